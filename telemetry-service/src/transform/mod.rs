use meter_client::domain::MeterReading;
use time::macros::datetime;

use crate::pipeline::{Envelope, PipelineError, Transform};

/// Pure validation of a `MeterReading`.
///
/// Rules:
/// - cumulative and instantaneous flow must be finite and non-negative (the
///   counter itself never goes below zero; decreasing *deltas* between
///   readings are an analysis-time concern, not an ingest reject).
/// - ts must be within the fleet's window [2020-01-01, 2030-12-31].
pub fn validate_reading(env: Envelope) -> Result<Envelope, PipelineError> {
    let r = &env.reading;

    if !r.cumulative_flow.is_finite() || r.cumulative_flow < 0.0 {
        return Err(PipelineError::Transform(format!(
            "cumulative_flow must be finite and non-negative, got {}",
            r.cumulative_flow
        )));
    }

    if !r.instantaneous_flow.is_finite() || r.instantaneous_flow < 0.0 {
        return Err(PipelineError::Transform(format!(
            "instantaneous_flow must be finite and non-negative, got {}",
            r.instantaneous_flow
        )));
    }

    let min_ts = datetime!(2020-01-01 00:00:00 UTC);
    let max_ts = datetime!(2030-12-31 00:00:00 UTC);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform for ReadingValidation {
    async fn apply(&self, input: Envelope) -> Result<Envelope, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_readings_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn envelope(ts: time::OffsetDateTime, cumulative_flow: f64, instantaneous_flow: f64) -> Envelope {
        Envelope::now(MeterReading {
            ts,
            device_no: "70018".to_string(),
            imei: None,
            cumulative_flow,
            instantaneous_flow,
            temperature: None,
            battery_voltage: None,
            signal_strength: None,
            pressure: None,
            reverse_flow: None,
            valve_status: None,
        })
    }

    #[test]
    fn validation_accepts_valid_reading() {
        let env = envelope(datetime!(2025-03-04 08:00:00 UTC), 123.456, 0.72);
        assert!(validate_reading(env).is_ok());
    }

    #[test]
    fn validation_rejects_negative_counter() {
        let env = envelope(datetime!(2025-03-04 08:00:00 UTC), -0.001, 0.0);
        let res = validate_reading(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn validation_rejects_nan_counter() {
        let env = envelope(datetime!(2025-03-04 08:00:00 UTC), f64::NAN, 0.0);
        let res = validate_reading(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn validation_rejects_out_of_range_ts() {
        let env = envelope(datetime!(2019-12-31 23:59:59 UTC), 1.0, 0.0);
        let res = validate_reading(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }
}
