use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use meter_client::domain::{parse_report_ts, MeterReading};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// CSV backfill/source for historical device readings.
///
/// Expected header columns (by name):
/// - ts (RFC3339 or `YYYY-MM-DD HH:MM:SS`)
/// - device_no
/// - imei (optional)
/// - cumulative_flow (m³)
/// - instantaneous_flow (m³/h; blank treated as 0)
/// - temperature (optional)
/// - battery_voltage (optional)
/// - signal_strength (optional)
/// - pressure (optional)
/// - reverse_flow (optional)
/// - valve_status (optional)
pub struct ReadingsCsvFileSource {
    path: PathBuf,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    if s.trim().is_empty() {
        None
    } else {
        s.trim().parse().ok()
    }
}

fn parse_optional_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Shared with the offline analyzer, which walks CSV files outside a
/// pipeline.
pub fn record_to_reading(
    record: &StringRecord,
    headers: &csv::StringRecord,
) -> Result<MeterReading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let ts_str = get("ts")?;
    let ts = parse_report_ts(ts_str).map_err(|e| PipelineError::Source(e.to_string()))?;

    let device_no = get("device_no")?.trim().to_string();
    let imei = parse_optional_string(get("imei").unwrap_or(""));

    // Readings without a usable counter are excluded before analysis ever
    // sees them.
    let flow_str = get("cumulative_flow")?;
    let cumulative_flow: f64 = flow_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid cumulative_flow '{flow_str}': {e}")))?;

    let instantaneous_flow = get("instantaneous_flow")
        .ok()
        .and_then(parse_optional_f64)
        .unwrap_or(0.0);

    let temperature = get("temperature").ok().and_then(parse_optional_f64);
    let battery_voltage = get("battery_voltage").ok().and_then(parse_optional_f64);
    let signal_strength = get("signal_strength").ok().and_then(parse_optional_f64);
    let pressure = get("pressure").ok().and_then(parse_optional_f64);
    let reverse_flow = get("reverse_flow").ok().and_then(parse_optional_f64);
    let valve_status = get("valve_status").ok().map(parse_optional_string).unwrap_or(None);

    Ok(MeterReading {
        ts,
        device_no,
        imei,
        cumulative_flow,
        instantaneous_flow,
        temperature,
        battery_voltage,
        signal_strength,
        pressure,
        reverse_flow,
        valve_status,
    })
}

#[async_trait::async_trait]
impl Source for ReadingsCsvFileSource {
    async fn stream(&self) -> EnvelopeStream {
        // This source uses a blocking CSV reader but is wrapped in a single
        // async task. For large files, you might want to move this onto a
        // dedicated thread pool.
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let reading = match record_to_reading(&record, &headers) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("readings_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope::now(reading);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn parse_line(header: &str, line: &str) -> Result<MeterReading, PipelineError> {
        let headers = StringRecord::from(header.split(',').collect::<Vec<_>>());
        let record = StringRecord::from(line.split(',').collect::<Vec<_>>());
        record_to_reading(&record, &headers)
    }

    const HEADER: &str =
        "ts,device_no,imei,cumulative_flow,instantaneous_flow,temperature,battery_voltage,signal_strength,pressure,reverse_flow,valve_status";

    #[test]
    fn parses_full_row_with_plain_timestamp() {
        let r = parse_line(
            HEADER,
            "2025-03-04 08:10:00,70018,860329065551923,123.456,0.72,21.5,3.62,-85,0.30,0.00,open",
        )
        .unwrap();

        assert_eq!(r.ts, datetime!(2025-03-04 08:10:00 UTC));
        assert_eq!(r.device_no, "70018");
        assert!((r.cumulative_flow - 123.456).abs() < 1e-9);
        assert_eq!(r.signal_strength, Some(-85.0));
        assert_eq!(r.valve_status.as_deref(), Some("open"));
    }

    #[test]
    fn parses_rfc3339_timestamp_and_blank_optionals() {
        let r = parse_line(HEADER, "2025-03-04T08:10:00Z,70018,,123.456,,,,,,,").unwrap();

        assert_eq!(r.ts, datetime!(2025-03-04 08:10:00 UTC));
        assert_eq!(r.imei, None);
        assert_eq!(r.instantaneous_flow, 0.0);
        assert_eq!(r.temperature, None);
        assert_eq!(r.valve_status, None);
    }

    #[test]
    fn rejects_row_without_usable_counter() {
        let err = parse_line(HEADER, "2025-03-04 08:10:00,70018,,not-a-number,0.72,,,,,,")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[test]
    fn rejects_row_with_unparseable_timestamp() {
        let err = parse_line(HEADER, "around breakfast,70018,,123.456,0.72,,,,,,").unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }
}
