use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use meter_client::domain::{parse_report_ts, MeterReading};
use time::{macros::datetime, OffsetDateTime};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

#[derive(Clone)]
struct PushState {
    tx: mpsc::Sender<Envelope>,
    auth_bearer_token: Option<String>,
}

/// HTTP source for device pushes.
///
/// Meters POST one reading at a time to `/push/water-meter`; accepted
/// readings are queued on a bounded channel that the pipeline drains as its
/// stream. Rejections (bad token, malformed payload) answer the device
/// directly and never enter the pipeline.
#[derive(Clone)]
pub struct HttpPushSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope>>>>,
}

/// Device push payload, exactly as the meters send it: every numeric field is
/// a string, `updateTime` is epoch milliseconds or `YYYY-MM-DD HH:MM:SS`, and
/// the `temprature` / `valveStatu` spellings are part of the protocol.
/// `startFrequency` arrives too and is ignored wholesale.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WaterMeterPush {
    pub device_no: String,
    pub imei: String,
    pub total_flow: String,
    pub instantaneous_flow: String,
    pub battery_voltage: String,
    pub pressure: String,
    pub reverse_flow: String,
    pub freeze_date_flow: String,
    pub signal_value: String,
    #[serde(rename = "temprature")]
    pub temperature: String,
    #[serde(rename = "valveStatu")]
    pub valve_status: String,
    pub update_time: UpdateTime,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum UpdateTime {
    EpochMillis(i64),
    Text(String),
}

fn required_f64(field: &str, raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("field '{field}' is not numeric: '{raw}'"))
}

fn lenient_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        trimmed.parse().ok()
    }
}

fn lenient_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Epoch timestamps outside this window are clock faults, not history.
fn parse_update_time(value: &UpdateTime) -> Result<OffsetDateTime, String> {
    match value {
        UpdateTime::EpochMillis(ms) => {
            let ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(*ms) * 1_000_000)
                .map_err(|_| format!("updateTime out of range: {ms}"))?;
            let min = datetime!(2020-01-01 00:00:00 UTC);
            let max = datetime!(2030-12-31 00:00:00 UTC);
            if ts < min || ts > max {
                return Err(format!("updateTime outside accepted window: {ms}"));
            }
            Ok(ts)
        }
        UpdateTime::Text(s) => parse_report_ts(s).map_err(|e| e.to_string()),
    }
}

impl WaterMeterPush {
    /// Strictly-validated fields mirror the push interface contract; the rest
    /// parse leniently and fall back to absent. `freezeDateFlow` is checked
    /// for protocol conformance but not stored.
    pub(crate) fn try_into_reading(self) -> Result<MeterReading, String> {
        let ts = parse_update_time(&self.update_time)?;
        let cumulative_flow = required_f64("totalFlow", &self.total_flow)?;
        let instantaneous_flow = required_f64("instantaneousFlow", &self.instantaneous_flow)?;
        let battery_voltage = required_f64("batteryVoltage", &self.battery_voltage)?;
        let pressure = required_f64("pressure", &self.pressure)?;
        required_f64("freezeDateFlow", &self.freeze_date_flow)?;

        Ok(MeterReading {
            ts,
            device_no: self.device_no,
            imei: lenient_string(&self.imei),
            cumulative_flow,
            instantaneous_flow,
            temperature: lenient_f64(&self.temperature),
            battery_voltage: Some(battery_voltage),
            signal_strength: lenient_f64(&self.signal_value),
            pressure: Some(pressure),
            reverse_flow: lenient_f64(&self.reverse_flow),
            valve_status: lenient_string(&self.valve_status),
        })
    }
}

impl HttpPushSource {
    pub async fn new(
        bind_addr: &str,
        channel_capacity: usize,
        auth_bearer_token: Option<String>,
    ) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let state = PushState {
            tx,
            auth_bearer_token,
        };

        let app = Router::new()
            .route("/push/water-meter", post(push_water_meter))
            .with_state(state);

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "push source server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind push source listener");
                }
            }
        });

        Ok(Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }
}

#[async_trait::async_trait]
impl Source for HttpPushSource {
    async fn stream(&self) -> EnvelopeStream {
        let mut guard = self.receiver.lock().await;
        let rx = guard
            .take()
            .expect("HttpPushSource stream already taken; only one consumer supported");

        Box::pin(ReceiverStream::new(rx).map(Ok))
    }
}

async fn push_water_meter(
    State(state): State<PushState>,
    headers: HeaderMap,
    Json(payload): Json<WaterMeterPush>,
) -> Result<StatusCode, StatusCode> {
    metrics::counter!("push_requests_total").increment(1);

    if let Some(expected) = &state.auth_bearer_token {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            metrics::counter!("push_unauthorized_total").increment(1);
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let reading = match payload.try_into_reading() {
        Ok(r) => r,
        Err(reason) => {
            metrics::counter!("push_rejected_total").increment(1);
            tracing::warn!(%reason, "rejected water-meter push");
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    if state.tx.send(Envelope::now(reading)).await.is_err() {
        // Channel closed; the pipeline is gone.
        metrics::counter!("push_enqueue_failed_total").increment(1);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const PUSH_JSON: &str = r#"{
        "batteryVoltage": "3.62",
        "deviceNo": "70018",
        "freezeDateFlow": "123.400",
        "imei": "860329065551923",
        "instantaneousFlow": "0.72",
        "pressure": "0.30",
        "reverseFlow": "0.00",
        "signalValue": "-85",
        "startFrequency": "113",
        "temprature": "21.5",
        "totalFlow": "123.456",
        "valveStatu": "open",
        "updateTime": "2025-03-04 08:10:00"
    }"#;

    #[test]
    fn decodes_device_push_with_text_timestamp() {
        let push: WaterMeterPush = serde_json::from_str(PUSH_JSON).unwrap();
        let reading = push.try_into_reading().unwrap();

        assert_eq!(reading.ts, datetime!(2025-03-04 08:10:00 UTC));
        assert_eq!(reading.device_no, "70018");
        assert_eq!(reading.imei.as_deref(), Some("860329065551923"));
        assert!((reading.cumulative_flow - 123.456).abs() < 1e-9);
        assert!((reading.instantaneous_flow - 0.72).abs() < 1e-9);
        assert_eq!(reading.temperature, Some(21.5));
        assert_eq!(reading.battery_voltage, Some(3.62));
        assert_eq!(reading.signal_strength, Some(-85.0));
        assert_eq!(reading.valve_status.as_deref(), Some("open"));
    }

    #[test]
    fn decodes_device_push_with_epoch_millis() {
        let json = PUSH_JSON.replace("\"2025-03-04 08:10:00\"", "1741075800000");
        let push: WaterMeterPush = serde_json::from_str(&json).unwrap();
        let reading = push.try_into_reading().unwrap();
        // 1741075800000 ms = 2025-03-04 08:10:00 UTC
        assert_eq!(reading.ts, datetime!(2025-03-04 08:10:00 UTC));
    }

    #[test]
    fn rejects_epoch_outside_device_window() {
        // 1999-01-01, long before any meter in the fleet existed.
        let json = PUSH_JSON.replace("\"2025-03-04 08:10:00\"", "915148800000");
        let push: WaterMeterPush = serde_json::from_str(&json).unwrap();
        let err = push.try_into_reading().unwrap_err();
        assert!(err.contains("window"));
    }

    #[test]
    fn rejects_non_numeric_total_flow() {
        let json = PUSH_JSON.replace("\"totalFlow\": \"123.456\"", "\"totalFlow\": \"n/a\"");
        let push: WaterMeterPush = serde_json::from_str(&json).unwrap();
        let err = push.try_into_reading().unwrap_err();
        assert!(err.contains("totalFlow"));
    }

    #[test]
    fn lenient_fields_tolerate_blanks() {
        let json = PUSH_JSON
            .replace("\"temprature\": \"21.5\"", "\"temprature\": \"\"")
            .replace("\"signalValue\": \"-85\"", "\"signalValue\": \" \"");
        let push: WaterMeterPush = serde_json::from_str(&json).unwrap();
        let reading = push.try_into_reading().unwrap();
        assert_eq!(reading.temperature, None);
        assert_eq!(reading.signal_strength, None);
    }
}
