use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

/// One device transmission.
///
/// `cumulative_flow` is the meter's lifetime total in m³ and is expected to be
/// monotone non-decreasing; nothing here repairs resets or rollover. The
/// auxiliary columns are carried through unchanged and play no part in the
/// usage classification.
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterReading {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    pub device_no: String,
    pub imei: Option<String>,
    /// Lifetime total, m³.
    pub cumulative_flow: f64,
    /// Point-in-time rate, m³/h.
    pub instantaneous_flow: f64,
    pub temperature: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub signal_strength: Option<f64>,
    pub pressure: Option<f64>,
    pub reverse_flow: Option<f64>,
    pub valve_status: Option<String>,
}

impl MeterReading {
    /// Instantaneous flow converted m³/h → L/s.
    pub fn instantaneous_lps(&self) -> f64 {
        crate::analysis::m3h_to_lps(self.instantaneous_flow)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unparseable report timestamp '{raw}'")]
pub struct TimestampParseError {
    pub raw: String,
}

/// Parse a reporting timestamp as either RFC3339 or the devices' plain
/// `YYYY-MM-DD HH:MM:SS` form. The plain form carries no offset (device
/// local clock) and is taken as UTC.
pub fn parse_report_ts(raw: &str) -> Result<OffsetDateTime, TimestampParseError> {
    let trimmed = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(ts);
    }

    let plain = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(trimmed, &plain)
        .map(|dt| dt.assume_utc())
        .map_err(|_| TimestampParseError {
            raw: trimmed.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_rfc3339_report_ts() {
        let ts = parse_report_ts("2025-03-04T08:10:00Z").unwrap();
        assert_eq!(ts, datetime!(2025-03-04 08:10:00 UTC));
    }

    #[test]
    fn parses_plain_report_ts_as_utc() {
        let ts = parse_report_ts("2025-03-04 08:10:00").unwrap();
        assert_eq!(ts, datetime!(2025-03-04 08:10:00 UTC));
    }

    #[test]
    fn rejects_garbage_report_ts() {
        let err = parse_report_ts("yesterday-ish").unwrap_err();
        assert!(err.to_string().contains("yesterday-ish"));
    }

    #[test]
    fn lps_conversion_round_trips() {
        let r = MeterReading {
            ts: datetime!(2025-03-04 08:00:00 UTC),
            device_no: "70018".to_string(),
            imei: None,
            cumulative_flow: 10.0,
            instantaneous_flow: 0.72,
            temperature: None,
            battery_voltage: None,
            signal_strength: None,
            pressure: None,
            reverse_flow: None,
            valve_status: None,
        };
        assert!((r.instantaneous_lps() * 3.6 - r.instantaneous_flow).abs() < 1e-12);
        assert!((r.instantaneous_lps() - 0.2).abs() < 1e-12);
    }
}
