use super::{Behavior, UsageInterval};

/// Day totals for the stats box: per-label liter sums (absolute value of the
/// signed sum, as the chart has always displayed them) and row counts.
#[derive(Debug, Clone, Default)]
pub struct UsageSummary {
    pub total_liters: f64,
    pub flushing_liters: f64,
    pub bucket_liters: f64,
    pub small_use_liters: f64,
    pub flushing_count: usize,
    pub bucket_count: usize,
    pub small_use_count: usize,
}

impl UsageSummary {
    pub fn from_intervals(intervals: &[UsageInterval]) -> Self {
        let mut total = 0.0;
        let mut flushing = 0.0;
        let mut bucket = 0.0;
        let mut small = 0.0;
        let mut out = UsageSummary::default();

        for iv in intervals {
            total += iv.volume_liters;
            match iv.behavior {
                Behavior::Flushing => {
                    flushing += iv.volume_liters;
                    out.flushing_count += 1;
                }
                Behavior::Bucket => {
                    bucket += iv.volume_liters;
                    out.bucket_count += 1;
                }
                Behavior::SmallUse => {
                    small += iv.volume_liters;
                    out.small_use_count += 1;
                }
            }
        }

        out.total_liters = total.abs();
        out.flushing_liters = flushing.abs();
        out.bucket_liters = bucket.abs();
        out.small_use_liters = small.abs();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_intervals, ClassificationPolicy};
    use crate::domain::MeterReading;
    use time::macros::datetime;

    fn reading(ts: time::OffsetDateTime, cumulative_flow: f64) -> MeterReading {
        MeterReading {
            ts,
            device_no: "70018".to_string(),
            imei: None,
            cumulative_flow,
            instantaneous_flow: 0.0,
            temperature: None,
            battery_voltage: None,
            signal_strength: None,
            pressure: None,
            reverse_flow: None,
            valve_status: None,
        }
    }

    #[test]
    fn summary_partitions_by_behavior() {
        // Hourly key readings with deltas of 30 L, 10 L and 1 L.
        let input = vec![
            reading(datetime!(2025-03-04 07:00:00 UTC), 9.000),
            reading(datetime!(2025-03-04 08:00:00 UTC), 9.030),
            reading(datetime!(2025-03-04 09:00:00 UTC), 9.040),
            reading(datetime!(2025-03-04 10:00:00 UTC), 9.041),
        ];

        let out = extract_intervals(input, ClassificationPolicy::SignedThreshold);
        let summary = UsageSummary::from_intervals(&out.intervals);

        assert!((summary.total_liters - 41.0).abs() < 1e-9);
        assert!((summary.flushing_liters - 30.0).abs() < 1e-9);
        assert!((summary.bucket_liters - 10.0).abs() < 1e-9);
        assert!((summary.small_use_liters - 1.0).abs() < 1e-9);
        assert_eq!(summary.flushing_count, 1);
        assert_eq!(summary.bucket_count, 1);
        assert_eq!(summary.small_use_count, 1);
    }

    #[test]
    fn empty_interval_list_sums_to_zero() {
        let summary = UsageSummary::from_intervals(&[]);
        assert_eq!(summary.total_liters, 0.0);
        assert_eq!(summary.flushing_count + summary.bucket_count + summary.small_use_count, 0);
    }
}
