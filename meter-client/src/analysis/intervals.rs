use time::Time;

use crate::domain::MeterReading;

use super::{Behavior, ClassificationPolicy, LITERS_PER_M3, QUIESCENT_GAP_SECS};

/// One classified span between two adjacent key readings.
///
/// `end` is the key reading the span is attributed to (where the chart dot
/// sits), `start` the next key reading back in time. `volume_liters` is
/// signed under `SignedThreshold` and strictly positive under
/// `AbsoluteFiltered`.
#[derive(Debug, Clone)]
pub struct UsageInterval {
    pub start: Time,
    pub end: Time,
    /// Meter total at `end`, m³. Used as the y-value when charting.
    pub cumulative_flow: f64,
    pub volume_liters: f64,
    pub behavior: Behavior,
}

/// Result of analyzing one device-day.
///
/// `readings` is the full input echoed back sorted ascending by time-of-day
/// for plotting; `intervals` runs latest-first, matching the order the key
/// readings were selected in.
#[derive(Debug, Clone)]
pub struct DayAnalysis {
    pub readings: Vec<MeterReading>,
    pub intervals: Vec<UsageInterval>,
}

fn tod_secs(t: Time) -> i64 {
    i64::from(t.hour()) * 3600 + i64::from(t.minute()) * 60 + i64::from(t.second())
}

/// Seconds between two times of day, wrapping at 24 h so the result is never
/// negative. Dates are deliberately out of the picture: a day's readings are
/// compared purely on the clock, which is also why a set spanning midnight
/// can look 2 minutes wide (known limitation, relied on downstream).
fn gap_seconds(later: Time, earlier: Time) -> i64 {
    let mut diff = tod_secs(later) - tod_secs(earlier);
    if diff < 0 {
        diff += 24 * 3600;
    }
    diff
}

/// Reduce a device-day to key readings and classify the spans between them.
///
/// Key readings are the quiescence boundaries: every reading that trails its
/// predecessor (latest-first order) by more than [`QUIESCENT_GAP_SECS`], plus
/// the latest reading of the day as anchor. Each key reading is then paired
/// with the next one back in time; the volume of the pair is
/// `1000 × (later.cumulative_flow − earlier.cumulative_flow)` liters and the
/// chronologically earliest key reading, having no partner, produces no row.
/// NaN volumes (from readings ingested with unusable counters) are dropped,
/// never propagated.
///
/// Fewer than two readings, or no gap over the threshold, simply yields an
/// empty interval list.
pub fn extract_intervals(mut readings: Vec<MeterReading>, policy: ClassificationPolicy) -> DayAnalysis {
    // Latest-first over indices so the echo can be re-sorted afterwards.
    let mut desc: Vec<usize> = (0..readings.len()).collect();
    desc.sort_by(|&a, &b| readings[b].ts.time().cmp(&readings[a].ts.time()));

    let mut key_idx: Vec<usize> = Vec::new();
    for pos in 0..desc.len() {
        let selected = pos == 0 // anchor
            || gap_seconds(
                readings[desc[pos - 1]].ts.time(),
                readings[desc[pos]].ts.time(),
            ) > QUIESCENT_GAP_SECS;
        if selected {
            key_idx.push(desc[pos]);
        }
    }

    let mut intervals = Vec::new();
    for pair in key_idx.windows(2) {
        let cur = &readings[pair[0]];
        let next = &readings[pair[1]]; // chronologically earlier
        let volume = LITERS_PER_M3 * (cur.cumulative_flow - next.cumulative_flow);
        if volume.is_nan() {
            continue;
        }

        let (volume_liters, behavior) = match policy {
            ClassificationPolicy::SignedThreshold => (volume, Behavior::classify(volume)),
            ClassificationPolicy::AbsoluteFiltered => {
                if volume <= 0.0 {
                    continue;
                }
                (volume, Behavior::classify(volume))
            }
        };

        intervals.push(UsageInterval {
            start: next.ts.time(),
            end: cur.ts.time(),
            cumulative_flow: cur.cumulative_flow,
            volume_liters,
            behavior,
        });
    }

    readings.sort_by(|a, b| a.ts.time().cmp(&b.ts.time()));

    DayAnalysis { readings, intervals }
}
