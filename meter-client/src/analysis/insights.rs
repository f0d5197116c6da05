use super::UsageInterval;

/// Single large draw, liters.
pub const LARGE_USE_MIN_LITERS: f64 = 50.0;
/// Night-time draw worth flagging, liters.
pub const NIGHT_USE_MIN_LITERS: f64 = 5.0;
/// Upper bound of a "seep" interval, liters.
pub const SEEP_MAX_LITERS: f64 = 1.0;
/// More seep intervals than this in one day suggests a leak.
pub const LEAK_SEEP_COUNT: usize = 5;

/// Fixed-threshold anomaly counters for the day view tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayInsights {
    /// Intervals over [`LARGE_USE_MIN_LITERS`].
    pub large_use_count: usize,
    /// Intervals attributed to 23:00–05:59 moving more than
    /// [`NIGHT_USE_MIN_LITERS`].
    pub night_use_count: usize,
    /// Intervals in (0, [`SEEP_MAX_LITERS`]).
    pub seep_interval_count: usize,
    pub suspected_leak: bool,
}

pub fn day_insights(intervals: &[UsageInterval]) -> DayInsights {
    let mut out = DayInsights::default();

    for iv in intervals {
        if iv.volume_liters > LARGE_USE_MIN_LITERS {
            out.large_use_count += 1;
        }

        let hour = iv.end.hour();
        if (hour >= 23 || hour <= 5) && iv.volume_liters > NIGHT_USE_MIN_LITERS {
            out.night_use_count += 1;
        }

        if iv.volume_liters > 0.0 && iv.volume_liters < SEEP_MAX_LITERS {
            out.seep_interval_count += 1;
        }
    }

    out.suspected_leak = out.seep_interval_count > LEAK_SEEP_COUNT;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Behavior, UsageInterval};
    use time::macros::time;
    use time::Time;

    fn interval(end: Time, volume_liters: f64) -> UsageInterval {
        UsageInterval {
            start: end,
            end,
            cumulative_flow: 0.0,
            volume_liters,
            behavior: Behavior::classify(volume_liters),
        }
    }

    #[test]
    fn counts_large_and_night_uses() {
        let intervals = vec![
            interval(time!(12:00:00), 60.0),  // large, daytime
            interval(time!(23:30:00), 12.0),  // night
            interval(time!(03:00:00), 5.0),   // night but at the 5 L bound: not counted
            interval(time!(04:00:00), 5.1),   // night
            interval(time!(10:00:00), 12.0),  // daytime, unremarkable
        ];

        let insights = day_insights(&intervals);
        assert_eq!(insights.large_use_count, 1);
        assert_eq!(insights.night_use_count, 2);
        assert!(!insights.suspected_leak);
    }

    #[test]
    fn many_seep_intervals_flag_a_leak() {
        let mut intervals: Vec<UsageInterval> =
            (0..6).map(|i| interval(time!(08:00:00), 0.1 * (i + 1) as f64)).collect();
        assert_eq!(day_insights(&intervals).seep_interval_count, 6);
        assert!(day_insights(&intervals).suspected_leak);

        intervals.pop();
        assert!(!day_insights(&intervals).suspected_leak);
    }

    #[test]
    fn zero_and_negative_volumes_are_not_seeps() {
        let intervals = vec![
            interval(time!(08:00:00), 0.0),
            interval(time!(09:00:00), -0.5),
        ];
        let insights = day_insights(&intervals);
        assert_eq!(insights.seep_interval_count, 0);
        assert!(!insights.suspected_leak);
    }
}
