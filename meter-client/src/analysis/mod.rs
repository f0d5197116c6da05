pub mod insights;
pub mod intervals;
pub mod summary;

pub use insights::{day_insights, DayInsights};
pub use intervals::{extract_intervals, DayAnalysis, UsageInterval};
pub use summary::UsageSummary;

pub const LITERS_PER_M3: f64 = 1000.0;

/// Gap in time-of-day seconds beyond which the meter is considered to have
/// gone quiet between two transmissions.
pub const QUIESCENT_GAP_SECS: i64 = 360;

/// Volume above which an interval counts as flushing, liters.
pub const FLUSHING_MIN_LITERS: f64 = 25.0;
/// Volume above which (up to the flushing bound) an interval counts as
/// bucket filling, liters.
pub const BUCKET_MIN_LITERS: f64 = 6.5;

/// m³/h per L/s.
pub const M3H_PER_LPS: f64 = 3.6;

pub fn m3h_to_lps(m3h: f64) -> f64 {
    m3h / M3H_PER_LPS
}

/// Water-use label for one interval.
///
/// The bands partition the real line: (25, ∞) flushing, (6.5, 25] bucket,
/// (-∞, 6.5] small use. Zero and negative volumes land in `SmallUse`; callers
/// wanting them gone use `ClassificationPolicy::AbsoluteFiltered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Flushing,
    Bucket,
    SmallUse,
}

impl Behavior {
    pub fn classify(volume_liters: f64) -> Self {
        if volume_liters > FLUSHING_MIN_LITERS {
            Behavior::Flushing
        } else if volume_liters > BUCKET_MIN_LITERS {
            Behavior::Bucket
        } else {
            Behavior::SmallUse
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Behavior::Flushing => "Flushing",
            Behavior::Bucket => "Bucket",
            Behavior::SmallUse => "Small Use",
        }
    }

    /// Chart color for this label.
    pub fn color(self) -> &'static str {
        match self {
            Behavior::Flushing => "#FF9999",
            Behavior::Bucket => "#66B2FF",
            Behavior::SmallUse => "#99CC99",
        }
    }
}

/// How interval volumes are filtered and compared against the behavior bands.
///
/// The two variants reproduce the two renderings the system has always had:
/// the annotated chart keeps every signed volume, the plain interval listing
/// drops non-positive volumes first. They disagree on counter anomalies
/// (negative deltas), so the choice is configuration, not a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum ClassificationPolicy {
    /// Classify the raw signed volume; negative and zero volumes come out as
    /// `SmallUse`.
    #[default]
    SignedThreshold,
    /// Drop non-positive volumes, then classify.
    AbsoluteFiltered,
}
