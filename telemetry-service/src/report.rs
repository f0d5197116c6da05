use anyhow::Result;
use meter_client::analysis::{
    day_insights, ClassificationPolicy, DayAnalysis, UsageSummary,
};
use serde::Serialize;
use time::{macros::date, macros::format_description, Date, PrimitiveDateTime, Time};

/// Everything a day view needs: the raw curve, the classified interval table,
/// the stats box and the anomaly tiles. Times are `HH:MM:SS` strings for
/// tables, `plot_ts` anchors the same time-of-day on a fixed date so chart
/// axes line up across days.
#[derive(Debug, Serialize)]
pub struct DayReport {
    pub device_no: String,
    pub date: String,
    pub policy: ClassificationPolicy,
    pub readings: Vec<ReadingPoint>,
    pub intervals: Vec<IntervalRow>,
    pub summary: SummaryRow,
    pub insights: InsightsRow,
}

#[derive(Debug, Serialize)]
pub struct ReadingPoint {
    pub time: String,
    pub plot_ts: String,
    pub cumulative_flow_m3: f64,
    pub instantaneous_lps: f64,
    pub temperature: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub signal_strength: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IntervalRow {
    pub start: String,
    pub end: String,
    pub cumulative_flow_m3: f64,
    pub volume_liters: f64,
    pub behavior: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SummaryRow {
    pub total_liters: f64,
    pub flushing_liters: f64,
    pub bucket_liters: f64,
    pub small_use_liters: f64,
    pub flushing_pct: f64,
    pub bucket_pct: f64,
    pub small_use_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct InsightsRow {
    pub large_use_count: usize,
    pub night_use_count: usize,
    pub seep_interval_count: usize,
    pub suspected_leak: bool,
}

fn fmt_time(t: Time) -> Result<String> {
    let desc = format_description!("[hour]:[minute]:[second]");
    Ok(t.format(&desc)?)
}

fn fmt_plot_ts(t: Time) -> Result<String> {
    // Chart anchor date, same for every day rendered.
    let anchored = PrimitiveDateTime::new(date!(1900-01-01), t);
    let desc = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    Ok(anchored.format(&desc)?)
}

fn pct(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        100.0 * part / total
    }
}

pub fn build_day_report(
    device_no: &str,
    date: Date,
    policy: ClassificationPolicy,
    analysis: &DayAnalysis,
) -> Result<DayReport> {
    let date_desc = format_description!("[year]-[month]-[day]");

    let mut readings = Vec::with_capacity(analysis.readings.len());
    for r in &analysis.readings {
        readings.push(ReadingPoint {
            time: fmt_time(r.ts.time())?,
            plot_ts: fmt_plot_ts(r.ts.time())?,
            cumulative_flow_m3: r.cumulative_flow,
            instantaneous_lps: r.instantaneous_lps(),
            temperature: r.temperature,
            battery_voltage: r.battery_voltage,
            signal_strength: r.signal_strength,
        });
    }

    let mut intervals = Vec::with_capacity(analysis.intervals.len());
    for iv in &analysis.intervals {
        intervals.push(IntervalRow {
            start: fmt_time(iv.start)?,
            end: fmt_time(iv.end)?,
            cumulative_flow_m3: iv.cumulative_flow,
            volume_liters: iv.volume_liters,
            behavior: iv.behavior.label(),
            color: iv.behavior.color(),
        });
    }

    let summary = UsageSummary::from_intervals(&analysis.intervals);
    let insights = day_insights(&analysis.intervals);

    Ok(DayReport {
        device_no: device_no.to_string(),
        date: date.format(&date_desc)?,
        policy,
        readings,
        intervals,
        summary: SummaryRow {
            total_liters: summary.total_liters,
            flushing_liters: summary.flushing_liters,
            bucket_liters: summary.bucket_liters,
            small_use_liters: summary.small_use_liters,
            flushing_pct: pct(summary.flushing_liters, summary.total_liters),
            bucket_pct: pct(summary.bucket_liters, summary.total_liters),
            small_use_pct: pct(summary.small_use_liters, summary.total_liters),
        },
        insights: InsightsRow {
            large_use_count: insights.large_use_count,
            night_use_count: insights.night_use_count,
            seep_interval_count: insights.seep_interval_count,
            suspected_leak: insights.suspected_leak,
        },
    })
}
