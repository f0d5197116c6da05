use anyhow::{bail, Context, Result};
use meter_client::{analysis::extract_intervals, db::reading_queries};
use sqlx::postgres::PgPoolOptions;
use std::env;
use telemetry_service::{config::AppConfig, observability, report};
use time::{macros::format_description, Date};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: analyze_day <device_no> <YYYY-MM-DD>");
    }
    let device_no = &args[1];
    let date_desc = format_description!("[year]-[month]-[day]");
    let date = Date::parse(&args[2], &date_desc).context("invalid date, expected YYYY-MM-DD")?;

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let readings = reading_queries::day_readings(&pool, device_no, date).await?;
    tracing::info!(%device_no, %date, rows = readings.len(), "loaded device-day readings");

    let analysis = extract_intervals(readings, cfg.analysis.policy);
    let report = report::build_day_report(device_no, date, cfg.analysis.policy, &analysis)?;

    tracing::info!(
        intervals = report.intervals.len(),
        total_liters = report.summary.total_liters,
        "day analysis complete"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
