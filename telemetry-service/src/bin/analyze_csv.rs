use anyhow::{bail, Context, Result};
use meter_client::analysis::extract_intervals;
use std::{env, fs::File};
use telemetry_service::{config::AppConfig, observability, report, sources::readings_csv_file::record_to_reading};
use time::{macros::format_description, Date};

// Offline analysis of a historical CSV export, no database required.
fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: analyze_csv <csv_file_path> <YYYY-MM-DD>");
    }
    let file_path = &args[1];
    let date_desc = format_description!("[year]-[month]-[day]");
    let date = Date::parse(&args[2], &date_desc).context("invalid date, expected YYYY-MM-DD")?;

    let cfg = AppConfig::load()?;

    let file = File::open(file_path).with_context(|| format!("failed to open {file_path}"))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers().context("failed to read CSV headers")?.clone();

    let mut total_rows = 0usize;
    let mut parse_failures = 0usize;
    let mut readings = Vec::new();
    let mut other_days = 0usize;

    for result in rdr.records() {
        let record = result.context("failed to read CSV record")?;
        total_rows += 1;

        match record_to_reading(&record, &headers) {
            Ok(r) => {
                if r.ts.date() == date {
                    readings.push(r);
                } else {
                    other_days += 1;
                }
            }
            Err(e) => {
                parse_failures += 1;
                tracing::debug!(error = %e, "skipping unusable CSV row");
            }
        }
    }

    if total_rows > 0 && parse_failures == total_rows {
        // Nothing in the file established an ordering; that is not an empty
        // day, it is unusable input.
        bail!("no row in {file_path} has a parseable timestamp and counter");
    }

    tracing::info!(
        total_rows,
        parse_failures,
        other_days,
        day_rows = readings.len(),
        "loaded CSV readings"
    );

    let device_no = readings
        .first()
        .map(|r| r.device_no.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let analysis = extract_intervals(readings, cfg.analysis.policy);
    let report = report::build_day_report(&device_no, date, cfg.analysis.policy, &analysis)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
