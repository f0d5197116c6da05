use anyhow::{bail, Context, Result};
use meter_client::db::reading_queries;
use sqlx::postgres::PgPoolOptions;
use std::env;
use telemetry_service::{config::AppConfig, observability};

// Quick look at what a device pushed most recently, newest first.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: latest_readings <device_no> [limit]");
    }
    let device_no = &args[1];
    let limit: i64 = match args.get(2) {
        Some(raw) => raw.parse().context("invalid limit, expected an integer")?,
        None => 10,
    };

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let readings = reading_queries::latest_readings(&pool, device_no, limit).await?;
    tracing::info!(%device_no, rows = readings.len(), "loaded latest readings");

    for reading in &readings {
        println!("{}", serde_json::to_string(reading)?);
    }

    Ok(())
}
