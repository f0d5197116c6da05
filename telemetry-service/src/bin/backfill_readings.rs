use anyhow::{bail, Result};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc, time::Duration};
use telemetry_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::PostgresReadingsSink,
    sources::ReadingsBackfillFileSource,
    transform,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <ndjson_file_path>");
    }
    let file_path = &args[1];

    // Load configuration (can point TELEMETRY_CONFIG to a backfill-specific file).
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let r_cfg = &cfg.readings;

    let sink = PostgresReadingsSink::new(
        pool,
        r_cfg.sink.batch_size,
        r_cfg.sink.max_retries,
        Duration::from_millis(r_cfg.sink.retry_backoff_ms),
    );

    let source = ReadingsBackfillFileSource::new(file_path);

    let pipeline = Pipeline {
        source,
        transforms: vec![Arc::new(transform::ReadingValidation::default())],
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
