use anyhow::{anyhow, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use telemetry_service::{
    config::{AppConfig, SinkKind},
    metrics_server, observability,
    pipeline::{Pipeline, PipelineError, Sink},
    sinks::{CsvAppendSink, PostgresReadingsSink},
    sources::HttpPushSource,
    transform,
};

enum ReadingsSink {
    Postgres(PostgresReadingsSink),
    Csv(CsvAppendSink),
}

#[async_trait::async_trait]
impl Sink for ReadingsSink {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<telemetry_service::Envelope, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        match self {
            Self::Postgres(s) => s.run(input).await,
            Self::Csv(s) => s.run(input).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr);
    }

    let r_cfg = &cfg.readings;

    let sink = match r_cfg.sink.kind {
        SinkKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.database.max_connections)
                .connect(&cfg.database.uri)
                .await?;
            ReadingsSink::Postgres(PostgresReadingsSink::new(
                pool,
                r_cfg.sink.batch_size,
                r_cfg.sink.max_retries,
                Duration::from_millis(r_cfg.sink.retry_backoff_ms),
            ))
        }
        SinkKind::Csv => {
            let path = r_cfg
                .sink
                .csv_path
                .clone()
                .ok_or_else(|| anyhow!("readings.sink.csv_path is required when kind = \"csv\""))?;
            ReadingsSink::Csv(CsvAppendSink::new(
                path,
                r_cfg.sink.batch_size,
                r_cfg.sink.max_retries,
                Duration::from_millis(r_cfg.sink.retry_backoff_ms),
            ))
        }
    };

    let source = HttpPushSource::new(
        &r_cfg.source.http_bind_addr,
        r_cfg.source.channel_capacity,
        r_cfg.source.auth_bearer_token.clone(),
    )
    .await?;

    tracing::info!(
        pipeline = %r_cfg.name,
        bind_addr = %r_cfg.source.http_bind_addr,
        "telemetry pipeline starting"
    );

    let pipeline = Pipeline {
        source,
        transforms: vec![Arc::new(transform::ReadingValidation::default())],
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
