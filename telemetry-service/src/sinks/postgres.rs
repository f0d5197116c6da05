use std::time::Duration;

use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Batched inserts into `water_readings` with bounded, linearly backed-off
/// retries per batch.
pub struct PostgresReadingsSink {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PostgresReadingsSink {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size,
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let res = self.insert_batch(batch).await;
            match res {
                Ok(()) => {
                    let counter = metrics::counter!("readings_ingested_total");
                    counter.increment(batch.len() as u64);

                    // Approximate end-to-end latency from earliest received_at to now.
                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                            let hist = metrics::histogram!("ingest_end_to_end_latency_seconds");
                            hist.record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "postgres sink flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "postgres sink flush failed, giving up");
                    metrics::counter!("postgres_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn insert_batch(&self, batch: &[Envelope]) -> Result<(), sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO water_readings (ts, device_no, imei, cumulative_flow, instantaneous_flow, temperature, battery_voltage, signal_strength, pressure, reverse_flow, valve_status) ",
        );

        builder.push("VALUES ");
        builder.push_values(batch, |mut b, env| {
            let r = &env.reading;
            b.push_bind(r.ts)
                .push_bind(&r.device_no)
                .push_bind(&r.imei)
                .push_bind(r.cumulative_flow)
                .push_bind(r.instantaneous_flow)
                .push_bind(r.temperature)
                .push_bind(r.battery_voltage)
                .push_bind(r.signal_strength)
                .push_bind(r.pressure)
                .push_bind(r.reverse_flow)
                .push_bind(&r.valve_status);
        });

        let query = builder.build();
        query.execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Sink for PostgresReadingsSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<Envelope> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for PostgresReadingsSink");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}
