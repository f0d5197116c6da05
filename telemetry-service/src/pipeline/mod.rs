use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use meter_client::domain::MeterReading;

/// A reading in flight through the pipeline, stamped on arrival so sinks can
/// report end-to-end latency.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub reading: MeterReading,
    pub received_at: SystemTime,
}

impl Envelope {
    pub fn now(reading: MeterReading) -> Self {
        Self {
            reading,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn stream(&self) -> EnvelopeStream;
}

#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, input: Envelope) -> Result<Envelope, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope, PipelineError>> + Send + Unpin + 'static;
}

/// One source, a chain of transforms, one sink. Per-reading faults travel
/// down the stream as `Err` items; the sinks in this service count and skip
/// them rather than aborting the run.
pub struct Pipeline<S, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform>>,
    pub sink: K,
}

impl<S, K> Pipeline<S, K>
where
    S: Source + Send + Sync + 'static,
    K: Sink + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}
