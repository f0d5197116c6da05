use std::path::PathBuf;

use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use async_stream::try_stream;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};
use crate::sources::http_push::WaterMeterPush;

/// NDJSON backfill source.
///
/// Each line is one device push object in the same shape the HTTP endpoint
/// accepts (replays of captured push traffic, `push_history_data` style), so
/// the decoding and validation are shared with the push source.
pub struct ReadingsBackfillFileSource {
    path: PathBuf,
}

impl ReadingsBackfillFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source for ReadingsBackfillFileSource {
    async fn stream(&self) -> EnvelopeStream {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open backfill file: {e}"))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read backfill line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }

                let push: WaterMeterPush = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("backfill_readings_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "failed to parse backfill json line: {e}"
                        )))?
                    }
                };

                let reading = match push.try_into_reading() {
                    Ok(r) => r,
                    Err(reason) => {
                        metrics::counter!("backfill_readings_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "invalid backfill record: {reason}"
                        )))?
                    }
                };

                yield Envelope::now(reading);
            }
        };

        Box::pin(s)
    }
}
