use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    time::Duration,
};

use futures::StreamExt;
use time::format_description::well_known::Rfc3339;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Column order shared with `ReadingsCsvFileSource`, so a file written here
/// can be re-ingested as a backfill.
pub(crate) const CSV_HEADER: [&str; 11] = [
    "ts",
    "device_no",
    "imei",
    "cumulative_flow",
    "instantaneous_flow",
    "temperature",
    "battery_voltage",
    "signal_strength",
    "pressure",
    "reverse_flow",
    "valve_status",
];

/// Appends accepted readings to a flat CSV file, the local no-database
/// deployment's store. The header is written once, when the sink creates the
/// file; append runs never repeat it. Single writer by construction: one
/// sink task owns the file handle.
pub struct CsvAppendSink {
    path: PathBuf,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

fn opt_f64_field(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

pub(crate) fn reading_to_record(env: &Envelope) -> Result<Vec<String>, PipelineError> {
    let r = &env.reading;
    let ts = r
        .ts
        .format(&Rfc3339)
        .map_err(|e| PipelineError::Sink(format!("unformattable ts: {e}")))?;

    Ok(vec![
        ts,
        r.device_no.clone(),
        r.imei.clone().unwrap_or_default(),
        r.cumulative_flow.to_string(),
        r.instantaneous_flow.to_string(),
        opt_f64_field(r.temperature),
        opt_f64_field(r.battery_voltage),
        opt_f64_field(r.signal_strength),
        opt_f64_field(r.pressure),
        opt_f64_field(r.reverse_flow),
        r.valve_status.clone().unwrap_or_default(),
    ])
}

impl CsvAppendSink {
    pub fn new<P: Into<PathBuf>>(path: P, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            path: path.into(),
            batch_size,
            max_retries,
            retry_backoff,
        }
    }

    fn open_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, PipelineError> {
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::Sink(format!("failed to open CSV store: {e}")))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer
                .write_record(CSV_HEADER)
                .map_err(|e| PipelineError::Sink(format!("failed to write CSV header: {e}")))?;
        }

        Ok(writer)
    }

    async fn flush_batch(
        &self,
        writer: &mut csv::Writer<std::fs::File>,
        batch: &[Envelope],
    ) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            match Self::write_batch(writer, batch) {
                Ok(()) => {
                    metrics::counter!("readings_ingested_total").increment(batch.len() as u64);

                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                            metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
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
                        "CSV sink flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "CSV sink flush failed, giving up");
                    metrics::counter!("csv_sink_errors_total").increment(1);
                    return Err(e);
                }
            }
        }
    }

    fn write_batch(
        writer: &mut csv::Writer<std::fs::File>,
        batch: &[Envelope],
    ) -> Result<(), PipelineError> {
        for env in batch {
            let record = reading_to_record(env)?;
            writer
                .write_record(&record)
                .map_err(|e| PipelineError::Sink(format!("failed to append CSV record: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush CSV store: {e}")))
    }
}

#[async_trait::async_trait]
impl Sink for CsvAppendSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope, PipelineError>> + Send + Unpin + 'static,
    {
        // Blocking file writes from the sink task; batches are small and the
        // file is local, matching how the CSV source reads.
        let mut writer = Self::open_writer(&self.path)?;
        let mut buffer: Vec<Envelope> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for CsvAppendSink");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&mut writer, &buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&mut writer, &buffer).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::readings_csv_file::record_to_reading;
    use csv::StringRecord;
    use meter_client::domain::MeterReading;
    use time::macros::datetime;

    fn envelope() -> Envelope {
        Envelope::now(MeterReading {
            ts: datetime!(2025-03-04 08:10:00 UTC),
            device_no: "70018".to_string(),
            imei: Some("860329065551923".to_string()),
            cumulative_flow: 123.456,
            instantaneous_flow: 0.72,
            temperature: Some(21.5),
            battery_voltage: None,
            signal_strength: Some(-85.0),
            pressure: None,
            reverse_flow: Some(0.0),
            valve_status: Some("open".to_string()),
        })
    }

    #[test]
    fn record_matches_header_width() {
        let record = reading_to_record(&envelope()).unwrap();
        assert_eq!(record.len(), CSV_HEADER.len());
        assert_eq!(record[0], "2025-03-04T08:10:00Z");
        assert_eq!(record[3], "123.456");
        // Absent optionals become empty cells.
        assert_eq!(record[6], "");
        assert_eq!(record[8], "");
    }

    #[test]
    fn header_is_written_once_per_file() {
        let path = std::env::temp_dir().join(format!(
            "water-csv-sink-header-{}.csv",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let mut writer = CsvAppendSink::open_writer(&path).unwrap();
            CsvAppendSink::write_batch(&mut writer, &[envelope()]).unwrap();
        }
        {
            // Re-opening an existing store must append without repeating the
            // header.
            let mut writer = CsvAppendSink::open_writer(&path).unwrap();
            CsvAppendSink::write_batch(&mut writer, &[envelope()]).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let header_lines = contents.lines().filter(|l| l.starts_with("ts,")).count();
        assert_eq!(header_lines, 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn written_rows_read_back_through_the_csv_source() {
        let env = envelope();
        let record = reading_to_record(&env).unwrap();

        let headers = StringRecord::from(CSV_HEADER.to_vec());
        let row = StringRecord::from(record);
        let parsed = record_to_reading(&row, &headers).unwrap();

        assert_eq!(parsed.ts, env.reading.ts);
        assert_eq!(parsed.device_no, env.reading.device_no);
        assert_eq!(parsed.imei, env.reading.imei);
        assert_eq!(parsed.cumulative_flow, env.reading.cumulative_flow);
        assert_eq!(parsed.signal_strength, env.reading.signal_strength);
        assert_eq!(parsed.battery_voltage, None);
        assert_eq!(parsed.valve_status, env.reading.valve_status);
    }
}
