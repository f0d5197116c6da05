pub mod postgres;
pub mod readings_csv;

pub use postgres::PostgresReadingsSink;
pub use readings_csv::CsvAppendSink;
