pub mod http_push;
pub mod readings_backfill_file;
pub mod readings_csv_file;

pub use http_push::HttpPushSource;
pub use readings_backfill_file::ReadingsBackfillFileSource;
pub use readings_csv_file::ReadingsCsvFileSource;
