pub mod meter_reading;

pub use meter_reading::{parse_report_ts, MeterReading, TimestampParseError};
