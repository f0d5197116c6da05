use anyhow::{Context, Result};
use sqlx::PgPool;
use time::Date;

use crate::domain::MeterReading;

// Expected schema (applied out-of-band):
//
//   CREATE TABLE water_readings (
//       ts                 TIMESTAMPTZ      NOT NULL,
//       device_no          TEXT             NOT NULL,
//       imei               TEXT,
//       cumulative_flow    DOUBLE PRECISION NOT NULL,
//       instantaneous_flow DOUBLE PRECISION NOT NULL,
//       temperature        DOUBLE PRECISION,
//       battery_voltage    DOUBLE PRECISION,
//       signal_strength    DOUBLE PRECISION,
//       pressure           DOUBLE PRECISION,
//       reverse_flow       DOUBLE PRECISION,
//       valve_status       TEXT
//   );

/// Fetch one device's readings for one calendar day, ascending by ts.
///
/// The window is half-open: `[day 00:00, day+1 00:00)` UTC.
pub async fn day_readings(pool: &PgPool, device_no: &str, day: Date) -> Result<Vec<MeterReading>> {
    let start = day.midnight().assume_utc();
    let end = day
        .next_day()
        .context("day has no successor in the supported calendar range")?
        .midnight()
        .assume_utc();

    let rows = sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT
            ts,
            device_no,
            imei,
            cumulative_flow,
            instantaneous_flow,
            temperature,
            battery_voltage,
            signal_strength,
            pressure,
            reverse_flow,
            valve_status
        FROM water_readings
        WHERE device_no = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(device_no)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Most recent readings for a device, newest first.
pub async fn latest_readings(pool: &PgPool, device_no: &str, limit: i64) -> Result<Vec<MeterReading>> {
    let rows = sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT
            ts,
            device_no,
            imei,
            cumulative_flow,
            instantaneous_flow,
            temperature,
            battery_voltage,
            signal_strength,
            pressure,
            reverse_flow,
            valve_status
        FROM water_readings
        WHERE device_no = $1
        ORDER BY ts DESC
        LIMIT $2
        "#,
    )
    .bind(device_no)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
