use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::reading::{format_timestamp, parse_timestamp};
use crate::models::{FuelType, NewReading, Reading, ReadingStats};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row, Sqlite, Transaction};

const UPSERT_SQL: &str = r#"
    INSERT INTO consumption (fuel_type, interval_start, interval_end, consumption, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (fuel_type, interval_start) DO UPDATE SET
        interval_end = excluded.interval_end,
        consumption = excluded.consumption,
        updated_at = excluded.updated_at
"#;

fn decode_ts(row: &SqliteRow, column: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn decode_opt_ts(
    row: &SqliteRow,
    column: &str,
) -> std::result::Result<Option<DateTime<Utc>>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        parse_timestamp(&s).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

impl<'r> FromRow<'r, SqliteRow> for Reading {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let fuel: String = row.try_get("fuel_type")?;
        let fuel_type = fuel
            .parse::<FuelType>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "fuel_type".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            fuel_type,
            interval_start: decode_ts(row, "interval_start")?,
            interval_end: decode_ts(row, "interval_end")?,
            consumption: row.try_get("consumption")?,
            updated_at: decode_ts(row, "updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for ReadingStats {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            count: row.try_get("reading_count")?,
            total: row.try_get("total_consumption")?,
            earliest: decode_opt_ts(row, "earliest_reading")?,
            latest: decode_opt_ts(row, "latest_reading")?,
        })
    }
}

#[derive(Clone)]
pub struct ReadingsRepository {
    pool: DbPool,
}

impl ReadingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace the reading at `(fuel_type, interval_start)`.
    pub async fn upsert(&self, reading: &NewReading) -> Result<()> {
        self.upsert_at(reading, Utc::now()).await
    }

    pub async fn upsert_at(&self, reading: &NewReading, updated_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(reading.fuel_type.as_str())
            .bind(format_timestamp(reading.interval_start))
            .bind(format_timestamp(reading.interval_end))
            .bind(reading.consumption)
            .bind(format_timestamp(updated_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upserts a batch in a single transaction, stamping every row with the same
    /// `updated_at`. Returns the number of rows written.
    pub async fn upsert_many(&self, readings: &[NewReading]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let updated_at = format_timestamp(Utc::now());
        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await?;
        for reading in readings {
            sqlx::query(UPSERT_SQL)
                .bind(reading.fuel_type.as_str())
                .bind(format_timestamp(reading.interval_start))
                .bind(format_timestamp(reading.interval_end))
                .bind(reading.consumption)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(readings.len())
    }

    /// Readings with `interval_start > since`, newest first.
    pub async fn list(&self, fuel_type: FuelType, since: DateTime<Utc>) -> Result<Vec<Reading>> {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT fuel_type, interval_start, interval_end, consumption, updated_at
            FROM consumption
            WHERE fuel_type = ?1 AND interval_start > ?2
            ORDER BY interval_start DESC
            "#,
        )
        .bind(fuel_type.as_str())
        .bind(format_timestamp(since))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Db)
    }

    pub async fn stats(&self, fuel_type: FuelType) -> Result<ReadingStats> {
        sqlx::query_as::<_, ReadingStats>(
            r#"
            SELECT
                COUNT(*) AS reading_count,
                SUM(consumption) AS total_consumption,
                MIN(interval_start) AS earliest_reading,
                MAX(interval_start) AS latest_reading
            FROM consumption
            WHERE fuel_type = ?1
            "#,
        )
        .bind(fuel_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Db)
    }

    pub async fn get(
        &self,
        fuel_type: FuelType,
        interval_start: DateTime<Utc>,
    ) -> Result<Option<Reading>> {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT fuel_type, interval_start, interval_end, consumption, updated_at
            FROM consumption
            WHERE fuel_type = ?1 AND interval_start = ?2
            "#,
        )
        .bind(fuel_type.as_str())
        .bind(format_timestamp(interval_start))
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Db)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consumption")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
