use crate::config::DbConfig;
use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub type DbPool = Pool<Sqlite>;

pub async fn connect(cfg: &DbConfig) -> Result<DbPool, AppError> {
    let options = SqliteConnectOptions::from_str(&cfg.url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Creates the readings table if it does not exist. Never alters an existing table.
pub async fn init_schema(pool: &DbPool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consumption (
            fuel_type TEXT NOT NULL,
            interval_start TEXT NOT NULL,
            interval_end TEXT NOT NULL,
            consumption REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (fuel_type, interval_start)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    // A single long-lived connection: each `:memory:` connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_schema_is_repeatable() {
        let pool = test_pool().await;
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consumption")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
