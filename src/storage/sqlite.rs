use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use super::{SqlValue, UnitOfWork};
use crate::models::errors::StoreError;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    info!("Database connection pool created for {}", database_url);
    Ok(pool)
}

/// Height of the last committed block, if the driver ever committed one.
pub async fn last_indexed_block(pool: &SqlitePool) -> Result<Option<u64>, StoreError> {
    let exists: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(super::PROGRESS_TABLE)
            .fetch_optional(pool)
            .await?;
    if exists.is_none() {
        return Ok(None);
    }

    let height: Option<i64> =
        sqlx::query_scalar("SELECT block_height FROM indexer_progress WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    height
        .map(|value| {
            u64::try_from(value).map_err(|_| StoreError::ValueOutOfRange {
                value: value.to_string(),
            })
        })
        .transpose()
}

/// `sqlx::Transaction<'_, Sqlite>` derefs to a connection, so drivers pass `&mut *tx`.
#[async_trait]
impl UnitOfWork for SqliteConnection {
    async fn exec(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64, StoreError> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = match value {
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Unsigned(v) => {
                    let v = i64::try_from(*v).map_err(|_| StoreError::ValueOutOfRange {
                        value: v.to_string(),
                    })?;
                    query.bind(v)
                }
                SqlValue::Text(v) => query.bind(v.as_str()),
            };
        }

        let result = query.execute(&mut *self).await?;
        Ok(result.rows_affected())
    }
}
