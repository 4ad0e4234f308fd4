pub mod sqlite;

use alloy_primitives::{Address, B256, U256, hex};
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::models::errors::StoreError;

pub use sqlite::{connect, last_indexed_block};

/// Table holding the height of the last block committed by the driver.
pub const PROGRESS_TABLE: &str = "indexer_progress";

const CREATE_PROGRESS_TABLE: &str = "CREATE TABLE IF NOT EXISTS indexer_progress (\
    id INTEGER PRIMARY KEY CHECK (id = 1),\
    block_height INTEGER NOT NULL CHECK (block_height >= 0))";

const UPSERT_PROGRESS: &str = "INSERT INTO indexer_progress (id, block_height) VALUES (1, ?) \
    ON CONFLICT (id) DO UPDATE SET block_height = excluded.block_height";

/// A positional bind value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Integer(i64),
    /// Checked against the backend's integer range when bound.
    Unsigned(u64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Addresses are stored in their checksummed form.
impl From<Address> for SqlValue {
    fn from(value: Address) -> Self {
        Self::Text(value.to_checksum(None))
    }
}

/// Hashes are stored as bare lowercase hex.
impl From<B256> for SqlValue {
    fn from(value: B256) -> Self {
        Self::Text(hex::encode(value))
    }
}

impl From<U256> for SqlValue {
    fn from(value: U256) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<BigDecimal> for SqlValue {
    fn from(value: BigDecimal) -> Self {
        Self::Text(value.to_string())
    }
}

/// The transaction handle supplied by the driver.
///
/// Everything a protocol writes while handling a block goes through one of these.
/// Implementations only execute statements: beginning, committing and rolling back
/// stay with whoever created the transaction.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Executes one statement and returns the number of affected rows.
    async fn exec(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64, StoreError>;
}

pub async fn create_progress_table(tx: &mut dyn UnitOfWork) -> Result<(), StoreError> {
    tx.exec(CREATE_PROGRESS_TABLE, &[]).await?;
    Ok(())
}

pub async fn record_progress(tx: &mut dyn UnitOfWork, block_height: u64) -> Result<(), StoreError> {
    tx.exec(UPSERT_PROGRESS, &[SqlValue::from(block_height)])
        .await?;
    Ok(())
}
