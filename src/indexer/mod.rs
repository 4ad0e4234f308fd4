pub mod rpc;

use std::sync::Arc;
use std::time::Instant;

use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_network::{AnyNetwork, AnyRpcBlock, AnyTransactionReceipt};
use alloy_provider::Provider;
use anyhow::{Result, anyhow};
use sqlx::{SqliteConnection, SqlitePool};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::rpc::{blocks::BlockParser, receipts::ReceiptParser};
use crate::metrics::Metrics;
use crate::models::block_data::BlockData;
use crate::models::errors::{ProtocolError, StoreError};
use crate::protocols::ProtocolRegistry;
use crate::storage::{create_progress_table, record_progress};
use crate::utils::retry::{RetryConfig, retry};

/// Owns the database and hands every block to the registered protocols, one
/// transaction per block.
pub struct Indexer {
    registry: ProtocolRegistry,
    pool: SqlitePool,
    metrics: Option<Arc<Metrics>>,
}

impl Indexer {
    pub fn new(registry: ProtocolRegistry, pool: SqlitePool, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            registry,
            pool,
            metrics,
        }
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates every protocol's schema and the progress table in a single transaction.
    pub async fn initialize(&self) -> Result<(), ProtocolError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        self.registry.initialize_all(&mut *tx).await?;
        create_progress_table(&mut *tx).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    /// Writes one block atomically: all protocols' rows and the progress marker are
    /// committed together, or nothing is.
    pub async fn index_block(
        &self,
        block: &BlockData,
        cancel: &CancellationToken,
    ) -> Result<(), ProtocolError> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        match self.write_block(&mut *tx, block, cancel).await {
            Ok(()) => {
                tx.commit().await.map_err(StoreError::from)?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_block_indexed(block.height(), start.elapsed());
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        "Failed to roll back block {}: {}",
                        block.height(),
                        rollback_err
                    );
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_block_failure();
                }
                Err(e)
            }
        }
    }

    async fn write_block(
        &self,
        tx: &mut SqliteConnection,
        block: &BlockData,
        cancel: &CancellationToken,
    ) -> Result<(), ProtocolError> {
        self.registry.handle_block_data(cancel, &mut *tx, block).await?;
        record_progress(&mut *tx, block.height()).await?;
        Ok(())
    }
}

fn record_rpc<T, E>(
    metrics: Option<&Metrics>,
    method: &'static str,
    start: Instant,
    result: &Result<T, E>,
) {
    if let Some(metrics) = metrics {
        metrics.record_rpc_call(method, start.elapsed(), result.is_err());
    }
}

pub async fn get_latest_block_number<P>(provider: &P, metrics: Option<&Metrics>) -> Result<u64>
where
    P: Provider<AnyNetwork>,
{
    let retry_config = RetryConfig::default();
    retry(
        move || async move {
            let start = Instant::now();
            let result = provider.get_block_number().await;
            record_rpc(metrics, "get_latest_block_number", start, &result);

            result.map_err(|e| {
                warn!("Failed to get latest block number. Error details:\n{:#?}", e);
                anyhow!("RPC error: {}", e)
            })
        },
        &retry_config,
        "get_latest_block_number",
    )
    .await
}

pub async fn get_block_by_number<P>(
    provider: &P,
    block_number: u64,
    metrics: Option<&Metrics>,
) -> Result<AnyRpcBlock>
where
    P: Provider<AnyNetwork>,
{
    let retry_config = RetryConfig::default();
    retry(
        move || async move {
            let start = Instant::now();
            let result = provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number))
                .full()
                .await;
            record_rpc(metrics, "get_block_by_number", start, &result);

            result
                .map_err(|e| {
                    warn!("Failed to get block {}. Error details:\n{:#?}", block_number, e);
                    anyhow!("RPC error: {}", e)
                })?
                .ok_or_else(|| anyhow!("Provider returned no block {}", block_number))
        },
        &retry_config,
        "get_block_by_number",
    )
    .await
}

pub async fn get_block_receipts<P>(
    provider: &P,
    block_number: u64,
    metrics: Option<&Metrics>,
) -> Result<Vec<AnyTransactionReceipt>>
where
    P: Provider<AnyNetwork>,
{
    let retry_config = RetryConfig::default();
    retry(
        move || async move {
            let start = Instant::now();
            let result = provider
                .get_block_receipts(BlockId::number(block_number))
                .await;
            record_rpc(metrics, "get_block_receipts", start, &result);

            result
                .map_err(|e| {
                    warn!(
                        "Failed to get receipts for block {}. Error details:\n{:#?}",
                        block_number, e
                    );
                    anyhow!("RPC error: {}", e)
                })?
                .ok_or_else(|| anyhow!("Provider returned no receipts for block {}", block_number))
        },
        &retry_config,
        "get_block_receipts",
    )
    .await
}

/// Fetches a block with full transactions and its receipts, and assembles the
/// immutable view handed to protocols.
pub async fn fetch_block_data<P>(
    provider: &P,
    block_number: u64,
    metrics: Option<&Metrics>,
) -> Result<BlockData>
where
    P: Provider<AnyNetwork>,
{
    let block = get_block_by_number(provider, block_number, metrics).await?;
    let receipts = get_block_receipts(provider, block_number, metrics)
        .await?
        .parse_receipts(block_number);

    let header = block.parse_header()?;
    if header.height != block_number {
        return Err(anyhow!(
            "Requested block {} but provider returned {}",
            block_number,
            header.height
        ));
    }
    let transaction_logs = block.parse_transaction_logs(&receipts)?;

    info!(
        "Fetched block {}: {} receipts, {} value transfers",
        block_number,
        receipts.len(),
        transaction_logs.len()
    );

    Ok(BlockData {
        header,
        receipts,
        transaction_logs,
    })
}
