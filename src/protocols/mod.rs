//! Pluggable block-data indexing protocols.
//!
//! A protocol owns a set of tables, creates them in [`Protocol::initialize`] and fills
//! them from each block in [`Protocol::handle_block_data`]. Both run inside a transaction
//! opened by the driver, which alone decides whether to commit or roll back.
//!
//! ```text
//! Driver ──► tx ──► ProtocolRegistry ──► Protocol::handle_block_data
//!                                          ├─ decoder   (classify + decode logs)
//!                                          ├─ contract  (enrichment reads)
//!                                          └─ records   (one batched INSERT per table)
//! ```

pub mod contract;
pub mod decoder;
pub mod mimo;
pub mod records;
pub mod transfers;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::block_data::BlockData;
use crate::models::common::ProtocolsConfig;
use crate::models::errors::ProtocolError;
use crate::storage::UnitOfWork;

pub use contract::{ContractReader, RpcContractReader};
pub use mimo::MimoProtocol;
pub use transfers::NativeTransferProtocol;

/// A pluggable unit of indexing logic that owns its tables and rows.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Stable identifier, unique within a registry.
    fn id(&self) -> &'static str;

    /// Creates the protocol's tables and views. Safe to run on every start.
    async fn initialize(&self, tx: &mut dyn UnitOfWork) -> Result<(), ProtocolError>;

    /// Derives and inserts this block's rows.
    ///
    /// Either every row of the block is written or an error is returned; the caller is
    /// expected to roll the transaction back on error.
    async fn handle_block_data(
        &self,
        cancel: &CancellationToken,
        tx: &mut dyn UnitOfWork,
        block: &BlockData,
    ) -> Result<(), ProtocolError>;
}

/// Runs DDL statements in order, attributing a failure to the object being created.
pub(crate) async fn apply_schema(
    tx: &mut dyn UnitOfWork,
    protocol: &'static str,
    statements: &[(&'static str, &str)],
) -> Result<(), ProtocolError> {
    for &(object, sql) in statements {
        tx.exec(sql, &[])
            .await
            .map_err(|source| ProtocolError::Schema {
                protocol,
                object,
                source,
            })?;
    }
    Ok(())
}

/// Protocols in invocation order.
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: Vec<Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Protocol + 'static>(&mut self, protocol: P) -> Result<(), ProtocolError> {
        if self.get(protocol.id()).is_some() {
            return Err(ProtocolError::AlreadyRegistered {
                id: protocol.id().to_string(),
            });
        }
        self.protocols.push(Arc::new(protocol));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols
            .iter()
            .find(|protocol| protocol.id() == id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.protocols.iter().map(|protocol| protocol.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub async fn initialize_all(&self, tx: &mut dyn UnitOfWork) -> Result<(), ProtocolError> {
        for protocol in &self.protocols {
            protocol.initialize(tx).await?;
            info!("Initialized protocol {}", protocol.id());
        }
        Ok(())
    }

    /// Hands the block to every protocol in turn, stopping at the first failure.
    pub async fn handle_block_data(
        &self,
        cancel: &CancellationToken,
        tx: &mut dyn UnitOfWork,
        block: &BlockData,
    ) -> Result<(), ProtocolError> {
        for protocol in &self.protocols {
            if let Err(e) = protocol.handle_block_data(cancel, tx, block).await {
                error!(
                    "Protocol {} failed on block {}: {}",
                    protocol.id(),
                    block.height(),
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Registers every protocol this indexer ships with.
pub fn build_registry(
    config: &ProtocolsConfig,
    reader: Arc<dyn ContractReader>,
) -> Result<ProtocolRegistry, ProtocolError> {
    let mut registry = ProtocolRegistry::new();

    registry.register(MimoProtocol::new(config.mimo.factory_address, reader))?;
    registry.register(NativeTransferProtocol::new(config.native_transfers.enabled))?;

    info!(
        "Built protocol registry with {} protocols: {:?}",
        registry.len(),
        registry.ids()
    );

    Ok(registry)
}
