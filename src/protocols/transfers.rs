//! Native value transfers of successful transactions.

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::records::BatchInsert;
use super::{Protocol, apply_schema};
use crate::models::block_data::BlockData;
use crate::models::errors::ProtocolError;
use crate::storage::{SqlValue, UnitOfWork};

pub const PROTOCOL_ID: &str = "native_transfers";
pub const TRANSFER_TABLE: &str = "native_transfers";

const TRANSFER_COLUMNS: &[&str] = &[
    "action_hash",
    "idx",
    "block_height",
    "block_time",
    "sender",
    "recipient",
    "amount",
];

const CREATE_TRANSFER_TABLE: &str = "CREATE TABLE IF NOT EXISTS native_transfers (
    action_hash VARCHAR(64) NOT NULL,
    idx INTEGER NOT NULL,
    block_height INTEGER NOT NULL CHECK (block_height >= 0),
    block_time TEXT NOT NULL,
    sender VARCHAR(42) NOT NULL,
    recipient VARCHAR(42) NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (action_hash, idx)
)";

const CREATE_HEIGHT_INDEX: &str = "CREATE INDEX IF NOT EXISTS \
    i_native_transfers_block_height ON native_transfers (block_height)";
const CREATE_SENDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS i_native_transfers_sender ON native_transfers (sender)";
const CREATE_RECIPIENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS i_native_transfers_recipient ON native_transfers (recipient)";

pub struct NativeTransferProtocol {
    enabled: bool,
}

impl NativeTransferProtocol {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Protocol for NativeTransferProtocol {
    fn id(&self) -> &'static str {
        PROTOCOL_ID
    }

    async fn initialize(&self, tx: &mut dyn UnitOfWork) -> Result<(), ProtocolError> {
        if !self.enabled {
            return Ok(());
        }
        apply_schema(
            tx,
            PROTOCOL_ID,
            &[
                (TRANSFER_TABLE, CREATE_TRANSFER_TABLE),
                (TRANSFER_TABLE, CREATE_HEIGHT_INDEX),
                (TRANSFER_TABLE, CREATE_SENDER_INDEX),
                (TRANSFER_TABLE, CREATE_RECIPIENT_INDEX),
            ],
        )
        .await
    }

    async fn handle_block_data(
        &self,
        _cancel: &CancellationToken,
        tx: &mut dyn UnitOfWork,
        block: &BlockData,
    ) -> Result<(), ProtocolError> {
        if !self.enabled {
            return Ok(());
        }

        let block_time = block
            .header
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut transfers = BatchInsert::new(TRANSFER_TABLE, TRANSFER_COLUMNS);

        for transaction_log in &block.transaction_logs {
            for (idx, transfer) in (0u32..).zip(&transaction_log.transfers) {
                transfers.push(vec![
                    transaction_log.action_hash.into(),
                    idx.into(),
                    transaction_log.block_height.into(),
                    SqlValue::from(block_time.as_str()),
                    transfer.sender.into(),
                    transfer.recipient.into(),
                    transfer.amount.into(),
                ]);
            }
        }

        let inserted = transfers.flush(tx).await?;
        if inserted > 0 {
            debug!("Block {}: {} native transfers", block.height(), inserted);
        }
        Ok(())
    }
}
