//! Mimo exchange indexing.
//!
//! Only logs emitted by the configured factory are indexed; the same signatures from
//! any other contract are skipped. The factory announces every new exchange with
//! `NewExchange(token, exchange)`; the exchange's token is enriched with `name()`,
//! `symbol()` and `decimals()` at that height. Liquidity providers' deposits and
//! withdrawals are stored as signed amounts in a single action table, a withdrawal
//! being the negation of a deposit.

use std::sync::Arc;

use alloy_primitives::{Address, B256, b256};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::contract::{ContractReader, TokenMetadata, read_token_metadata};
use super::decoder::{
    classify, ensure_topic_count, topic_to_address, topic_to_uint, uint_to_decimal,
};
use super::records::BatchInsert;
use super::{Protocol, apply_schema};
use crate::models::block_data::{BlockData, Log};
use crate::models::errors::{DecodeError, ProtocolError};
use crate::storage::{SqlValue, UnitOfWork};

pub const PROTOCOL_ID: &str = "mimo";

pub const EXCHANGE_CREATION_TABLE: &str = "mimo_exchange_creations";
pub const EXCHANGE_MONITOR_VIEW: &str = "mimo_exchange_to_monitor";
pub const TOKEN_MONITOR_VIEW: &str = "mimo_token_to_monitor";
pub const PROVIDER_ACTION_TABLE: &str = "mimo_exchange_provider_actions";

/// Longest token name or symbol stored.
pub const MAX_TOKEN_TEXT_LEN: usize = 140;

/// `NewExchange(address indexed token, address indexed exchange)`
pub const NEW_EXCHANGE_TOPIC: B256 =
    b256!("9d42cb017eb05bd8944ab536a8b35bc68085931dd5f4356489801453923953f9");
/// `AddLiquidity(address indexed provider, uint256 indexed native_amount, uint256 indexed token_amount)`
pub const ADD_LIQUIDITY_TOPIC: B256 =
    b256!("06239653922ac7bea6aa2b19dc486b9361821d37712eb796adfd38d81de278ca");
/// `RemoveLiquidity(address indexed provider, uint256 indexed native_amount, uint256 indexed token_amount)`
pub const REMOVE_LIQUIDITY_TOPIC: B256 =
    b256!("0fbf06c058b90cb038a618f8c2acbf6145f8b3570fd1fa56abb8f0f3f05b36e8");

const EVENT_SIGNATURES: [(B256, MimoEvent); 3] = [
    (NEW_EXCHANGE_TOPIC, MimoEvent::NewExchange),
    (ADD_LIQUIDITY_TOPIC, MimoEvent::AddLiquidity),
    (REMOVE_LIQUIDITY_TOPIC, MimoEvent::RemoveLiquidity),
];

const CREATION_COLUMNS: &[&str] = &[
    "exchange",
    "token",
    "block_height",
    "action_hash",
    "token_name",
    "token_symbol",
    "token_decimals",
];

const ACTION_COLUMNS: &[&str] = &[
    "action_hash",
    "idx",
    "exchange",
    "block_height",
    "provider",
    "native_amount",
    "token_amount",
];

const CREATE_EXCHANGE_TABLE: &str = "CREATE TABLE IF NOT EXISTS mimo_exchange_creations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange VARCHAR(42) NOT NULL,
    token VARCHAR(42) NOT NULL,
    block_height INTEGER NOT NULL CHECK (block_height >= 0),
    action_hash VARCHAR(64) NOT NULL,
    token_name VARCHAR(140) NOT NULL,
    token_symbol VARCHAR(140) NOT NULL,
    token_decimals INTEGER NOT NULL DEFAULT 18 CHECK (token_decimals >= 0),
    CONSTRAINT exchange_unique UNIQUE (exchange),
    CONSTRAINT token_unique UNIQUE (token)
)";

const CREATE_EXCHANGE_HEIGHT_INDEX: &str = "CREATE INDEX IF NOT EXISTS \
    i_mimo_exchange_creations_block_height ON mimo_exchange_creations (block_height)";

const DROP_EXCHANGE_VIEW: &str = "DROP VIEW IF EXISTS mimo_exchange_to_monitor";
const CREATE_EXCHANGE_VIEW: &str = "CREATE VIEW mimo_exchange_to_monitor AS \
    SELECT exchange AS account FROM mimo_exchange_creations";

const DROP_TOKEN_VIEW: &str = "DROP VIEW IF EXISTS mimo_token_to_monitor";
const CREATE_TOKEN_VIEW: &str = "CREATE VIEW mimo_token_to_monitor AS \
    SELECT token, exchange AS account FROM mimo_exchange_creations \
    UNION ALL \
    SELECT exchange AS token, '*' AS account FROM mimo_exchange_creations";

// Amounts are TEXT: NUMERIC affinity would round 256-bit values through REAL.
const CREATE_PROVIDER_ACTION_TABLE: &str = "CREATE TABLE IF NOT EXISTS mimo_exchange_provider_actions (
    action_hash VARCHAR(64) NOT NULL,
    idx INTEGER NOT NULL,
    exchange VARCHAR(42) NOT NULL,
    block_height INTEGER NOT NULL CHECK (block_height >= 0),
    provider VARCHAR(42) NOT NULL,
    native_amount TEXT NOT NULL,
    token_amount TEXT NOT NULL,
    PRIMARY KEY (action_hash, idx)
)";

const CREATE_ACTION_HEIGHT_INDEX: &str = "CREATE INDEX IF NOT EXISTS \
    i_mimo_provider_actions_block_height ON mimo_exchange_provider_actions (block_height)";
const CREATE_ACTION_EXCHANGE_INDEX: &str = "CREATE INDEX IF NOT EXISTS \
    i_mimo_provider_actions_exchange ON mimo_exchange_provider_actions (exchange)";
const CREATE_ACTION_PROVIDER_INDEX: &str = "CREATE INDEX IF NOT EXISTS \
    i_mimo_provider_actions_provider ON mimo_exchange_provider_actions (provider)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimoEvent {
    /// Creation kind.
    NewExchange,
    /// Addition kind.
    AddLiquidity,
    /// Removal kind.
    RemoveLiquidity,
}

impl MimoEvent {
    pub fn classify(log: &Log) -> Option<Self> {
        classify(&EVENT_SIGNATURES, log)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NewExchange => "NewExchange",
            Self::AddLiquidity => "AddLiquidity",
            Self::RemoveLiquidity => "RemoveLiquidity",
        }
    }

    /// Topics required, signature included.
    fn topic_count(self) -> usize {
        match self {
            Self::NewExchange => 3,
            Self::AddLiquidity | Self::RemoveLiquidity => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    ExchangeCreated { token: Address, exchange: Address },
    LiquidityChanged(LiquidityChange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityChange {
    pub provider: Address,
    pub native_amount: BigDecimal,
    pub token_amount: BigDecimal,
}

/// Decodes a classified log. Removal amounts come out negated.
pub fn decode_event(kind: MimoEvent, log: &Log) -> Result<DecodedEvent, DecodeError> {
    ensure_topic_count(log, kind.name(), kind.topic_count())?;

    match kind {
        MimoEvent::NewExchange => Ok(DecodedEvent::ExchangeCreated {
            token: topic_to_address(&log.topics[1])?,
            exchange: topic_to_address(&log.topics[2])?,
        }),
        MimoEvent::AddLiquidity | MimoEvent::RemoveLiquidity => {
            let provider = topic_to_address(&log.topics[1])?;
            let native_amount = uint_to_decimal(topic_to_uint(&log.topics[2]))?;
            let token_amount = uint_to_decimal(topic_to_uint(&log.topics[3]))?;

            let change = if kind == MimoEvent::RemoveLiquidity {
                LiquidityChange {
                    provider,
                    native_amount: -native_amount,
                    token_amount: -token_amount,
                }
            } else {
                LiquidityChange {
                    provider,
                    native_amount,
                    token_amount,
                }
            };
            Ok(DecodedEvent::LiquidityChanged(change))
        }
    }
}

pub struct MimoProtocol {
    factory: Option<Address>,
    reader: Arc<dyn ContractReader>,
}

impl MimoProtocol {
    pub fn new(factory: Option<Address>, reader: Arc<dyn ContractReader>) -> Self {
        Self { factory, reader }
    }

    fn creation_row(
        log: &Log,
        token: Address,
        exchange: Address,
        metadata: TokenMetadata,
    ) -> Vec<SqlValue> {
        vec![
            exchange.into(),
            token.into(),
            log.block_height.into(),
            log.action_hash.into(),
            bounded_text(metadata.name, "name", token).into(),
            bounded_text(metadata.symbol, "symbol", token).into(),
            metadata.decimals.into(),
        ]
    }

    fn action_row(log: &Log, change: LiquidityChange) -> Vec<SqlValue> {
        vec![
            log.action_hash.into(),
            log.index.into(),
            log.address.into(),
            log.block_height.into(),
            change.provider.into(),
            change.native_amount.into(),
            change.token_amount.into(),
        ]
    }
}

fn bounded_text(value: String, field: &str, token: Address) -> String {
    if value.chars().count() <= MAX_TOKEN_TEXT_LEN {
        return value;
    }
    warn!(
        "Token {} {} longer than {} characters, truncating",
        token, field, MAX_TOKEN_TEXT_LEN
    );
    value.chars().take(MAX_TOKEN_TEXT_LEN).collect()
}

#[async_trait]
impl Protocol for MimoProtocol {
    fn id(&self) -> &'static str {
        PROTOCOL_ID
    }

    async fn initialize(&self, tx: &mut dyn UnitOfWork) -> Result<(), ProtocolError> {
        apply_schema(
            tx,
            PROTOCOL_ID,
            &[
                (EXCHANGE_CREATION_TABLE, CREATE_EXCHANGE_TABLE),
                (EXCHANGE_CREATION_TABLE, CREATE_EXCHANGE_HEIGHT_INDEX),
                (EXCHANGE_MONITOR_VIEW, DROP_EXCHANGE_VIEW),
                (EXCHANGE_MONITOR_VIEW, CREATE_EXCHANGE_VIEW),
                (TOKEN_MONITOR_VIEW, DROP_TOKEN_VIEW),
                (TOKEN_MONITOR_VIEW, CREATE_TOKEN_VIEW),
                (PROVIDER_ACTION_TABLE, CREATE_PROVIDER_ACTION_TABLE),
                (PROVIDER_ACTION_TABLE, CREATE_ACTION_HEIGHT_INDEX),
                (PROVIDER_ACTION_TABLE, CREATE_ACTION_EXCHANGE_INDEX),
                (PROVIDER_ACTION_TABLE, CREATE_ACTION_PROVIDER_INDEX),
            ],
        )
        .await
    }

    async fn handle_block_data(
        &self,
        cancel: &CancellationToken,
        tx: &mut dyn UnitOfWork,
        block: &BlockData,
    ) -> Result<(), ProtocolError> {
        let Some(factory) = self.factory else {
            return Ok(());
        };

        let mut creations = BatchInsert::new(EXCHANGE_CREATION_TABLE, CREATION_COLUMNS);
        let mut actions = BatchInsert::new(PROVIDER_ACTION_TABLE, ACTION_COLUMNS);

        for receipt in block.successful_receipts() {
            for log in &receipt.logs {
                let Some(kind) = MimoEvent::classify(log) else {
                    continue;
                };
                if log.address != factory {
                    debug!(
                        "Skipping {} from {} in {}: not the configured factory",
                        kind.name(),
                        log.address,
                        log.action_hash
                    );
                    continue;
                }

                match decode_event(kind, log)? {
                    DecodedEvent::ExchangeCreated { token, exchange } => {
                        let metadata = read_token_metadata(
                            self.reader.as_ref(),
                            cancel,
                            token,
                            log.block_height,
                        )
                        .await?;
                        creations.push(Self::creation_row(log, token, exchange, metadata));
                    }
                    DecodedEvent::LiquidityChanged(change) => {
                        actions.push(Self::action_row(log, change));
                    }
                }
            }
        }

        let (created, acted) = (creations.len(), actions.len());
        creations.flush(tx).await?;
        actions.flush(tx).await?;

        if created + acted > 0 {
            debug!(
                "Block {}: {} exchanges created, {} liquidity actions",
                block.height(),
                created,
                acted
            );
        }
        Ok(())
    }
}
