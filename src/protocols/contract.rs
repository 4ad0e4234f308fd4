use std::sync::Arc;
use std::time::Instant;

use alloy_eips::BlockId;
use alloy_network::AnyNetwork;
use alloy_primitives::{Address, Bytes, TxKind, U256, hex};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_serde::WithOtherFields;
use alloy_transport::{RpcError, TransportError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::decoder::{decode_return_string, decode_return_u32};
use crate::metrics::Metrics;
use crate::models::errors::{ContractReadError, ProtocolError};
use crate::utils::strip_html;

/// Caller identity for read-only simulations.
pub const READ_CALLER: Address = Address::ZERO;
pub const READ_GAS_LIMIT: u64 = 3_000_000;
/// Zero keeps nodes from checking the simulated fee against the block base fee.
pub const READ_GAS_PRICE: u128 = 0;

/// ERC-20 `name()`
pub const NAME_SELECTOR: [u8; 4] = hex!("06fdde03");
/// ERC-20 `symbol()`
pub const SYMBOL_SELECTOR: [u8; 4] = hex!("95d89b41");
/// ERC-20 `decimals()`
pub const DECIMALS_SELECTOR: [u8; 4] = hex!("313ce567");

/// JSON-RPC error code geth uses for reverted calls.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Read-only access to deployed contracts.
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Simulates a call of `call_data` against `address` as of `block_height` and returns
    /// the raw ABI-encoded output.
    async fn read_contract(
        &self,
        address: Address,
        call_data: Bytes,
        block_height: u64,
    ) -> Result<Bytes, ContractReadError>;
}

/// [`ContractReader`] backed by `eth_call`.
pub struct RpcContractReader<P> {
    provider: P,
    metrics: Option<Arc<Metrics>>,
}

impl<P> RpcContractReader<P> {
    pub fn new(provider: P, metrics: Option<Arc<Metrics>>) -> Self {
        Self { provider, metrics }
    }
}

#[async_trait]
impl<P> ContractReader for RpcContractReader<P>
where
    P: Provider<AnyNetwork>,
{
    async fn read_contract(
        &self,
        address: Address,
        call_data: Bytes,
        block_height: u64,
    ) -> Result<Bytes, ContractReadError> {
        let request = TransactionRequest {
            from: Some(READ_CALLER),
            to: Some(TxKind::Call(address)),
            gas: Some(READ_GAS_LIMIT),
            gas_price: Some(READ_GAS_PRICE),
            value: Some(U256::ZERO),
            input: TransactionInput::new(call_data),
            ..Default::default()
        };

        let start = Instant::now();
        let result = self
            .provider
            .call(WithOtherFields::new(request))
            .block(BlockId::number(block_height))
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_rpc_call("read_contract", start.elapsed(), result.is_err());
        }

        result.map_err(|e| {
            warn!("Contract read at {} failed: {}", address, e);
            classify_call_error(address, e)
        })
    }
}

/// Splits `eth_call` failures into reverted executions and everything else.
///
/// Node-side aborts such as `execution aborted (timeout = 5s)` stay remote call errors.
pub fn classify_call_error(address: Address, err: TransportError) -> ContractReadError {
    match err {
        RpcError::ErrorResp(payload)
            if payload.code == EXECUTION_REVERTED_CODE || payload.message.contains("revert") =>
        {
            ContractReadError::ContractExecution {
                address,
                message: payload.message.to_string(),
            }
        }
        other => ContractReadError::RemoteCall {
            address,
            message: strip_html(&other.to_string()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Reads `name()`, `symbol()` and `decimals()` of a token.
///
/// Any failed read fails the whole lookup. Each read is abandoned as soon as `cancel`
/// fires.
pub async fn read_token_metadata(
    reader: &dyn ContractReader,
    cancel: &CancellationToken,
    token: Address,
    block_height: u64,
) -> Result<TokenMetadata, ProtocolError> {
    let name = read_cancellable(reader, cancel, token, &NAME_SELECTOR, block_height).await?;
    let symbol = read_cancellable(reader, cancel, token, &SYMBOL_SELECTOR, block_height).await?;
    let decimals =
        read_cancellable(reader, cancel, token, &DECIMALS_SELECTOR, block_height).await?;

    Ok(TokenMetadata {
        name: decode_return_string(&name)?,
        symbol: decode_return_string(&symbol)?,
        decimals: decode_return_u32(&decimals)?,
    })
}

async fn read_cancellable(
    reader: &dyn ContractReader,
    cancel: &CancellationToken,
    address: Address,
    selector: &[u8],
    block_height: u64,
) -> Result<Bytes, ProtocolError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProtocolError::Cancelled),
        output = reader.read_contract(address, Bytes::copy_from_slice(selector), block_height) => {
            Ok(output?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::ErrorPayload;
    use alloy_transport::TransportErrorKind;

    #[test]
    fn reverted_call_is_execution_error() {
        let err = RpcError::ErrorResp(ErrorPayload {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        });
        assert!(matches!(
            classify_call_error(Address::ZERO, err),
            ContractReadError::ContractExecution { .. }
        ));
    }

    #[test]
    fn transport_failure_is_remote_call_error() {
        let err = TransportErrorKind::backend_gone();
        assert!(matches!(
            classify_call_error(Address::ZERO, err),
            ContractReadError::RemoteCall { .. }
        ));
    }

    #[test]
    fn rate_limit_response_is_remote_call_error() {
        let err = RpcError::ErrorResp(ErrorPayload {
            code: -32005,
            message: "rate limit exceeded".into(),
            data: None,
        });
        assert!(matches!(
            classify_call_error(Address::ZERO, err),
            ContractReadError::RemoteCall { .. }
        ));
    }

    #[test]
    fn node_timeout_is_remote_call_error() {
        let err = RpcError::ErrorResp(ErrorPayload {
            code: -32000,
            message: "execution aborted (timeout = 5s)".into(),
            data: None,
        });
        let classified = classify_call_error(Address::ZERO, err);
        assert!(matches!(classified, ContractReadError::RemoteCall { .. }));
        assert!(ProtocolError::ContractRead(classified).is_transient());
    }
}
