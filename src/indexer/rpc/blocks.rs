use std::collections::HashMap;

use alloy_consensus::Transaction;
use alloy_network::{AnyRpcBlock, TransactionResponse};
use alloy_primitives::{B256, TxKind};
use anyhow::{Result, anyhow};
use chrono::DateTime;

use crate::models::block_data::{BlockHeader, NativeTransfer, Receipt, TransactionLog};

pub trait BlockParser {
    fn parse_header(&self) -> Result<BlockHeader>;
    fn parse_transaction_logs(&self, receipts: &[Receipt]) -> Result<Vec<TransactionLog>>;
}

impl BlockParser for AnyRpcBlock {
    fn parse_header(&self) -> Result<BlockHeader> {
        let inner = &self.header.inner;

        let timestamp = DateTime::from_timestamp(inner.timestamp as i64, 0)
            .ok_or_else(|| anyhow!("invalid timestamp {} in block {}", inner.timestamp, inner.number))?;

        Ok(BlockHeader {
            height: inner.number,
            hash: self.header.hash,
            timestamp,
        })
    }

    /// Native value moved by each successful transaction. Requires full transactions.
    fn parse_transaction_logs(&self, receipts: &[Receipt]) -> Result<Vec<TransactionLog>> {
        if !receipts.is_empty() && self.transactions.as_transactions().is_none() {
            return Err(anyhow!(
                "block {} was fetched without full transactions",
                self.header.inner.number
            ));
        }

        let by_hash: HashMap<B256, &Receipt> = receipts
            .iter()
            .map(|receipt| (receipt.action_hash, receipt))
            .collect();

        let mut transaction_logs = Vec::new();
        for transaction in self.transactions.txns() {
            let tx_hash = TransactionResponse::tx_hash(transaction);
            let value = Transaction::value(transaction);
            if value.is_zero() {
                continue;
            }

            let receipt = by_hash
                .get(&tx_hash)
                .ok_or_else(|| anyhow!("no receipt for transaction {}", tx_hash))?;
            if !receipt.is_success() {
                continue;
            }

            // Contract creations send their value to the deployed address
            let recipient = match Transaction::kind(transaction) {
                TxKind::Call(to) => to,
                TxKind::Create => receipt.contract_address.ok_or_else(|| {
                    anyhow!("creation {} has no contract address", tx_hash)
                })?,
            };

            transaction_logs.push(TransactionLog {
                action_hash: tx_hash,
                block_height: receipt.block_height,
                transfers: vec![NativeTransfer {
                    sender: TransactionResponse::from(transaction),
                    recipient,
                    amount: value,
                }],
            });
        }

        Ok(transaction_logs)
    }
}
