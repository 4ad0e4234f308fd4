use alloy_network::AnyTransactionReceipt;

use crate::models::block_data::{
    Log, RECEIPT_STATUS_FAILURE, RECEIPT_STATUS_SUCCESS, Receipt,
};

pub trait ReceiptParser {
    /// Converts node receipts into the protocol-facing model, preserving receipt and
    /// log order.
    fn parse_receipts(self, block_height: u64) -> Vec<Receipt>;
}

impl ReceiptParser for Vec<AnyTransactionReceipt> {
    fn parse_receipts(self, block_height: u64) -> Vec<Receipt> {
        self.into_iter()
            .map(|receipt| {
                // Access the inner ReceiptWithBloom through the AnyReceiptEnvelope
                let receipt_with_bloom = &receipt.inner.inner.inner;
                let action_hash = receipt.inner.transaction_hash;

                // Pre-Byzantium receipts carry a state root instead of a status
                let status = if receipt_with_bloom.receipt.status.coerce_status() {
                    RECEIPT_STATUS_SUCCESS
                } else {
                    RECEIPT_STATUS_FAILURE
                };

                let logs = (0u32..)
                    .zip(&receipt_with_bloom.receipt.logs)
                    .map(|(index, log)| Log {
                        address: log.inner.address,
                        topics: log.inner.data.topics().to_vec(),
                        data: log.inner.data.data.clone(),
                        action_hash,
                        block_height,
                        index,
                    })
                    .collect();

                Receipt {
                    status,
                    action_hash,
                    block_height,
                    contract_address: receipt.inner.contract_address,
                    logs,
                }
            })
            .collect()
    }
}
