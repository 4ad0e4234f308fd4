use alloy_primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};

/// Receipt status code of a successfully executed transaction.
pub const RECEIPT_STATUS_SUCCESS: u64 = 1;

/// Receipt status code of a reverted transaction.
pub const RECEIPT_STATUS_FAILURE: u64 = 0;

/// Everything a protocol sees for a single block height.
///
/// Built once by the driver and handed to every registered protocol by reference,
/// so it is never mutated after construction.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub header: BlockHeader,
    /// Receipts in transaction order.
    pub receipts: Vec<Receipt>,
    /// Native value movements of the block's successful transactions.
    pub transaction_logs: Vec<TransactionLog>,
}

impl BlockData {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Receipts eligible for event extraction, in block order.
    pub fn successful_receipts(&self) -> impl Iterator<Item = &Receipt> {
        self.receipts.iter().filter(|receipt| receipt.is_success())
    }
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: B256,
    pub timestamp: DateTime<Utc>,
}

////////////////////////////////////// Receipts ////////////////////////////////////////
#[derive(Debug, Clone)]
pub struct Receipt {
    pub status: u64,
    pub action_hash: B256,
    pub block_height: u64,
    /// Address of the contract deployed by this transaction, if any.
    pub contract_address: Option<Address>,
    /// Logs in emission order.
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == RECEIPT_STATUS_SUCCESS
    }
}

#[derive(Debug, Clone)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub action_hash: B256,
    pub block_height: u64,
    /// Position within the receipt. Together with `action_hash` this identifies the event.
    pub index: u32,
}

////////////////////////////////// Transaction Logs ////////////////////////////////////
#[derive(Debug, Clone)]
pub struct TransactionLog {
    pub action_hash: B256,
    pub block_height: u64,
    pub transfers: Vec<NativeTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTransfer {
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
}
