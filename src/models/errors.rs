use alloy_primitives::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed topic: {reason}")]
    MalformedTopic { reason: String },
    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },
}

impl DecodeError {
    pub fn topic(reason: impl Into<String>) -> Self {
        Self::MalformedTopic {
            reason: reason.into(),
        }
    }

    pub fn payload(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ContractReadError {
    #[error("Remote call to {address} failed: {message}")]
    RemoteCall { address: Address, message: String },
    #[error("Contract execution at {address} did not succeed: {message}")]
    ContractExecution { address: Address, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key: {message}")]
    DuplicateKey { message: String },
    #[error("Value out of range for storage: {value}")]
    ValueOutOfRange { value: String },
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::DuplicateKey {
                    message: db_err.message().to_string(),
                };
            }
        }
        Self::Database(err)
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ContractRead(#[from] ContractReadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to create {object} for protocol {protocol}: {source}")]
    Schema {
        protocol: &'static str,
        object: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("Block handling was cancelled")]
    Cancelled,
    #[error("Protocol already registered: {id}")]
    AlreadyRegistered { id: String },
}

impl ProtocolError {
    /// Whether re-running the block in a fresh transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ContractRead(ContractReadError::RemoteCall { .. })
        )
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(StoreError::DuplicateKey { .. }))
    }
}
