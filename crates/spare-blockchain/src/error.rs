use spare_protocol::{Bytes32, ErrorKind, StreamError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sled")]
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt stored record: {0}")]
    Corrupt(#[from] StreamError),

    #[error("Block {0} is missing from the store")]
    MissingBlock(Bytes32),

    #[error("Arrival index entry {0} is missing from the store")]
    MissingArrivalEntry(u64),

    #[error("Unknown block {0}")]
    UnknownBlock(Bytes32),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StorageFailure
    }
}

impl BlockchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBlock(_) => ErrorKind::ProtocolViolation,
            Self::Store(_)
            | Self::Corrupt(_)
            | Self::MissingBlock(_)
            | Self::MissingArrivalEntry(_) => ErrorKind::StorageFailure,
        }
    }
}
