use spare_consensus::ValidationError;
use spare_protocol::{Bytes32, ErrorKind};
use thiserror::Error;

/// Why a transaction was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Transaction {0} is already in the mempool")]
    AlreadyIncluded(Bytes32),

    #[error("Fee rate does not exceed that of conflicting transactions {0:?}")]
    ConflictingSpend(Vec<Bytes32>),

    #[error("Mempool is full and the fee rate is too low to evict anything")]
    MempoolFull,
}

impl MempoolError {
    /// The error classification, or `None` for outcomes that are part of normal
    /// admission policy rather than a fault of the sender.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Invalid(error) => Some(error.kind()),
            Self::AlreadyIncluded(_) | Self::ConflictingSpend(_) | Self::MempoolFull => None,
        }
    }

    /// The transaction may become valid later, for example once its coins are confirmed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Invalid(error) => error.is_transient(),
            Self::AlreadyIncluded(_) => false,
            Self::ConflictingSpend(_) | Self::MempoolFull => true,
        }
    }
}
