use std::{io, time::Duration};

use spare_blockchain::{BlockchainError, StoreError, WeightProofError};
use spare_protocol::{ErrorKind, StreamError};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Streamable error: {0}")]
    Streamable(#[from] StreamError),

    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Weight proof error: {0}")]
    WeightProof(#[from] WeightProofError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Verifier task failed: {0}")]
    Join(#[from] JoinError),

    #[error("The node has shut down")]
    Shutdown,

    #[error("The chain kept changing while the command was being verified")]
    ChainMoved,

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("A database path requires the sled feature")]
    PersistenceUnavailable,
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Streamable(error) => error.kind(),
            Self::Blockchain(error) => error.kind(),
            Self::Store(error) => error.kind(),
            Self::WeightProof(error) => error.kind(),
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Join(_) | Self::Shutdown | Self::ChainMoved => ErrorKind::Cancelled,
            Self::Config(_) | Self::Io(_) | Self::PersistenceUnavailable => {
                ErrorKind::StorageFailure
            }
        }
    }
}
