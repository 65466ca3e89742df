use spare_protocol::{Bytes32, ErrorKind};
use thiserror::Error;

/// The validation stage that rejected a block, in the order the stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationStep {
    Structure,
    Proofs,
    Weight,
    Transactions,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Expected height {expected}, found {found}")]
    InvalidHeight { expected: u32, found: u32 },

    #[error("Previous header hash {found} does not match {expected}")]
    InvalidPrevHash { expected: Bytes32, found: Bytes32 },

    #[error("Transaction ids do not match the included transactions")]
    InvalidTransactionIds,

    #[error("Pool target expired at height {max_height}")]
    ExpiredPoolTarget { max_height: u32 },

    #[error("Genesis block does not pay the pre-farm puzzle hashes")]
    InvalidPrefarm,

    #[error("Plot size {0} is out of range")]
    InvalidPlotSize(u8),

    #[error("Proof of space answers the wrong challenge")]
    InvalidChallenge,

    #[error("Invalid proof of space")]
    InvalidProofOfSpace,

    #[error("VDF challenge does not follow from the proof of space")]
    InvalidVdfChallenge,

    #[error("Invalid proof of time")]
    InvalidProofOfTime,

    #[error("Unknown ancestor {0} needed to compute the difficulty")]
    MissingAncestor(Bytes32),

    #[error("Expected weight {expected}, found {found}")]
    InvalidWeight { expected: u128, found: u128 },

    #[error("Expected {expected} iterations, found {found}")]
    InvalidIterations { expected: u64, found: u64 },

    #[error("Expected total iterations {expected}, found {found}")]
    InvalidTotalIters { expected: u128, found: u128 },

    #[error("Spend bundle has no coin spends")]
    EmptySpendBundle,

    #[error("Coin {0} is unknown")]
    UnknownCoin(Bytes32),

    #[error("Coin {0} is already spent")]
    DoubleSpend(Bytes32),

    #[error("Coin {0} is not owned by the public key spending it")]
    WrongPuzzleHash(Bytes32),

    #[error("Created coin {0} does not have the spent coin as its parent")]
    InvalidCoinDerivation(Bytes32),

    #[error("Coin {0} is created more than once or already exists")]
    DuplicateOutput(Bytes32),

    #[error("Coin amount {0} exceeds the maximum")]
    CoinAmountExceedsMaximum(u64),

    #[error("Outputs exceed inputs")]
    MintingCoin,

    #[error("Fee {fee} is lower than the reserve fee {reserve_fee}")]
    ReserveFeeNotMet { fee: u128, reserve_fee: u64 },

    #[error("Fee {0} does not fit in 64 bits")]
    FeeOutOfRange(u128),

    #[error("Cost {cost} exceeds the maximum of {max}")]
    CostExceedsMax { cost: u64, max: u64 },

    #[error("Bad aggregate signature")]
    BadAggregateSignature,

    #[error("Timestamp {timestamp} is before the previous block's {prev_timestamp}")]
    TimestampTooFarInPast { timestamp: u64, prev_timestamp: u64 },

    #[error("Timestamp {timestamp} is too far past the local time {now}")]
    TimestampTooFarInFuture { timestamp: u64, now: u64 },

    #[error("Pre-validation result belongs to block {0}")]
    PreValidationMismatch(Bytes32),
}

impl ValidationError {
    pub fn step(&self) -> ValidationStep {
        match self {
            Self::InvalidHeight { .. }
            | Self::InvalidPrevHash { .. }
            | Self::InvalidTransactionIds
            | Self::ExpiredPoolTarget { .. }
            | Self::InvalidPrefarm
            | Self::PreValidationMismatch(_) => ValidationStep::Structure,
            Self::InvalidPlotSize(_)
            | Self::InvalidChallenge
            | Self::InvalidProofOfSpace
            | Self::InvalidVdfChallenge
            | Self::InvalidProofOfTime => ValidationStep::Proofs,
            Self::MissingAncestor(_)
            | Self::InvalidWeight { .. }
            | Self::InvalidIterations { .. }
            | Self::InvalidTotalIters { .. } => ValidationStep::Weight,
            Self::EmptySpendBundle
            | Self::UnknownCoin(_)
            | Self::DoubleSpend(_)
            | Self::WrongPuzzleHash(_)
            | Self::InvalidCoinDerivation(_)
            | Self::DuplicateOutput(_)
            | Self::CoinAmountExceedsMaximum(_)
            | Self::MintingCoin
            | Self::ReserveFeeNotMet { .. }
            | Self::FeeOutOfRange(_)
            | Self::CostExceedsMax { .. }
            | Self::BadAggregateSignature => ValidationStep::Transactions,
            Self::TimestampTooFarInPast { .. } | Self::TimestampTooFarInFuture { .. } => {
                ValidationStep::Timestamp
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProtocolViolation
    }

    /// Whether the same object may become valid later without changing, because the
    /// failure depends on local time or on coins this node hasn't seen yet.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TimestampTooFarInFuture { .. } | Self::UnknownCoin(_) | Self::MissingAncestor(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        assert!(ValidationStep::Structure < ValidationStep::Proofs);
        assert!(ValidationStep::Transactions < ValidationStep::Timestamp);
        assert_eq!(
            ValidationError::MintingCoin.step(),
            ValidationStep::Transactions
        );
    }

    #[test]
    fn test_transient_failures() {
        let future = ValidationError::TimestampTooFarInFuture {
            timestamp: 1000,
            now: 0,
        };
        assert!(future.is_transient());
        assert_eq!(future.kind(), ErrorKind::ProtocolViolation);
        assert!(!ValidationError::BadAggregateSignature.is_transient());
    }
}
