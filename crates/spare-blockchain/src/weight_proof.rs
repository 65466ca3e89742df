use std::{
    collections::{BTreeSet, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use spare_consensus::{
    calculate_iterations_quality, retarget_difficulty, validate_header_proofs, ConsensusConstants,
    ProofOracle, ValidationError,
};
use spare_protocol::{Bytes32, ErrorKind, Header, WeightProof};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{Blockchain, BlockchainError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeightProofError {
    #[error("Weight proof has no samples")]
    Empty,

    #[error("Weight proof does not start at the genesis block")]
    InvalidGenesis,

    #[error("Sample heights and weights must strictly increase at height {0}")]
    NotIncreasing(u32),

    #[error("Samples at heights {lower} and {upper} are too far apart")]
    TooSparse { lower: u32, upper: u32 },

    #[error("Missing epoch boundary sample at height {0}")]
    MissingEpochSample(u32),

    #[error("Sample at height {0} does not follow the sample before it")]
    InvalidLink(u32),

    #[error("Expected weight {expected} at height {height}, found {found}")]
    InvalidWeight {
        height: u32,
        expected: u128,
        found: u128,
    },

    #[error("Sample at height {height} is invalid: {error}")]
    InvalidSample {
        height: u32,
        error: ValidationError,
    },

    #[error("Weight proof verification was cancelled")]
    Cancelled,
}

impl WeightProofError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::ProtocolViolation,
        }
    }
}

/// The tip a verified weight proof vouches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifiedWeightProof {
    pub tip: Bytes32,
    pub height: u32,
    pub weight: u128,
}

/// The largest height difference allowed between two consecutive samples, where the
/// upper sample is `depth` blocks below the tip. Every block in the recent window is
/// sampled, and below it the allowed gap grows with depth so the number of samples
/// grows logarithmically with chain length.
pub fn allowed_gap(depth: u32, recent_blocks: u32) -> u32 {
    if depth < recent_blocks {
        1
    } else {
        depth - recent_blocks + 2
    }
}

/// The heights a weight proof for a chain ending at `tip_height` samples, ascending.
///
/// Includes the genesis block, the tip, and the first and last block of every epoch
/// that precedes a retarget, so the verifier can recompute every difficulty.
pub fn sample_heights(tip_height: u32, constants: &ConsensusConstants) -> Vec<u32> {
    let mut heights = BTreeSet::new();
    heights.insert(0);

    let mut height = tip_height;
    loop {
        heights.insert(height);
        let gap = allowed_gap(tip_height - height, constants.weight_proof_recent_blocks);
        if gap > height {
            break;
        }
        height -= gap;
    }

    let epoch_blocks = constants.epoch_blocks;
    let mut boundary = epoch_blocks;
    while boundary <= tip_height {
        heights.insert(boundary - epoch_blocks);
        heights.insert(boundary - 1);
        boundary = match boundary.checked_add(epoch_blocks) {
            Some(next) => next,
            None => break,
        };
    }

    heights.into_iter().collect()
}

impl Blockchain {
    /// Samples headers of the canonical chain, or `None` if there is no peak yet.
    #[instrument(skip_all)]
    pub fn build_weight_proof(&self) -> Result<Option<WeightProof>, BlockchainError> {
        let Some(peak) = self.peak() else {
            return Ok(None);
        };

        let heights = sample_heights(peak.height, self.constants());
        let mut samples = Vec::with_capacity(heights.len());

        for height in heights {
            let header_hash = self
                .height_to_hash(height)
                .ok_or(BlockchainError::UnknownBlock(peak.header_hash))?;
            let block = self
                .get_block(&header_hash)?
                .ok_or(BlockchainError::MissingBlock(header_hash))?;
            samples.push(block.header);
        }

        debug!(
            "Built weight proof with {} samples for height {}",
            samples.len(),
            peak.height
        );

        Ok(Some(WeightProof::new(samples)))
    }
}

/// Checks that a weight proof describes a chain whose blocks could all have been valid,
/// and returns the tip it vouches for.
///
/// Gives up with [`WeightProofError::Cancelled`] as soon as `cancel` is set.
#[instrument(skip_all, fields(samples = proof.samples.len()))]
pub fn verify_weight_proof(
    proof: &WeightProof,
    constants: &ConsensusConstants,
    proofs: &dyn ProofOracle,
    cancel: &AtomicBool,
) -> Result<VerifiedWeightProof, WeightProofError> {
    let samples = &proof.samples;
    let (Some(first), Some(tip)) = (samples.first(), samples.last()) else {
        return Err(WeightProofError::Empty);
    };

    if first.height != 0 || first.prev_header_hash != constants.genesis_challenge {
        return Err(WeightProofError::InvalidGenesis);
    }

    for pair in samples.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        if upper.height <= lower.height || upper.weight <= lower.weight {
            return Err(WeightProofError::NotIncreasing(upper.height));
        }
    }

    // Heights strictly increase from here on, so no sample is above the tip.
    for pair in samples.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        let depth = tip.height - upper.height;
        if upper.height - lower.height > allowed_gap(depth, constants.weight_proof_recent_blocks) {
            return Err(WeightProofError::TooSparse {
                lower: lower.height,
                upper: upper.height,
            });
        }
    }

    let epochs = EpochSchedule::new(samples, tip.height, constants)?;

    let mut prev: Option<&Header> = None;
    for header in samples {
        if cancel.load(Ordering::Relaxed) {
            return Err(WeightProofError::Cancelled);
        }

        verify_sample(header, prev, &epochs, constants, proofs)?;
        prev = Some(header);
    }

    Ok(VerifiedWeightProof {
        tip: tip.header_hash(),
        height: tip.height,
        weight: tip.weight,
    })
}

fn verify_sample(
    header: &Header,
    prev: Option<&Header>,
    epochs: &EpochSchedule,
    constants: &ConsensusConstants,
    proofs: &dyn ProofOracle,
) -> Result<(), WeightProofError> {
    let height = header.height;
    let invalid = |error| WeightProofError::InvalidSample { height, error };

    let quality = validate_header_proofs(header, constants, proofs).map_err(invalid)?;

    let (difficulty, expected_weight) = epochs.at(height, constants.epoch_blocks);
    if header.weight != expected_weight {
        return Err(WeightProofError::InvalidWeight {
            height,
            expected: expected_weight,
            found: header.weight,
        });
    }

    let required_iters =
        calculate_iterations_quality(constants, &quality, header.proof_of_space.size, difficulty);
    if header.challenge_vdf.number_of_iterations != required_iters {
        return Err(invalid(ValidationError::InvalidIterations {
            expected: required_iters,
            found: header.challenge_vdf.number_of_iterations,
        }));
    }

    let prev_total_iters = match prev {
        None => Some(0),
        Some(prev) if prev.height + 1 == height => {
            if header.prev_header_hash != prev.header_hash() {
                return Err(WeightProofError::InvalidLink(height));
            }
            Some(prev.total_iters)
        }
        Some(_) => None,
    };

    if let Some(prev_total_iters) = prev_total_iters {
        let expected = prev_total_iters.saturating_add(u128::from(required_iters));
        if header.total_iters != expected {
            return Err(invalid(ValidationError::InvalidTotalIters {
                expected,
                found: header.total_iters,
            }));
        }
    }

    Ok(())
}

/// The difficulty of every epoch up to the tip, recomputed from the boundary samples.
struct EpochSchedule {
    difficulties: Vec<u64>,
    /// The weight of the chain just before each epoch's first block.
    weights_before: Vec<u128>,
}

impl EpochSchedule {
    fn new(
        samples: &[Header],
        tip_height: u32,
        constants: &ConsensusConstants,
    ) -> Result<Self, WeightProofError> {
        let by_height: HashMap<u32, &Header> = samples
            .iter()
            .map(|header| (header.height, header))
            .collect();

        let epoch_blocks = constants.epoch_blocks;
        let epochs = tip_height / epoch_blocks;

        let mut difficulties = vec![constants.difficulty_starting];
        let mut weights_before = vec![0_u128];

        for epoch in 1..=epochs {
            let boundary = epoch * epoch_blocks;
            let first = by_height
                .get(&(boundary - epoch_blocks))
                .ok_or(WeightProofError::MissingEpochSample(boundary - epoch_blocks))?;
            let last = by_height
                .get(&(boundary - 1))
                .ok_or(WeightProofError::MissingEpochSample(boundary - 1))?;

            let prev_difficulty = difficulties[difficulties.len() - 1];
            let prev_weight = weights_before[weights_before.len() - 1];

            difficulties.push(retarget_difficulty(
                constants,
                prev_difficulty,
                last.weight.saturating_sub(first.weight),
                last.timestamp.saturating_sub(first.timestamp),
            ));
            weights_before.push(
                prev_weight
                    .saturating_add(u128::from(epoch_blocks) * u128::from(prev_difficulty)),
            );
        }

        Ok(Self {
            difficulties,
            weights_before,
        })
    }

    /// The difficulty at `height` and the weight the block there must have.
    fn at(&self, height: u32, epoch_blocks: u32) -> (u64, u128) {
        let epoch = usize::try_from(height / epoch_blocks).unwrap_or(usize::MAX);
        let last = self.difficulties.len() - 1;
        let epoch = epoch.min(last);

        let difficulty = self.difficulties[epoch];
        let blocks_into_epoch = u128::from(height % epoch_blocks) + 1;
        let weight = self.weights_before[epoch]
            .saturating_add(blocks_into_epoch * u128::from(difficulty));

        (difficulty, weight)
    }
}

#[cfg(test)]
mod tests {
    use spare_consensus::{simulator_constants, MAINNET_CONSTANTS};

    use super::*;

    #[test]
    fn test_allowed_gap() {
        assert_eq!(allowed_gap(0, 20), 1);
        assert_eq!(allowed_gap(19, 20), 1);
        assert_eq!(allowed_gap(20, 20), 2);
        assert_eq!(allowed_gap(100, 20), 82);
    }

    #[test]
    fn test_sample_heights_are_dense_near_tip() {
        let constants = simulator_constants();
        let heights = sample_heights(999, &constants);

        assert_eq!(heights.first(), Some(&0));
        assert_eq!(heights.last(), Some(&999));
        assert!((980..=999).all(|height| heights.contains(&height)));
        assert!(heights.contains(&(992 - 32)));
        assert!(heights.contains(&991));

        for pair in heights.windows(2) {
            assert!(pair[1] - pair[0] <= allowed_gap(999 - pair[1], 20));
        }
    }

    #[test]
    fn test_sample_count_is_sublinear() {
        let constants = ConsensusConstants {
            weight_proof_recent_blocks: 100,
            ..*MAINNET_CONSTANTS
        };

        let small = sample_heights(10_000, &constants).len();
        let large = sample_heights(1_000_000, &constants).len();

        assert!(small < 10_000 / 10);
        assert!(large < 1_000_000 / 100);
    }

    #[test]
    fn test_genesis_only() {
        assert_eq!(sample_heights(0, &simulator_constants()), vec![0]);
    }
}
