use std::{collections::HashSet, fmt};

use spare_protocol::{Bytes32, FullBlock, Header, SpendBundle};

use crate::{
    block_challenge, calculate_iterations_quality, check_transaction, next_difficulty,
    quality_string, validate_transaction_signature, vdf_challenge, BlockRecord, BlockRecords,
    CoinView, ConsensusConstants, ProofOracle, SignatureOracle, ValidationError,
};

/// The result of the checks that depend only on a block and its parent, which are
/// safe to run off the critical section and in parallel across candidate blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreValidation {
    pub header_hash: Bytes32,
    pub quality: Bytes32,
    /// The first transaction whose aggregate signature failed, reported once the
    /// transaction checks reach it.
    pub invalid_signature: Option<Bytes32>,
}

/// Everything beyond the block and its parent that full validation reads.
#[derive(Clone, Copy)]
pub struct BlockContext<'a> {
    pub constants: &'a ConsensusConstants,
    pub records: &'a dyn BlockRecords,
    /// The coin set as of the parent block.
    pub coins: &'a dyn CoinView,
    pub signatures: &'a dyn SignatureOracle,
    /// Local time, in seconds since the unix epoch.
    pub now: u64,
}

impl fmt::Debug for BlockContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockContext")
            .field("constants", self.constants)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// Runs every check against a block whose parent is `prev`, or `None` for genesis.
pub fn validate_block(
    block: &FullBlock,
    prev: Option<&BlockRecord>,
    proofs: &dyn ProofOracle,
    context: &BlockContext<'_>,
) -> Result<BlockRecord, ValidationError> {
    let pre_validation =
        pre_validate_block(block, prev, context.constants, proofs, context.signatures)?;
    validate_prevalidated_block(block, &pre_validation, prev, context)
}

/// Structural and proof checks, plus the signature of every transaction.
///
/// These are the only checks that call into the oracles.
pub fn pre_validate_block(
    block: &FullBlock,
    prev: Option<&BlockRecord>,
    constants: &ConsensusConstants,
    proofs: &dyn ProofOracle,
    signatures: &dyn SignatureOracle,
) -> Result<PreValidation, ValidationError> {
    validate_structure(block, prev, constants)?;
    let quality = validate_header_proofs(&block.header, constants, proofs)?;

    let invalid_signature = block
        .transactions
        .iter()
        .find(|bundle| validate_transaction_signature(bundle, constants, signatures).is_err())
        .map(SpendBundle::name);

    Ok(PreValidation {
        header_hash: block.header_hash(),
        quality,
        invalid_signature,
    })
}

/// Weight, transaction and timestamp checks, given a block that already passed
/// [`pre_validate_block`] against the same parent. Never calls an oracle.
pub fn validate_prevalidated_block(
    block: &FullBlock,
    pre_validation: &PreValidation,
    prev: Option<&BlockRecord>,
    context: &BlockContext<'_>,
) -> Result<BlockRecord, ValidationError> {
    let header = &block.header;
    let constants = context.constants;

    if pre_validation.header_hash != block.header_hash() {
        return Err(ValidationError::PreValidationMismatch(
            pre_validation.header_hash,
        ));
    }

    let difficulty = next_difficulty(constants, context.records, prev)
        .ok_or(ValidationError::MissingAncestor(header.prev_header_hash))?;

    validate_header_weight(
        header,
        &pre_validation.quality,
        difficulty,
        prev.map_or(0, |prev| prev.weight),
        prev.map_or(0, |prev| prev.total_iters),
        constants,
    )?;

    let fees = validate_block_transactions(block, pre_validation, context)?;

    validate_timestamp(header, prev, constants, context.now)?;

    Ok(BlockRecord::from_block(block, difficulty, fees))
}

fn validate_structure(
    block: &FullBlock,
    prev: Option<&BlockRecord>,
    constants: &ConsensusConstants,
) -> Result<(), ValidationError> {
    let header = &block.header;

    let expected_height = prev.map_or(0, |prev| prev.height.saturating_add(1));
    if header.height != expected_height {
        return Err(ValidationError::InvalidHeight {
            expected: expected_height,
            found: header.height,
        });
    }

    let expected_prev = prev.map_or(constants.genesis_challenge, |prev| prev.header_hash);
    if header.prev_header_hash != expected_prev {
        return Err(ValidationError::InvalidPrevHash {
            expected: expected_prev,
            found: header.prev_header_hash,
        });
    }

    if !header
        .transaction_ids
        .iter()
        .copied()
        .eq(block.transactions.iter().map(SpendBundle::name))
    {
        return Err(ValidationError::InvalidTransactionIds);
    }

    if !header.pool_target.is_valid_at(header.height) {
        return Err(ValidationError::ExpiredPoolTarget {
            max_height: header.pool_target.max_height,
        });
    }

    if header.height == 0
        && (header.pool_target.puzzle_hash != constants.genesis_pre_farm_pool_puzzle_hash
            || header.farmer_reward_puzzle_hash != constants.genesis_pre_farm_farmer_puzzle_hash)
    {
        return Err(ValidationError::InvalidPrefarm);
    }

    Ok(())
}

/// Checks the proof of space and the VDF that follows it, returning the proof's quality.
///
/// Needs nothing but the header itself, so weight proofs use it on sampled headers.
pub fn validate_header_proofs(
    header: &Header,
    constants: &ConsensusConstants,
    proofs: &dyn ProofOracle,
) -> Result<Bytes32, ValidationError> {
    let proof_of_space = &header.proof_of_space;

    if proof_of_space.size < constants.min_plot_size
        || proof_of_space.size > constants.max_plot_size
    {
        return Err(ValidationError::InvalidPlotSize(proof_of_space.size));
    }

    let challenge = block_challenge(&header.prev_header_hash);
    if proof_of_space.challenge != challenge {
        return Err(ValidationError::InvalidChallenge);
    }

    if !proofs.verify_space_proof(&challenge, proof_of_space) {
        return Err(ValidationError::InvalidProofOfSpace);
    }

    let quality = quality_string(proof_of_space);
    let vdf = &header.challenge_vdf;

    if vdf.challenge != vdf_challenge(&challenge, &quality) {
        return Err(ValidationError::InvalidVdfChallenge);
    }

    if !proofs.verify_time_proof(
        &vdf.challenge,
        vdf,
        &header.challenge_vdf_proof,
        vdf.number_of_iterations,
    ) {
        return Err(ValidationError::InvalidProofOfTime);
    }

    Ok(quality)
}

/// Checks that a header's weight and iteration counts follow from its difficulty.
pub fn validate_header_weight(
    header: &Header,
    quality: &Bytes32,
    difficulty: u64,
    prev_weight: u128,
    prev_total_iters: u128,
    constants: &ConsensusConstants,
) -> Result<(), ValidationError> {
    let expected_weight = prev_weight.saturating_add(u128::from(difficulty));
    if header.weight != expected_weight {
        return Err(ValidationError::InvalidWeight {
            expected: expected_weight,
            found: header.weight,
        });
    }

    let required_iters = calculate_iterations_quality(
        constants,
        quality,
        header.proof_of_space.size,
        difficulty,
    );
    if header.challenge_vdf.number_of_iterations != required_iters {
        return Err(ValidationError::InvalidIterations {
            expected: required_iters,
            found: header.challenge_vdf.number_of_iterations,
        });
    }

    let expected_total_iters = prev_total_iters.saturating_add(u128::from(required_iters));
    if header.total_iters != expected_total_iters {
        return Err(ValidationError::InvalidTotalIters {
            expected: expected_total_iters,
            found: header.total_iters,
        });
    }

    Ok(())
}

/// Validates every transaction against the parent's coin set and returns the total fees.
fn validate_block_transactions(
    block: &FullBlock,
    pre_validation: &PreValidation,
    context: &BlockContext<'_>,
) -> Result<u64, ValidationError> {
    let constants = context.constants;
    let mut spent = HashSet::new();
    let mut created = HashSet::new();
    let mut fees: u64 = 0;
    let mut cost: u64 = 0;

    for bundle in &block.transactions {
        let validated = check_transaction(bundle, context.coins, constants)?;
        if pre_validation.invalid_signature == Some(validated.name) {
            return Err(ValidationError::BadAggregateSignature);
        }

        for coin_id in &validated.removals {
            if !spent.insert(*coin_id) {
                return Err(ValidationError::DoubleSpend(*coin_id));
            }
        }

        for coin in &validated.additions {
            let coin_id = coin.coin_id();
            if !created.insert(coin_id) {
                return Err(ValidationError::DuplicateOutput(coin_id));
            }
        }

        fees = fees.checked_add(validated.fee).ok_or_else(|| {
            ValidationError::FeeOutOfRange(u128::from(fees) + u128::from(validated.fee))
        })?;
        cost = cost.saturating_add(validated.cost);
    }

    if cost > constants.max_block_cost {
        return Err(ValidationError::CostExceedsMax {
            cost,
            max: constants.max_block_cost,
        });
    }

    Ok(fees)
}

fn validate_timestamp(
    header: &Header,
    prev: Option<&BlockRecord>,
    constants: &ConsensusConstants,
    now: u64,
) -> Result<(), ValidationError> {
    if let Some(prev) = prev {
        if header.timestamp < prev.timestamp {
            return Err(ValidationError::TimestampTooFarInPast {
                timestamp: header.timestamp,
                prev_timestamp: prev.timestamp,
            });
        }
    }

    if header.timestamp > now.saturating_add(constants.max_future_time2) {
        return Err(ValidationError::TimestampTooFarInFuture {
            timestamp: header.timestamp,
            now,
        });
    }

    Ok(())
}
