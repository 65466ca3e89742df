use crate::{BlockRecord, BlockRecords, ConsensusConstants};

/// Clears every bit below the `significant_bits` most significant ones.
pub fn truncate_to_significant_bits(value: u64, significant_bits: u8) -> u64 {
    let bit_length = u64::BITS - value.leading_zeros();
    let significant_bits = u32::from(significant_bits);
    if significant_bits >= bit_length {
        return value;
    }
    let lower = bit_length - significant_bits;
    value & u64::MAX.checked_shl(lower).unwrap_or(0)
}

/// The difficulty of a new epoch, given the weight and time gained across the previous one.
///
/// Blocks arriving faster than the target raise the difficulty and slower ones lower it,
/// but never by more than [`difficulty_change_max_factor`] at once. A previous epoch that
/// took no time at all is treated as the fastest possible.
///
/// [`difficulty_change_max_factor`]: ConsensusConstants::difficulty_change_max_factor
pub fn retarget_difficulty(
    constants: &ConsensusConstants,
    prev_difficulty: u64,
    weight_delta: u128,
    time_delta: u64,
) -> u64 {
    let bits = constants.significant_bits;
    let factor = constants.difficulty_change_max_factor.max(1);
    let upper = truncate_to_significant_bits(prev_difficulty.saturating_mul(factor), bits).max(1);
    let lower = truncate_to_significant_bits((prev_difficulty / factor).max(1), bits).max(1);

    if time_delta == 0 {
        return upper;
    }

    let precise = weight_delta.saturating_mul(u128::from(constants.sub_slot_time_target))
        / (u128::from(constants.slot_blocks_target) * u128::from(time_delta)).max(1);
    let precise = u64::try_from(precise).unwrap_or(u64::MAX);

    truncate_to_significant_bits(precise, bits).max(lower).min(upper)
}

/// The difficulty of the block that would follow `prev`, or the starting difficulty for
/// the genesis block. Returns `None` if the start of the previous epoch is unknown.
pub fn next_difficulty<R>(
    constants: &ConsensusConstants,
    records: &R,
    prev: Option<&BlockRecord>,
) -> Option<u64>
where
    R: BlockRecords + ?Sized,
{
    let Some(prev) = prev else {
        return Some(constants.difficulty_starting);
    };

    let height = prev.height.saturating_add(1);
    if height % constants.epoch_blocks != 0 {
        return Some(prev.difficulty);
    }

    let first = records.ancestor_at(&prev.header_hash, height - constants.epoch_blocks)?;

    Some(retarget_difficulty(
        constants,
        prev.difficulty,
        prev.weight.saturating_sub(first.weight),
        prev.timestamp.saturating_sub(first.timestamp),
    ))
}

/// Whether a block at `height` starts a new epoch and is therefore retargeted.
pub fn is_epoch_boundary(constants: &ConsensusConstants, height: u32) -> bool {
    height != 0 && height % constants.epoch_blocks == 0
}
