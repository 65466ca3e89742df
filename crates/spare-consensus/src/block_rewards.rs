use spare_protocol::{Bytes32, Coin};

use crate::ConsensusConstants;

const MOJO_PER_UNIT: u64 = 1_000_000_000_000;
/// One eighth of the 21 million unit pre-farm.
const PREFARM_EIGHTH: u64 = 2_625_000 * MOJO_PER_UNIT;

/// The pool's share of the block reward at a given height. The genesis block carries
/// the pre-farm, after which the reward halves every three years of blocks.
pub fn calculate_pool_reward(height: u32, constants: &ConsensusConstants) -> u64 {
    if height == 0 {
        return PREFARM_EIGHTH * 7;
    }
    base_reward(height, constants) / 8 * 7
}

/// The farmer's share of the block reward, excluding fees.
pub fn calculate_base_farmer_reward(height: u32, constants: &ConsensusConstants) -> u64 {
    if height == 0 {
        return PREFARM_EIGHTH;
    }
    base_reward(height, constants) / 8
}

fn base_reward(height: u32, constants: &ConsensusConstants) -> u64 {
    let period = constants.blocks_per_year.saturating_mul(3).max(1);
    let halvings = (height / period).min(4);
    2 * MOJO_PER_UNIT >> halvings
}

/// Reward coins have no spending parent, so their parent id is made unique per height.
pub fn pool_parent_id(height: u32, genesis_challenge: Bytes32) -> Bytes32 {
    reward_parent_id(&genesis_challenge[..16], height)
}

pub fn farmer_parent_id(height: u32, genesis_challenge: Bytes32) -> Bytes32 {
    reward_parent_id(&genesis_challenge[16..], height)
}

fn reward_parent_id(prefix: &[u8], height: u32) -> Bytes32 {
    let mut bytes = [0; 32];
    bytes[..16].copy_from_slice(prefix);
    bytes[16..].copy_from_slice(&u128::from(height).to_be_bytes());
    Bytes32::new(bytes)
}

pub fn create_pool_coin(height: u32, puzzle_hash: Bytes32, constants: &ConsensusConstants) -> Coin {
    Coin::new(
        pool_parent_id(height, constants.genesis_challenge),
        puzzle_hash,
        calculate_pool_reward(height, constants),
    )
}

pub fn create_farmer_coin(
    height: u32,
    puzzle_hash: Bytes32,
    fees: u64,
    constants: &ConsensusConstants,
) -> Coin {
    Coin::new(
        farmer_parent_id(height, constants.genesis_challenge),
        puzzle_hash,
        calculate_base_farmer_reward(height, constants).saturating_add(fees),
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::MAINNET_CONSTANTS;

    use super::*;

    #[rstest]
    #[case(0, 18_375_000 * MOJO_PER_UNIT, 2_625_000 * MOJO_PER_UNIT)]
    #[case(1, 1_750_000_000_000, 250_000_000_000)]
    #[case(5_045_759, 1_750_000_000_000, 250_000_000_000)]
    #[case(5_045_760, 875_000_000_000, 125_000_000_000)]
    #[case(20_183_040, 109_375_000_000, 15_625_000_000)]
    #[case(u32::MAX, 109_375_000_000, 15_625_000_000)]
    fn test_rewards(#[case] height: u32, #[case] pool: u64, #[case] farmer: u64) {
        assert_eq!(calculate_pool_reward(height, &MAINNET_CONSTANTS), pool);
        assert_eq!(calculate_base_farmer_reward(height, &MAINNET_CONSTANTS), farmer);
    }

    #[test]
    fn test_parent_ids_are_unique() {
        let genesis = MAINNET_CONSTANTS.genesis_challenge;
        assert_ne!(pool_parent_id(1, genesis), farmer_parent_id(1, genesis));
        assert_ne!(pool_parent_id(1, genesis), pool_parent_id(2, genesis));
        assert_eq!(pool_parent_id(3, genesis)[..16], genesis[..16]);
        assert_eq!(pool_parent_id(3, genesis)[31], 3);
    }

    #[test]
    fn test_farmer_coin_includes_fees() {
        let coin = create_farmer_coin(10, Bytes32::default(), 500, &MAINNET_CONSTANTS);
        assert_eq!(coin.amount, 250_000_000_500);
    }
}
