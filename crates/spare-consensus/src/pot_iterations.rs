use chia_sha2::Sha256;
use num_bigint::BigUint;
use spare_protocol::{Bytes32, ProofOfSpace};

use crate::ConsensusConstants;

/// The approximate number of entries in a plot of size `k`.
pub fn expected_plot_size(k: u8) -> u128 {
    (2 * u128::from(k) + 1) << (k.saturating_sub(1))
}

/// The challenge a block's proof of space must answer, derived from its parent.
///
/// The genesis block uses the genesis challenge in place of a parent header hash.
pub fn block_challenge(prev_header_hash: &Bytes32) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(prev_header_hash);
    Bytes32::new(hasher.finalize())
}

pub fn quality_string(proof: &ProofOfSpace) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(proof.challenge);
    hasher.update(&proof.proof);
    Bytes32::new(hasher.finalize())
}

/// The challenge of the VDF that follows a proof of space, so the time proof can't be
/// computed before the space proof is found.
pub fn vdf_challenge(challenge: &Bytes32, quality: &Bytes32) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(challenge);
    hasher.update(quality);
    Bytes32::new(hasher.finalize())
}

/// How many VDF iterations a proof of the given quality must be followed by. Better
/// qualities need fewer iterations, and higher difficulties need proportionally more.
pub fn calculate_iterations_quality(
    constants: &ConsensusConstants,
    quality: &Bytes32,
    size: u8,
    difficulty: u64,
) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(quality);
    let sp_quality = BigUint::from_bytes_be(&hasher.finalize());

    let numerator =
        BigUint::from(difficulty) * BigUint::from(constants.difficulty_constant_factor) * sp_quality;
    let denominator = (BigUint::from(1u8) << 256u32) * BigUint::from(expected_plot_size(size));

    let iters = numerator / denominator;
    u64::try_from(&iters).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use spare_protocol::{Bytes, Bytes48};

    use crate::MAINNET_CONSTANTS;

    use super::*;

    #[rstest]
    #[case(1, 3)]
    #[case(18, 37 << 17)]
    #[case(32, 65 << 31)]
    fn test_expected_plot_size(#[case] k: u8, #[case] expected: u128) {
        assert_eq!(expected_plot_size(k), expected);
    }

    #[test]
    fn test_iterations_scale_with_difficulty() {
        let proof = ProofOfSpace {
            challenge: Bytes32::new([4; 32]),
            plot_public_key: Bytes48::default(),
            size: 32,
            proof: Bytes::new(vec![1, 2, 3]),
        };
        let quality = quality_string(&proof);

        let low = calculate_iterations_quality(&MAINNET_CONSTANTS, &quality, 32, 7);
        let high = calculate_iterations_quality(&MAINNET_CONSTANTS, &quality, 32, 700);
        assert!(low >= 1);
        assert!(high >= low * 99);
        assert!(high <= low * 101);
    }

    #[test]
    fn test_iterations_never_zero() {
        let constants = ConsensusConstants {
            difficulty_constant_factor: 1,
            ..*MAINNET_CONSTANTS
        };
        let quality = Bytes32::new([0xff; 32]);
        assert_eq!(calculate_iterations_quality(&constants, &quality, 50, 1), 1);
    }
}
