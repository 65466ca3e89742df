use bip39::Mnemonic;
use chia_bls::{PublicKey, SecretKey};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spare_consensus::standard_puzzle_hash;
use spare_protocol::{Bytes32, Bytes48};

#[derive(Debug, Clone)]
pub struct BlsPair {
    pub sk: SecretKey,
    pub pk: PublicKey,
    pub public_key: Bytes48,
    pub puzzle_hash: Bytes32,
}

impl Default for BlsPair {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BlsPair {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let entropy: [u8; 32] = rng.gen();
        let mnemonic = Mnemonic::from_entropy(&entropy).unwrap();
        let seed = mnemonic.to_seed("");
        let sk = SecretKey::from_seed(&seed);
        let pk = sk.public_key();
        let public_key = Bytes48::new(pk.to_bytes());
        Self {
            sk,
            pk,
            public_key,
            puzzle_hash: standard_puzzle_hash(&public_key),
        }
    }

    pub fn range<const N: usize>() -> [Self; N] {
        Self::range_with_seed(0)
    }

    pub fn range_with_seed<const N: usize>(seed: u64) -> [Self; N] {
        Self::range_vec_with_seed(seed, N).try_into().unwrap()
    }

    pub fn range_vec_with_seed(seed: u64, length: usize) -> Vec<Self> {
        (0..length)
            .map(|i| Self::new(seed + u64::try_from(i).unwrap()))
            .collect()
    }
}
