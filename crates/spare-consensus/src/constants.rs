use chia_sha2::Sha256;
use hex_literal::hex;
use once_cell::sync::Lazy;
use spare_protocol::Bytes32;

const MAINNET_GENESIS_CHALLENGE: Bytes32 = Bytes32::new(hex!(
    "ccd5bb71183532bff220ba46c268991a3ff07eb358e8255a65c30a2dce0e5fbb"
));

const TESTNET_GENESIS_CHALLENGE: Bytes32 = Bytes32::new(hex!(
    "37a90eb5185a9c4439a91ddc98bbadce7b4feba060d50116a067de66bf236615"
));

/// Parameters every node on a network must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusConstants {
    /// How many blocks are targeted per sub slot.
    pub slot_blocks_target: u32,
    /// Target duration of a sub slot, in seconds.
    pub sub_slot_time_target: u64,
    /// Scales the number of iterations a proof of space requires.
    pub difficulty_constant_factor: u128,
    /// The difficulty of the genesis block and every block in the first epoch.
    pub difficulty_starting: u64,
    /// The most a single retarget may scale the difficulty up or down by.
    pub difficulty_change_max_factor: u64,
    /// Difficulty is recomputed every time the height is a multiple of this.
    pub epoch_blocks: u32,
    /// Retargeted difficulties are truncated to this many significant bits.
    pub significant_bits: u8,
    pub min_plot_size: u8,
    pub max_plot_size: u8,
    /// How far past the local clock a block timestamp may be, in seconds.
    pub max_future_time2: u64,
    pub genesis_challenge: Bytes32,
    /// Appended to every signed message, so signatures can't be replayed across networks.
    pub agg_sig_me_additional_data: Bytes32,
    pub genesis_pre_farm_pool_puzzle_hash: Bytes32,
    pub genesis_pre_farm_farmer_puzzle_hash: Bytes32,
    pub max_coin_amount: u64,
    pub max_block_cost: u64,
    pub cost_per_byte: u64,
    /// The mempool holds at most this many blocks worth of cost.
    pub mempool_block_buffer: u64,
    /// Weight proofs include every header in this many blocks below the tip.
    pub weight_proof_recent_blocks: u32,
    /// The reward halving period, in blocks.
    pub blocks_per_year: u32,
}

impl ConsensusConstants {
    /// The default upper bound on the cost of everything held in the mempool.
    pub fn mempool_max_total_cost(&self) -> u64 {
        self.max_block_cost.saturating_mul(self.mempool_block_buffer)
    }
}

/// Used to compute the default constants of the main network, with a custom
/// [`genesis_challenge`](ConsensusConstants::genesis_challenge) and
/// [`agg_sig_me_additional_data`](ConsensusConstants::agg_sig_me_additional_data).
pub fn default_constants(genesis_challenge: Bytes32, agg_sig_me: Bytes32) -> ConsensusConstants {
    ConsensusConstants {
        slot_blocks_target: 32,
        sub_slot_time_target: 600,
        difficulty_constant_factor: 2u128.pow(67),
        difficulty_starting: 7,
        difficulty_change_max_factor: 3,
        epoch_blocks: 4608,
        significant_bits: 8,
        min_plot_size: 32,
        max_plot_size: 50,
        max_future_time2: 120,
        genesis_challenge,
        agg_sig_me_additional_data: agg_sig_me,
        genesis_pre_farm_pool_puzzle_hash: Bytes32::new(hex!(
            "d23da14695a188ae5708dd152263c4db883eb27edeb936178d4d988b8f3ce5fc"
        )),
        genesis_pre_farm_farmer_puzzle_hash: Bytes32::new(hex!(
            "3d8765d3a597ec1d99663f6c9816d915b9f68613ac94009884c4addaefcce6af"
        )),
        max_coin_amount: u64::MAX,
        max_block_cost: 11_000_000_000,
        cost_per_byte: 12_000,
        mempool_block_buffer: 10,
        weight_proof_recent_blocks: 1000,
        blocks_per_year: 32 * 6 * 24 * 365,
    }
}

/// The consensus constants of the main network.
pub static MAINNET_CONSTANTS: Lazy<ConsensusConstants> =
    Lazy::new(|| default_constants(MAINNET_GENESIS_CHALLENGE, MAINNET_GENESIS_CHALLENGE));

/// The consensus constants of the public test network.
pub static TESTNET_CONSTANTS: Lazy<ConsensusConstants> = Lazy::new(|| ConsensusConstants {
    difficulty_constant_factor: 10_052_721_566_054,
    difficulty_starting: 30,
    epoch_blocks: 768,
    min_plot_size: 18,
    genesis_pre_farm_pool_puzzle_hash: Bytes32::new(hex!(
        "3ef7c233fc0785f3c0cae5992c1d35e7c955ca37a423571c1607ba392a9d12f7"
    )),
    genesis_pre_farm_farmer_puzzle_hash: Bytes32::new(hex!(
        "08296fc227decd043aee855741444538e4cc9a31772c4d1a9e6242d1e777e42a"
    )),
    ..default_constants(TESTNET_GENESIS_CHALLENGE, TESTNET_GENESIS_CHALLENGE)
});

/// Small epochs and a short recent window, so that retargeting and weight proofs can
/// be exercised on chains a few hundred blocks long.
pub fn simulator_constants() -> ConsensusConstants {
    let genesis_challenge = hash(MAINNET_GENESIS_CHALLENGE, b"simulator");
    ConsensusConstants {
        difficulty_constant_factor: 2u128.pow(20),
        epoch_blocks: 32,
        min_plot_size: 18,
        weight_proof_recent_blocks: 20,
        blocks_per_year: 64,
        ..default_constants(genesis_challenge, genesis_challenge)
    }
}

fn hash(data: Bytes32, tag: &[u8]) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(tag);
    Bytes32::new(hasher.finalize())
}
