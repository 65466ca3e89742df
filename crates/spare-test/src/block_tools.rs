use std::collections::HashMap;

use spare_consensus::{
    block_challenge, calculate_iterations_quality, next_difficulty, quality_string, vdf_challenge,
    BlockRecord, BlockRecords, CoinState, ConsensusConstants,
};
use spare_protocol::{Bytes32, Bytes48, FullBlock, Header, PoolTarget, SpendBundle};

use crate::MockProofOracle;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// How a single block should differ from the default.
#[derive(Debug, Default, Clone)]
pub struct BlockOptions {
    pub transactions: Vec<SpendBundle>,
    /// Seconds after the parent, or the builder's block time if unset.
    pub time_delta: Option<u64>,
    /// Selects a different plot, so sibling blocks get different header hashes.
    pub plot_seed: u8,
}

impl BlockOptions {
    pub fn with_transactions(transactions: Vec<SpendBundle>) -> Self {
        Self {
            transactions,
            ..Default::default()
        }
    }

    pub fn with_plot_seed(plot_seed: u8) -> Self {
        Self {
            plot_seed,
            ..Default::default()
        }
    }
}

/// Builds valid blocks on top of any block it has built before, so that tests can
/// produce long chains, forks and transaction blocks without real proofs.
#[derive(Debug, Clone)]
pub struct BlockTools {
    constants: ConsensusConstants,
    records: HashMap<Bytes32, BlockRecord>,
    blocks: HashMap<Bytes32, FullBlock>,
    reward_puzzle_hash: Bytes32,
    block_time: u64,
}

impl BlockTools {
    pub fn new(constants: ConsensusConstants) -> Self {
        Self {
            constants,
            records: HashMap::new(),
            blocks: HashMap::new(),
            reward_puzzle_hash: Bytes32::default(),
            block_time: 18,
        }
    }

    /// Pays farmer and pool rewards of every block after genesis to `puzzle_hash`.
    #[must_use]
    pub fn with_reward_puzzle_hash(mut self, puzzle_hash: Bytes32) -> Self {
        self.reward_puzzle_hash = puzzle_hash;
        self
    }

    #[must_use]
    pub fn with_block_time(mut self, block_time: u64) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn constants(&self) -> &ConsensusConstants {
        &self.constants
    }

    pub fn record(&self, header_hash: &Bytes32) -> &BlockRecord {
        &self.records[header_hash]
    }

    pub fn block(&self, header_hash: &Bytes32) -> &FullBlock {
        &self.blocks[header_hash]
    }

    /// Builds a block on top of `prev`, or the genesis block if `prev` is `None`.
    pub fn create_block(&mut self, prev: Option<Bytes32>, options: BlockOptions) -> FullBlock {
        let constants = self.constants;
        let prev = prev.map(|hash| *self.record(&hash));

        let height = prev.map_or(0, |prev| prev.height + 1);
        let prev_header_hash = prev.map_or(constants.genesis_challenge, |prev| prev.header_hash);
        let difficulty = next_difficulty(&constants, &self.records, prev.as_ref())
            .expect("missing ancestor");

        let challenge = block_challenge(&prev_header_hash);
        let proof_of_space = MockProofOracle::prove_space(
            challenge,
            Bytes48::new([options.plot_seed; 48]),
            constants.min_plot_size,
        );
        let quality = quality_string(&proof_of_space);
        let iterations =
            calculate_iterations_quality(&constants, &quality, proof_of_space.size, difficulty);
        let (challenge_vdf, challenge_vdf_proof) =
            MockProofOracle::prove_time(vdf_challenge(&challenge, &quality), iterations);

        let (farmer_reward_puzzle_hash, pool_puzzle_hash) = if height == 0 {
            (
                constants.genesis_pre_farm_farmer_puzzle_hash,
                constants.genesis_pre_farm_pool_puzzle_hash,
            )
        } else {
            (self.reward_puzzle_hash, self.reward_puzzle_hash)
        };

        let timestamp = prev.map_or(GENESIS_TIMESTAMP, |prev| {
            prev.timestamp + options.time_delta.unwrap_or(self.block_time)
        });

        let header = Header {
            prev_header_hash,
            height,
            weight: prev.map_or(0, |prev| prev.weight) + u128::from(difficulty),
            total_iters: prev.map_or(0, |prev| prev.total_iters) + u128::from(iterations),
            timestamp,
            proof_of_space,
            challenge_vdf,
            challenge_vdf_proof,
            farmer_reward_puzzle_hash,
            pool_target: PoolTarget::new(pool_puzzle_hash, 0),
            transaction_ids: options.transactions.iter().map(SpendBundle::name).collect(),
        };

        let fees = options
            .transactions
            .iter()
            .map(|bundle| u64::try_from(bundle.fee().unwrap()).unwrap())
            .sum();

        let block = FullBlock::new(header, options.transactions);
        let record = BlockRecord::from_block(&block, difficulty, fees);
        self.records.insert(record.header_hash, record);
        self.blocks.insert(record.header_hash, block.clone());
        block
    }

    /// Extends `prev` (or starts a new chain) by `count` empty blocks.
    pub fn extend(&mut self, prev: Option<Bytes32>, count: usize) -> Vec<FullBlock> {
        self.extend_with_seed(prev, count, 0)
    }

    /// Like [`extend`](Self::extend), but on a different plot, for building forks.
    pub fn extend_with_seed(
        &mut self,
        mut prev: Option<Bytes32>,
        count: usize,
        plot_seed: u8,
    ) -> Vec<FullBlock> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let block = self.create_block(prev, BlockOptions::with_plot_seed(plot_seed));
            prev = Some(block.header_hash());
            blocks.push(block);
        }
        blocks
    }

    /// A fresh chain of `count` blocks starting at genesis.
    pub fn chain(&mut self, count: usize) -> Vec<FullBlock> {
        self.extend(None, count)
    }

    /// The coin set as of `tip`, replayed from genesis.
    pub fn coin_set(&self, tip: &Bytes32) -> HashMap<Bytes32, CoinState> {
        let mut path = Vec::new();
        let mut cursor = self.records.get(tip);
        while let Some(record) = cursor {
            path.push(record);
            cursor = if record.height == 0 {
                None
            } else {
                self.records.get(&record.prev_hash)
            };
        }

        let mut coins: HashMap<Bytes32, CoinState> = HashMap::new();
        for record in path.into_iter().rev() {
            for bundle in &self.blocks[&record.header_hash].transactions {
                for coin in bundle.removals() {
                    if let Some(state) = coins.get_mut(&coin.coin_id()) {
                        state.spent_height = Some(record.height);
                    }
                }
                for coin in bundle.additions() {
                    coins.insert(coin.coin_id(), CoinState::new(*coin, record.height, false));
                }
            }
            for coin in record.reward_coins(&self.constants) {
                coins.insert(coin.coin_id(), CoinState::new(coin, record.height, true));
            }
        }
        coins
    }
}

impl BlockRecords for BlockTools {
    fn block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.records.get(header_hash)
    }
}
