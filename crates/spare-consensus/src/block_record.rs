use spare_protocol::{Bytes32, Coin, FullBlock};

use crate::{create_farmer_coin, create_pool_coin, ConsensusConstants};

/// The consensus-relevant summary of a validated block, kept for every block in the
/// block tree so that forks can be compared and retargets computed without the bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRecord {
    pub header_hash: Bytes32,
    pub prev_hash: Bytes32,
    pub height: u32,
    pub weight: u128,
    pub total_iters: u128,
    pub timestamp: u64,
    /// The difficulty this block was produced at, which is also its weight increment.
    pub difficulty: u64,
    /// Sum of the fees of the transactions included in the block.
    pub fees: u64,
    pub farmer_puzzle_hash: Bytes32,
    pub pool_puzzle_hash: Bytes32,
}

impl BlockRecord {
    pub fn from_block(block: &FullBlock, difficulty: u64, fees: u64) -> Self {
        let header = &block.header;
        Self {
            header_hash: header.header_hash(),
            prev_hash: header.prev_header_hash,
            height: header.height,
            weight: header.weight,
            total_iters: header.total_iters,
            timestamp: header.timestamp,
            difficulty,
            fees,
            farmer_puzzle_hash: header.farmer_reward_puzzle_hash,
            pool_puzzle_hash: header.pool_target.puzzle_hash,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// The coins minted by this block: the pool reward, then the farmer reward plus fees.
    pub fn reward_coins(&self, constants: &ConsensusConstants) -> [Coin; 2] {
        [
            create_pool_coin(self.height, self.pool_puzzle_hash, constants),
            create_farmer_coin(self.height, self.farmer_puzzle_hash, self.fees, constants),
        ]
    }
}

/// Access to the records of previously validated blocks.
pub trait BlockRecords {
    fn block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord>;

    /// The ancestor of `header_hash` at `height`, which may be the block itself.
    fn ancestor_at(&self, header_hash: &Bytes32, height: u32) -> Option<&BlockRecord> {
        let mut record = self.block_record(header_hash)?;
        while record.height > height {
            record = self.block_record(&record.prev_hash)?;
        }
        (record.height == height).then_some(record)
    }
}

impl BlockRecords for std::collections::HashMap<Bytes32, BlockRecord> {
    fn block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.get(header_hash)
    }
}
