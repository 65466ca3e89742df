use crate::{Bytes32, Streamable};

/// Where the pool share of a block reward is paid.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Streamable)]
pub struct PoolTarget {
    pub puzzle_hash: Bytes32,
    /// Zero means the target never expires.
    pub max_height: u32,
}

impl PoolTarget {
    pub fn new(puzzle_hash: Bytes32, max_height: u32) -> Self {
        Self {
            puzzle_hash,
            max_height,
        }
    }

    pub fn is_valid_at(&self, height: u32) -> bool {
        self.max_height == 0 || height <= self.max_height
    }
}
