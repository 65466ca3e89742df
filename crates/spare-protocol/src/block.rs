use crate::{Bytes32, PoolTarget, ProofOfSpace, SpendBundle, Streamable, VdfInfo, VdfProof};

/// Everything about a block except its transaction bodies.
///
/// The header hash commits to every field, including both proofs and the ordered list
/// of included transaction ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct Header {
    /// The previous block's header hash, or the genesis challenge for the genesis block.
    pub prev_header_hash: Bytes32,
    pub height: u32,
    /// Cumulative difficulty from genesis up to and including this block.
    pub weight: u128,
    pub total_iters: u128,
    pub timestamp: u64,
    pub proof_of_space: ProofOfSpace,
    pub challenge_vdf: VdfInfo,
    pub challenge_vdf_proof: VdfProof,
    pub farmer_reward_puzzle_hash: Bytes32,
    pub pool_target: PoolTarget,
    pub transaction_ids: Vec<Bytes32>,
}

impl Header {
    pub fn header_hash(&self) -> Bytes32 {
        self.hash()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct FullBlock {
    pub header: Header,
    pub transactions: Vec<SpendBundle>,
}

impl FullBlock {
    pub fn new(header: Header, transactions: Vec<SpendBundle>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn header_hash(&self) -> Bytes32 {
        self.header.header_hash()
    }

    pub fn prev_header_hash(&self) -> Bytes32 {
        self.header.prev_header_hash
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn weight(&self) -> u128 {
        self.header.weight
    }

    pub fn is_transaction_block(&self) -> bool {
        !self.transactions.is_empty()
    }
}
