#![doc = include_str!("../README.md")]

pub use spare_blockchain as blockchain;
pub use spare_consensus as consensus;
pub use spare_mempool as mempool;
pub use spare_node as node;
pub use spare_protocol as protocol;

pub mod prelude {
    pub use spare_blockchain::{AddBlockResult, BlockStore, Blockchain, MemoryStore};
    pub use spare_consensus::{ConsensusConstants, ProofOracle, SignatureOracle};
    pub use spare_mempool::{Mempool, MempoolInclusion};
    pub use spare_node::{FullNode, Network, NodeConfig};
    pub use spare_protocol::{Bytes32, Coin, ErrorKind, FullBlock, SpendBundle, Streamable};
}
