use crate::{Bytes, Bytes100, Bytes32, Bytes48, Streamable};

/// A proof of space over a challenge. Verification is delegated to the proof oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct ProofOfSpace {
    pub challenge: Bytes32,
    pub plot_public_key: Bytes48,
    pub size: u8,
    pub proof: Bytes,
}

/// The claimed result of running the verifiable delay function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct VdfInfo {
    pub challenge: Bytes32,
    pub number_of_iterations: u64,
    pub output: Bytes100,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct VdfProof {
    pub witness_type: u8,
    pub witness: Bytes,
    pub normalized_to_identity: bool,
}
