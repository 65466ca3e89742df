use std::{thread, time::Duration};

use chia_sha2::Sha256;
use spare_consensus::ProofOracle;
use spare_protocol::{Bytes, Bytes100, Bytes32, Bytes48, ProofOfSpace, VdfInfo, VdfProof};

/// Accepts exactly the proofs produced by [`MockProofOracle::prove_space`] and
/// [`MockProofOracle::prove_time`], which are hashes of what they claim to prove.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProofOracle {
    delay: Option<Duration>,
}

impl MockProofOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` in every verification, to simulate slow proof checking.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    pub fn prove_space(challenge: Bytes32, plot_public_key: Bytes48, size: u8) -> ProofOfSpace {
        ProofOfSpace {
            challenge,
            plot_public_key,
            size,
            proof: Bytes::new(space_witness(&challenge, &plot_public_key, size).to_vec()),
        }
    }

    pub fn prove_time(challenge: Bytes32, iterations: u64) -> (VdfInfo, VdfProof) {
        let info = VdfInfo {
            challenge,
            number_of_iterations: iterations,
            output: Bytes100::default(),
        };
        let proof = VdfProof {
            witness_type: 0,
            witness: Bytes::new(time_witness(&challenge, iterations).to_vec()),
            normalized_to_identity: false,
        };
        (info, proof)
    }

    fn wait(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }
}

impl ProofOracle for MockProofOracle {
    fn verify_space_proof(&self, challenge: &Bytes32, proof: &ProofOfSpace) -> bool {
        self.wait();
        proof.challenge == *challenge
            && proof.proof.as_ref()
                == space_witness(challenge, &proof.plot_public_key, proof.size).as_ref()
    }

    fn verify_time_proof(
        &self,
        challenge: &Bytes32,
        info: &VdfInfo,
        proof: &VdfProof,
        iterations: u64,
    ) -> bool {
        self.wait();
        info.challenge == *challenge
            && info.number_of_iterations == iterations
            && proof.witness.as_ref() == time_witness(challenge, iterations).as_ref()
    }
}

fn space_witness(challenge: &Bytes32, plot_public_key: &Bytes48, size: u8) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(b"space");
    hasher.update(challenge);
    hasher.update(plot_public_key);
    hasher.update([size]);
    Bytes32::new(hasher.finalize())
}

fn time_witness(challenge: &Bytes32, iterations: u64) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(b"time");
    hasher.update(challenge);
    hasher.update(iterations.to_be_bytes());
    Bytes32::new(hasher.finalize())
}
