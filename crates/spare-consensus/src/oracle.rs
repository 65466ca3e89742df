use chia_bls::{aggregate_verify, PublicKey, Signature};
use spare_protocol::{Bytes32, Bytes48, Bytes96, ProofOfSpace, VdfInfo, VdfProof};

/// Verifies the space and time proofs embedded in headers.
///
/// Both checks are pure functions of their inputs, but may be slow. Implementations
/// must be callable from several verifier threads at once.
pub trait ProofOracle: Send + Sync {
    fn verify_space_proof(&self, challenge: &Bytes32, proof: &ProofOfSpace) -> bool;

    fn verify_time_proof(
        &self,
        challenge: &Bytes32,
        info: &VdfInfo,
        proof: &VdfProof,
        iterations: u64,
    ) -> bool;
}

/// Verifies aggregated signatures over a list of public key and message pairs.
pub trait SignatureOracle: Send + Sync {
    fn aggregate_verify(&self, signature: &Bytes96, pairs: &[(Bytes48, Vec<u8>)]) -> bool;
}

/// Checks BLS12-381 aggregate signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlsSignatureOracle;

impl SignatureOracle for BlsSignatureOracle {
    fn aggregate_verify(&self, signature: &Bytes96, pairs: &[(Bytes48, Vec<u8>)]) -> bool {
        let Ok(signature) = Signature::from_bytes(&signature.to_bytes()) else {
            return false;
        };

        let mut data = Vec::with_capacity(pairs.len());
        for (public_key, message) in pairs {
            let Ok(public_key) = PublicKey::from_bytes(&public_key.to_bytes()) else {
                return false;
            };
            data.push((public_key, message.as_slice()));
        }

        aggregate_verify(&signature, data)
    }
}

#[cfg(test)]
mod tests {
    use chia_bls::{sign, SecretKey};

    use super::*;

    #[test]
    fn test_bls_oracle() {
        let first = SecretKey::from_seed(&[1; 32]);
        let second = SecretKey::from_seed(&[2; 32]);

        let mut signature = sign(&first, b"first");
        signature += &sign(&second, b"second");

        let pairs = vec![
            (Bytes48::new(first.public_key().to_bytes()), b"first".to_vec()),
            (Bytes48::new(second.public_key().to_bytes()), b"second".to_vec()),
        ];
        let signature = Bytes96::new(signature.to_bytes());

        assert!(BlsSignatureOracle.aggregate_verify(&signature, &pairs));
        assert!(!BlsSignatureOracle.aggregate_verify(&signature, &pairs[..1]));
        assert!(!BlsSignatureOracle.aggregate_verify(&Bytes96::default(), &pairs));
    }
}
