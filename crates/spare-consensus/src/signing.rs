use chia_sha2::Sha256;
use spare_protocol::{Bytes32, Bytes48, CoinSpend, SpendBundle};

use crate::ConsensusConstants;

/// The puzzle hash of coins owned outright by a public key.
pub fn standard_puzzle_hash(public_key: &Bytes48) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update([1]);
    hasher.update(public_key);
    Bytes32::new(hasher.finalize())
}

/// Commits to the spend's message and every coin it creates, so that neither can be
/// altered without invalidating the signature.
pub fn spend_commitment(spend: &CoinSpend) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(&spend.message);
    for coin in &spend.created_coins {
        hasher.update(coin.coin_id());
    }
    Bytes32::new(hasher.finalize())
}

/// The exact bytes the owner of a spent coin must sign.
pub fn spend_signature_message(spend: &CoinSpend, constants: &ConsensusConstants) -> Vec<u8> {
    let mut message = Vec::with_capacity(96);
    message.extend_from_slice(&spend_commitment(spend));
    message.extend_from_slice(&spend.coin.coin_id());
    message.extend_from_slice(&constants.agg_sig_me_additional_data);
    message
}

/// Every public key and message pair the aggregated signature of a bundle must cover.
pub fn required_signatures(
    bundle: &SpendBundle,
    constants: &ConsensusConstants,
) -> Vec<(Bytes48, Vec<u8>)> {
    bundle
        .coin_spends
        .iter()
        .map(|spend| (spend.public_key, spend_signature_message(spend, constants)))
        .collect()
}
