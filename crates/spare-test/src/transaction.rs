use chia_bls::{sign, Signature};
use spare_consensus::{spend_signature_message, ConsensusConstants};
use spare_protocol::{Bytes, Bytes32, Bytes96, Coin, CoinSpend, SpendBundle};

use crate::BlsPair;

/// Spends a coin owned by `pair`, creating one coin per `(puzzle_hash, amount)` output.
pub fn spend_coin(pair: &BlsPair, coin: Coin, outputs: &[(Bytes32, u64)]) -> CoinSpend {
    let created_coins = outputs
        .iter()
        .map(|&(puzzle_hash, amount)| Coin::new(coin.coin_id(), puzzle_hash, amount))
        .collect();
    CoinSpend::new(coin, pair.public_key, Bytes::default(), created_coins)
}

/// Signs every spend with the key pair whose public key it names.
pub fn sign_spends(
    coin_spends: Vec<CoinSpend>,
    pairs: &[&BlsPair],
    reserve_fee: u64,
    constants: &ConsensusConstants,
) -> SpendBundle {
    let mut signature = Signature::default();

    for spend in &coin_spends {
        let pair = pairs
            .iter()
            .find(|pair| pair.public_key == spend.public_key)
            .expect("no key pair for coin spend");
        signature += &sign(&pair.sk, spend_signature_message(spend, constants));
    }

    SpendBundle::new(coin_spends, reserve_fee, Bytes96::new(signature.to_bytes()))
}

/// A signed bundle spending a single coin.
pub fn transfer(
    pair: &BlsPair,
    coin: Coin,
    outputs: &[(Bytes32, u64)],
    constants: &ConsensusConstants,
) -> SpendBundle {
    sign_spends(vec![spend_coin(pair, coin, outputs)], &[pair], 0, constants)
}
