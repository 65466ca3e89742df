use crate::{Bytes, Bytes32, Bytes48, Bytes96, Coin, Streamable};

/// Spends a single coin, authorized by the key its puzzle hash commits to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct CoinSpend {
    pub coin: Coin,
    pub public_key: Bytes48,
    /// The message the owner signs, committing to the intent of the spend.
    pub message: Bytes,
    pub created_coins: Vec<Coin>,
}

impl CoinSpend {
    pub fn new(coin: Coin, public_key: Bytes48, message: Bytes, created_coins: Vec<Coin>) -> Self {
        Self {
            coin,
            public_key,
            message,
            created_coins,
        }
    }
}

/// A transaction: a set of coin spends and the aggregate of their signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Streamable)]
pub struct SpendBundle {
    pub coin_spends: Vec<CoinSpend>,
    /// The minimum fee the spender declares; the implicit fee must cover it.
    pub reserve_fee: u64,
    pub aggregated_signature: Bytes96,
}

impl SpendBundle {
    pub fn new(coin_spends: Vec<CoinSpend>, reserve_fee: u64, aggregated_signature: Bytes96) -> Self {
        Self {
            coin_spends,
            reserve_fee,
            aggregated_signature,
        }
    }

    /// The transaction identifier.
    pub fn name(&self) -> Bytes32 {
        self.hash()
    }

    pub fn removals(&self) -> impl Iterator<Item = &Coin> + '_ {
        self.coin_spends.iter().map(|spend| &spend.coin)
    }

    pub fn additions(&self) -> impl Iterator<Item = &Coin> + '_ {
        self.coin_spends
            .iter()
            .flat_map(|spend| spend.created_coins.iter())
    }

    pub fn input_amount(&self) -> u128 {
        self.removals().map(|coin| u128::from(coin.amount)).sum()
    }

    pub fn output_amount(&self) -> u128 {
        self.additions().map(|coin| u128::from(coin.amount)).sum()
    }

    /// The implicit fee, or `None` if the outputs exceed the inputs.
    pub fn fee(&self) -> Option<u128> {
        self.input_amount().checked_sub(self.output_amount())
    }
}
