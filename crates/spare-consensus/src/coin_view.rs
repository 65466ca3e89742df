use std::collections::HashMap;

use spare_protocol::{Bytes32, Coin};

/// Where a coin stands as of some block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoinState {
    pub coin: Coin,
    pub created_height: u32,
    pub spent_height: Option<u32>,
    /// Whether the coin was minted as a block reward rather than by a spend.
    pub reward: bool,
}

impl CoinState {
    pub fn new(coin: Coin, created_height: u32, reward: bool) -> Self {
        Self {
            coin,
            created_height,
            spent_height: None,
            reward,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.spent_height.is_some()
    }
}

/// A read-only view of the coin set as of a particular block, which need not be the peak.
pub trait CoinView {
    fn coin_state(&self, coin_id: &Bytes32) -> Option<CoinState>;

    fn is_unspent(&self, coin_id: &Bytes32) -> bool {
        self.coin_state(coin_id)
            .is_some_and(|state| !state.is_spent())
    }
}

impl CoinView for HashMap<Bytes32, CoinState> {
    fn coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        self.get(coin_id).copied()
    }
}

impl<T: CoinView + ?Sized> CoinView for &T {
    fn coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        (**self).coin_state(coin_id)
    }
}
