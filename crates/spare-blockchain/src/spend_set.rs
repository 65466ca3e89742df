use std::collections::{HashMap, HashSet};

use spare_consensus::{BlockRecord, CoinState, CoinView, ConsensusConstants};
use spare_protocol::{Bytes32, FullBlock};

use crate::CoinStore;

/// The coin set as of an arbitrary block in the tree.
///
/// Reads the canonical coin store as it was at the fork height, with the changes made
/// by the fork's own blocks layered on top. Nothing is copied from the store.
#[derive(Debug, Clone)]
pub struct SpendSet<'a> {
    store: &'a CoinStore,
    fork_height: Option<u32>,
    changes: HashMap<Bytes32, CoinState>,
}

impl<'a> SpendSet<'a> {
    /// A view of `store` rolled back to `fork_height`, or to before genesis if `None`.
    pub fn new(store: &'a CoinStore, fork_height: Option<u32>) -> Self {
        Self {
            store,
            fork_height,
            changes: HashMap::new(),
        }
    }

    pub fn fork_height(&self) -> Option<u32> {
        self.fork_height
    }

    /// Layers a block on top of the view. The block must extend the view's tip.
    pub fn apply_block(
        &mut self,
        record: &BlockRecord,
        block: &FullBlock,
        constants: &ConsensusConstants,
    ) {
        for bundle in &block.transactions {
            for coin in bundle.removals() {
                let coin_id = coin.coin_id();
                if let Some(mut state) = self.coin_state(&coin_id) {
                    state.spent_height = Some(record.height);
                    self.changes.insert(coin_id, state);
                }
            }

            for coin in bundle.additions() {
                self.changes
                    .insert(coin.coin_id(), CoinState::new(*coin, record.height, false));
            }
        }

        for coin in record.reward_coins(constants) {
            self.changes
                .insert(coin.coin_id(), CoinState::new(coin, record.height, true));
        }
    }

    /// Every coin that is unspent as of the view's tip.
    pub fn unspent_coin_ids(&self) -> HashSet<Bytes32> {
        let mut unspent: HashSet<Bytes32> = self
            .store
            .coin_ids()
            .filter(|coin_id| {
                self.base_state(coin_id)
                    .is_some_and(|state| !state.is_spent())
            })
            .copied()
            .collect();

        for (coin_id, state) in &self.changes {
            if state.is_spent() {
                unspent.remove(coin_id);
            } else {
                unspent.insert(*coin_id);
            }
        }

        unspent
    }

    fn base_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        let fork_height = self.fork_height?;
        let mut state = *self.store.get(coin_id)?;

        if state.created_height > fork_height {
            return None;
        }

        if state.spent_height.is_some_and(|height| height > fork_height) {
            state.spent_height = None;
        }

        Some(state)
    }
}

impl CoinView for SpendSet<'_> {
    fn coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        self.changes
            .get(coin_id)
            .copied()
            .or_else(|| self.base_state(coin_id))
    }
}
