use std::collections::{BTreeMap, HashMap};

use spare_consensus::{BlockRecord, CoinState, CoinView, ConsensusConstants};
use spare_protocol::{Bytes32, Coin, FullBlock};

/// The coin set as of the peak of the canonical chain.
///
/// Creations and spends are indexed by height, so the set can be rolled back to any
/// earlier height when the peak moves to another fork.
#[derive(Debug, Default, Clone)]
pub struct CoinStore {
    coins: HashMap<Bytes32, CoinState>,
    created_at: BTreeMap<u32, Vec<Bytes32>>,
    spent_at: BTreeMap<u32, Vec<Bytes32>>,
}

impl CoinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coin_id: &Bytes32) -> Option<&CoinState> {
        self.coins.get(coin_id)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn coin_ids(&self) -> impl Iterator<Item = &Bytes32> + '_ {
        self.coins.keys()
    }

    pub fn unspent_coins(&self) -> impl Iterator<Item = &Coin> + '_ {
        self.coins
            .values()
            .filter(|state| !state.is_spent())
            .map(|state| &state.coin)
    }

    /// Applies a block that extends the current peak. The block must already be valid.
    pub fn apply_block(
        &mut self,
        record: &BlockRecord,
        block: &FullBlock,
        constants: &ConsensusConstants,
    ) {
        let height = record.height;

        for bundle in &block.transactions {
            for coin in bundle.removals() {
                let coin_id = coin.coin_id();
                if let Some(state) = self.coins.get_mut(&coin_id) {
                    state.spent_height = Some(height);
                    self.spent_at.entry(height).or_default().push(coin_id);
                }
            }

            for coin in bundle.additions() {
                self.insert(CoinState::new(*coin, height, false));
            }
        }

        for coin in record.reward_coins(constants) {
            self.insert(CoinState::new(coin, height, true));
        }
    }

    fn insert(&mut self, state: CoinState) {
        let coin_id = state.coin.coin_id();
        self.created_at
            .entry(state.created_height)
            .or_default()
            .push(coin_id);
        self.coins.insert(coin_id, state);
    }

    /// Undoes every block above `height`, or every block if `height` is `None`.
    pub fn rollback_to(&mut self, height: Option<u32>) {
        let first_undone = height.map_or(0, |height| height.saturating_add(1));

        for coin_id in self.spent_at.split_off(&first_undone).into_values().flatten() {
            if let Some(state) = self.coins.get_mut(&coin_id) {
                state.spent_height = None;
            }
        }

        for coin_id in self
            .created_at
            .split_off(&first_undone)
            .into_values()
            .flatten()
        {
            self.coins.remove(&coin_id);
        }
    }
}

impl CoinView for CoinStore {
    fn coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        self.coins.get(coin_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use spare_consensus::simulator_constants;
    use spare_test::{transfer, BlockOptions, BlockTools, BlsPair};

    use super::*;

    #[test]
    fn test_apply_and_rollback() {
        let alice = BlsPair::new(0);
        let mut tools =
            BlockTools::new(simulator_constants()).with_reward_puzzle_hash(alice.puzzle_hash);
        let constants = *tools.constants();
        let mut store = CoinStore::new();

        let blocks = tools.chain(2);
        for block in &blocks {
            store.apply_block(tools.record(&block.header_hash()), block, &constants);
        }
        assert_eq!(store.len(), 4);

        let [pool_coin, _] = tools.record(&blocks[1].header_hash()).reward_coins(&constants);
        let bundle = transfer(&alice, pool_coin, &[(alice.puzzle_hash, 5)], &constants);
        let created = bundle.additions().copied().next().unwrap();
        let block = tools.create_block(
            Some(blocks[1].header_hash()),
            BlockOptions::with_transactions(vec![bundle]),
        );
        store.apply_block(tools.record(&block.header_hash()), &block, &constants);

        assert_eq!(store.get(&pool_coin.coin_id()).unwrap().spent_height, Some(2));
        assert!(store.is_unspent(&created.coin_id()));
        assert_eq!(store.len(), 7);
        assert_eq!(store.unspent_coins().count(), 6);

        store.rollback_to(Some(1));
        assert!(store.is_unspent(&pool_coin.coin_id()));
        assert!(store.get(&created.coin_id()).is_none());
        assert_eq!(store.len(), 4);

        store.rollback_to(None);
        assert!(store.is_empty());
    }
}
