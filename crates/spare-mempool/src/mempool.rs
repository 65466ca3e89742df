use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use spare_consensus::{
    validate_transaction, CoinView, ConsensusConstants, SignatureOracle, ValidatedTransaction,
};
use spare_protocol::{Bytes32, SpendBundle};
use tracing::{debug, info};

use crate::{MempoolError, MempoolItem};

/// The outcome of offering a transaction to the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolInclusion {
    Admitted,
    /// Admitted after evicting these items, either because they spent the same coins
    /// at a lower fee rate or to make room.
    ReplacesExisting(Vec<Bytes32>),
    Rejected(MempoolError),
}

impl MempoolInclusion {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Pending transactions, valid against the peak's coin set and ranked by fee rate.
///
/// No two resident items spend the same coin, and the sum of their costs never exceeds
/// the configured maximum.
#[derive(Debug, Clone)]
pub struct Mempool {
    constants: ConsensusConstants,
    max_total_cost: u64,
    items: IndexMap<Bytes32, MempoolItem>,
    spends: HashMap<Bytes32, Bytes32>,
    total_cost: u64,
    peak_height: u32,
}

impl Mempool {
    pub fn new(constants: ConsensusConstants) -> Self {
        Self {
            max_total_cost: constants.mempool_max_total_cost(),
            constants,
            items: IndexMap::new(),
            spends: HashMap::new(),
            total_cost: 0,
            peak_height: 0,
        }
    }

    #[must_use]
    pub fn with_max_total_cost(mut self, max_total_cost: u64) -> Self {
        self.max_total_cost = max_total_cost;
        self
    }

    pub fn get(&self, name: &Bytes32) -> Option<&MempoolItem> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &Bytes32) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn max_total_cost(&self) -> u64 {
        self.max_total_cost
    }

    /// Items in the order they were admitted.
    pub fn items(&self) -> impl Iterator<Item = &MempoolItem> + '_ {
        self.items.values()
    }

    /// The resident item spending `coin_id`, if any.
    pub fn spender_of(&self, coin_id: &Bytes32) -> Option<&MempoolItem> {
        self.spends
            .get(coin_id)
            .and_then(|name| self.items.get(name))
    }

    /// Validates a transaction against `coins`, the coin set at the peak, and admits it
    /// if the pool's replacement and capacity rules allow.
    pub fn try_add<V>(
        &mut self,
        bundle: SpendBundle,
        coins: &V,
        signatures: &dyn SignatureOracle,
    ) -> MempoolInclusion
    where
        V: CoinView + ?Sized,
    {
        let name = bundle.name();

        if self.items.contains_key(&name) {
            return MempoolInclusion::Rejected(MempoolError::AlreadyIncluded(name));
        }

        match validate_transaction(&bundle, coins, &self.constants, signatures) {
            Ok(validated) => self.add_validated(bundle, validated),
            Err(error) => {
                debug!("Rejected transaction {name}: {error}");
                MempoolInclusion::Rejected(error.into())
            }
        }
    }

    /// Admits a transaction that already passed [`validate_transaction`] against the
    /// peak's coin set. Only the pool's own conflict and capacity rules run here.
    pub fn add_validated(
        &mut self,
        bundle: SpendBundle,
        validated: ValidatedTransaction,
    ) -> MempoolInclusion {
        let name = validated.name;

        if self.items.contains_key(&name) {
            return MempoolInclusion::Rejected(MempoolError::AlreadyIncluded(name));
        }

        let item = MempoolItem::new(bundle, validated, self.peak_height);

        let evicted = match self.plan_admission(&item) {
            Ok(evicted) => evicted,
            Err(error) => {
                debug!("Rejected transaction {name}: {error}");
                return MempoolInclusion::Rejected(error);
            }
        };

        for evicted_name in &evicted {
            self.remove(evicted_name);
        }

        debug!(
            "Admitted transaction {name} with fee {} and cost {}",
            item.fee, item.cost
        );
        self.insert(item);

        if evicted.is_empty() {
            MempoolInclusion::Admitted
        } else {
            info!("Transaction {name} evicted {} items", evicted.len());
            MempoolInclusion::ReplacesExisting(evicted)
        }
    }

    /// Works out which residents must go for `item` to fit, without changing anything.
    fn plan_admission(&self, item: &MempoolItem) -> Result<Vec<Bytes32>, MempoolError> {
        let fee_rate = item.fee_rate();

        let mut conflicts = Vec::new();
        for coin_id in &item.removals {
            if let Some(name) = self.spends.get(coin_id) {
                if !conflicts.contains(name) {
                    conflicts.push(*name);
                }
            }
        }

        let conflicting_items: Vec<&MempoolItem> = conflicts
            .iter()
            .filter_map(|name| self.items.get(name))
            .collect();

        if conflicting_items
            .iter()
            .any(|existing| existing.fee_rate() >= fee_rate)
        {
            return Err(MempoolError::ConflictingSpend(conflicts));
        }

        let mut total_cost = conflicting_items
            .iter()
            .fold(self.total_cost, |total, existing| {
                total.saturating_sub(existing.cost)
            })
            .saturating_add(item.cost);

        let mut evicted = conflicts;

        if total_cost > self.max_total_cost {
            for candidate in self.by_fee_rate().into_iter().rev() {
                if evicted.contains(&candidate.name) {
                    continue;
                }

                if candidate.fee_rate() >= fee_rate {
                    return Err(MempoolError::MempoolFull);
                }

                total_cost = total_cost.saturating_sub(candidate.cost);
                evicted.push(candidate.name);

                if total_cost <= self.max_total_cost {
                    break;
                }
            }

            if total_cost > self.max_total_cost {
                return Err(MempoolError::MempoolFull);
            }
        }

        Ok(evicted)
    }

    /// Selects transactions for a block by descending fee rate until `cost_budget` is
    /// used up. Items that don't fit or that spend an already selected coin are skipped.
    pub fn get_for_block(&self, cost_budget: u64) -> Vec<SpendBundle> {
        let mut remaining = cost_budget;
        let mut claimed = HashSet::new();
        let mut selected = Vec::new();

        for item in self.by_fee_rate() {
            if item.cost > remaining {
                continue;
            }

            if item.removals.iter().any(|coin_id| claimed.contains(coin_id)) {
                continue;
            }

            claimed.extend(item.removals.iter().copied());
            remaining -= item.cost;
            selected.push(item.bundle.clone());
        }

        selected
    }

    /// Brings the pool in line with a new peak.
    ///
    /// Drops every item that spends a coin which is no longer unspent in `coins`, then
    /// offers the transactions of blocks a reorg disconnected. Returns the names of the
    /// dropped items.
    pub fn new_peak<V>(
        &mut self,
        peak_height: Option<u32>,
        coins: &V,
        disconnected: Vec<SpendBundle>,
        signatures: &dyn SignatureOracle,
    ) -> Vec<Bytes32>
    where
        V: CoinView + ?Sized,
    {
        let stale = self.remove_stale(peak_height, coins);

        let offered = disconnected.len();
        let mut readmitted = 0;
        for bundle in disconnected {
            if self.try_add(bundle, coins, signatures).is_admitted() {
                readmitted += 1;
            }
        }

        if offered != 0 {
            info!("Re-admitted {readmitted} of {offered} disconnected transactions");
        }

        stale
    }

    /// The part of [`Mempool::new_peak`] that needs no signature checks: records the
    /// new peak height and drops every item spending a coin that is no longer unspent.
    pub fn remove_stale<V>(&mut self, peak_height: Option<u32>, coins: &V) -> Vec<Bytes32>
    where
        V: CoinView + ?Sized,
    {
        self.peak_height = peak_height.unwrap_or(0);

        let stale: Vec<Bytes32> = self
            .items
            .values()
            .filter(|item| {
                !item
                    .removals
                    .iter()
                    .all(|coin_id| coins.is_unspent(coin_id))
            })
            .map(|item| item.name)
            .collect();

        for name in &stale {
            self.remove(name);
        }

        if !stale.is_empty() {
            info!("Dropped {} stale items", stale.len());
        }

        stale
    }

    fn by_fee_rate(&self) -> Vec<&MempoolItem> {
        let mut items: Vec<&MempoolItem> = self.items.values().collect();
        items.sort_by(|a, b| b.fee_rate().cmp(&a.fee_rate()));
        items
    }

    fn insert(&mut self, item: MempoolItem) {
        for coin_id in &item.removals {
            self.spends.insert(*coin_id, item.name);
        }
        self.total_cost = self.total_cost.saturating_add(item.cost);
        self.items.insert(item.name, item);
    }

    fn remove(&mut self, name: &Bytes32) -> Option<MempoolItem> {
        let item = self.items.shift_remove(name)?;
        for coin_id in &item.removals {
            self.spends.remove(coin_id);
        }
        self.total_cost = self.total_cost.saturating_sub(item.cost);
        Some(item)
    }
}
