use spare_consensus::ValidatedTransaction;
use spare_protocol::{Bytes32, SpendBundle};

use crate::FeeRate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolItem {
    pub bundle: SpendBundle,
    pub name: Bytes32,
    pub fee: u64,
    pub cost: u64,
    /// The peak height when the item was admitted.
    pub added_height: u32,
    pub removals: Vec<Bytes32>,
}

impl MempoolItem {
    pub fn new(bundle: SpendBundle, validated: ValidatedTransaction, added_height: u32) -> Self {
        Self {
            bundle,
            name: validated.name,
            fee: validated.fee,
            cost: validated.cost,
            added_height,
            removals: validated.removals,
        }
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::new(self.fee, self.cost)
    }
}
