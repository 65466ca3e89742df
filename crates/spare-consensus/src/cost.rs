use spare_protocol::{SpendBundle, Streamable};

use crate::ConsensusConstants;

/// Charged once per coin spend, for its share of the aggregate signature check.
pub const AGG_SIG_COST: u64 = 1_200_000;

/// Charged once per created coin.
pub const CREATE_COIN_COST: u64 = 1_800_000;

/// The cost a spend bundle contributes towards the block and mempool ceilings.
pub fn spend_bundle_cost(bundle: &SpendBundle, constants: &ConsensusConstants) -> u64 {
    let size = u64::try_from(bundle.to_bytes().len()).unwrap_or(u64::MAX);
    let spends = u64::try_from(bundle.coin_spends.len()).unwrap_or(u64::MAX);
    let created = u64::try_from(bundle.additions().count()).unwrap_or(u64::MAX);

    size.saturating_mul(constants.cost_per_byte)
        .saturating_add(spends.saturating_mul(AGG_SIG_COST))
        .saturating_add(created.saturating_mul(CREATE_COIN_COST))
}
