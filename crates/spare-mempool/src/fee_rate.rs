use std::{cmp::Ordering, fmt};

/// Fee paid per unit of cost.
///
/// Compared by cross multiplication, so no precision is lost to division.
#[derive(Clone, Copy)]
pub struct FeeRate {
    pub fee: u64,
    pub cost: u64,
}

impl FeeRate {
    pub fn new(fee: u64, cost: u64) -> Self {
        Self { fee, cost }
    }
}

impl PartialEq for FeeRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FeeRate {}

impl PartialOrd for FeeRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeeRate {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.fee) * u128::from(other.cost);
        let rhs = u128::from(other.fee) * u128::from(self.cost);
        lhs.cmp(&rhs)
    }
}

impl fmt::Debug for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.fee, self.cost)
    }
}
