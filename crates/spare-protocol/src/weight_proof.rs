use crate::{Header, Streamable};

/// A sampled view of a chain, from genesis to the tip, dense near the tip and
/// increasingly sparse towards genesis. Every retarget boundary is included so the
/// verifier can recompute each epoch's difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Streamable)]
pub struct WeightProof {
    pub samples: Vec<Header>,
}

impl WeightProof {
    pub fn new(samples: Vec<Header>) -> Self {
        Self { samples }
    }

    pub fn tip(&self) -> Option<&Header> {
        self.samples.last()
    }
}
