use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use spare_consensus::{
    simulator_constants, ConsensusConstants, MAINNET_CONSTANTS, TESTNET_CONSTANTS,
};

use crate::NodeError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Simulator,
}

impl Network {
    pub fn constants(self) -> ConsensusConstants {
        match self {
            Self::Mainnet => *MAINNET_CONSTANTS,
            Self::Testnet => *TESTNET_CONSTANTS,
            Self::Simulator => simulator_constants(),
        }
    }
}

/// Settings for a [`FullNode`](crate::FullNode). Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: Network,
    /// Where blocks are persisted. Kept in memory if unset.
    pub database_path: Option<PathBuf>,
    pub max_reorg_depth: Option<u32>,
    /// Defaults to the network's block cost ceiling times the mempool block buffer.
    pub mempool_max_total_cost: Option<u64>,
    pub verifier_threads: usize,
    pub oracle_timeout_ms: u64,
    pub weight_proof_timeout_ms: u64,
    pub channel_capacity: usize,
    pub log_filter: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            database_path: None,
            max_reorg_depth: None,
            mempool_max_total_cost: None,
            verifier_threads: 4,
            oracle_timeout_ms: 30_000,
            weight_proof_timeout_ms: 120_000,
            channel_capacity: 256,
            log_filter: "info".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NodeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn constants(&self) -> ConsensusConstants {
        self.network.constants()
    }

    pub fn mempool_max_total_cost(&self) -> u64 {
        self.mempool_max_total_cost
            .unwrap_or_else(|| self.constants().mempool_max_total_cost())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn weight_proof_timeout(&self) -> Duration {
        Duration::from_millis(self.weight_proof_timeout_ms)
    }
}
