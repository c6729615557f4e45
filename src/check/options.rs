use serde::{Deserialize, Serialize};

use super::chain::DEFAULT_MAX_CHAIN_LENGTH;

/// Default number of entity ids handed to a worker at a time.
pub const DEFAULT_SHARD_SIZE: u64 = 10_000;

/// Options controlling a consistency pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    /// Cross-check entities against matching schema indexes.
    pub check_indexes: bool,
    /// Report property chain defects.
    pub check_property_chains: bool,
    /// Scan the relationship store after the node store.
    pub check_relationships: bool,
    /// Worker threads.
    pub threads: usize,
    /// Entity ids per work unit.
    pub shard_size: u64,
    /// Records followed per chain before it is reported too long.
    pub max_chain_length: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            check_indexes: true,
            check_property_chains: true,
            check_relationships: true,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            shard_size: DEFAULT_SHARD_SIZE,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }
}

impl CheckOptions {
    /// Enables or disables index cross-checks.
    pub fn check_indexes(mut self, enabled: bool) -> Self {
        self.check_indexes = enabled;
        self
    }

    /// Enables or disables chain defect reporting.
    pub fn check_property_chains(mut self, enabled: bool) -> Self {
        self.check_property_chains = enabled;
        self
    }

    /// Enables or disables the relationship store scan.
    pub fn check_relationships(mut self, enabled: bool) -> Self {
        self.check_relationships = enabled;
        self
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the ids per work unit. Zero is treated as one.
    pub fn shard_size(mut self, shard_size: u64) -> Self {
        self.shard_size = shard_size.max(1);
        self
    }

    /// Sets the chain length bound.
    pub fn max_chain_length(mut self, max_chain_length: usize) -> Self {
        self.max_chain_length = max_chain_length.max(1);
        self
    }
}
