//! Executor configuration

use serde::{Deserialize, Serialize};

/// Default ceiling on intermediate bindings
pub const DEFAULT_MAX_INTERMEDIATE_RESULTS: usize = 100_000;

/// Configuration for query execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Maximum number of intermediate bindings a pattern may produce
    pub max_intermediate_results: usize,

    /// Row cap applied when the query has no LIMIT
    pub default_limit: Option<usize>,

    /// Record timing and scan counters
    pub collect_stats: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_intermediate_results: DEFAULT_MAX_INTERMEDIATE_RESULTS,
            default_limit: None,
            collect_stats: true,
        }
    }
}

impl ExecutorOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Small ceiling so blow-up tests stay fast
    pub fn for_testing() -> Self {
        Self {
            max_intermediate_results: 1_000,
            default_limit: None,
            collect_stats: true,
        }
    }

    /// Set the intermediate binding ceiling
    pub fn max_intermediate_results(mut self, limit: usize) -> Self {
        self.max_intermediate_results = limit;
        self
    }

    /// Set the row cap used when a query has no LIMIT
    pub fn default_limit(mut self, limit: Option<usize>) -> Self {
        self.default_limit = limit;
        self
    }

    /// Enable or disable statistics collection
    pub fn collect_stats(mut self, enabled: bool) -> Self {
        self.collect_stats = enabled;
        self
    }
}
