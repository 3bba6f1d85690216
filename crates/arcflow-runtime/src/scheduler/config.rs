//! Graph configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Graph`](crate::scheduler::graph::Graph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum number of nodes executing simultaneously.
    ///
    /// A node holds its slot from dispatch through completion, input
    /// gathering and output propagation included.
    ///
    /// Default: 4
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Whether completions re-evaluate downstream readiness and re-arm
    /// nodes with residual buffered input.
    ///
    /// With this disabled, readiness is only evaluated when nodes are added
    /// and when edges are removed (useful for static pre-planned
    /// executions).
    ///
    /// Default: true
    #[serde(default = "default_dynamic_scheduling")]
    pub enable_dynamic_scheduling: bool,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_dynamic_scheduling() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            enable_dynamic_scheduling: default_dynamic_scheduling(),
        }
    }
}

impl GraphConfig {
    /// Validates the configuration, returning a description of the first
    /// rejected setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}
