//! Graph configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Graph`](crate::graph::Graph) and the effect
/// [`Runtime`](crate::reactive::Runtime) built on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Upper bound on flush rounds performed by `Runtime::stabilize`.
    pub max_stabilize_rounds: usize,

    /// Whether effects created without explicit options may write signals.
    pub effects_allow_signal_writes: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_stabilize_rounds: 100,
            effects_allow_signal_writes: false,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }
}
