//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default tolerance for pruning and normalization checks.
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Hard ceiling on the root-register width; basis indices are `u64`.
pub const MAX_QUBITS: usize = 63;

/// Numeric and sampling settings for a [`QuantumEngine`](crate::QuantumEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Amplitudes with magnitude below this are dropped from the map, and
    /// norms/unitarity are accepted within it.
    pub epsilon: f64,
    /// Seed for measurement sampling. `None` draws from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Maximum root-register width accepted by the engine.
    pub max_qubits: usize,
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            seed: None,
            max_qubits: MAX_QUBITS,
        }
    }

    /// Set the tolerance.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Fix the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Limit the root-register width. Values above [`MAX_QUBITS`] are clamped.
    #[must_use]
    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits.min(MAX_QUBITS);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
