//! Session configuration.

use qide_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;

/// How gate placement calls are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Gates are only logged; the engine is reached by stepping.
    #[default]
    Build,
    /// Gates are logged and applied at once. Pending steps are replayed
    /// first so that the engine reflects the whole log.
    Immediate,
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Amplitude engine settings.
    pub engine: EngineConfig,
    /// Placement mode at session start.
    pub mode: ExecutionMode,
    /// Whether a placed gate may join the last step when its span is free.
    pub pack_steps: bool,
}

impl SessionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            engine: EngineConfig::default(),
            mode: ExecutionMode::default(),
            pack_steps: true,
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the engine settings.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the placement mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Choose whether placed gates may join the last step.
    #[must_use]
    pub fn with_packing(mut self, pack_steps: bool) -> Self {
        self.pack_steps = pack_steps;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
