//! Tunables for stores and checkpoint stacks
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [store]
//! max_mutator_rounds = 100
//!
//! [checkpoints]
//! size = 100
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Mutator rounds a commit may run before failing with `MutatorOverflow`
    pub max_mutator_rounds: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_mutator_rounds: 100,
        }
    }
}

/// Checkpoint stack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointsConfig {
    /// Maximum number of backward checkpoints kept
    pub size: usize,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self { size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulonConfig {
    pub store: StoreConfig,
    pub checkpoints: CheckpointsConfig,
}

impl TabulonConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns `Config` if the document is not valid TOML or has fields of
    /// the wrong type.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }
}
