//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default cap on how many times one watcher may re-run within a flush.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Tunables held by a [`Runtime`](crate::reactive::Runtime).
///
/// Any field missing from a deserialized document falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suppresses development diagnostics (prop mutation warnings, watcher
    /// error logging before re-raising).
    pub production: bool,

    /// How many times a single watcher may be re-queued during one flush
    /// before the flush is aborted as an infinite loop.
    pub max_update_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            production: !cfg!(debug_assertions),
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}
