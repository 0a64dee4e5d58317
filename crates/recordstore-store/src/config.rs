//! Store configuration.

use serde::{Deserialize, Serialize};

use recordstore_core::{Error, Result};

/// Configuration for [`Store`](crate::Store) behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Parents per batched one-to-many load when the query sets none.
    pub default_batch_size: usize,
    /// Upper bound applied to any requested batch size.
    pub max_batch_size: usize,
    /// Emit every rendered statement at `trace` level.
    pub log_statements: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 50,
            max_batch_size: 1000,
            log_statements: false,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON configuration document. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Decode(format!("invalid store config: {e}")))
    }

    /// Effective batch size for a query that requested `requested`.
    pub fn batch_size(&self, requested: Option<usize>) -> usize {
        let max = self.max_batch_size.max(1);
        requested.unwrap_or(self.default_batch_size).clamp(1, max)
    }
}
