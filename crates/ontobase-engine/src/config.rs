//! Engine configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to
//! `EngineConfig::default()`.
//!
//! ```json
//! {
//!   "default_language": "it",
//!   "default_page_size": 25,
//!   "retry": { "max_attempts": 5 }
//! }
//! ```

use std::path::{Path, PathBuf};

use ontobase_storage::{Paging, RetryPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Language used for labels when a request names none, and as the
    /// fallback when a label is not found in the requested language.
    pub default_language: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub default_collection: String,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            default_page_size: 50,
            max_page_size: 1_000,
            default_collection: "documents".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill in the default limit and clamp to the maximum page size.
    pub fn effective_paging(&self, paging: &Paging) -> Paging {
        let limit = paging
            .limit
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size.max(1));
        Paging {
            skip: paging.skip,
            limit: Some(limit),
            sort: paging.sort.clone(),
        }
    }
}
