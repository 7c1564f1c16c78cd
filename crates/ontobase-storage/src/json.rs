//! JSON file backends.
//!
//! The ontology file holds one `OntologyBundle` (`{tags, nodes, edges}`).
//! The document file holds `{ "<collection>": [ { "_id": ..., ... } ] }`.
//! Files are re-read on every load, so editing the ontology file and calling
//! reload picks up the change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ontobase_ontology::{OntoError, OntologyBundle, Result};

use crate::memory::MemoryDocumentStore;
use crate::store::OntologyStore;

#[derive(Debug, Clone)]
pub struct JsonOntologyStore {
    path: PathBuf,
}

impl JsonOntologyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OntologyStore for JsonOntologyStore {
    async fn load_bundle(&self) -> Result<OntologyBundle> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OntoError::DictionaryLoad(format!(
                    "ontology file {} not found",
                    self.path.display()
                )))
            }
            Err(e) => {
                return Err(OntoError::unavailable(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            OntoError::DictionaryLoad(format!("parsing {}: {e}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        format!("json ontology file {}", self.path.display())
    }
}

impl MemoryDocumentStore {
    /// Load a document fixture file.
    pub async fn load_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OntoError::unavailable(format!("reading {}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| OntoError::unavailable(format!("parsing {}: {e}", path.display())))?;
        let store = Self::from_json(value)?;
        tracing::info!(path = %path.display(), "loaded document fixture");
        Ok(store)
    }
}
