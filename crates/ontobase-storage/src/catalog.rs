//! Catalog: owner of the live ontology snapshot.
//!
//! ```text
//!   OntologyStore ──load_bundle──► OntologySnapshot::build(epoch + 1)
//!                                          │ ok
//!                                          ▼
//!                      RwLock<Option<Arc<OntologySnapshot>>>  (swap)
//! ```
//!
//! Readers clone the current `Arc` and never observe a half-built snapshot.
//! Loads are serialized by an async mutex, so there is a single writer at a
//! time. The epoch advances only when a new snapshot is installed; a failed
//! reload leaves the previous snapshot live and records a warning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ontobase_ontology::{OntoError, OntologySnapshot, Result};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::retry::{with_retry, RetryPolicy};
use crate::store::OntologyStore;

/// Outcome of a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    /// Epoch of the snapshot in effect after the reload.
    pub epoch: u64,
    /// True when the reload failed and an older snapshot is still served.
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct Catalog {
    store: Arc<dyn OntologyStore>,
    retry: RetryPolicy,
    current: RwLock<Option<Arc<OntologySnapshot>>>,
    epoch: AtomicU64,
    last_warning: RwLock<Option<String>>,
    writer: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("store", &self.store.describe())
            .field("epoch", &self.epoch())
            .finish()
    }
}

impl Catalog {
    pub fn new(store: Arc<dyn OntologyStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            current: RwLock::new(None),
            epoch: AtomicU64::new(0),
            last_warning: RwLock::new(None),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    /// Bootstrap (or force) a load. Errors are returned, not downgraded.
    pub async fn load(&self) -> Result<Arc<OntologySnapshot>> {
        self.load_cancellable(&CancellationToken::new()).await
    }

    pub async fn load_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<OntologySnapshot>> {
        let _guard = self.writer.lock().await;

        let bundle = with_retry(&self.retry, cancel, "load ontology", || {
            self.store.load_bundle()
        })
        .await
        .map_err(|e| match e {
            OntoError::Cancelled | OntoError::DictionaryLoad(_) => e,
            other => OntoError::DictionaryLoad(format!("{}: {other}", self.store.describe())),
        })?;

        let epoch = self.epoch.load(Ordering::Acquire) + 1;
        let (tags, nodes, edges) = (bundle.tags.len(), bundle.nodes.len(), bundle.edges.len());
        let snapshot = OntologySnapshot::build(bundle, epoch).map_err(|e| match e {
            OntoError::DictionaryLoad(_) => e,
            other => OntoError::DictionaryLoad(other.to_string()),
        })?;
        let snapshot = Arc::new(snapshot);

        {
            let mut current = self.current.write();
            *current = Some(snapshot.clone());
            self.epoch.store(epoch, Ordering::Release);
        }
        *self.last_warning.write() = None;

        tracing::info!(
            source = %self.store.describe(),
            epoch,
            tags,
            nodes,
            edges,
            "ontology snapshot installed"
        );
        Ok(snapshot)
    }

    /// Reload from the store. On failure the previous snapshot stays live
    /// and the failure is reported in the returned report.
    ///
    /// Without any previous snapshot there is nothing to fall back to, so
    /// the load error is returned. Cancellation is never a stale reload: it
    /// returns `Cancelled` and leaves `last_warning` alone.
    pub async fn reload(&self) -> Result<ReloadReport> {
        self.reload_cancellable(&CancellationToken::new()).await
    }

    pub async fn reload_cancellable(&self, cancel: &CancellationToken) -> Result<ReloadReport> {
        match self.load_cancellable(cancel).await {
            Ok(snapshot) => Ok(ReloadReport {
                epoch: snapshot.epoch(),
                stale: false,
                warning: None,
            }),
            Err(OntoError::Cancelled) => Err(OntoError::Cancelled),
            Err(e) if self.is_loaded() => {
                let warning = e.to_string();
                tracing::warn!(
                    epoch = self.epoch(),
                    error = %warning,
                    "ontology reload failed; keeping previous snapshot"
                );
                *self.last_warning.write() = Some(warning.clone());
                Ok(ReloadReport {
                    epoch: self.epoch(),
                    stale: true,
                    warning: Some(warning),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn snapshot(&self) -> Result<Arc<OntologySnapshot>> {
        self.current.read().clone().ok_or(OntoError::NotLoaded)
    }

    /// Epoch of the live snapshot (0 before the first load).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Warning from the most recent failed reload, cleared on success.
    pub fn last_warning(&self) -> Option<String> {
        self.last_warning.read().clone()
    }
}
