//! Contracts of the two external stores.

use async_trait::async_trait;
use ontobase_ontology::{OntologyBundle, Result};

use crate::query::{DistinctValue, FieldPath, Filter, Paging, QueryPage};

/// Authoritative source of tags, nodes and edges.
#[async_trait]
pub trait OntologyStore: Send + Sync {
    /// Bulk load of the full ontology for bootstrap or reload.
    async fn load_bundle(&self) -> Result<OntologyBundle>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "ontology store".to_string()
    }
}

/// Query capability of the document store.
///
/// Transient failures must be reported as `OntoError::StoreUnavailable` so
/// the caller can retry them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Matching document ids in store order (or `paging.sort` order).
    async fn query(&self, collection: &str, filter: &Filter, paging: &Paging)
        -> Result<QueryPage>;

    /// Explicit count pass, used when `query` cannot report a total.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn exists(&self, collection: &str, filter: &Filter) -> Result<bool> {
        let page = self
            .query(collection, filter, &Paging::new(0, 1))
            .await?;
        Ok(!page.ids.is_empty())
    }

    /// Distinct values stored under `path`, with document counts.
    async fn distinct_values(&self, collection: &str, path: &FieldPath)
        -> Result<Vec<DistinctValue>>;
}
