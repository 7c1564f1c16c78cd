//! Matcher: runs compiled queries against the document store.
//!
//! All store calls go through `with_retry`, so transient failures are
//! retried with backoff and a cancelled token aborts at the next
//! checkpoint. Nothing the matcher does touches shared caches, so a
//! cancelled request leaves no partial state behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use ontobase_ontology::{OntologySnapshot, Result, TagDescriptor};
use ontobase_storage::{with_retry, DocumentStore, FieldPath, Filter, Paging, RetryPolicy};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::compiler::{FieldLabel, MatchQuery};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub identifiers: Vec<String>,
    pub total_count: u64,
    /// offset -> tag and label, for rendering the matched fields.
    pub dictionary: BTreeMap<String, FieldLabel>,
    pub epoch: u64,
}

/// One row of a distinct-values report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistinctEntry {
    pub value: serde_json::Value,
    pub count: u64,
    /// Display label of the value when it names an ontology node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub struct Matcher {
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) retry: RetryPolicy,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher").field("retry", &self.retry).finish()
    }
}

impl Matcher {
    pub fn new(documents: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { documents, retry }
    }

    /// Run `query` with `paging`. The total count comes from the store's
    /// query when it reports one; otherwise an explicit count pass runs.
    pub async fn execute(
        &self,
        query: &MatchQuery,
        paging: &Paging,
        cancel: &CancellationToken,
    ) -> Result<MatchResult> {
        let collection = query.collection.as_str();
        let page = with_retry(&self.retry, cancel, "query documents", || {
            self.documents.query(collection, &query.filter, paging)
        })
        .await?;

        let total_count = match page.total {
            Some(total) => total,
            None => {
                tracing::debug!(collection, "store reported no total; running count pass");
                self.count(collection, &query.filter, cancel).await?
            }
        };

        tracing::debug!(
            collection,
            returned = page.ids.len(),
            total_count,
            skip = paging.skip,
            "match executed"
        );
        Ok(MatchResult {
            identifiers: page.ids,
            total_count,
            dictionary: query.fields.clone(),
            epoch: query.epoch,
        })
    }

    pub async fn count(
        &self,
        collection: &str,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        with_retry(&self.retry, cancel, "count documents", || {
            self.documents.count(collection, filter)
        })
        .await
    }

    pub async fn exists(
        &self,
        collection: &str,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        with_retry(&self.retry, cancel, "probe documents", || {
            self.documents.exists(collection, filter)
        })
        .await
    }

    /// Distinct stored values of `tag` across `collection`.
    ///
    /// This is a plain aggregate over the field; it does not go through
    /// criteria compilation.
    pub async fn distinct_values(
        &self,
        snapshot: &OntologySnapshot,
        collection: &str,
        tag: &TagDescriptor,
        path: Option<FieldPath>,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DistinctEntry>> {
        let path = path.unwrap_or_else(|| vec![tag.offset.clone()]);
        let values = with_retry(&self.retry, cancel, "distinct values", || {
            self.documents.distinct_values(collection, &path)
        })
        .await?;

        Ok(values
            .into_iter()
            .map(|v| {
                let label = v
                    .value
                    .as_str()
                    .and_then(|pid| node_label(snapshot, pid, language));
                DistinctEntry {
                    value: v.value,
                    count: v.count,
                    label,
                }
            })
            .collect())
    }
}

/// Label of the node named `pid`, in `language` or any language.
pub(crate) fn node_label(snapshot: &OntologySnapshot, pid: &str, language: &str) -> Option<String> {
    let node = snapshot.graph.find_by_pid(pid).ok()?;
    node.labels
        .get(language)
        .or_else(|| node.labels.values().next())
        .cloned()
}
