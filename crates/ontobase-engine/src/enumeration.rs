//! Enumeration drill-down.
//!
//! An enumeration tag lists its allowed value ids; the ontology graph
//! links values into a hierarchy with `ENUMERATED-BY` edges (parent value
//! -> child value).
//!
//! ```text
//!   kingdom.values = [plantae, fungi, pinophyta, ...]
//!
//!   plantae ──ENUMERATED-BY──► pinophyta ──ENUMERATED-BY──► pinaceae
//!   fungi
//! ```
//!
//! Root values are allowed values that no other allowed value enumerates.
//! Child values of `v` are the allowed values `v` enumerates. Each entry
//! reports whether at least one document in the collection carries the
//! value while also satisfying the sibling criteria.

use ontobase_ontology::{
    DataKind, OntoError, OntologySnapshot, Predicate, Result, TagDescriptor,
};
use ontobase_storage::{FieldPath, FieldTest, Filter, Scalar};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::matcher::{node_label, Matcher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationEntry {
    pub value: String,
    pub label: String,
    pub has_matches: bool,
    pub has_children: bool,
}

/// Where and under which sibling selections to probe values.
#[derive(Debug, Clone)]
pub struct EnumerationScope {
    pub collection: String,
    /// Compiled sibling criteria (`Filter::All` for none).
    pub siblings: Filter,
    /// Paths holding the tag's value; empty means the bare tag offset.
    pub paths: Vec<FieldPath>,
    pub language: String,
}

impl Matcher {
    pub async fn root_enumerations(
        &self,
        snapshot: &OntologySnapshot,
        tag: &TagDescriptor,
        scope: &EnumerationScope,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnumerationEntry>> {
        ensure_enumeration(tag)?;
        let graph = &snapshot.graph;

        let roots: Vec<&str> = tag
            .values
            .iter()
            .map(String::as_str)
            .filter(|value| match graph.find_by_pid(value) {
                Ok(node) => !graph
                    .incoming(node.id, &Predicate::EnumeratedBy)
                    .iter()
                    .any(|parent| tag.allows_value(&parent.pid)),
                Err(_) => true,
            })
            .collect();

        self.entries(snapshot, tag, scope, roots, cancel).await
    }

    pub async fn child_enumerations(
        &self,
        snapshot: &OntologySnapshot,
        tag: &TagDescriptor,
        parent: &str,
        scope: &EnumerationScope,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnumerationEntry>> {
        ensure_enumeration(tag)?;
        if !tag.allows_value(parent) {
            return Err(OntoError::InvalidPattern {
                tag: tag.id.clone(),
                message: format!("`{parent}` is not a value of this enumeration"),
            });
        }
        let parent = snapshot.graph.find_by_pid(parent)?;

        let children: Vec<&str> = snapshot
            .graph
            .neighbors(parent.id, &Predicate::EnumeratedBy)
            .into_iter()
            .map(|node| node.pid.as_str())
            .filter(|pid| tag.allows_value(pid))
            .collect();

        self.entries(snapshot, tag, scope, children, cancel).await
    }

    async fn entries(
        &self,
        snapshot: &OntologySnapshot,
        tag: &TagDescriptor,
        scope: &EnumerationScope,
        values: Vec<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnumerationEntry>> {
        let paths = if scope.paths.is_empty() {
            vec![vec![tag.offset.clone()]]
        } else {
            scope.paths.clone()
        };

        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let probe = Filter::and(vec![
                scope.siblings.clone(),
                Filter::Field {
                    paths: paths.clone(),
                    test: FieldTest::Equals {
                        value: Scalar::Text(value.to_string()),
                    },
                },
            ]);
            let has_matches = self.exists(&scope.collection, &probe, cancel).await?;
            out.push(EnumerationEntry {
                value: value.to_string(),
                label: node_label(snapshot, value, &scope.language)
                    .unwrap_or_else(|| value.to_string()),
                has_matches,
                has_children: has_children(snapshot, tag, value),
            });
        }

        tracing::debug!(
            tag = %tag.id,
            collection = %scope.collection,
            values = out.len(),
            "enumeration entries computed"
        );
        Ok(out)
    }
}

fn ensure_enumeration(tag: &TagDescriptor) -> Result<()> {
    if tag.kind == DataKind::Enumeration {
        Ok(())
    } else {
        Err(OntoError::IncompatibleOperator {
            tag: tag.id.clone(),
            kind: tag.kind,
            operator: "enumerate".to_string(),
        })
    }
}

fn has_children(snapshot: &OntologySnapshot, tag: &TagDescriptor, value: &str) -> bool {
    snapshot.graph.find_by_pid(value).is_ok_and(|node| {
        snapshot
            .graph
            .neighbors(node.id, &Predicate::EnumeratedBy)
            .iter()
            .any(|child| tag.allows_value(&child.pid))
    })
}
