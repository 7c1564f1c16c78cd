//! OntologyGraph: node arena plus predicate-typed edge lists.
//!
//! Nodes live in a dense arena addressed by `NodeId`; predicates are
//! interned to compact `PredicateId`s. Edges are indexed both ways:
//!
//! - forward: `(subject, predicate) -> edge ids`
//! - backward: `(object, predicate) -> edge ids`
//! - outgoing: `subject -> edge ids` (all predicates, insertion order)
//!
//! The graph is immutable once built. Ontology edits happen out-of-band and
//! produce a new snapshot.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::dictionary::TagDictionary;
use crate::error::{OntoError, Result};
use crate::model::{EdgeRecord, NodeKind, NodeRecord, Predicate};

/// Surrogate key of a node (arena index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PredicateId(u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub pid: String,
    pub kind: NodeKind,
    pub tag: Option<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    subject: NodeId,
    predicate: PredicateId,
    object: NodeId,
}

#[derive(Debug, Default)]
pub struct OntologyGraph {
    nodes: Vec<Node>,
    by_pid: HashMap<String, NodeId>,
    predicates: Vec<Predicate>,
    predicate_ids: HashMap<Predicate, PredicateId>,
    edges: Vec<Edge>,
    forward_index: HashMap<(NodeId, PredicateId), Vec<u32>>,
    backward_index: HashMap<(NodeId, PredicateId), Vec<u32>>,
    outgoing_index: HashMap<NodeId, Vec<u32>>,
}

impl OntologyGraph {
    /// Build the graph, checking every node binding and edge endpoint.
    pub fn from_records(
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
        dictionary: &TagDictionary,
    ) -> Result<Self> {
        let mut graph = OntologyGraph::default();

        for record in nodes {
            if record.pid.trim().is_empty() {
                return Err(OntoError::InvalidGraph("node with empty pid".to_string()));
            }
            if graph.by_pid.contains_key(&record.pid) {
                return Err(OntoError::InvalidGraph(format!(
                    "duplicate node pid `{}`",
                    record.pid
                )));
            }
            if let Some(tag) = &record.tag {
                if !dictionary.contains(tag) {
                    return Err(OntoError::InvalidGraph(format!(
                        "node `{}` is bound to unknown tag `{tag}`",
                        record.pid
                    )));
                }
            }

            let id = NodeId(graph.nodes.len() as u32);
            graph.by_pid.insert(record.pid.clone(), id);
            graph.nodes.push(Node {
                id,
                pid: record.pid,
                kind: record.kind,
                tag: record.tag,
                labels: record.labels,
            });
        }

        for record in edges {
            let subject = graph.lookup_endpoint(&record.subject, &record)?;
            let object = graph.lookup_endpoint(&record.object, &record)?;
            if subject == object {
                return Err(OntoError::InvalidGraph(format!(
                    "self-loop on `{}` via {}",
                    record.subject, record.predicate
                )));
            }
            let predicate = graph.intern_predicate(record.predicate);
            if graph.has_edge_ids(subject, predicate, object) {
                tracing::debug!(
                    subject = %record.subject,
                    object = %record.object,
                    "skipping duplicate ontology edge"
                );
                continue;
            }
            graph.add_edge(Edge {
                subject,
                predicate,
                object,
            });
        }

        Ok(graph)
    }

    fn lookup_endpoint(&self, pid: &str, record: &EdgeRecord) -> Result<NodeId> {
        self.by_pid.get(pid).copied().ok_or_else(|| {
            OntoError::InvalidGraph(format!(
                "edge {} -[{}]-> {} references unknown node `{pid}`",
                record.subject, record.predicate, record.object
            ))
        })
    }

    fn intern_predicate(&mut self, predicate: Predicate) -> PredicateId {
        if let Some(id) = self.predicate_ids.get(&predicate) {
            return *id;
        }
        let id = PredicateId(self.predicates.len() as u32);
        self.predicates.push(predicate.clone());
        self.predicate_ids.insert(predicate, id);
        id
    }

    fn add_edge(&mut self, edge: Edge) {
        let id = self.edges.len() as u32;
        self.forward_index
            .entry((edge.subject, edge.predicate))
            .or_default()
            .push(id);
        self.backward_index
            .entry((edge.object, edge.predicate))
            .or_default()
            .push(id);
        self.outgoing_index.entry(edge.subject).or_default().push(id);
        self.edges.push(edge);
    }

    fn has_edge_ids(&self, subject: NodeId, predicate: PredicateId, object: NodeId) -> bool {
        self.forward_index
            .get(&(subject, predicate))
            .is_some_and(|ids| ids.iter().any(|&id| self.edges[id as usize].object == object))
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn find_by_pid(&self, pid: &str) -> Result<&Node> {
        self.by_pid
            .get(pid)
            .map(|id| &self.nodes[id.index()])
            .ok_or_else(|| OntoError::NodeNotFound(pid.to_string()))
    }

    /// Objects of `node -[predicate]-> *`, in edge insertion order.
    ///
    /// Unknown predicates and nodes without such edges yield an empty list.
    pub fn neighbors(&self, node: NodeId, predicate: &Predicate) -> Vec<&Node> {
        let Some(pred) = self.predicate_ids.get(predicate) else {
            return Vec::new();
        };
        self.forward_index
            .get(&(node, *pred))
            .map(|ids| {
                ids.iter()
                    .map(|&id| &self.nodes[self.edges[id as usize].object.index()])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subjects of `* -[predicate]-> node`, in edge insertion order.
    pub fn incoming(&self, node: NodeId, predicate: &Predicate) -> Vec<&Node> {
        let Some(pred) = self.predicate_ids.get(predicate) else {
            return Vec::new();
        };
        self.backward_index
            .get(&(node, *pred))
            .map(|ids| {
                ids.iter()
                    .map(|&id| &self.nodes[self.edges[id as usize].subject.index()])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All outgoing edges of `node`, grouped by predicate.
    ///
    /// Groups appear in order of each predicate's first outgoing edge;
    /// objects within a group keep edge insertion order.
    pub fn outgoing_grouped(&self, node: NodeId) -> Vec<(&Predicate, Vec<NodeId>)> {
        let mut groups: Vec<(PredicateId, Vec<NodeId>)> = Vec::new();
        let Some(ids) = self.outgoing_index.get(&node) else {
            return Vec::new();
        };
        for &id in ids {
            let edge = self.edges[id as usize];
            match groups.iter_mut().find(|(p, _)| *p == edge.predicate) {
                Some((_, objects)) => objects.push(edge.object),
                None => groups.push((edge.predicate, vec![edge.object])),
            }
        }
        groups
            .into_iter()
            .map(|(p, objects)| (&self.predicates[p.0 as usize], objects))
            .collect()
    }

    pub fn has_outgoing(&self, node: NodeId) -> bool {
        self.outgoing_index
            .get(&node)
            .is_some_and(|ids| !ids.is_empty())
    }

    pub fn has_edge(&self, subject: NodeId, predicate: &Predicate, object: NodeId) -> bool {
        self.predicate_ids
            .get(predicate)
            .is_some_and(|&p| self.has_edge_ids(subject, p, object))
    }
}
