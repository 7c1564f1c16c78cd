//! StructureResolver: materialize a template's hierarchical structure.
//!
//! Expansion is breadth-first from the root. Each node's outgoing edges are
//! grouped by predicate; a child is expanded only the first time the
//! traversal reaches it. Later occurrences of an already-expanded node are
//! kept as `Reference` entries, so cyclic ontologies terminate without any
//! acyclicity assumption. Because expansion is breadth-first, the expanded
//! occurrence of a shared node is always its shallowest one.
//!
//! A finite depth limit that leaves children unexpanded is an error
//! (`CycleLimitExceeded`); the resolver never returns a silently truncated
//! structure.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, EpochCache};
use crate::error::{OntoError, Result};
use crate::graph::{NodeId, OntologyGraph};
use crate::model::{NodeKind, Predicate};
use crate::snapshot::OntologySnapshot;

/// Maximum number of edge levels to expand below the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Depth {
    Unbounded,
    Limited(u32),
}

impl Depth {
    fn allows(self, depth: u32) -> bool {
        match self {
            Depth::Unbounded => true,
            Depth::Limited(max) => depth < max,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Unbounded => f.write_str("unbounded"),
            Depth::Limited(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "unbounded" | "all" | "-1" => Ok(Depth::Unbounded),
            other => other
                .parse::<u32>()
                .map(Depth::Limited)
                .map_err(|_| format!("invalid depth `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureNode {
    pub node: NodeId,
    pub pid: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub expansion: Expansion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Expansion {
    /// No outgoing edges.
    Leaf,
    /// Already expanded elsewhere in the same traversal.
    Reference,
    Expanded { groups: Vec<PredicateGroup> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateGroup {
    pub predicate: Predicate,
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    pub fn groups(&self) -> &[PredicateGroup] {
        match &self.expansion {
            Expansion::Expanded { groups } => groups,
            _ => &[],
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.expansion, Expansion::Reference)
    }

    /// Children under `predicate`, in graph order.
    pub fn children(&self, predicate: &Predicate) -> &[StructureNode] {
        self.groups()
            .iter()
            .find(|g| &g.predicate == predicate)
            .map(|g| g.children.as_slice())
            .unwrap_or(&[])
    }
}

/// Output of one resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStructure {
    pub root: StructureNode,
    pub max_depth: Depth,
    pub epoch: u64,
    /// Nodes expanded by this traversal.
    pub visited: BTreeSet<NodeId>,
}

impl ResolvedStructure {
    /// The expanded occurrence of `node`, if this traversal expanded it.
    pub fn expanded(&self, node: NodeId) -> Option<&StructureNode> {
        if !self.visited.contains(&node) {
            return None;
        }
        let mut stack = vec![&self.root];
        while let Some(current) = stack.pop() {
            if current.node == node && !current.is_reference() {
                return Some(current);
            }
            for group in current.groups() {
                stack.extend(group.children.iter());
            }
        }
        None
    }
}

// ============================================================================
// Traversal
// ============================================================================

enum SlotState {
    Pending,
    Leaf,
    Reference,
    Expanded(Vec<(Predicate, Vec<usize>)>),
}

struct Slot {
    node: NodeId,
    state: SlotState,
}

/// Resolve `root` without consulting any cache.
pub fn resolve_structure(
    graph: &OntologyGraph,
    root_pid: &str,
    max_depth: Depth,
    epoch: u64,
) -> Result<ResolvedStructure> {
    let root = graph.find_by_pid(root_pid)?.id;

    let mut slots = vec![Slot {
        node: root,
        state: SlotState::Pending,
    }];
    let mut visited = BTreeSet::from([root]);
    let mut queue = VecDeque::from([(0usize, 0u32)]);
    let mut pending = 0usize;

    while let Some((slot, depth)) = queue.pop_front() {
        let node = slots[slot].node;
        let outgoing = graph.outgoing_grouped(node);
        if outgoing.is_empty() {
            slots[slot].state = SlotState::Leaf;
            continue;
        }
        if !max_depth.allows(depth) {
            pending += 1;
            continue;
        }

        let mut groups = Vec::with_capacity(outgoing.len());
        for (predicate, objects) in outgoing {
            let mut children = Vec::with_capacity(objects.len());
            for object in objects {
                let state = if !graph.has_outgoing(object) {
                    SlotState::Leaf
                } else if visited.insert(object) {
                    queue.push_back((slots.len(), depth + 1));
                    SlotState::Pending
                } else {
                    SlotState::Reference
                };
                children.push(slots.len());
                slots.push(Slot {
                    node: object,
                    state,
                });
            }
            groups.push((predicate.clone(), children));
        }
        slots[slot].state = SlotState::Expanded(groups);
    }

    if pending > 0 {
        return Err(OntoError::CycleLimitExceeded {
            root: root_pid.to_string(),
            max_depth: match max_depth {
                Depth::Limited(n) => n,
                Depth::Unbounded => u32::MAX,
            },
            pending,
        });
    }

    let root = assemble(graph, &mut slots, 0)?;
    Ok(ResolvedStructure {
        root,
        max_depth,
        epoch,
        visited,
    })
}

fn assemble(graph: &OntologyGraph, slots: &mut [Slot], idx: usize) -> Result<StructureNode> {
    let node_id = slots[idx].node;
    let node = graph
        .node(node_id)
        .ok_or_else(|| OntoError::NodeNotFound(format!("#{}", node_id.raw())))?;

    let expansion = match std::mem::replace(&mut slots[idx].state, SlotState::Leaf) {
        SlotState::Leaf | SlotState::Pending => Expansion::Leaf,
        SlotState::Reference => Expansion::Reference,
        SlotState::Expanded(groups) => {
            let mut out = Vec::with_capacity(groups.len());
            for (predicate, children) in groups {
                let children = children
                    .into_iter()
                    .map(|child| assemble(graph, slots, child))
                    .collect::<Result<Vec<_>>>()?;
                out.push(PredicateGroup {
                    predicate,
                    children,
                });
            }
            Expansion::Expanded { groups: out }
        }
    };

    Ok(StructureNode {
        node: node_id,
        pid: node.pid.clone(),
        kind: node.kind,
        tag: node.tag.clone(),
        expansion,
    })
}

// ============================================================================
// Cached resolver
// ============================================================================

/// Resolver with a per-epoch, request-coalescing cache.
#[derive(Debug, Default)]
pub struct StructureResolver {
    cache: EpochCache<(NodeId, Depth), Result<Arc<ResolvedStructure>>>,
}

impl StructureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        snapshot: &OntologySnapshot,
        root_pid: &str,
        max_depth: Depth,
    ) -> Result<Arc<ResolvedStructure>> {
        let root = snapshot.graph.find_by_pid(root_pid)?.id;
        let epoch = snapshot.epoch();
        self.cache.get_or_compute(epoch, (root, max_depth), || {
            tracing::debug!(root = root_pid, depth = %max_depth, epoch, "resolving structure");
            resolve_structure(&snapshot.graph, root_pid, max_depth, epoch).map(Arc::new)
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
