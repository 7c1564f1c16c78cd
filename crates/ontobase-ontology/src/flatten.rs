//! OffsetFlattener: turn a resolved structure into storage offsets.
//!
//! Three interchangeable outputs:
//!
//! - `Flat`: deduplicated final offsets of every field, for projection and
//!   existence queries.
//! - `Nested`: predicate -> children tree, fields annotated with their
//!   `OffsetPath`, for rendering a template.
//! - `Tagged`: `Nested` plus each tagged node's descriptor, for form
//!   generation.
//!
//! The flattener never touches the graph and never re-expands a node: a
//! `Reference` in the resolved structure is emitted as a childless entry
//! with `reference: true`, so every output is linear in the structure.
//! `offset_paths` is the one consumer that follows references, through a
//! per-node memo (see `PathCollector`).
//!
//! Field = a non-enum-value node bound to a tag whose kind is not `struct`.
//! Struct-kind tags contribute their offset as an intermediate segment.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, EpochCache};
use crate::dictionary::TagDictionary;
use crate::error::Result;
use crate::graph::NodeId;
use crate::model::{DataKind, NodeKind, Predicate, TagDescriptor};
use crate::resolver::{Depth, ResolvedStructure, StructureNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlattenMode {
    Flat,
    Nested,
    Tagged,
}

impl FromStr for FlattenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(FlattenMode::Flat),
            "nested" | "tree" => Ok(FlattenMode::Nested),
            "tagged" | "tags" => Ok(FlattenMode::Tagged),
            other => Err(format!("unknown flatten mode `{other}`")),
        }
    }
}

/// One step of the structural position of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathStep {
    pub predicate: Predicate,
    pub pid: String,
}

/// Storage location of one field reachable from a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OffsetPath {
    /// Struct offsets followed by the field's own offset.
    pub offsets: Vec<String>,
    /// Predicate/node trail from the root to the field.
    pub position: Vec<PathStep>,
}

impl OffsetPath {
    pub fn leaf(&self) -> &str {
        self.offsets.last().map(String::as_str).unwrap_or_default()
    }

    /// Predicate labels along the path, e.g. `COLLECTION-OF/PART-OF`.
    pub fn predicate_trail(&self) -> String {
        self.position
            .iter()
            .map(|s| s.predicate.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for OffsetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.offsets.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub id: String,
    pub kind: DataKind,
    pub offset: String,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedNode {
    pub pid: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<OffsetPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagSummary>,
    /// Expanded elsewhere in the tree; children are listed only there.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reference: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedGroup {
    pub predicate: Predicate,
    pub children: Vec<NestedNode>,
}

impl NestedNode {
    /// Every field path in this subtree, depth-first, in child order.
    pub fn field_paths(&self) -> Vec<&OffsetPath> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(path) = &node.field {
                out.push(path);
            }
            for group in node.children.iter().rev() {
                stack.extend(group.children.iter().rev());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "offsets", rename_all = "kebab-case")]
pub enum OffsetCollection {
    Flat(Vec<String>),
    Nested(NestedNode),
    Tagged(NestedNode),
}

// ============================================================================
// Walkers
// ============================================================================

/// The tag that makes `node` a field, if it is one.
fn field_tag<'d>(
    node: &StructureNode,
    tag: Option<&'d TagDescriptor>,
) -> Option<&'d TagDescriptor> {
    tag.filter(|t| node.kind != NodeKind::EnumValue && t.kind != DataKind::Struct)
}

fn struct_offset(tag: Option<&TagDescriptor>) -> Option<&str> {
    tag.filter(|t| t.kind == DataKind::Struct).map(|t| t.offset.as_str())
}

fn node_tag<'d>(
    dictionary: &'d TagDictionary,
    node: &StructureNode,
) -> Result<Option<&'d TagDescriptor>> {
    node.tag.as_deref().map(|id| dictionary.resolve(id)).transpose()
}

/// Builds `Nested`/`Tagged` trees. The output mirrors the resolved structure
/// one to one: a `Reference` stays a childless reference entry.
struct TreeWalker<'a> {
    dictionary: &'a TagDictionary,
    tagged: bool,
}

impl TreeWalker<'_> {
    fn walk(
        &self,
        node: &StructureNode,
        offsets: &mut Vec<String>,
        position: &mut Vec<PathStep>,
    ) -> Result<NestedNode> {
        let tag = node_tag(self.dictionary, node)?;

        let field = field_tag(node, tag).map(|t| {
            let mut full = offsets.clone();
            full.push(t.offset.clone());
            OffsetPath {
                offsets: full,
                position: position.clone(),
            }
        });

        let summary = tag.filter(|_| self.tagged).map(|t| TagSummary {
            id: t.id.clone(),
            kind: t.kind,
            offset: t.offset.clone(),
            labels: t.labels.clone(),
            values: t.values.clone(),
        });

        let mut children = Vec::new();
        if !node.groups().is_empty() {
            let prefix = struct_offset(tag);
            if let Some(prefix) = prefix {
                offsets.push(prefix.to_string());
            }
            for group in node.groups() {
                let mut nested = Vec::with_capacity(group.children.len());
                for child in &group.children {
                    position.push(PathStep {
                        predicate: group.predicate.clone(),
                        pid: child.pid.clone(),
                    });
                    let result = self.walk(child, offsets, position);
                    position.pop();
                    nested.push(result?);
                }
                children.push(NestedGroup {
                    predicate: group.predicate.clone(),
                    children: nested,
                });
            }
            if prefix.is_some() {
                offsets.pop();
            }
        }

        Ok(NestedNode {
            pid: node.pid.clone(),
            kind: node.kind,
            field,
            tag: summary,
            reference: node.is_reference(),
            children,
        })
    }
}

/// Collects every distinct storage path below the root.
///
/// A shared node can sit under different struct offsets, so a `Reference`
/// does contribute paths: those of its expanded occurrence, re-prefixed.
/// Paths relative to each node are computed once and memoized, which keeps
/// the work proportional to the number of distinct paths rather than the
/// number of routes through shared sub-structures. Paths are deduplicated
/// by offsets; each keeps the position of its first occurrence. An edge
/// back onto the node currently being expanded contributes only that
/// node's own field.
struct PathCollector<'a> {
    dictionary: &'a TagDictionary,
    expanded: HashMap<NodeId, &'a StructureNode>,
    memo: HashMap<NodeId, Rc<Vec<OffsetPath>>>,
    active: HashSet<NodeId>,
}

impl<'a> PathCollector<'a> {
    fn new(structure: &'a ResolvedStructure, dictionary: &'a TagDictionary) -> Self {
        let mut expanded = HashMap::new();
        let mut stack = vec![&structure.root];
        while let Some(node) = stack.pop() {
            if !node.is_reference() {
                expanded.entry(node.node).or_insert(node);
            }
            for group in node.groups() {
                stack.extend(group.children.iter());
            }
        }
        Self {
            dictionary,
            expanded,
            memo: HashMap::new(),
            active: HashSet::new(),
        }
    }

    /// Paths below `node`, relative to it (its own field included).
    fn relative(&mut self, node: &'a StructureNode) -> Result<Rc<Vec<OffsetPath>>> {
        let source = if node.is_reference() {
            self.expanded.get(&node.node).copied().unwrap_or(node)
        } else {
            node
        };
        if let Some(done) = self.memo.get(&source.node) {
            return Ok(done.clone());
        }

        let tag = node_tag(self.dictionary, source)?;
        let mut out = Vec::new();
        if let Some(t) = field_tag(source, tag) {
            out.push(OffsetPath {
                offsets: vec![t.offset.clone()],
                position: Vec::new(),
            });
        }
        if !self.active.insert(source.node) {
            return Ok(Rc::new(out));
        }

        let prefix = struct_offset(tag);
        let mut seen: HashSet<Vec<String>> = out.iter().map(|p| p.offsets.clone()).collect();
        for group in source.groups() {
            for child in &group.children {
                let below = match self.relative(child) {
                    Ok(below) => below,
                    Err(e) => {
                        self.active.remove(&source.node);
                        return Err(e);
                    }
                };
                for path in below.iter() {
                    let mut offsets = Vec::with_capacity(path.offsets.len() + 1);
                    offsets.extend(prefix.map(str::to_string));
                    offsets.extend(path.offsets.iter().cloned());
                    if !seen.insert(offsets.clone()) {
                        continue;
                    }
                    let mut position = Vec::with_capacity(path.position.len() + 1);
                    position.push(PathStep {
                        predicate: group.predicate.clone(),
                        pid: child.pid.clone(),
                    });
                    position.extend(path.position.iter().cloned());
                    out.push(OffsetPath { offsets, position });
                }
            }
        }

        self.active.remove(&source.node);
        let out = Rc::new(out);
        self.memo.insert(source.node, out.clone());
        Ok(out)
    }
}

/// Every distinct field storage path, in structure order.
pub fn offset_paths(
    structure: &ResolvedStructure,
    dictionary: &TagDictionary,
) -> Result<Vec<OffsetPath>> {
    let mut collector = PathCollector::new(structure, dictionary);
    let paths = collector.relative(&structure.root)?;
    Ok((*paths).clone())
}

/// Field offsets in depth-first order, each once.
fn flat_offsets(structure: &ResolvedStructure, dictionary: &TagDictionary) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![&structure.root];
    while let Some(node) = stack.pop() {
        if let Some(t) = field_tag(node, node_tag(dictionary, node)?) {
            if seen.insert(t.offset.as_str()) {
                out.push(t.offset.clone());
            }
        }
        for group in node.groups().iter().rev() {
            stack.extend(group.children.iter().rev());
        }
    }
    Ok(out)
}

/// Flatten without caching.
pub fn flatten_structure(
    structure: &ResolvedStructure,
    dictionary: &TagDictionary,
    mode: FlattenMode,
) -> Result<OffsetCollection> {
    let tree = |tagged| {
        let walker = TreeWalker { dictionary, tagged };
        walker.walk(&structure.root, &mut Vec::new(), &mut Vec::new())
    };
    match mode {
        FlattenMode::Flat => Ok(OffsetCollection::Flat(flat_offsets(structure, dictionary)?)),
        FlattenMode::Nested => Ok(OffsetCollection::Nested(tree(false)?)),
        FlattenMode::Tagged => Ok(OffsetCollection::Tagged(tree(true)?)),
    }
}

/// Flattener with the same per-epoch coalescing cache as the resolver.
#[derive(Debug, Default)]
pub struct OffsetFlattener {
    cache: EpochCache<(NodeId, Depth, FlattenMode), Result<Arc<OffsetCollection>>>,
}

impl OffsetFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dictionary` must belong to the snapshot `structure` was resolved from.
    pub fn flatten(
        &self,
        structure: &ResolvedStructure,
        dictionary: &TagDictionary,
        mode: FlattenMode,
    ) -> Result<Arc<OffsetCollection>> {
        let key = (structure.root.node, structure.max_depth, mode);
        self.cache.get_or_compute(structure.epoch, key, || {
            flatten_structure(structure, dictionary, mode).map(Arc::new)
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
