//! Ontobase ontology core.
//!
//! A directed, predicate-typed ontology graph of tags and nodes, plus the
//! components that read it:
//!
//! 1. **TagDictionary**: tag id -> descriptor (labels per language, data
//!    kind, storage offset, enumeration values)
//! 2. **OntologyGraph**: node arena and predicate-typed edges
//! 3. **StructureResolver**: cycle-safe, breadth-first structure expansion
//! 4. **OffsetFlattener**: resolved structure -> storage offsets
//!
//! Dictionary and graph are bundled into an epoch-versioned
//! [`OntologySnapshot`]. Resolver and flattener caches are keyed on that
//! epoch, so swapping in a newer snapshot invalidates them wholesale.
//!
//! ```text
//!   OntologyBundle ──► OntologySnapshot { TagDictionary, OntologyGraph }
//!                                │
//!                                ▼
//!                     StructureResolver ──► ResolvedStructure
//!                                                  │
//!                                                  ▼
//!                                  OffsetFlattener ──► OffsetCollection
//! ```

mod cache;
pub mod dictionary;
pub mod error;
pub mod flatten;
pub mod graph;
pub mod model;
pub mod resolver;
pub mod snapshot;

pub use cache::CacheStats;
pub use dictionary::TagDictionary;
pub use error::{OntoError, Result};
pub use flatten::{
    flatten_structure, offset_paths, FlattenMode, NestedGroup, NestedNode, OffsetCollection,
    OffsetFlattener, OffsetPath, PathStep, TagSummary,
};
pub use graph::{Node, NodeId, OntologyGraph};
pub use model::{
    DataKind, EdgeRecord, NodeKind, NodeRecord, OntologyBundle, Predicate, TagDescriptor,
    TagRecord,
};
pub use resolver::{
    resolve_structure, Depth, Expansion, PredicateGroup, ResolvedStructure, StructureNode,
    StructureResolver,
};
pub use snapshot::OntologySnapshot;
