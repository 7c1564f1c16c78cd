//! Ontobase storage layer.
//!
//! Contracts for the two external stores plus the pieces that sit on the
//! I/O boundary:
//!
//! - `OntologyStore` / `DocumentStore`: async store traits
//! - `Filter`: backend-neutral predicate tree executed by a document store
//! - `MemoryDocumentStore`, `MemoryOntologyStore`, `JsonOntologyStore`
//! - `with_retry`: bounded, cancellable retry of transient store failures
//! - `Catalog`: live snapshot with epoch bump and stale-but-available reload

pub mod catalog;
pub mod json;
pub mod memory;
pub mod query;
pub mod retry;
pub mod store;
pub mod text;

pub use catalog::{Catalog, ReloadReport};
pub use json::JsonOntologyStore;
pub use memory::{MemoryDocumentStore, MemoryOntologyStore, ID_FIELD};
pub use query::{
    Bound, DistinctValue, FieldPath, FieldTest, Filter, Paging, QueryPage, Scalar, SortKey, TextOp,
};
pub use retry::{with_retry, RetryPolicy};
pub use store::{DocumentStore, OntologyStore};
pub use text::tokenize;
