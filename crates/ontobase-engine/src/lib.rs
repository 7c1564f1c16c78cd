//! Ontobase query engine.
//!
//! Turns field-level criteria into backend-neutral filters and runs them
//! against a document store:
//!
//! 1. **CriteriaCompiler**: tag resolution (id or multilingual label),
//!    operator validation against the tag's data kind, pattern parsing
//! 2. **Matcher**: paged execution with retry, total counts, distinct
//!    values and enumeration drill-down
//! 3. **OntologyService**: the service-level operations over one live
//!    ontology catalog
//!
//! ```text
//!   [Criterion] ──► CriteriaCompiler ──► MatchQuery { Filter } ──► Matcher
//!                        ▲                                            │
//!                  OntologySnapshot                             DocumentStore
//! ```

pub mod compiler;
pub mod config;
pub mod criteria;
pub mod enumeration;
pub mod matcher;
pub mod service;

pub use compiler::{CriteriaCompiler, FieldLabel, MatchQuery};
pub use config::{ConfigError, EngineConfig};
pub use criteria::{Criterion, Operator, Pattern, TagRef};
pub use enumeration::{EnumerationEntry, EnumerationScope};
pub use matcher::{DistinctEntry, MatchResult, Matcher};
pub use service::{EnumerationRequest, MatchRequest, OntologyService, ServiceStats, TagListing};
