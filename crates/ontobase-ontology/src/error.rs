//! Error taxonomy shared by every ontobase crate.
//!
//! Caller errors (`UnknownTag`, `AmbiguousLabel`, `IncompatibleOperator`, ...)
//! are surfaced immediately. Only `StoreUnavailable` is considered transient
//! and is retried at the I/O boundary.

use crate::model::DataKind;

pub type Result<T, E = OntoError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OntoError {
    #[error("dictionary load failed: {0}")]
    DictionaryLoad(String),

    #[error("unknown tag `{0}`")]
    UnknownTag(String),

    #[error("no tag labelled `{label}` in language `{language}`")]
    UnknownLabel { label: String, language: String },

    #[error("label `{label}` is ambiguous in language `{language}`: {candidates:?}")]
    AmbiguousLabel {
        label: String,
        language: String,
        candidates: Vec<String>,
    },

    #[error("node `{0}` not found")]
    NodeNotFound(String),

    #[error("invalid ontology graph: {0}")]
    InvalidGraph(String),

    #[error("operator `{operator}` cannot be applied to tag `{tag}` of kind {kind}")]
    IncompatibleOperator {
        tag: String,
        kind: DataKind,
        operator: String,
    },

    #[error("invalid pattern for tag `{tag}`: {message}")]
    InvalidPattern { tag: String, message: String },

    #[error("store unavailable after {attempts} attempt(s): {message}")]
    StoreUnavailable { attempts: u32, message: String },

    #[error("depth limit {max_depth} reached below `{root}` with {pending} unexpanded node(s)")]
    CycleLimitExceeded {
        root: String,
        max_depth: u32,
        pending: usize,
    },

    #[error("ontology has not been loaded")]
    NotLoaded,

    #[error("request cancelled")]
    Cancelled,
}

impl OntoError {
    /// Transient I/O failure from a backing store (single attempt).
    pub fn unavailable(message: impl Into<String>) -> Self {
        OntoError::StoreUnavailable {
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OntoError::StoreUnavailable { .. })
    }
}
