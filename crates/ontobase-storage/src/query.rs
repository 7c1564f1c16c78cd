//! Backend-neutral query representation.
//!
//! A `Filter` is what the criteria compiler produces and what a
//! `DocumentStore` executes. Field tests address document fields by
//! `FieldPath` (a sequence of storage offsets); a field test matches when
//! any of its paths yields a value that passes.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Storage offsets from the document root to one field.
pub type FieldPath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextOp {
    Exact,
    Prefix,
    Contains,
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: Scalar,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "kebab-case")]
pub enum FieldTest {
    Equals {
        value: Scalar,
    },
    In {
        values: Vec<Scalar>,
    },
    Text {
        op: TextOp,
        needle: String,
        case_insensitive: bool,
    },
    Regex {
        pattern: String,
        case_insensitive: bool,
    },
    Range {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    Exists,
    /// Every token must occur in the field's tokenized text.
    FullText {
        tokens: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Filter {
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field { paths: Vec<FieldPath>, test: FieldTest },
}

impl Filter {
    pub fn field(path: FieldPath, test: FieldTest) -> Self {
        Filter::Field {
            paths: vec![path],
            test,
        }
    }

    /// Conjunction, dropping `All` terms and unwrapping single terms.
    pub fn and(terms: Vec<Filter>) -> Self {
        let mut terms: Vec<Filter> = terms.into_iter().filter(|t| *t != Filter::All).collect();
        match terms.len() {
            0 => Filter::All,
            1 => terms.remove(0),
            _ => Filter::And(terms),
        }
    }

    /// Disjunction, unwrapping single terms.
    pub fn or(mut terms: Vec<Filter>) -> Self {
        if terms.len() == 1 {
            return terms.remove(0);
        }
        Filter::Or(terms)
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: FieldPath,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort: Option<SortKey>,
}

impl Paging {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
            sort: None,
        }
    }

    pub fn sorted_by(mut self, path: FieldPath, descending: bool) -> Self {
        self.sort = Some(SortKey { path, descending });
        self
    }
}

/// One page of matches. `total` is `None` when the store cannot count natively.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryPage {
    pub ids: Vec<String>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistinctValue {
    pub value: serde_json::Value,
    pub count: u64,
}
