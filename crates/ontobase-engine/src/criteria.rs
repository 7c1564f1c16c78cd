//! Match criteria as submitted by callers.
//!
//! A criterion names a tag (by id, or by label in some language), a
//! pattern, and a list of operators: at most one match operator plus any
//! modifiers. Everything here is unvalidated; the compiler checks it
//! against the tag's data kind.

use std::fmt;
use std::str::FromStr;

use ontobase_storage::FieldPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Id(String),
    Label {
        label: String,
        #[serde(default)]
        language: Option<String>,
    },
}

impl TagRef {
    pub fn id(id: impl Into<String>) -> Self {
        TagRef::Id(id.into())
    }

    pub fn label(label: impl Into<String>, language: Option<&str>) -> Self {
        TagRef::Label {
            label: label.into(),
            language: language.map(str::to_string),
        }
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagRef::Id(id) => f.write_str(id),
            TagRef::Label {
                label,
                language: Some(lang),
            } => write!(f, "{label}@{lang}"),
            TagRef::Label { label, .. } => f.write_str(label),
        }
    }
}

/// Raw pattern. Values are kept as text and parsed per data kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    #[default]
    None,
    Number(f64),
    Text(String),
    Set(Vec<String>),
    Range {
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
}

impl Pattern {
    pub fn text(value: impl Into<String>) -> Self {
        Pattern::Text(value.into())
    }

    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn range(min: Option<&str>, max: Option<&str>) -> Self {
        Pattern::Range {
            min: min.map(str::to_string),
            max: max.map(str::to_string),
        }
    }

    /// Single-value view (`Text` or `Number`).
    pub(crate) fn single(&self) -> Option<String> {
        match self {
            Pattern::Text(s) => Some(s.clone()),
            Pattern::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Pattern::None => "no pattern",
            Pattern::Number(_) => "a number",
            Pattern::Text(_) => "a single value",
            Pattern::Set(_) => "a value set",
            Pattern::Range { .. } => "a range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    Equals,
    NotEquals,
    Prefix,
    Contains,
    Suffix,
    Regex,
    In,
    Exists,
    Range,
    ExclusiveRange,
    Text,
    // modifiers
    CaseInsensitive,
    Not,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not-equals",
            Operator::Prefix => "prefix",
            Operator::Contains => "contains",
            Operator::Suffix => "suffix",
            Operator::Regex => "regex",
            Operator::In => "in",
            Operator::Exists => "exists",
            Operator::Range => "range",
            Operator::ExclusiveRange => "exclusive-range",
            Operator::Text => "text",
            Operator::CaseInsensitive => "case-insensitive",
            Operator::Not => "not",
        }
    }

    pub fn is_modifier(self) -> bool {
        matches!(self, Operator::CaseInsensitive | Operator::Not)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts `contains`, `CONTAINS`, `case_insensitive`, `case-insensitive`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let op = match normalized.as_str() {
            "equals" | "eq" => Operator::Equals,
            "not-equals" | "ne" => Operator::NotEquals,
            "prefix" | "starts-with" => Operator::Prefix,
            "contains" => Operator::Contains,
            "suffix" | "ends-with" => Operator::Suffix,
            "regex" => Operator::Regex,
            "in" => Operator::In,
            "exists" => Operator::Exists,
            "range" => Operator::Range,
            "exclusive-range" => Operator::ExclusiveRange,
            "text" => Operator::Text,
            "case-insensitive" | "ci" => Operator::CaseInsensitive,
            "not" => Operator::Not,
            other => return Err(format!("unknown operator `{other}`")),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub tag: TagRef,
    #[serde(default)]
    pub pattern: Pattern,
    #[serde(default)]
    pub operators: Vec<Operator>,
    /// Explicit document paths; when empty the compiler derives them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<FieldPath>,
}

impl Criterion {
    pub fn new(tag: TagRef, pattern: Pattern) -> Self {
        Self {
            tag,
            pattern,
            operators: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn with(mut self, operator: Operator) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn at(mut self, path: FieldPath) -> Self {
        self.paths.push(path);
        self
    }
}
