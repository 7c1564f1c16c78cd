//! Ontology records and descriptors.
//!
//! Records (`TagRecord`, `NodeRecord`, `EdgeRecord`) are what an ontology
//! store hands over at bootstrap. Descriptors are the immutable, validated
//! form owned by a dictionary snapshot.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Kinds
// ============================================================================

/// Data kind of a tag's stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    String,
    Numeric,
    Date,
    Enumeration,
    Reference,
    Struct,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::String => "string",
            DataKind::Numeric => "numeric",
            DataKind::Date => "date",
            DataKind::Enumeration => "enumeration",
            DataKind::Reference => "reference",
            DataKind::Struct => "struct",
        }
    }

    /// Ordered kinds accept range comparisons.
    pub fn is_ordered(self) -> bool {
        matches!(self, DataKind::Numeric | DataKind::Date)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Template,
    Struct,
    Property,
    EnumValue,
}

// ============================================================================
// Predicates
// ============================================================================

/// Typed relation label on a graph edge.
///
/// Edges always point from the container to the contained node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predicate {
    /// container -> field
    PartOf,
    /// container -> repeated sub-structure
    CollectionOf,
    /// enumeration owner (or parent value) -> value
    EnumeratedBy,
    Custom(String),
}

impl Predicate {
    pub fn as_str(&self) -> &str {
        match self {
            Predicate::PartOf => "PART-OF",
            Predicate::CollectionOf => "COLLECTION-OF",
            Predicate::EnumeratedBy => "ENUMERATED-BY",
            Predicate::Custom(s) => s,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Predicate {
    /// Parse a predicate label, accepting `is-` prefixed and snake_case aliases.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_uppercase().replace('_', "-");
        match normalized.as_str() {
            "PART-OF" | "IS-PART-OF" => Predicate::PartOf,
            "COLLECTION-OF" | "IS-COLLECTION-OF" => Predicate::CollectionOf,
            "ENUMERATED-BY" | "IS-ENUMERATED-BY" | "ENUM-OF" => Predicate::EnumeratedBy,
            _ => Predicate::Custom(normalized),
        }
    }
}

impl FromStr for Predicate {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Predicate::from_label(s))
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Predicate::from_label(&raw))
    }
}

// ============================================================================
// Store records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: String,
    pub offset: String,
    pub kind: DataKind,
    /// language code -> display label
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Allowed value identifiers (enumerations only).
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub pid: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
}

/// Everything needed to build one ontology snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyBundle {
    #[serde(default)]
    pub tags: Vec<TagRecord>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

// ============================================================================
// Descriptors
// ============================================================================

/// Validated, immutable tag definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDescriptor {
    pub id: String,
    pub offset: String,
    pub kind: DataKind,
    pub labels: BTreeMap<String, String>,
    pub values: Vec<String>,
}

impl TagDescriptor {
    /// Label in `language`, else `fallback`, else the first label, else the id.
    pub fn label(&self, language: &str, fallback: &str) -> &str {
        self.labels
            .get(language)
            .or_else(|| self.labels.get(fallback))
            .or_else(|| self.labels.values().next())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    pub fn allows_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

impl From<TagRecord> for TagDescriptor {
    fn from(record: TagRecord) -> Self {
        Self {
            id: record.id,
            offset: record.offset,
            kind: record.kind,
            labels: record.labels,
            values: record.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_parsing_accepts_aliases() {
        assert_eq!("is-part-of".parse::<Predicate>().unwrap(), Predicate::PartOf);
        assert_eq!(
            "collection_of".parse::<Predicate>().unwrap(),
            Predicate::CollectionOf
        );
        assert_eq!(
            "related-to".parse::<Predicate>().unwrap(),
            Predicate::Custom("RELATED-TO".to_string())
        );
    }

    #[test]
    fn predicate_serde_is_a_plain_string() {
        let json = serde_json::to_string(&Predicate::EnumeratedBy).unwrap();
        assert_eq!(json, "\"ENUMERATED-BY\"");
        let back: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Predicate::EnumeratedBy);
    }

    #[test]
    fn tag_label_falls_back() {
        let tag = TagDescriptor {
            id: "t1".into(),
            offset: "1".into(),
            kind: DataKind::String,
            labels: BTreeMap::from([("en".to_string(), "Genus".to_string())]),
            values: vec![],
        };
        assert_eq!(tag.label("fr", "en"), "Genus");
        assert_eq!(tag.label("fr", "de"), "Genus");
    }
}
