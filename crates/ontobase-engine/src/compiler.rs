//! CriteriaCompiler: criteria -> backend-neutral `Filter`.
//!
//! Per criterion:
//!
//! 1. resolve the tag (by id, or by label with default-language fallback)
//! 2. split operators into one match operator plus modifiers
//! 3. validate the operator against the tag's data kind
//! 4. parse the pattern for that kind and build the field test
//!
//! Criteria are combined with AND. A value-set pattern is an internal OR,
//! except under `equals`/`in` where it becomes set membership.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ontobase_ontology::{
    DataKind, OffsetPath, OntoError, OntologySnapshot, Result, TagDescriptor,
};
use ontobase_storage::{tokenize, Bound, FieldPath, FieldTest, Filter, Scalar, TextOp};
use regex::RegexBuilder;
use serde::Serialize;

use crate::criteria::{Criterion, Operator, Pattern, TagRef};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Label of one field referenced by a query, for result dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLabel {
    pub tag: String,
    pub label: String,
    pub kind: DataKind,
}

/// A compiled query, ready to run against one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuery {
    pub collection: String,
    pub filter: Filter,
    /// Epoch of the snapshot the query was compiled against.
    pub epoch: u64,
    /// offset -> label, for every tag the criteria touched.
    pub fields: BTreeMap<String, FieldLabel>,
}

pub struct CriteriaCompiler<'a> {
    snapshot: &'a OntologySnapshot,
    language: String,
    default_language: String,
    structure: Option<&'a [OffsetPath]>,
}

impl<'a> CriteriaCompiler<'a> {
    pub fn new(snapshot: &'a OntologySnapshot, default_language: &str) -> Self {
        Self {
            snapshot,
            language: default_language.to_string(),
            default_language: default_language.to_string(),
            structure: None,
        }
    }

    /// Request language, used for label references without an explicit
    /// language and for result labels.
    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Derive document paths from a resolved template instead of using the
    /// bare tag offset.
    pub fn within(mut self, paths: &'a [OffsetPath]) -> Self {
        self.structure = Some(paths);
        self
    }

    pub fn resolve_tag(&self, tag: &TagRef) -> Result<&'a TagDescriptor> {
        let dictionary = &self.snapshot.dictionary;
        match tag {
            TagRef::Id(id) => dictionary.resolve(id),
            TagRef::Label { label, language } => {
                let language = language.as_deref().unwrap_or(&self.language);
                match dictionary.resolve_by_label(label, language) {
                    Err(OntoError::UnknownLabel { .. }) if language != self.default_language => {
                        tracing::debug!(
                            label = %label,
                            language,
                            fallback = %self.default_language,
                            "label not found; trying default language"
                        );
                        dictionary.resolve_by_label(label, &self.default_language)
                    }
                    other => other,
                }
            }
        }
    }

    pub fn compile(&self, collection: &str, criteria: &[Criterion]) -> Result<MatchQuery> {
        let mut terms = Vec::with_capacity(criteria.len());
        let mut fields = BTreeMap::new();

        for criterion in criteria {
            let tag = self.resolve_tag(&criterion.tag)?;
            terms.push(self.compile_for(tag, criterion)?);
            fields.insert(
                tag.offset.clone(),
                FieldLabel {
                    tag: tag.id.clone(),
                    label: tag.label(&self.language, &self.default_language).to_string(),
                    kind: tag.kind,
                },
            );
        }

        let filter = Filter::and(terms);
        tracing::debug!(collection, criteria = criteria.len(), "compiled criteria");
        Ok(MatchQuery {
            collection: collection.to_string(),
            filter,
            epoch: self.snapshot.epoch(),
            fields,
        })
    }

    /// Compile a single criterion.
    pub fn compile_criterion(&self, criterion: &Criterion) -> Result<Filter> {
        let tag = self.resolve_tag(&criterion.tag)?;
        self.compile_for(tag, criterion)
    }

    /// Document paths holding `tag`'s value.
    pub fn paths_for(&self, tag: &TagDescriptor, explicit: &[FieldPath]) -> Vec<FieldPath> {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }
        let mut paths: Vec<FieldPath> = Vec::new();
        if let Some(structure) = self.structure {
            for path in structure.iter().filter(|p| p.leaf() == tag.offset) {
                if !paths.contains(&path.offsets) {
                    paths.push(path.offsets.clone());
                }
            }
        }
        if paths.is_empty() {
            paths.push(vec![tag.offset.clone()]);
        }
        paths
    }

    fn compile_for(&self, tag: &TagDescriptor, criterion: &Criterion) -> Result<Filter> {
        let (op, case_insensitive, negated) = split_operators(tag, &criterion.operators)?;
        validate(tag, op, case_insensitive)?;

        let paths = self.paths_for(tag, &criterion.paths);
        let field = |test: FieldTest| Filter::Field {
            paths: paths.clone(),
            test,
        };
        let pattern = &criterion.pattern;

        let filter = match op {
            Operator::Exists => field(FieldTest::Exists),

            Operator::Equals | Operator::NotEquals | Operator::In => {
                let values = values(tag, op, pattern)?;
                let filter = if case_insensitive {
                    Filter::or(
                        values
                            .into_iter()
                            .map(|v| {
                                field(FieldTest::Text {
                                    op: TextOp::Exact,
                                    needle: v,
                                    case_insensitive: true,
                                })
                            })
                            .collect(),
                    )
                } else {
                    let mut scalars = values
                        .iter()
                        .map(|v| scalar(tag, v))
                        .collect::<Result<Vec<_>>>()?;
                    if scalars.len() == 1 && op != Operator::In {
                        field(FieldTest::Equals {
                            value: scalars.remove(0),
                        })
                    } else {
                        field(FieldTest::In { values: scalars })
                    }
                };
                if op == Operator::NotEquals {
                    filter.negate()
                } else {
                    filter
                }
            }

            Operator::Prefix | Operator::Contains | Operator::Suffix => {
                let text_op = match op {
                    Operator::Prefix => TextOp::Prefix,
                    Operator::Suffix => TextOp::Suffix,
                    _ => TextOp::Contains,
                };
                Filter::or(
                    values(tag, op, pattern)?
                        .into_iter()
                        .map(|needle| {
                            field(FieldTest::Text {
                                op: text_op,
                                needle,
                                case_insensitive,
                            })
                        })
                        .collect(),
                )
            }

            Operator::Regex => {
                let mut alternatives = Vec::new();
                for source in values(tag, op, pattern)? {
                    RegexBuilder::new(&source)
                        .case_insensitive(case_insensitive)
                        .build()
                        .map_err(|e| invalid(tag, e.to_string()))?;
                    alternatives.push(field(FieldTest::Regex {
                        pattern: source,
                        case_insensitive,
                    }));
                }
                Filter::or(alternatives)
            }

            Operator::Text => {
                let mut alternatives = Vec::new();
                for text in values(tag, op, pattern)? {
                    let tokens = tokenize(&text);
                    if tokens.is_empty() {
                        return Err(invalid(tag, format!("`{text}` has no searchable terms")));
                    }
                    alternatives.push(field(FieldTest::FullText { tokens }));
                }
                Filter::or(alternatives)
            }

            Operator::Range | Operator::ExclusiveRange => {
                let inclusive = op == Operator::Range;
                let (min, max) = range_bounds(tag, pattern)?;
                let min = min.map(|v| scalar(tag, &v)).transpose()?;
                let max = max.map(|v| scalar(tag, &v)).transpose()?;
                if let (Some(lo), Some(hi)) = (&min, &max) {
                    if scalar_gt(lo, hi) {
                        return Err(invalid(tag, format!("range lower bound {lo} exceeds {hi}")));
                    }
                }
                field(FieldTest::Range {
                    min: min.map(|value| Bound { value, inclusive }),
                    max: max.map(|value| Bound { value, inclusive }),
                })
            }

            Operator::CaseInsensitive | Operator::Not => {
                return Err(incompatible(tag, op.as_str()));
            }
        };

        Ok(if negated { filter.negate() } else { filter })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn incompatible(tag: &TagDescriptor, operator: impl Into<String>) -> OntoError {
    OntoError::IncompatibleOperator {
        tag: tag.id.clone(),
        kind: tag.kind,
        operator: operator.into(),
    }
}

fn invalid(tag: &TagDescriptor, message: impl Into<String>) -> OntoError {
    OntoError::InvalidPattern {
        tag: tag.id.clone(),
        message: message.into(),
    }
}

/// `(match operator, case-insensitive, not)`. Defaults to `equals`.
fn split_operators(tag: &TagDescriptor, operators: &[Operator]) -> Result<(Operator, bool, bool)> {
    let mut matcher: Option<Operator> = None;
    let mut case_insensitive = false;
    let mut negated = false;

    for &op in operators {
        match op {
            Operator::CaseInsensitive => case_insensitive = true,
            Operator::Not => negated = !negated,
            _ => match matcher {
                Some(prev) if prev != op => {
                    return Err(incompatible(tag, format!("{prev}+{op}")));
                }
                _ => matcher = Some(op),
            },
        }
    }

    Ok((matcher.unwrap_or(Operator::Equals), case_insensitive, negated))
}

fn validate(tag: &TagDescriptor, op: Operator, case_insensitive: bool) -> Result<()> {
    let ok = match op {
        Operator::Prefix
        | Operator::Contains
        | Operator::Suffix
        | Operator::Regex
        | Operator::Text => tag.kind == DataKind::String,
        Operator::Range | Operator::ExclusiveRange => tag.kind.is_ordered(),
        Operator::Equals | Operator::NotEquals | Operator::In => tag.kind != DataKind::Struct,
        Operator::Exists | Operator::CaseInsensitive | Operator::Not => true,
    };
    if !ok {
        return Err(incompatible(tag, op.as_str()));
    }
    if case_insensitive && tag.kind != DataKind::String {
        return Err(incompatible(tag, Operator::CaseInsensitive.as_str()));
    }
    Ok(())
}

// ============================================================================
// Pattern parsing
// ============================================================================

fn values(tag: &TagDescriptor, op: Operator, pattern: &Pattern) -> Result<Vec<String>> {
    match pattern {
        Pattern::Set(values) if values.is_empty() => Err(invalid(tag, "empty value set")),
        Pattern::Set(values) => Ok(values.clone()),
        other => other.single().map(|v| vec![v]).ok_or_else(|| {
            invalid(
                tag,
                format!("operator `{op}` needs a value, got {}", other.describe()),
            )
        }),
    }
}

fn range_bounds(tag: &TagDescriptor, pattern: &Pattern) -> Result<(Option<String>, Option<String>)> {
    let (min, max) = match pattern {
        Pattern::Range { min, max } => (min.clone(), max.clone()),
        Pattern::Set(values) if values.len() == 2 => {
            (Some(values[0].clone()), Some(values[1].clone()))
        }
        other => {
            return Err(invalid(
                tag,
                format!("range needs `min`/`max` bounds, got {}", other.describe()),
            ))
        }
    };
    let blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    match (blank(min), blank(max)) {
        (None, None) => Err(invalid(tag, "range has neither bound")),
        bounds => Ok(bounds),
    }
}

fn scalar(tag: &TagDescriptor, raw: &str) -> Result<Scalar> {
    match tag.kind {
        DataKind::Numeric => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Scalar::Number)
            .ok_or_else(|| invalid(tag, format!("`{raw}` is not a number"))),
        DataKind::Date => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map(Scalar::Date)
            .map_err(|_| invalid(tag, format!("`{raw}` is not a {DATE_FORMAT} date"))),
        DataKind::Enumeration if !tag.values.is_empty() && !tag.allows_value(raw) => {
            Err(invalid(tag, format!("`{raw}` is not an allowed value")))
        }
        _ => Ok(Scalar::Text(raw.to_string())),
    }
}

fn scalar_gt(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::Number(x), Scalar::Number(y)) => x > y,
        (Scalar::Date(x), Scalar::Date(y)) => x > y,
        _ => false,
    }
}
