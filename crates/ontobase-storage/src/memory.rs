//! In-memory stores.
//!
//! `MemoryDocumentStore` keeps each collection as a row arena of JSON
//! documents and evaluates filters as set algebra over document-row
//! bitmaps (`And` = intersection, `Or` = union, `Not` = complement).
//! `MemoryOntologyStore` serves a replaceable bundle, which is how
//! out-of-band ontology edits are simulated.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use ontobase_ontology::{OntoError, OntologyBundle, Result};
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use roaring::RoaringBitmap;
use serde_json::Value;

use crate::query::{
    Bound, DistinctValue, FieldPath, FieldTest, Filter, Paging, QueryPage, Scalar, TextOp,
};
use crate::store::{DocumentStore, OntologyStore};
use crate::text::tokenize;

/// Document field holding the document identifier.
pub const ID_FIELD: &str = "_id";

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Default)]
struct Collection {
    ids: Vec<String>,
    docs: Vec<Value>,
    rows: HashMap<String, u32>,
}

impl Collection {
    fn all(&self) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        out.insert_range(0..self.docs.len() as u32);
        out
    }

    fn upsert(&mut self, id: String, doc: Value) {
        if let Some(&row) = self.rows.get(&id) {
            self.docs[row as usize] = doc;
            return;
        }
        let row = self.docs.len() as u32;
        self.rows.insert(id.clone(), row);
        self.ids.push(id);
        self.docs.push(doc);
    }
}

#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    native_count: bool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            native_count: true,
        }
    }

    /// When disabled, `query` leaves `total` empty and callers must count.
    pub fn with_native_count(mut self, enabled: bool) -> Self {
        self.native_count = enabled;
        self
    }

    /// Insert or replace a document.
    pub fn insert(&self, collection: &str, id: impl Into<String>, doc: Value) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .upsert(id.into(), doc);
    }

    /// Load `{ "<collection>": [ { "_id": "...", ... }, ... ], ... }`.
    pub fn from_json(value: Value) -> Result<Self> {
        let store = Self::new();
        let Value::Object(collections) = value else {
            return Err(OntoError::unavailable(
                "document fixture must be an object of collections",
            ));
        };
        for (name, docs) in collections {
            let Value::Array(docs) = docs else {
                return Err(OntoError::unavailable(format!(
                    "collection `{name}` must be an array"
                )));
            };
            for (i, doc) in docs.into_iter().enumerate() {
                let id = match doc.get(ID_FIELD) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => format!("{name}/{i}"),
                };
                store.insert(&name, id, doc);
            }
        }
        Ok(store)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.read();
        let coll = collections.get(collection)?;
        let row = *coll.rows.get(id)?;
        coll.docs.get(row as usize).cloned()
    }

    fn matching_rows(&self, coll: &Collection, filter: &Filter) -> Result<RoaringBitmap> {
        let mut regexes = HashMap::new();
        eval(coll, filter, &mut regexes)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, collection: &str, filter: &Filter, paging: &Paging) -> Result<QueryPage> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(QueryPage {
                ids: Vec::new(),
                total: self.native_count.then_some(0),
            });
        };

        let rows = self.matching_rows(coll, filter)?;
        let total = rows.len();
        let mut rows: Vec<u32> = rows.iter().collect();

        if let Some(sort) = &paging.sort {
            rows.sort_by(|&a, &b| {
                let va = values_at(&coll.docs[a as usize], &sort.path).into_iter().next();
                let vb = values_at(&coll.docs[b as usize], &sort.path).into_iter().next();
                compare_optional(va, vb, sort.descending)
            });
        }

        let ids = rows
            .into_iter()
            .skip(paging.skip)
            .take(paging.limit.unwrap_or(usize::MAX))
            .map(|row| coll.ids[row as usize].clone())
            .collect();

        Ok(QueryPage {
            ids,
            total: self.native_count.then_some(total),
        })
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read();
        match collections.get(collection) {
            Some(coll) => Ok(self.matching_rows(coll, filter)?.len()),
            None => Ok(0),
        }
    }

    async fn distinct_values(
        &self,
        collection: &str,
        path: &FieldPath,
    ) -> Result<Vec<DistinctValue>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
        for doc in &coll.docs {
            let mut seen_in_doc = Vec::new();
            for value in values_at(doc, path) {
                let key = value.to_string();
                if seen_in_doc.contains(&key) {
                    continue;
                }
                counts
                    .entry(key.clone())
                    .or_insert_with(|| (value.clone(), 0))
                    .1 += 1;
                seen_in_doc.push(key);
            }
        }

        let mut out: Vec<DistinctValue> = counts
            .into_values()
            .map(|(value, count)| DistinctValue { value, count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(out)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(
    coll: &Collection,
    filter: &Filter,
    regexes: &mut HashMap<(String, bool), Regex>,
) -> Result<RoaringBitmap> {
    match filter {
        Filter::All => Ok(coll.all()),
        Filter::And(terms) => {
            let mut acc = coll.all();
            for term in terms {
                if acc.is_empty() {
                    break;
                }
                acc &= eval(coll, term, regexes)?;
            }
            Ok(acc)
        }
        Filter::Or(terms) => {
            let mut acc = RoaringBitmap::new();
            for term in terms {
                acc |= eval(coll, term, regexes)?;
            }
            Ok(acc)
        }
        Filter::Not(inner) => Ok(coll.all() - eval(coll, inner, regexes)?),
        Filter::Field { paths, test } => {
            let regex = match test {
                FieldTest::Regex {
                    pattern,
                    case_insensitive,
                } => Some(compiled(regexes, pattern, *case_insensitive)?),
                _ => None,
            };
            let mut out = RoaringBitmap::new();
            for (row, doc) in coll.docs.iter().enumerate() {
                let hit = paths.iter().any(|path| {
                    values_at(doc, path)
                        .into_iter()
                        .any(|v| test_value(test, v, regex.as_ref()))
                });
                if hit {
                    out.insert(row as u32);
                }
            }
            Ok(out)
        }
    }
}

fn compiled(
    cache: &mut HashMap<(String, bool), Regex>,
    pattern: &str,
    case_insensitive: bool,
) -> Result<Regex> {
    let key = (pattern.to_string(), case_insensitive);
    if let Some(re) = cache.get(&key) {
        return Ok(re.clone());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| OntoError::InvalidPattern {
            tag: pattern.to_string(),
            message: e.to_string(),
        })?;
    cache.insert(key, re.clone());
    Ok(re)
}

/// Non-null values reachable along `path`; arrays fan out at every level.
pub(crate) fn values_at<'a>(doc: &'a Value, path: &[String]) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    let mut out = Vec::new();
    for value in current {
        match value {
            Value::Null => {}
            Value::Array(items) => out.extend(items.iter().filter(|v| !v.is_null())),
            other => out.push(other),
        }
    }
    out
}

fn test_value(test: &FieldTest, value: &Value, regex: Option<&Regex>) -> bool {
    match test {
        FieldTest::Exists => true,
        FieldTest::Equals { value: expected } => scalar_eq(expected, value),
        FieldTest::In { values } => values.iter().any(|expected| scalar_eq(expected, value)),
        FieldTest::Text {
            op,
            needle,
            case_insensitive,
        } => {
            let Some(text) = as_text(value) else {
                return false;
            };
            let (text, needle) = if *case_insensitive {
                (text.to_lowercase(), needle.to_lowercase())
            } else {
                (text, needle.clone())
            };
            match op {
                TextOp::Exact => text == needle,
                TextOp::Prefix => text.starts_with(&needle),
                TextOp::Contains => text.contains(&needle),
                TextOp::Suffix => text.ends_with(&needle),
            }
        }
        FieldTest::Regex { .. } => match (regex, as_text(value)) {
            (Some(re), Some(text)) => re.is_match(&text),
            _ => false,
        },
        FieldTest::Range { min, max } => {
            within(value, min.as_ref(), Ordering::Greater)
                && within(value, max.as_ref(), Ordering::Less)
        }
        FieldTest::FullText { tokens } => {
            let Some(text) = as_text(value) else {
                return false;
            };
            let have = tokenize(&text);
            !tokens.is_empty() && tokens.iter().all(|t| have.contains(t))
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
        _ => None,
    }
}

fn scalar_eq(expected: &Scalar, value: &Value) -> bool {
    match expected {
        Scalar::Number(n) => as_number(value).is_some_and(|v| v == *n),
        Scalar::Date(d) => as_date(value).is_some_and(|v| v == *d),
        Scalar::Text(s) => as_text(value).is_some_and(|v| v == *s),
    }
}

fn compare_scalar(value: &Value, bound: &Scalar) -> Option<Ordering> {
    match bound {
        Scalar::Number(n) => as_number(value)?.partial_cmp(n),
        Scalar::Date(d) => Some(as_date(value)?.cmp(d)),
        Scalar::Text(s) => Some(as_text(value)?.as_str().cmp(s.as_str())),
    }
}

/// `value` lies on the `side` of `bound` (or on it, when inclusive).
fn within(value: &Value, bound: Option<&Bound>, side: Ordering) -> bool {
    let Some(bound) = bound else {
        return true;
    };
    match compare_scalar(value, &bound.value) {
        Some(Ordering::Equal) => bound.inclusive,
        Some(ord) => ord == side,
        None => false,
    }
}

/// Missing values sort last in both directions; numbers before strings.
fn compare_optional(a: Option<&Value>, b: Option<&Value>, descending: bool) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => (a, b),
    };
    let ord = match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => as_text(a).cmp(&as_text(b)),
    };
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

// ============================================================================
// Ontology
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryOntologyStore {
    bundle: RwLock<OntologyBundle>,
}

impl MemoryOntologyStore {
    pub fn new(bundle: OntologyBundle) -> Self {
        Self {
            bundle: RwLock::new(bundle),
        }
    }

    /// Replace the served bundle; takes effect on the next (re)load.
    pub fn replace(&self, bundle: OntologyBundle) {
        *self.bundle.write() = bundle;
    }
}

#[async_trait]
impl OntologyStore for MemoryOntologyStore {
    async fn load_bundle(&self) -> Result<OntologyBundle> {
        Ok(self.bundle.read().clone())
    }

    fn describe(&self) -> String {
        "in-memory ontology".to_string()
    }
}
