//! TagDictionary: the read-mostly tag cache.
//!
//! One dictionary belongs to exactly one snapshot epoch. It is built once
//! from store records and never mutated; a reload builds a fresh dictionary.
//!
//! Indexes:
//! - `id -> tag`
//! - `offset -> tag` (reverse lookup for result dictionaries)
//! - `(language, label) -> {tags}` exact
//! - `(language, lowercase label) -> {tags}` case-insensitive fallback

use std::collections::HashMap;

use crate::error::{OntoError, Result};
use crate::model::{TagDescriptor, TagRecord};

#[derive(Debug, Default)]
pub struct TagDictionary {
    epoch: u64,
    tags: Vec<TagDescriptor>,
    by_id: HashMap<String, usize>,
    by_offset: HashMap<String, usize>,
    by_label: HashMap<(String, String), Vec<usize>>,
    by_folded_label: HashMap<(String, String), Vec<usize>>,
}

impl TagDictionary {
    /// Build a dictionary for `epoch`, rejecting malformed records.
    pub fn from_records(records: Vec<TagRecord>, epoch: u64) -> Result<Self> {
        let mut dict = TagDictionary {
            epoch,
            ..Default::default()
        };

        for record in records {
            if record.id.trim().is_empty() {
                return Err(OntoError::DictionaryLoad("tag with empty id".to_string()));
            }
            if record.offset.trim().is_empty() {
                return Err(OntoError::DictionaryLoad(format!(
                    "tag `{}` has no storage offset",
                    record.id
                )));
            }
            if dict.by_id.contains_key(&record.id) {
                return Err(OntoError::DictionaryLoad(format!(
                    "duplicate tag id `{}`",
                    record.id
                )));
            }
            if let Some(&other) = dict.by_offset.get(&record.offset) {
                return Err(OntoError::DictionaryLoad(format!(
                    "storage offset `{}` shared by `{}` and `{}`",
                    record.offset, dict.tags[other].id, record.id
                )));
            }

            let idx = dict.tags.len();
            for (language, label) in &record.labels {
                dict.by_label
                    .entry((language.clone(), label.clone()))
                    .or_default()
                    .push(idx);
                dict.by_folded_label
                    .entry((language.clone(), label.to_lowercase()))
                    .or_default()
                    .push(idx);
            }
            dict.by_id.insert(record.id.clone(), idx);
            dict.by_offset.insert(record.offset.clone(), idx);
            dict.tags.push(record.into());
        }

        Ok(dict)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagDescriptor> {
        self.tags.iter()
    }

    pub fn contains(&self, tag_id: &str) -> bool {
        self.by_id.contains_key(tag_id)
    }

    pub fn resolve(&self, tag_id: &str) -> Result<&TagDescriptor> {
        self.by_id
            .get(tag_id)
            .map(|&idx| &self.tags[idx])
            .ok_or_else(|| OntoError::UnknownTag(tag_id.to_string()))
    }

    pub fn resolve_offset(&self, offset: &str) -> Option<&TagDescriptor> {
        self.by_offset.get(offset).map(|&idx| &self.tags[idx])
    }

    /// Look a tag up by its display label in `language`.
    ///
    /// Exact (case-sensitive) matches win; only when there are none is the
    /// case-insensitive index consulted. More than one candidate at the
    /// winning level is an `AmbiguousLabel` error.
    pub fn resolve_by_label(&self, label: &str, language: &str) -> Result<&TagDescriptor> {
        let key = (language.to_string(), label.to_string());
        if let Some(found) = self.by_label.get(&key) {
            return self.single(found, label, language);
        }

        let folded = (language.to_string(), label.to_lowercase());
        if let Some(found) = self.by_folded_label.get(&folded) {
            return self.single(found, label, language);
        }

        Err(OntoError::UnknownLabel {
            label: label.to_string(),
            language: language.to_string(),
        })
    }

    /// Display label of `tag_id` in `language`, falling back to `fallback`.
    pub fn label(&self, tag_id: &str, language: &str, fallback: &str) -> Result<&str> {
        Ok(self.resolve(tag_id)?.label(language, fallback))
    }

    fn single(&self, found: &[usize], label: &str, language: &str) -> Result<&TagDescriptor> {
        match found {
            [idx] => Ok(&self.tags[*idx]),
            _ => Err(OntoError::AmbiguousLabel {
                label: label.to_string(),
                language: language.to_string(),
                candidates: found.iter().map(|&i| self.tags[i].id.clone()).collect(),
            }),
        }
    }
}
