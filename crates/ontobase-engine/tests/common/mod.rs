//! Herbarium fixture shared by the engine tests.
//!
//! ```text
//! specimen (template)
//!   PART-OF       genus      (string, "g")
//!   PART-OF       elevation  (numeric, "e")
//!   PART-OF       collected  (date, "d")
//!   PART-OF       kingdom    (enumeration, "k")
//!                   ENUMERATED-BY plantae, fungi
//!                   plantae ENUMERATED-BY pinophyta, magnoliophyta
//!   COLLECTION-OF location   (struct, "loc")
//!                   PART-OF county (string, "c")
//! ```
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use ontobase_engine::{EngineConfig, OntologyService};
use ontobase_ontology::*;
use ontobase_storage::{MemoryDocumentStore, MemoryOntologyStore, RetryPolicy};
use serde_json::json;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(l, v)| (l.to_string(), v.to_string()))
        .collect()
}

fn tag(id: &str, offset: &str, kind: DataKind, names: &[(&str, &str)]) -> TagRecord {
    TagRecord {
        id: id.to_string(),
        offset: offset.to_string(),
        kind,
        labels: labels(names),
        values: vec![],
    }
}

fn node(pid: &str, kind: NodeKind, tag: Option<&str>, names: &[(&str, &str)]) -> NodeRecord {
    NodeRecord {
        pid: pid.to_string(),
        kind,
        tag: tag.map(str::to_string),
        labels: labels(names),
    }
}

fn edge(s: &str, p: Predicate, o: &str) -> EdgeRecord {
    EdgeRecord {
        subject: s.to_string(),
        predicate: p,
        object: o.to_string(),
    }
}

pub fn bundle() -> OntologyBundle {
    let mut kingdom = tag(
        "kingdom",
        "k",
        DataKind::Enumeration,
        &[("en", "Kingdom"), ("it", "Regno")],
    );
    kingdom.values = ["plantae", "fungi", "pinophyta", "magnoliophyta"]
        .iter()
        .map(|v| v.to_string())
        .collect();

    OntologyBundle {
        tags: vec![
            tag("genus", "g", DataKind::String, &[("en", "Genus"), ("it", "Genere")]),
            tag("elevation", "e", DataKind::Numeric, &[("en", "Elevation"), ("it", "Quota")]),
            tag("collected", "d", DataKind::Date, &[("en", "Collected")]),
            tag("location", "loc", DataKind::Struct, &[("en", "Location")]),
            tag("county", "c", DataKind::String, &[("en", "County"), ("it", "Comune")]),
            kingdom,
            tag("title_en", "te", DataKind::String, &[("en", "Name")]),
            tag("title_it", "ti", DataKind::String, &[("it", "Name")]),
        ],
        nodes: vec![
            node("specimen", NodeKind::Template, None, &[("en", "Specimen")]),
            node("genus", NodeKind::Property, Some("genus"), &[]),
            node("elevation", NodeKind::Property, Some("elevation"), &[]),
            node("collected", NodeKind::Property, Some("collected"), &[]),
            node("kingdom", NodeKind::Property, Some("kingdom"), &[]),
            node("location", NodeKind::Struct, Some("location"), &[]),
            node("county", NodeKind::Property, Some("county"), &[]),
            node("plantae", NodeKind::EnumValue, None, &[("en", "Plants"), ("it", "Piante")]),
            node("fungi", NodeKind::EnumValue, None, &[("en", "Fungi"), ("it", "Funghi")]),
            node("pinophyta", NodeKind::EnumValue, None, &[("en", "Conifers")]),
            node("magnoliophyta", NodeKind::EnumValue, None, &[("en", "Flowering plants")]),
        ],
        edges: vec![
            edge("specimen", Predicate::PartOf, "genus"),
            edge("specimen", Predicate::PartOf, "elevation"),
            edge("specimen", Predicate::PartOf, "collected"),
            edge("specimen", Predicate::PartOf, "kingdom"),
            edge("specimen", Predicate::CollectionOf, "location"),
            edge("location", Predicate::PartOf, "county"),
            edge("kingdom", Predicate::EnumeratedBy, "plantae"),
            edge("kingdom", Predicate::EnumeratedBy, "fungi"),
            edge("plantae", Predicate::EnumeratedBy, "pinophyta"),
            edge("plantae", Predicate::EnumeratedBy, "magnoliophyta"),
        ],
    }
}

pub fn snapshot() -> OntologySnapshot {
    OntologySnapshot::build(bundle(), 1).unwrap()
}

pub fn documents() -> MemoryDocumentStore {
    MemoryDocumentStore::from_json(json!({
        "specimens": [
            { "_id": "s1", "g": "Pinus", "e": 420, "d": "2021-04-02", "k": "pinophyta",
              "loc": [ { "c": "Firenze" } ] },
            { "_id": "s2", "g": "Quercus", "e": 90, "d": "2018-05-10", "k": "magnoliophyta",
              "loc": [ { "c": "Prato" }, { "c": "Siena" } ] },
            { "_id": "s3", "g": "Amanita", "e": 800, "k": "fungi" },
            { "_id": "s4", "g": "Pinus nigra", "e": 1200, "k": "pinophyta",
              "loc": [ { "c": "Siena" } ] }
        ]
    }))
    .unwrap()
}

pub fn config() -> EngineConfig {
    EngineConfig {
        default_collection: "specimens".to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..EngineConfig::default()
    }
}

pub async fn service() -> OntologyService {
    OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(bundle())),
        Arc::new(documents()),
        config(),
    )
    .await
    .unwrap()
}
