//! Integration tests for the complete Ontobase pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - JSON ontology file -> Catalog -> StructureResolver -> OffsetFlattener
//! - Criteria -> CriteriaCompiler -> Matcher -> document fixture
//! - Reload, cancellation and concurrent callers over one service
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ontobase_engine::*;
use ontobase_ontology::*;
use ontobase_storage::*;
use serde_json::json;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn census_bundle() -> serde_json::Value {
    json!({
        "tags": [
            { "id": "county", "offset": "cty", "kind": "string",
              "labels": { "en": "County", "it": "Provincia" } },
            { "id": "population", "offset": "pop", "kind": "numeric",
              "labels": { "en": "Population", "it": "Popolazione" } },
            { "id": "districts", "offset": "dst", "kind": "struct",
              "labels": { "en": "Districts" } }
        ],
        "nodes": [
            { "pid": "census", "kind": "template" },
            { "pid": "by-county", "kind": "struct" },
            { "pid": "by-population", "kind": "struct" },
            { "pid": "county", "kind": "property", "tag": "county" },
            { "pid": "population", "kind": "property", "tag": "population" }
        ],
        "edges": [
            { "subject": "census", "predicate": "COLLECTION-OF", "object": "by-county" },
            { "subject": "census", "predicate": "COLLECTION-OF", "object": "by-population" },
            { "subject": "by-county", "predicate": "PART-OF", "object": "county" },
            { "subject": "by-population", "predicate": "is-part-of", "object": "population" }
        ]
    })
}

fn census_documents() -> serde_json::Value {
    json!({
        "census": [
            { "_id": "r1", "cty": "Firenze", "pop": 361619 },
            { "_id": "r2", "cty": "Prato", "pop": 195213 },
            { "_id": "r3", "cty": "Pistoia", "pop": 89101 },
            { "_id": "r4", "cty": "Lucca" }
        ]
    })
}

fn write_json(dir: &std::path::Path, name: &str, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

async fn census_service(dir: &std::path::Path) -> OntologyService {
    let ontology = write_json(dir, "ontology.json", &census_bundle());
    let documents = write_json(dir, "documents.json", &census_documents());
    let config = EngineConfig {
        default_collection: "census".to_string(),
        ..EngineConfig::default()
    };
    OntologyService::bootstrap(
        Arc::new(JsonOntologyStore::new(ontology)),
        Arc::new(MemoryDocumentStore::load_json_file(documents).await.unwrap()),
        config,
    )
    .await
    .unwrap()
}

// ============================================================================
// Structure
// ============================================================================

#[tokio::test]
async fn test_county_population_flatten_from_files() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;

    let first = service
        .flatten("census", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert_eq!(
        *first,
        OffsetCollection::Flat(vec!["cty".to_string(), "pop".to_string()])
    );

    // independent of call order: nested first, then flat on a fresh service
    let other = census_service(dir.path()).await;
    let nested = other
        .flatten("census", Depth::Unbounded, FlattenMode::Nested)
        .unwrap();
    let flat = other
        .flatten("census", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert_eq!(*flat, *first);

    let OffsetCollection::Nested(tree) = &*nested else {
        panic!("expected nested output");
    };
    let leaves: Vec<&str> = tree.field_paths().iter().map(|p| p.leaf()).collect();
    assert_eq!(leaves, vec!["cty", "pop"]);
}

#[tokio::test]
async fn test_depth_limit_is_reported() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;
    let err = service.resolve("census", Depth::Limited(1)).unwrap_err();
    assert!(matches!(
        err,
        OntoError::CycleLimitExceeded { max_depth: 1, pending: 2, .. }
    ));
    assert!(service.resolve("census", Depth::Limited(2)).is_ok());
}

// ============================================================================
// Matching
// ============================================================================

#[tokio::test]
async fn test_match_by_label_with_paging() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;

    let request = MatchRequest {
        criteria: vec![Criterion::new(
            TagRef::label("Popolazione", Some("it")),
            Pattern::range(Some("100000"), None),
        )
        .with(Operator::Range)],
        paging: Paging::new(0, 10).sorted_by(vec!["pop".to_string()], true),
        language: Some("it".to_string()),
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["r1", "r2"]);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.dictionary["pop"].label, "Popolazione");
    assert_eq!(result.epoch, 1);

    let missing = MatchRequest {
        criteria: vec![
            Criterion::new(TagRef::id("population"), Pattern::None)
                .with(Operator::Exists)
                .with(Operator::Not),
        ],
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&missing, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["r4"]);
}

#[tokio::test]
async fn test_criteria_from_json_request() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;
    let request: MatchRequest = serde_json::from_value(json!({
        "criteria": [
            { "tag": "county", "pattern": ["Prato", "Lucca"], "operators": ["in"] }
        ]
    }))
    .unwrap();
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["r2", "r4"]);
}

// ============================================================================
// Reload and concurrency
// ============================================================================

#[tokio::test]
async fn test_reload_after_file_edit_and_failed_reload() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;

    let mut edited = census_bundle();
    edited["tags"][0]["labels"]["en"] = json!("Province");
    write_json(dir.path(), "ontology.json", &edited);
    let report = service.reload().await.unwrap();
    assert_eq!(report.epoch, 2);
    let tags = service.tags(None).unwrap();
    assert_eq!(tags.iter().find(|t| t.id == "county").unwrap().label, "Province");

    std::fs::write(dir.path().join("ontology.json"), "{ broken").unwrap();
    let report = service.reload().await.unwrap();
    assert!(report.stale);
    assert_eq!(report.epoch, 2);
    // still serving epoch 2
    assert!(service
        .flatten("census", Depth::Unbounded, FlattenMode::Flat)
        .is_ok());
    assert!(service.catalog().last_warning().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_is_coalesced() {
    let dir = tempdir().unwrap();
    let service = Arc::new(census_service(dir.path()).await);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            service.resolve("census", Depth::Unbounded).unwrap()
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(service.stats().resolver.computations, 1);
}

/// Document store whose queries take a while, for cancellation tests.
struct SlowDocuments {
    inner: MemoryDocumentStore,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowDocuments {
    async fn query(&self, collection: &str, filter: &Filter, paging: &Paging) -> Result<QueryPage> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(collection, filter, paging).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.inner.count(collection, filter).await
    }

    async fn distinct_values(
        &self,
        collection: &str,
        path: &FieldPath,
    ) -> Result<Vec<DistinctValue>> {
        self.inner.distinct_values(collection, path).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_store_query() {
    let documents = MemoryDocumentStore::from_json(census_documents()).unwrap();
    let bundle: OntologyBundle = serde_json::from_value(census_bundle()).unwrap();
    let service = OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(bundle)),
        Arc::new(SlowDocuments {
            inner: documents,
            delay: Duration::from_secs(30),
        }),
        EngineConfig {
            default_collection: "census".to_string(),
            ..EngineConfig::default()
        },
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = service
        .match_criteria(&MatchRequest::default(), &token)
        .await
        .unwrap_err();
    assert_eq!(err, OntoError::Cancelled);

    // caches are untouched by the abandoned request
    let flat = service
        .flatten("census", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert!(matches!(&*flat, OffsetCollection::Flat(o) if o.len() == 2));
}

#[tokio::test]
async fn test_distinct_values_report() {
    let dir = tempdir().unwrap();
    let service = census_service(dir.path()).await;
    let values = service
        .distinct_values(&TagRef::id("county"), None, None, None, &CancellationToken::new())
        .await
        .unwrap();
    let counts: BTreeMap<String, u64> = values
        .into_iter()
        .map(|v| (v.value.as_str().unwrap().to_string(), v.count))
        .collect();
    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|&c| c == 1));
}
