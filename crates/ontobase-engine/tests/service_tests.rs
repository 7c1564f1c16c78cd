//! OntologyService end-to-end tests over the in-memory stores

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ontobase_engine::*;
use ontobase_ontology::*;
use ontobase_storage::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn genus_contains(needle: &str) -> Criterion {
    Criterion::new(TagRef::id("genus"), Pattern::text(needle))
        .with(Operator::Contains)
        .with(Operator::CaseInsensitive)
}

#[tokio::test]
async fn test_genus_pinus_case_insensitive_contains() {
    let docs = MemoryDocumentStore::new();
    docs.insert("specimens", "pinus-1", json!({ "g": "Pinus" }));
    docs.insert("specimens", "quercus-1", json!({ "g": "Quercus" }));
    let service = OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(common::bundle())),
        Arc::new(docs),
        common::config(),
    )
    .await
    .unwrap();

    let request = MatchRequest {
        criteria: vec![genus_contains("pinus")],
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["pinus-1"]);
    assert_eq!(result.total_count, 1);
    assert_eq!(result.dictionary["g"].label, "Genus");
}

#[tokio::test]
async fn test_criteria_combine_with_and_and_paging() {
    let service = common::service().await;
    let request = MatchRequest {
        criteria: vec![
            genus_contains("pinus"),
            Criterion::new(TagRef::id("elevation"), Pattern::range(Some("500"), None))
                .with(Operator::Range),
        ],
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["s4"]);

    let request = MatchRequest {
        criteria: vec![Criterion::new(TagRef::id("elevation"), Pattern::None).with(Operator::Exists)],
        paging: Paging::new(1, 2).sorted_by(vec!["e".into()], false),
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    // ascending elevation: s2 (90), s1 (420), s3 (800), s4 (1200)
    assert_eq!(result.identifiers, vec!["s1", "s3"]);
    assert_eq!(result.total_count, 4);
}

#[tokio::test]
async fn test_template_paths_reach_nested_fields() {
    let service = common::service().await;
    let request = MatchRequest {
        criteria: vec![Criterion::new(
            TagRef::label("Comune", Some("it")),
            Pattern::text("Siena"),
        )],
        template: Some("specimen".to_string()),
        language: Some("it".to_string()),
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["s2", "s4"]);
    assert_eq!(result.dictionary["c"].label, "Comune");
}

#[tokio::test]
async fn test_count_pass_when_store_cannot_count() {
    let docs = common::documents().with_native_count(false);
    let service = OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(common::bundle())),
        Arc::new(docs),
        common::config(),
    )
    .await
    .unwrap();
    let request = MatchRequest {
        criteria: vec![genus_contains("pinus")],
        paging: Paging::new(0, 1),
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers.len(), 1);
    assert_eq!(result.total_count, 2);
}

#[tokio::test]
async fn test_caller_errors_surface_immediately() {
    let service = common::service().await;
    let request = MatchRequest {
        criteria: vec![Criterion::new(TagRef::id("elevation"), Pattern::text("4")).with(Operator::Contains)],
        ..MatchRequest::default()
    };
    let err = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OntoError::IncompatibleOperator { .. }));
}

/// Document store that fails the first `failures` queries.
struct FlakyDocuments {
    inner: MemoryDocumentStore,
    failures: AtomicU32,
}

#[async_trait]
impl DocumentStore for FlakyDocuments {
    async fn query(&self, collection: &str, filter: &Filter, paging: &Paging) -> Result<QueryPage> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(OntoError::unavailable("socket timeout"));
        }
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

#[tokio::test]
async fn test_store_unavailable_is_retried_then_surfaced() {
    let flaky = Arc::new(FlakyDocuments {
        inner: common::documents(),
        failures: AtomicU32::new(2),
    });
    let service = OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(common::bundle())),
        flaky.clone(),
        common::config(),
    )
    .await
    .unwrap();
    let request = MatchRequest {
        criteria: vec![genus_contains("pinus")],
        ..MatchRequest::default()
    };
    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total_count, 2);

    flaky.failures.store(10, Ordering::SeqCst);
    let err = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OntoError::StoreUnavailable {
            attempts: 3,
            message: "socket timeout".to_string()
        }
    );
}

#[tokio::test]
async fn test_cancelled_match_returns_cancelled() {
    let service = common::service().await;
    let token = CancellationToken::new();
    token.cancel();
    let err = service
        .match_criteria(&MatchRequest::default(), &token)
        .await
        .unwrap_err();
    assert_eq!(err, OntoError::Cancelled);
}

#[tokio::test]
async fn test_root_and_child_enumerations() {
    let service = common::service().await;
    let request = EnumerationRequest::new(TagRef::id("kingdom"));
    let cancel = CancellationToken::new();

    let roots = service.root_enumerations(&request, &cancel).await.unwrap();
    let values: Vec<&str> = roots.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, vec!["plantae", "fungi"]);
    assert_eq!(roots[0].label, "Plants");
    assert!(roots[0].has_children);
    // no document stores "plantae" itself
    assert!(!roots[0].has_matches);
    assert!(roots[1].has_matches);
    assert!(!roots[1].has_children);

    let children = service
        .child_enumerations(&request, "plantae", &cancel)
        .await
        .unwrap();
    let values: Vec<&str> = children.iter().map(|e| e.value.as_str()).collect();
    assert_eq!(values, vec!["pinophyta", "magnoliophyta"]);
    assert!(children.iter().all(|e| e.has_matches));
}

#[tokio::test]
async fn test_enumerations_respect_sibling_criteria() {
    let service = common::service().await;
    let request = EnumerationRequest {
        criteria: vec![Criterion::new(TagRef::id("elevation"), Pattern::range(None, Some("100")))
            .with(Operator::Range)],
        language: Some("it".to_string()),
        ..EnumerationRequest::new(TagRef::label("Regno", Some("it")))
    };
    let children = service
        .child_enumerations(&request, "plantae", &CancellationToken::new())
        .await
        .unwrap();
    let matching: Vec<&str> = children
        .iter()
        .filter(|e| e.has_matches)
        .map(|e| e.value.as_str())
        .collect();
    assert_eq!(matching, vec!["magnoliophyta"]);

    let roots = service
        .root_enumerations(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(roots[0].label, "Piante");
}

#[tokio::test]
async fn test_enumerations_reject_non_enumeration_tags() {
    let service = common::service().await;
    let cancel = CancellationToken::new();
    let err = service
        .root_enumerations(&EnumerationRequest::new(TagRef::id("genus")), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, OntoError::IncompatibleOperator { .. }));

    let err = service
        .child_enumerations(&EnumerationRequest::new(TagRef::id("kingdom")), "animalia", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, OntoError::InvalidPattern { .. }));
}

#[tokio::test]
async fn test_distinct_values_are_an_independent_read_path() {
    let service = common::service().await;
    let values = service
        .distinct_values(&TagRef::id("kingdom"), None, None, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(values[0].value, json!("pinophyta"));
    assert_eq!(values[0].count, 2);
    assert_eq!(values[0].label.as_deref(), Some("Conifers"));

    let counties = service
        .distinct_values(
            &TagRef::id("county"),
            None,
            Some(vec!["loc".into(), "c".into()]),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let siena = counties.iter().find(|v| v.value == json!("Siena")).unwrap();
    assert_eq!(siena.count, 2);
    assert_eq!(siena.label, None);
}

#[tokio::test]
async fn test_structure_operations_and_reload() {
    let ontology = Arc::new(MemoryOntologyStore::new(common::bundle()));
    let service = OntologyService::bootstrap(
        ontology.clone(),
        Arc::new(common::documents()),
        common::config(),
    )
    .await
    .unwrap();

    let flat = service
        .flatten("specimen", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert_eq!(
        *flat,
        OffsetCollection::Flat(vec![
            "g".to_string(),
            "e".to_string(),
            "d".to_string(),
            "k".to_string(),
            "c".to_string()
        ])
    );
    let again = service
        .flatten("specimen", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert!(Arc::ptr_eq(&flat, &again));

    let mut edited = common::bundle();
    edited.edges.retain(|e| e.object != "collected");
    ontology.replace(edited);
    let report = service.reload().await.unwrap();
    assert_eq!(report.epoch, 2);

    let flat = service
        .flatten("specimen", Depth::Unbounded, FlattenMode::Flat)
        .unwrap();
    assert!(!matches!(&*flat, OffsetCollection::Flat(o) if o.contains(&"d".to_string())));
    assert_eq!(service.stats().epoch, 2);
    assert_eq!(service.stats().resolver.newest_epoch, 2);

    let tags = service.tags(Some("it")).unwrap();
    let genus = tags.iter().find(|t| t.id == "genus").unwrap();
    assert_eq!(genus.label, "Genere");
}

#[tokio::test]
async fn test_operations_before_load_are_not_loaded() {
    let service = OntologyService::new(
        Arc::new(MemoryOntologyStore::new(common::bundle())),
        Arc::new(common::documents()),
        common::config(),
    );
    assert!(matches!(
        service.resolve("specimen", Depth::Unbounded),
        Err(OntoError::NotLoaded)
    ));
}

/// Template `j0` whose single field sits below a chain of shared junctions.
fn junction_chain_bundle(n: usize) -> OntologyBundle {
    let mut nodes = vec![json!({ "pid": "depth", "kind": "property", "tag": "depth" })];
    let mut edges = Vec::new();
    for i in 0..=n {
        nodes.push(json!({ "pid": format!("j{i}"), "kind": "struct" }));
    }
    for i in 0..n {
        for side in ["a", "b"] {
            let pid = format!("{side}{i}");
            nodes.push(json!({ "pid": &pid, "kind": "struct" }));
            edges.push(json!({ "subject": format!("j{i}"), "predicate": "PART-OF", "object": &pid }));
            edges.push(json!({ "subject": &pid, "predicate": "PART-OF", "object": format!("j{}", i + 1) }));
        }
    }
    edges.push(json!({ "subject": format!("j{n}"), "predicate": "PART-OF", "object": "depth" }));
    serde_json::from_value(json!({
        "tags": [{ "id": "depth", "offset": "dp", "kind": "numeric", "labels": { "en": "Depth" } }],
        "nodes": nodes,
        "edges": edges,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_template_scoped_match_over_shared_junctions() {
    let docs = MemoryDocumentStore::new();
    docs.insert("specimens", "shallow", json!({ "dp": 3 }));
    docs.insert("specimens", "deep", json!({ "dp": 120 }));
    let service = OntologyService::bootstrap(
        Arc::new(MemoryOntologyStore::new(junction_chain_bundle(32))),
        Arc::new(docs),
        common::config(),
    )
    .await
    .unwrap();

    let request = MatchRequest {
        criteria: vec![
            Criterion::new(TagRef::id("depth"), Pattern::range(Some("100"), None))
                .with(Operator::Range),
        ],
        template: Some("j0".to_string()),
        ..MatchRequest::default()
    };
    let query = service.compile(&request).unwrap();
    let Filter::Field { paths, .. } = &query.filter else {
        panic!("expected a single field filter, got {:?}", query.filter);
    };
    assert_eq!(paths, &vec![vec!["dp".to_string()]]);

    let result = service
        .match_criteria(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.identifiers, vec!["deep"]);
    assert_eq!(service.offset_paths("j0").unwrap().len(), 1);
}
