//! OntologyService: the operations a transport layer exposes.
//!
//! ```text
//!                 ┌────────────── OntologyService ──────────────┐
//!   resolve ─────►│ Catalog::snapshot ─► StructureResolver       │
//!   flatten ─────►│                   └► OffsetFlattener         │
//!   match ───────►│ CriteriaCompiler ─► Matcher::execute         │
//!   enumerations ►│ CriteriaCompiler ─► Matcher::*_enumerations  │
//!   distinct ────►│ Matcher::distinct_values                     │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! Every call takes one snapshot `Arc` up front and uses it throughout, so
//! a concurrent reload never mixes two epochs inside one request.

use std::sync::Arc;

use ontobase_ontology::{
    offset_paths, CacheStats, DataKind, Depth, FlattenMode, OffsetCollection, OffsetFlattener,
    OffsetPath, OntologySnapshot, ResolvedStructure, Result, StructureResolver, TagDescriptor,
};
use ontobase_storage::{Catalog, DocumentStore, FieldPath, OntologyStore, Paging, ReloadReport};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::compiler::{CriteriaCompiler, MatchQuery};
use crate::config::EngineConfig;
use crate::criteria::{Criterion, TagRef};
use crate::enumeration::{EnumerationEntry, EnumerationScope};
use crate::matcher::{DistinctEntry, MatchResult, Matcher};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRequest {
    /// Defaults to the configured collection.
    pub collection: Option<String>,
    pub criteria: Vec<Criterion>,
    pub paging: Paging,
    pub language: Option<String>,
    /// Template whose structure supplies nested document paths.
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationRequest {
    pub tag: TagRef,
    #[serde(default)]
    pub collection: Option<String>,
    /// Sibling selections that candidate values must co-occur with.
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

impl EnumerationRequest {
    pub fn new(tag: TagRef) -> Self {
        Self {
            tag,
            collection: None,
            criteria: Vec::new(),
            language: None,
            template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagListing {
    pub id: String,
    pub label: String,
    pub kind: DataKind,
    pub offset: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub epoch: u64,
    pub resolver: CacheStats,
    pub flattener: CacheStats,
}

#[derive(Debug)]
pub struct OntologyService {
    catalog: Catalog,
    matcher: Matcher,
    resolver: StructureResolver,
    flattener: OffsetFlattener,
    config: EngineConfig,
}

impl OntologyService {
    pub fn new(
        ontology: Arc<dyn OntologyStore>,
        documents: Arc<dyn DocumentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog: Catalog::new(ontology, config.retry.clone()),
            matcher: Matcher::new(documents, config.retry.clone()),
            resolver: StructureResolver::new(),
            flattener: OffsetFlattener::new(),
            config,
        }
    }

    /// Construct and perform the initial ontology load.
    pub async fn bootstrap(
        ontology: Arc<dyn OntologyStore>,
        documents: Arc<dyn DocumentStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        let service = Self::new(ontology, documents, config);
        service.catalog.load().await?;
        Ok(service)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> Result<Arc<OntologySnapshot>> {
        self.catalog.snapshot()
    }

    /// Reload the ontology. Caches are keyed by epoch, so a successful
    /// reload invalidates them without any explicit flush.
    pub async fn reload(&self) -> Result<ReloadReport> {
        self.catalog.reload().await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            epoch: self.catalog.epoch(),
            resolver: self.resolver.stats(),
            flattener: self.flattener.stats(),
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn resolve(&self, pid: &str, depth: Depth) -> Result<Arc<ResolvedStructure>> {
        let snapshot = self.snapshot()?;
        self.resolver.resolve(&snapshot, pid, depth)
    }

    pub fn flatten(
        &self,
        pid: &str,
        depth: Depth,
        mode: FlattenMode,
    ) -> Result<Arc<OffsetCollection>> {
        let snapshot = self.snapshot()?;
        let structure = self.resolver.resolve(&snapshot, pid, depth)?;
        self.flattener.flatten(&structure, &snapshot.dictionary, mode)
    }

    pub fn offset_paths(&self, pid: &str) -> Result<Vec<OffsetPath>> {
        let snapshot = self.snapshot()?;
        self.template_paths(&snapshot, pid)
    }

    fn template_paths(&self, snapshot: &OntologySnapshot, pid: &str) -> Result<Vec<OffsetPath>> {
        let structure = self.resolver.resolve(snapshot, pid, Depth::Unbounded)?;
        offset_paths(&structure, &snapshot.dictionary)
    }

    // ========================================================================
    // Matching
    // ========================================================================

    fn language<'r>(&'r self, requested: Option<&'r str>) -> &'r str {
        requested.unwrap_or(&self.config.default_language)
    }

    fn collection<'r>(&'r self, requested: Option<&'r str>) -> &'r str {
        requested.unwrap_or(&self.config.default_collection)
    }

    fn compile_with(
        &self,
        snapshot: &OntologySnapshot,
        collection: &str,
        criteria: &[Criterion],
        language: &str,
        template: Option<&str>,
    ) -> Result<MatchQuery> {
        let structure = match template {
            Some(pid) => Some(self.template_paths(snapshot, pid)?),
            None => None,
        };
        let mut compiler =
            CriteriaCompiler::new(snapshot, &self.config.default_language).language(language);
        if let Some(paths) = &structure {
            compiler = compiler.within(paths);
        }
        compiler.compile(collection, criteria)
    }

    pub fn compile(&self, request: &MatchRequest) -> Result<MatchQuery> {
        let snapshot = self.snapshot()?;
        self.compile_with(
            &snapshot,
            self.collection(request.collection.as_deref()),
            &request.criteria,
            self.language(request.language.as_deref()),
            request.template.as_deref(),
        )
    }

    pub async fn match_criteria(
        &self,
        request: &MatchRequest,
        cancel: &CancellationToken,
    ) -> Result<MatchResult> {
        let query = self.compile(request)?;
        let paging = self.config.effective_paging(&request.paging);
        self.matcher.execute(&query, &paging, cancel).await
    }

    // ========================================================================
    // Enumerations and aggregates
    // ========================================================================

    fn enumeration_scope(
        &self,
        snapshot: &OntologySnapshot,
        request: &EnumerationRequest,
    ) -> Result<(TagDescriptor, EnumerationScope)> {
        let language = self.language(request.language.as_deref());
        let collection = self.collection(request.collection.as_deref());
        let template_paths = match request.template.as_deref() {
            Some(pid) => Some(self.template_paths(snapshot, pid)?),
            None => None,
        };

        let mut compiler =
            CriteriaCompiler::new(snapshot, &self.config.default_language).language(language);
        if let Some(paths) = &template_paths {
            compiler = compiler.within(paths);
        }
        let tag = compiler.resolve_tag(&request.tag)?;
        let siblings = compiler.compile(collection, &request.criteria)?.filter;
        let paths = compiler.paths_for(tag, &[]);

        Ok((
            tag.clone(),
            EnumerationScope {
                collection: collection.to_string(),
                siblings,
                paths,
                language: language.to_string(),
            },
        ))
    }

    pub async fn root_enumerations(
        &self,
        request: &EnumerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnumerationEntry>> {
        let snapshot = self.snapshot()?;
        let (tag, scope) = self.enumeration_scope(&snapshot, request)?;
        self.matcher
            .root_enumerations(&snapshot, &tag, &scope, cancel)
            .await
    }

    pub async fn child_enumerations(
        &self,
        request: &EnumerationRequest,
        parent: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnumerationEntry>> {
        let snapshot = self.snapshot()?;
        let (tag, scope) = self.enumeration_scope(&snapshot, request)?;
        self.matcher
            .child_enumerations(&snapshot, &tag, parent, &scope, cancel)
            .await
    }

    pub async fn distinct_values(
        &self,
        tag: &TagRef,
        collection: Option<&str>,
        path: Option<FieldPath>,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DistinctEntry>> {
        let snapshot = self.snapshot()?;
        let language = self.language(language);
        let descriptor = CriteriaCompiler::new(&snapshot, &self.config.default_language)
            .language(language)
            .resolve_tag(tag)?
            .clone();
        self.matcher
            .distinct_values(
                &snapshot,
                self.collection(collection),
                &descriptor,
                path,
                language,
                cancel,
            )
            .await
    }

    /// The dictionary, labelled in `language`.
    pub fn tags(&self, language: Option<&str>) -> Result<Vec<TagListing>> {
        let snapshot = self.snapshot()?;
        let language = self.language(language);
        let mut out: Vec<TagListing> = snapshot
            .dictionary
            .iter()
            .map(|tag| TagListing {
                id: tag.id.clone(),
                label: tag.label(language, &self.config.default_language).to_string(),
                kind: tag.kind,
                offset: tag.offset.clone(),
                values: tag.values.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}
