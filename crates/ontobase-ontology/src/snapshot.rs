//! Epoch-versioned ontology snapshot.
//!
//! A snapshot pairs one `TagDictionary` with the `OntologyGraph` built
//! against it. Snapshots are shared behind `Arc` and never mutated; a reload
//! produces a new one with a higher epoch.

use crate::dictionary::TagDictionary;
use crate::error::Result;
use crate::graph::OntologyGraph;
use crate::model::OntologyBundle;

#[derive(Debug)]
pub struct OntologySnapshot {
    pub dictionary: TagDictionary,
    pub graph: OntologyGraph,
}

impl OntologySnapshot {
    pub fn build(bundle: OntologyBundle, epoch: u64) -> Result<Self> {
        let dictionary = TagDictionary::from_records(bundle.tags, epoch)?;
        let graph = OntologyGraph::from_records(bundle.nodes, bundle.edges, &dictionary)?;
        Ok(Self { dictionary, graph })
    }

    pub fn epoch(&self) -> u64 {
        self.dictionary.epoch()
    }
}
