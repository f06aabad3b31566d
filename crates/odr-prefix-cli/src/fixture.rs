//! JSON fixtures: a schema plus nested records.
//!
//! ```json
//! {
//!   "datatypes": [{ "id": 1, "name": "Sample" }],
//!   "edges": [{ "ancestor": 1, "descendant": 2, "multiple_allowed": true }],
//!   "records": [{ "id": 10, "datatype": 1, "children": { "2": [...] } }],
//!   "links": [[10, 30]]
//! }
//! ```

use anyhow::{Context, Result};
use odr_prefix_core::{DatatypeId, Edge, InMemoryRecords, Record, RecordId, SchemaGraph};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct DatatypeEntry {
    pub id: DatatypeId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub datatypes: Vec<DatatypeEntry>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Top-level records, each with its child records nested inside.
    #[serde(default)]
    pub records: Vec<Record>,
    /// `(ancestor, descendant)` record links.
    #[serde(default)]
    pub links: Vec<(RecordId, RecordId)>,
}

/// A fixture turned into the structures the engine works on.
#[derive(Debug)]
pub struct Loaded {
    pub graph: SchemaGraph,
    pub store: InMemoryRecords,
    pub names: BTreeMap<DatatypeId, String>,
}

impl Fixture {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(self) -> Loaded {
        let graph = SchemaGraph::build(self.edges);
        for issue in graph.issues() {
            tracing::warn!(%issue, "schema integrity issue");
        }

        let mut store = InMemoryRecords::new();
        for record in self.records {
            store.insert(record, None);
        }
        for (ancestor, descendant) in self.links {
            store.link(ancestor, descendant);
        }

        let names = self
            .datatypes
            .into_iter()
            .map(|entry| (entry.id, entry.name))
            .collect();

        Loaded {
            graph,
            store,
            names,
        }
    }
}
