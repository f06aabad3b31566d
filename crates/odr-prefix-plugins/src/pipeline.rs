//! Shared resolve → load → collect → reduce sequence.

use crate::{PluginError, PluginResult};
use odr_prefix_core::{
    collect, reduce_with, CollectRules, CoreResult, DatatypeId, DescendantPolicy, Disambiguation,
    FallbackPolicy, FieldId, InMemoryRecords, PathResolver, PrefixChoice, PrefixPath, Record,
    RecordId, RecordLinks, RecordTreeLoader, ResolvedChain, SchemaGraph,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The collaborators a plugin needs to go from a record to field values.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    graph: &'a SchemaGraph,
    links: &'a dyn RecordLinks,
    loader: &'a dyn RecordTreeLoader,
}

/// Everything gathered for one record.
#[derive(Debug, Clone)]
pub struct FieldLookup {
    pub chain: ResolvedChain,
    /// Tree rooted at the top-level record above the chain's ultimate ancestor.
    pub tree: Record,
    pub values: Disambiguation,
}

/// What a plugin attached to a datatype can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableFields {
    /// Every prefix ending at the datatype.
    pub prefixes: Vec<PrefixChoice>,
    /// Datatypes whose fields may be picked.
    pub datatypes: BTreeSet<DatatypeId>,
}

impl AvailableFields {
    pub fn for_datatype(
        graph: &SchemaGraph,
        datatype: DatatypeId,
        names: &BTreeMap<DatatypeId, String>,
        policy: DescendantPolicy,
    ) -> Self {
        Self {
            prefixes: PrefixPath::choices_to(graph, datatype, names),
            datatypes: graph.field_source_datatypes(datatype, policy),
        }
    }
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        graph: &'a SchemaGraph,
        links: &'a dyn RecordLinks,
        loader: &'a dyn RecordTreeLoader,
    ) -> Self {
        Self {
            graph,
            links,
            loader,
        }
    }

    /// A context backed by a single in-memory store.
    pub fn in_memory(graph: &'a SchemaGraph, store: &'a InMemoryRecords) -> Self {
        Self::new(graph, store, store)
    }

    pub fn graph(&self) -> &'a SchemaGraph {
        self.graph
    }

    pub fn resolve(&self, prefix: &PrefixPath, start: RecordId) -> CoreResult<ResolvedChain> {
        PathResolver::new(self.graph, self.links).resolve(prefix, start)
    }

    /// Load the whole top-level tree that contains the chain's ultimate
    /// ancestor, linked descendants included.
    pub fn load_for(&self, chain: &ResolvedChain) -> PluginResult<Record> {
        let top = self.links.top_level_of(chain.ultimate_ancestor());
        self.loader
            .load_tree(top)
            .ok_or(PluginError::MissingRecord { record: top })
    }

    pub fn lookup(
        &self,
        prefix: &PrefixPath,
        start: RecordId,
        fields: &[FieldId],
        rules: &CollectRules,
        fallback: FallbackPolicy,
    ) -> PluginResult<FieldLookup> {
        let chain = self.resolve(prefix, start)?;
        let tree = self.load_for(&chain)?;

        let candidates = collect(&tree, fields, rules);
        let on_chain = chain.intermediate_record_ids();
        let values = reduce_with(&candidates, fields, &on_chain, fallback);

        tracing::debug!(
            prefix = %prefix,
            record = %start,
            ancestor = %chain.ultimate_ancestor(),
            candidates = candidates.len(),
            "collected field values"
        );

        Ok(FieldLookup {
            chain,
            tree,
            values,
        })
    }
}
