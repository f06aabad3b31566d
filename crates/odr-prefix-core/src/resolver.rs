//! Prefix → concrete record chain.
//!
//! Given a validated [`PrefixPath`] and a record of the path's target
//! datatype, find the one chain of records `[root, .., start]` whose
//! datatypes match the path element for element, where each consecutive
//! pair is connected the way the schema says: through the record's direct
//! parent for parent/child edges, or through the link table for link edges.
//!
//! The chain is grown from the start record toward the root, keeping every
//! partial chain, so the result is the same set a multi-way join over the
//! two relationship tables would produce.

use crate::error::{CoreError, CoreResult};
use crate::prefix::PrefixPath;
use crate::schema_graph::SchemaGraph;
use crate::{DatatypeId, RecordId};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// Read access to record relationships.
pub trait RecordLinks {
    fn datatype_of(&self, record: RecordId) -> Option<DatatypeId>;

    /// Direct (non-link) parent.
    fn parent_of(&self, record: RecordId) -> Option<RecordId>;

    /// Records that link to `record` through the link table.
    fn linked_ancestors_of(&self, record: RecordId) -> Vec<RecordId>;

    /// The top-level record `record` is nested under (itself if top-level).
    fn top_level_of(&self, record: RecordId) -> RecordId {
        let mut current = record;
        let mut hops = 0usize;
        while let Some(parent) = self.parent_of(current) {
            if parent == record || hops > 4096 {
                tracing::warn!(record = %record, "parent chain does not terminate");
                break;
            }
            current = parent;
            hops += 1;
        }
        current
    }
}

/// A non-empty chain of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChain")]
pub struct ResolvedChain {
    /// Root first, start record last.
    records: Vec<RecordId>,
}

#[derive(Deserialize)]
struct RawChain {
    records: Vec<RecordId>,
}

impl TryFrom<RawChain> for ResolvedChain {
    type Error = &'static str;

    fn try_from(raw: RawChain) -> Result<Self, Self::Error> {
        if raw.records.is_empty() {
            return Err("a resolved chain needs at least one record");
        }
        Ok(Self {
            records: raw.records,
        })
    }
}

impl ResolvedChain {
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    /// The record at the root end of the chain.
    pub fn ultimate_ancestor(&self) -> RecordId {
        self.records[0]
    }

    pub fn start(&self) -> RecordId {
        self.records[self.records.len() - 1]
    }

    /// Every record on the chain, as a set for membership tests during
    /// value disambiguation.
    pub fn intermediate_record_ids(&self) -> RoaringBitmap {
        self.records.iter().map(|r| r.raw()).collect()
    }

    pub fn contains(&self, record: RecordId) -> bool {
        self.records.contains(&record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    NotStarted,
    WalkingChain { step: usize, partial_chains: usize },
    Resolved(ResolvedChain),
    Unsatisfiable,
    Ambiguous { count: usize },
}

pub struct PathResolver<'a, L: RecordLinks + ?Sized> {
    graph: &'a SchemaGraph,
    links: &'a L,
}

impl<'a, L: RecordLinks + ?Sized> PathResolver<'a, L> {
    pub fn new(graph: &'a SchemaGraph, links: &'a L) -> Self {
        Self { graph, links }
    }

    /// Resolve `path` from `start`, failing with `Unsatisfiable` when no
    /// chain exists and `Ambiguous` when more than one does.
    pub fn resolve(&self, path: &PrefixPath, start: RecordId) -> CoreResult<ResolvedChain> {
        match self.run(path, start)? {
            ResolutionState::Resolved(chain) => Ok(chain),
            ResolutionState::Ambiguous { count } => Err(CoreError::Ambiguous {
                record: start,
                count,
            }),
            ResolutionState::Unsatisfiable
            | ResolutionState::NotStarted
            | ResolutionState::WalkingChain { .. } => {
                Err(CoreError::Unsatisfiable { record: start })
            }
        }
    }

    /// Drive the resolution to a terminal state.
    ///
    /// Only a prefix that no longer matches the schema is an `Err`; an
    /// unsatisfiable or ambiguous chain is reported as the final state.
    pub fn run(&self, path: &PrefixPath, start: RecordId) -> CoreResult<ResolutionState> {
        path.validate(self.graph)?;

        let mut state = ResolutionState::NotStarted;
        tracing::debug!(prefix = %path, record = %start, state = ?state, "resolving prefix");

        if path.len() == 1 {
            state = ResolutionState::Resolved(ResolvedChain {
                records: vec![start],
            });
            tracing::debug!(prefix = %path, record = %start, state = ?state, "resolution finished");
            return Ok(state);
        }

        if self.links.datatype_of(start) != Some(path.target()) {
            tracing::debug!(
                prefix = %path,
                record = %start,
                "start record is not of the prefix target datatype"
            );
            return Ok(ResolutionState::Unsatisfiable);
        }

        let ids = path.ids();
        // Each partial chain runs from `start` upward.
        let mut partial: Vec<Vec<RecordId>> = vec![vec![start]];

        for step in (1..ids.len()).rev() {
            let ancestor_dt = ids[step - 1];
            let descendant_dt = ids[step];
            let via_link = self.graph.is_link(ancestor_dt, descendant_dt);

            let mut next = Vec::new();
            for chain in &partial {
                let Some(&current) = chain.last() else {
                    continue;
                };
                let candidates = if via_link {
                    self.links.linked_ancestors_of(current)
                } else {
                    self.links.parent_of(current).into_iter().collect()
                };
                for candidate in candidates {
                    if self.links.datatype_of(candidate) != Some(ancestor_dt) {
                        continue;
                    }
                    if chain.contains(&candidate) {
                        continue;
                    }
                    let mut extended = chain.clone();
                    extended.push(candidate);
                    next.push(extended);
                }
            }

            partial = next;
            partial.sort();
            partial.dedup();

            state = ResolutionState::WalkingChain {
                step: ids.len() - step,
                partial_chains: partial.len(),
            };
            tracing::debug!(prefix = %path, record = %start, state = ?state, "walking chain");

            if partial.is_empty() {
                break;
            }
        }

        state = match partial.len() {
            0 => ResolutionState::Unsatisfiable,
            1 => {
                let mut records = partial.remove(0);
                records.reverse();
                ResolutionState::Resolved(ResolvedChain { records })
            }
            count => ResolutionState::Ambiguous { count },
        };
        tracing::debug!(prefix = %path, record = %start, state = ?state, "resolution finished");

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_tree::{InMemoryRecords, Record};
    use crate::schema_graph::Edge;

    fn dr(raw: u32) -> RecordId {
        RecordId::new(raw)
    }

    fn path(s: &str) -> PrefixPath {
        PrefixPath::parse(s).unwrap()
    }

    /// Project(1) -> Sample(2) child; Project(1) -> Site(3) child, multiple;
    /// Site(3) -> Sample(2) link.
    fn graph() -> SchemaGraph {
        SchemaGraph::build([
            Edge::child(1, 2, false),
            Edge::child(1, 3, true),
            Edge::link(3, 2, false),
        ])
    }

    fn records() -> InMemoryRecords {
        let mut store = InMemoryRecords::new();
        store.insert(Record::new(10, 1), None);
        store.insert(Record::new(30, 3), Some(dr(10)));
        store.insert(Record::new(31, 3), Some(dr(10)));
        store.insert(Record::new(20, 2), Some(dr(10)));
        store.insert(Record::new(21, 2), Some(dr(10)));
        store.link(dr(30), dr(20));
        store.link(dr(30), dr(21));
        store.link(dr(31), dr(21));
        store
    }

    #[test]
    fn test_single_element_prefix_is_the_start_record() {
        let graph = graph();
        let store = records();
        let chain = PathResolver::new(&graph, &store)
            .resolve(&path("2"), dr(20))
            .unwrap();
        assert_eq!(chain.records(), &[dr(20)]);
        assert_eq!(chain.ultimate_ancestor(), dr(20));
    }

    #[test]
    fn test_parent_edges_resolve_through_parent() {
        let graph = graph();
        let store = records();
        let chain = PathResolver::new(&graph, &store)
            .resolve(&path("1_2"), dr(21))
            .unwrap();
        assert_eq!(chain.records(), &[dr(10), dr(21)]);
    }

    #[test]
    fn test_link_edges_resolve_through_link_table() {
        let graph = graph();
        let store = records();
        let resolver = PathResolver::new(&graph, &store);

        let chain = resolver.resolve(&path("1_3_2"), dr(20)).unwrap();
        assert_eq!(chain.records(), &[dr(10), dr(30), dr(20)]);
        let ids = chain.intermediate_record_ids();
        assert!(ids.contains(30));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_two_linking_sites_are_ambiguous() {
        let graph = graph();
        let store = records();
        let err = PathResolver::new(&graph, &store)
            .resolve(&path("1_3_2"), dr(21))
            .unwrap_err();
        assert_eq!(err, CoreError::Ambiguous { record: dr(21), count: 2 });
    }

    #[test]
    fn test_wrong_start_datatype_is_unsatisfiable() {
        let graph = graph();
        let store = records();
        let resolver = PathResolver::new(&graph, &store);
        assert_eq!(
            resolver.run(&path("1_2"), dr(30)).unwrap(),
            ResolutionState::Unsatisfiable
        );
        assert!(resolver.resolve(&path("1_2"), dr(999)).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_stale_prefix_is_rejected_before_walking() {
        let graph = graph();
        let store = records();
        let err = PathResolver::new(&graph, &store)
            .resolve(&path("3_1"), dr(10))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPrefix { .. }));
    }

    #[test]
    fn test_chain_json_must_name_a_record() {
        let chain: ResolvedChain = serde_json::from_str(r#"{"records":[10,30,20]}"#).unwrap();
        assert_eq!(chain.ultimate_ancestor(), dr(10));
        assert_eq!(chain.start(), dr(20));

        let err = serde_json::from_str::<ResolvedChain>(r#"{"records":[]}"#).unwrap_err();
        assert!(err.to_string().contains("at least one record"));
    }

    #[test]
    fn test_top_level_follows_parents() {
        let store = records();
        assert_eq!(store.top_level_of(dr(30)), dr(10));
        assert_eq!(store.top_level_of(dr(10)), dr(10));
    }
}
