//! Merge descendant records reachable through several paths.
//!
//! With a schema like `{A->B->C, A->C}`, the C records under B and the C
//! records linked straight from A can all be shown together under A. The
//! records are pulled out of every source position (leaving shadow copies)
//! and inserted at the destination.

use crate::PluginResult;
use odr_prefix_config::MergerConfig;
use odr_prefix_core::splicer::{self, Extracted};
use odr_prefix_core::{
    DatatypeId, DestinationPolicy, PrefixChoice, PrefixPath, Record, RecordOrdering, SchemaGraph,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A datatype reachable from the root through more than one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeCandidate {
    pub datatype: DatatypeId,
    /// Every path from the root ending at `datatype`.
    pub sources: Vec<PrefixChoice>,
    /// The sources records may be moved to.
    pub destinations: Vec<PrefixPath>,
}

/// Datatypes below `root` that can be merged, with their source and
/// destination prefixes.
pub fn merge_candidates(
    graph: &SchemaGraph,
    root: DatatypeId,
    names: &BTreeMap<DatatypeId, String>,
    policy: DestinationPolicy,
) -> Vec<MergeCandidate> {
    let mut paths = Vec::new();
    let mut on_path = BTreeSet::new();
    walk_down(graph, PrefixPath::single(root), &mut on_path, &mut paths);

    let mut by_target: BTreeMap<DatatypeId, Vec<PrefixPath>> = BTreeMap::new();
    for path in paths {
        by_target.entry(path.target()).or_default().push(path);
    }

    by_target
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(datatype, paths)| {
            let destinations = paths
                .iter()
                .filter(|p| p.is_valid_destination(graph, policy))
                .cloned()
                .collect();
            let sources = paths
                .into_iter()
                .map(|path| PrefixChoice {
                    label: path.label(names),
                    path,
                })
                .collect();
            MergeCandidate {
                datatype,
                sources,
                destinations,
            }
        })
        .collect()
}

fn walk_down(
    graph: &SchemaGraph,
    path: PrefixPath,
    on_path: &mut BTreeSet<DatatypeId>,
    out: &mut Vec<PrefixPath>,
) {
    let here = path.target();
    on_path.insert(here);
    for edge in graph.descendants(here) {
        if on_path.contains(&edge.descendant) {
            tracing::warn!(ancestor = %here, descendant = %edge.descendant, "skipping cyclic edge");
            continue;
        }
        walk_down(graph, path.child(edge.descendant), on_path, out);
    }
    on_path.remove(&here);
    out.push(path);
}

/// Apply every merge group in `config` to `record`.
///
/// The record's top-level children are kept as a shadow copy first; then
/// every group's source records are extracted before any group is
/// inserted, so one group's destination never feeds another's sources.
/// Groups whose destination isn't a valid merge destination in `graph` are
/// skipped with a warning.
pub fn merge_linked_descendants(
    graph: &SchemaGraph,
    record: &Record,
    config: &MergerConfig,
    ordering: &dyn RecordOrdering,
) -> PluginResult<Record> {
    let mut working = record.clone();
    working.original_children = working.children.clone();

    let policy = DestinationPolicy::default();
    let groups: Vec<_> = config
        .groups
        .iter()
        .filter(|group| {
            let valid = group.destination.is_valid_destination(graph, policy);
            if !valid {
                tracing::warn!(
                    record = %record.id,
                    destination = %group.destination,
                    "skipping merge group with an invalid destination"
                );
            }
            valid
        })
        .collect();

    let mut moving = Vec::with_capacity(groups.len());
    for group in &groups {
        let mut taken = Extracted::default();
        for source in &group.sources {
            let (edited, records) = splicer::extract(&working, source);
            working = edited;
            taken.merge(records);
        }
        moving.push(taken);
    }

    for (group, records) in groups.iter().zip(moving) {
        if records.is_empty() {
            continue;
        }
        tracing::debug!(
            record = %record.id,
            destination = %group.destination,
            moved = records.len(),
            "merging linked descendants"
        );
        working = splicer::insert(&working, &group.destination, records, ordering)?;
    }

    Ok(working)
}
