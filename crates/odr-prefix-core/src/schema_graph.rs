//! Datatype relationship graph.
//!
//! Nodes are datatype ids; edges run from an ancestor datatype to a
//! descendant datatype. Two flags on each edge matter to every consumer:
//!
//! - `is_link`: the relationship lives in the link table rather than being a
//!   direct parent/child nesting. Record chains are resolved differently for
//!   the two kinds, so they are never interchangeable.
//! - `multiple_allowed`: an ancestor record may have more than one descendant
//!   record through this edge.
//!
//! The graph is expected to be a DAG, but it is user-editable and not
//! enforced upstream, so every traversal carries a visited set.

use crate::DatatypeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub ancestor: DatatypeId,
    pub descendant: DatatypeId,
    #[serde(default)]
    pub is_link: bool,
    #[serde(default)]
    pub multiple_allowed: bool,
}

impl Edge {
    pub fn child(ancestor: u32, descendant: u32, multiple_allowed: bool) -> Self {
        Self {
            ancestor: DatatypeId::new(ancestor),
            descendant: DatatypeId::new(descendant),
            is_link: false,
            multiple_allowed,
        }
    }

    pub fn link(ancestor: u32, descendant: u32, multiple_allowed: bool) -> Self {
        Self {
            ancestor: DatatypeId::new(ancestor),
            descendant: DatatypeId::new(descendant),
            is_link: true,
            multiple_allowed,
        }
    }
}

/// Which descendant edges a forward traversal may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescendantPolicy {
    /// Only edges where at most one descendant record can exist. A value
    /// found below such an edge can be attributed to a single record.
    #[default]
    SingleOnly,
    /// Every edge.
    IncludeMultiple,
}

impl DescendantPolicy {
    pub fn follows(self, edge: &Edge) -> bool {
        match self {
            DescendantPolicy::SingleOnly => !edge.multiple_allowed,
            DescendantPolicy::IncludeMultiple => true,
        }
    }
}

impl From<bool> for DescendantPolicy {
    fn from(include_multiple_allowed: bool) -> Self {
        if include_multiple_allowed {
            DescendantPolicy::IncludeMultiple
        } else {
            DescendantPolicy::SingleOnly
        }
    }
}

/// Problems found (and repaired) while building a [`SchemaGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    SelfLoop { datatype: DatatypeId },
    DuplicateEdge { ancestor: DatatypeId, descendant: DatatypeId },
    Cycle { members: Vec<DatatypeId> },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::SelfLoop { datatype } => {
                write!(f, "datatype {datatype} is its own descendant (edge dropped)")
            }
            IntegrityIssue::DuplicateEdge {
                ancestor,
                descendant,
            } => write!(f, "duplicate edge {ancestor} -> {descendant} (later copy dropped)"),
            IntegrityIssue::Cycle { members } => {
                let ids: Vec<String> = members.iter().map(|id| id.to_string()).collect();
                write!(f, "datatypes [{}] are part of a cycle", ids.join(", "))
            }
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    edges: Vec<Edge>,
    /// ancestor -> edge indexes
    forward: BTreeMap<DatatypeId, Vec<usize>>,
    /// descendant -> edge indexes
    backward: BTreeMap<DatatypeId, Vec<usize>>,
    by_pair: BTreeMap<(DatatypeId, DatatypeId), usize>,
    issues: Vec<IntegrityIssue>,
}

impl SchemaGraph {
    /// Build the graph, dropping self-loops and duplicate edges.
    ///
    /// Dropped edges and detected cycles are logged and kept in
    /// [`SchemaGraph::issues`]; building never fails.
    pub fn build(edges: impl IntoIterator<Item = Edge>) -> Self {
        let mut graph = SchemaGraph::default();

        for edge in edges {
            if edge.ancestor == edge.descendant {
                tracing::warn!(datatype = %edge.ancestor, "dropping self-referencing datatype edge");
                graph.issues.push(IntegrityIssue::SelfLoop {
                    datatype: edge.ancestor,
                });
                continue;
            }
            let key = (edge.ancestor, edge.descendant);
            if graph.by_pair.contains_key(&key) {
                tracing::warn!(
                    ancestor = %edge.ancestor,
                    descendant = %edge.descendant,
                    "dropping duplicate datatype edge"
                );
                graph.issues.push(IntegrityIssue::DuplicateEdge {
                    ancestor: edge.ancestor,
                    descendant: edge.descendant,
                });
                continue;
            }

            let idx = graph.edges.len();
            graph.by_pair.insert(key, idx);
            graph.forward.entry(edge.ancestor).or_default().push(idx);
            graph.backward.entry(edge.descendant).or_default().push(idx);
            graph.edges.push(edge);
        }

        let cyclic = graph.cyclic_datatypes();
        if !cyclic.is_empty() {
            tracing::warn!(datatypes = ?cyclic, "datatype graph contains a cycle");
            graph.issues.push(IntegrityIssue::Cycle { members: cyclic });
        }

        graph
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    /// Every datatype that appears on an edge.
    pub fn datatypes(&self) -> BTreeSet<DatatypeId> {
        self.forward
            .keys()
            .chain(self.backward.keys())
            .copied()
            .collect()
    }

    pub fn contains(&self, id: DatatypeId) -> bool {
        self.forward.contains_key(&id) || self.backward.contains_key(&id)
    }

    pub fn edge(&self, ancestor: DatatypeId, descendant: DatatypeId) -> Option<&Edge> {
        self.by_pair
            .get(&(ancestor, descendant))
            .and_then(|&idx| self.edges.get(idx))
    }

    pub fn is_link(&self, ancestor: DatatypeId, descendant: DatatypeId) -> bool {
        self.edge(ancestor, descendant)
            .map(|e| e.is_link)
            .unwrap_or(false)
    }

    /// Direct outgoing edges, in insertion order.
    pub fn descendants(&self, ancestor: DatatypeId) -> impl Iterator<Item = &Edge> + '_ {
        self.forward
            .get(&ancestor)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.edges.get(idx))
    }

    /// Direct incoming edges, in insertion order.
    pub fn ancestors(&self, descendant: DatatypeId) -> impl Iterator<Item = &Edge> + '_ {
        self.backward
            .get(&descendant)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.edges.get(idx))
    }

    /// Every datatype that can reach `id` through parent or link edges.
    pub fn ancestors_of(&self, id: DatatypeId) -> BTreeSet<DatatypeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for edge in self.ancestors(current) {
                if edge.ancestor == id {
                    tracing::warn!(datatype = %id, "datatype is its own ancestor; ignoring cycle");
                    continue;
                }
                if seen.insert(edge.ancestor) {
                    queue.push_back(edge.ancestor);
                }
            }
        }

        seen
    }

    /// Every datatype reachable from `id` following edges allowed by `policy`.
    pub fn descendants_of(&self, id: DatatypeId, policy: DescendantPolicy) -> BTreeSet<DatatypeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for edge in self.descendants(current) {
                if !policy.follows(edge) {
                    continue;
                }
                if edge.descendant == id {
                    tracing::warn!(datatype = %id, "datatype is its own descendant; ignoring cycle");
                    continue;
                }
                if seen.insert(edge.descendant) {
                    queue.push_back(edge.descendant);
                }
            }
        }

        seen
    }

    /// Datatypes whose fields may feed a plugin attached to `id`: the
    /// datatype itself, its ancestors, and the descendants of all of those
    /// under `policy`.
    pub fn field_source_datatypes(
        &self,
        id: DatatypeId,
        policy: DescendantPolicy,
    ) -> BTreeSet<DatatypeId> {
        let mut out = self.ancestors_of(id);
        out.insert(id);
        let roots: Vec<DatatypeId> = out.iter().copied().collect();
        for root in roots {
            out.extend(self.descendants_of(root, policy));
        }
        out
    }

    fn cyclic_datatypes(&self) -> Vec<DatatypeId> {
        self.datatypes()
            .into_iter()
            .filter(|&id| self.reaches_itself(id))
            .collect()
    }

    fn reaches_itself(&self, id: DatatypeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for edge in self.descendants(current) {
                if edge.descendant == id {
                    return true;
                }
                if seen.insert(edge.descendant) {
                    stack.push(edge.descendant);
                }
            }
        }
        false
    }
}
