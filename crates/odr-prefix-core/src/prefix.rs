//! Prefix paths: ordered datatype ids from a root datatype down to a target.
//!
//! Stored in plugin configuration as the `_`-joined id list (`"1_3_2"`), and
//! re-validated against the live [`SchemaGraph`] on every use since the schema
//! can change after the plugin was configured.

use crate::error::{CoreError, CoreResult};
use crate::schema_graph::{DescendantPolicy, SchemaGraph};
use crate::DatatypeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const PREFIX_SEPARATOR: char = '_';

/// Separator used in human-readable prefix labels.
pub const LABEL_SEPARATOR: &str = " >> ";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrefixPath(Vec<DatatypeId>);

/// A candidate prefix together with its display label, e.g. `Sample >> Site`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixChoice {
    pub path: PrefixPath,
    pub label: String,
}

/// Restrictions applied to splice destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPolicy {
    /// Longest destination path accepted. `Some(2)` by default: deeper
    /// destinations would need every intermediate record to exist already.
    pub max_len: Option<usize>,
}

impl Default for DestinationPolicy {
    fn default() -> Self {
        Self { max_len: Some(2) }
    }
}

impl DestinationPolicy {
    pub fn unrestricted() -> Self {
        Self { max_len: None }
    }
}

impl PrefixPath {
    /// Parse the stored `_`-joined representation.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::malformed(input, "prefix is empty"));
        }

        let mut ids = Vec::new();
        for token in trimmed.split(PREFIX_SEPARATOR) {
            if token.is_empty() {
                return Err(CoreError::malformed(input, "empty datatype id"));
            }
            let raw: u32 = token
                .parse()
                .map_err(|_| CoreError::malformed(input, format!("`{token}` is not a datatype id")))?;
            ids.push(DatatypeId::new(raw));
        }

        Ok(Self(ids))
    }

    pub fn from_ids(ids: impl IntoIterator<Item = DatatypeId>) -> CoreResult<Self> {
        let ids: Vec<DatatypeId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Err(CoreError::malformed("", "prefix is empty"));
        }
        Ok(Self(ids))
    }

    pub fn single(id: DatatypeId) -> Self {
        Self(vec![id])
    }

    pub fn ids(&self) -> &[DatatypeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn root(&self) -> DatatypeId {
        self.0[0]
    }

    pub fn target(&self) -> DatatypeId {
        self.0[self.0.len() - 1]
    }

    pub fn contains(&self, id: DatatypeId) -> bool {
        self.0.contains(&id)
    }

    pub fn ends_with(&self, id: DatatypeId) -> bool {
        self.target() == id
    }

    /// The path below the root, or `None` for a length-1 path.
    pub fn strip_root(&self) -> Option<PrefixPath> {
        (self.0.len() > 1).then(|| PrefixPath(self.0[1..].to_vec()))
    }

    /// A copy of this path extended by one datatype.
    pub fn child(&self, id: DatatypeId) -> PrefixPath {
        let mut ids = self.0.clone();
        ids.push(id);
        PrefixPath(ids)
    }

    /// Consecutive `(ancestor, descendant)` pairs.
    pub fn steps(&self) -> impl Iterator<Item = (DatatypeId, DatatypeId)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }

    /// Fail with the first consecutive pair that isn't an edge of `graph`.
    pub fn validate(&self, graph: &SchemaGraph) -> CoreResult<()> {
        for (ancestor, descendant) in self.steps() {
            if graph.edge(ancestor, descendant).is_none() {
                return Err(CoreError::InvalidPrefix {
                    path: self.to_string(),
                    ancestor,
                    descendant,
                });
            }
        }
        Ok(())
    }

    /// Human-readable label using datatype names.
    pub fn label(&self, names: &BTreeMap<DatatypeId, String>) -> String {
        self.0
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| format!("#{id}")))
            .collect::<Vec<_>>()
            .join(LABEL_SEPARATOR)
    }

    /// Every path of `graph` that ends at `target`, starting either at
    /// `target` itself or at any of its ancestors.
    ///
    /// The ancestor walk first records, for each ancestor, which of its
    /// descendants lead on toward `target`; paths are then expanded from that
    /// map. Results are sorted by length, then by ids.
    pub fn all_paths_to(graph: &SchemaGraph, target: DatatypeId) -> Vec<PrefixPath> {
        let mut leads_to: BTreeMap<DatatypeId, BTreeSet<DatatypeId>> = BTreeMap::new();
        let mut frontier = vec![target];
        let mut seen = BTreeSet::from([target]);
        while let Some(current) = frontier.pop() {
            for edge in graph.ancestors(current) {
                leads_to
                    .entry(edge.ancestor)
                    .or_default()
                    .insert(edge.descendant);
                if seen.insert(edge.ancestor) {
                    frontier.push(edge.ancestor);
                }
            }
        }

        let mut out = Vec::new();
        for &start in &seen {
            let mut trail = vec![start];
            expand_toward(target, &leads_to, &mut trail, &mut out);
        }

        out.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// [`PrefixPath::all_paths_to`] with display labels.
    pub fn choices_to(
        graph: &SchemaGraph,
        target: DatatypeId,
        names: &BTreeMap<DatatypeId, String>,
    ) -> Vec<PrefixChoice> {
        Self::all_paths_to(graph, target)
            .into_iter()
            .map(|path| PrefixChoice {
                label: path.label(names),
                path,
            })
            .collect()
    }

    /// Datatypes a plugin using this prefix may read fields from: every path
    /// element plus everything below them under `policy`.
    pub fn allowed_datatypes(
        &self,
        graph: &SchemaGraph,
        policy: DescendantPolicy,
    ) -> BTreeSet<DatatypeId> {
        let mut out: BTreeSet<DatatypeId> = self.0.iter().copied().collect();
        for &id in &self.0 {
            out.extend(graph.descendants_of(id, policy));
        }
        out
    }

    /// Whether records may be spliced in at the end of this path.
    ///
    /// Rejects paths shorter than two elements, paths with a missing edge,
    /// and paths where an intermediate datatype is reached over a
    /// multiple-allowed edge (there would be no single record to insert
    /// under). `policy` additionally caps the path length.
    pub fn is_valid_destination(&self, graph: &SchemaGraph, policy: DestinationPolicy) -> bool {
        let len = self.0.len();
        if len < 2 {
            return false;
        }
        if let Some(max) = policy.max_len {
            if len > max {
                return false;
            }
        }

        for (i, (ancestor, descendant)) in self.steps().enumerate() {
            let Some(edge) = graph.edge(ancestor, descendant) else {
                return false;
            };
            let into_intermediate = i + 2 < len;
            if into_intermediate && edge.multiple_allowed {
                return false;
            }
        }
        true
    }
}

fn expand_toward(
    target: DatatypeId,
    leads_to: &BTreeMap<DatatypeId, BTreeSet<DatatypeId>>,
    trail: &mut Vec<DatatypeId>,
    out: &mut Vec<PrefixPath>,
) {
    let Some(&current) = trail.last() else {
        return;
    };
    if current == target {
        out.push(PrefixPath(trail.clone()));
        return;
    }
    let Some(next) = leads_to.get(&current) else {
        return;
    };
    for &id in next {
        if trail.contains(&id) {
            continue;
        }
        trail.push(id);
        expand_toward(target, leads_to, trail, out);
        trail.pop();
    }
}

impl fmt::Display for PrefixPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{PREFIX_SEPARATOR}")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl FromStr for PrefixPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrefixPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrefixPath> for String {
    fn from(path: PrefixPath) -> Self {
        path.to_string()
    }
}
