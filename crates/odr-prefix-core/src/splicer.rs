//! Structural edits on a nested record tree.
//!
//! Both operations borrow the input tree and return an edited copy; the
//! caller's tree is never modified. Records moved out of a position leave a
//! shadow copy in `original_children` so that renderers which still want
//! the original layout can find it.

use crate::error::{CoreError, CoreResult};
use crate::prefix::PrefixPath;
use crate::record_tree::{Record, RecordOrdering};
use crate::{DatatypeId, RecordId};
use std::collections::{BTreeMap, BTreeSet};

/// Records pulled out of a tree, with the records they were pulled from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub records: Vec<Record>,
    /// record id -> ids of the records it was removed from
    pub parents: BTreeMap<RecordId, BTreeSet<RecordId>>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Append `other`, keeping one record per id.
    pub fn merge(&mut self, other: Extracted) {
        let mut records = std::mem::take(&mut self.records);
        records.extend(other.records);
        self.records = dedup_by_id(records);
        for (id, parents) in other.parents {
            self.parents.entry(id).or_default().extend(parents);
        }
    }
}

/// Records with no known origin, e.g. freshly built ones.
impl From<Vec<Record>> for Extracted {
    fn from(records: Vec<Record>) -> Self {
        Self {
            records,
            parents: BTreeMap::new(),
        }
    }
}

/// Remove the records at the end of `path` from every branch matching the
/// path. `path` starts with the tree root's datatype.
///
/// Returns the edited tree and the removed records. A record reachable
/// through several branches is returned once, holding the last copy seen,
/// and remembers every record it was removed from.
pub fn extract(tree: &Record, path: &PrefixPath) -> (Record, Extracted) {
    let mut edited = tree.clone();
    let mut removed = Vec::new();
    let mut parents: BTreeMap<RecordId, BTreeSet<RecordId>> = BTreeMap::new();

    match path.strip_root() {
        Some(rest) if path.root() == tree.datatype => {
            extract_level(&mut edited, rest.ids(), &mut removed, &mut parents);
        }
        _ => {
            tracing::debug!(prefix = %path, record = %tree.id, "nothing to extract");
        }
    }

    let extracted = Extracted {
        records: dedup_by_id(removed),
        parents,
    };
    (edited, extracted)
}

fn extract_level(
    record: &mut Record,
    rest: &[DatatypeId],
    out: &mut Vec<Record>,
    parents: &mut BTreeMap<RecordId, BTreeSet<RecordId>>,
) {
    let Some((&next, below)) = rest.split_first() else {
        return;
    };

    if below.is_empty() {
        if let Some(children) = record.children.remove(&next) {
            for child in &children {
                parents.entry(child.id).or_default().insert(record.id);
            }
            record.original_children.insert(next, children.clone());
            out.extend(children);
        }
        return;
    }

    if let Some(children) = record.children.get_mut(&next) {
        for child in children {
            extract_level(child, below, out, parents);
        }
    }
}

/// Keep one record per id: the first position, holding the last copy.
pub fn dedup_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        match out.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => out.push(record),
        }
    }
    out
}

/// Insert records below the end of `path`, ordered by `ordering`.
///
/// Records are appended after the destination's existing children; a record
/// already present with the same id is replaced in place. Every record
/// along the path must already exist.
///
/// When the path ends below a single record everything goes there. When it
/// fans out over several records, each record goes back under the records
/// it was extracted from; a record with no known origin among them is an
/// [`CoreError::AmbiguousDestination`].
pub fn insert(
    tree: &Record,
    path: &PrefixPath,
    incoming: impl Into<Extracted>,
    ordering: &dyn RecordOrdering,
) -> CoreResult<Record> {
    let Some(rest) = path.strip_root() else {
        return Err(CoreError::malformed(
            path.to_string(),
            "a splice destination needs at least two datatypes",
        ));
    };
    if tree.datatype != path.root() {
        return Err(CoreError::MissingIntermediate {
            datatype: path.root(),
        });
    }

    let Extracted {
        mut records,
        parents,
    } = incoming.into();
    if records.is_empty() {
        return Ok(tree.clone());
    }

    let receivers = receivers(tree, rest.ids())?;
    ordering.sort_records(path.target(), &mut records);

    let mut assigned: BTreeMap<RecordId, Vec<Record>> = BTreeMap::new();
    for record in &records {
        let targets: Vec<RecordId> = match receivers.iter().next() {
            Some(only) if receivers.len() == 1 => vec![*only],
            _ => parents
                .get(&record.id)
                .into_iter()
                .flatten()
                .filter(|parent| receivers.contains(*parent))
                .copied()
                .collect(),
        };
        if targets.is_empty() {
            return Err(CoreError::AmbiguousDestination {
                datatype: path.target(),
                record: record.id,
            });
        }
        for target in targets {
            assigned.entry(target).or_default().push(record.clone());
        }
    }

    let mut edited = tree.clone();
    insert_level(&mut edited, rest.ids(), &assigned);
    tracing::debug!(
        prefix = %path,
        record = %tree.id,
        moved = records.len(),
        receivers = assigned.len(),
        "inserted records"
    );
    Ok(edited)
}

/// Ids of the records the last datatype of `rest` will be inserted under.
fn receivers(tree: &Record, rest: &[DatatypeId]) -> CoreResult<BTreeSet<RecordId>> {
    let intermediates = rest.split_last().map(|(_, init)| init).unwrap_or(&[]);
    let mut frontier = vec![tree];
    for &datatype in intermediates {
        frontier = frontier
            .into_iter()
            .flat_map(|record| record.children_of(datatype))
            .collect();
        if frontier.is_empty() {
            return Err(CoreError::MissingIntermediate { datatype });
        }
    }
    Ok(frontier.into_iter().map(|record| record.id).collect())
}

fn insert_level(
    record: &mut Record,
    rest: &[DatatypeId],
    assigned: &BTreeMap<RecordId, Vec<Record>>,
) {
    let Some((&next, below)) = rest.split_first() else {
        return;
    };

    if below.is_empty() {
        let Some(records) = assigned.get(&record.id) else {
            return;
        };
        let list = record.children.entry(next).or_default();
        for incoming in records {
            match list.iter_mut().find(|r| r.id == incoming.id) {
                Some(existing) => *existing = incoming.clone(),
                None => list.push(incoming.clone()),
            }
        }
        return;
    }

    if let Some(children) = record.children.get_mut(&next) {
        for child in children {
            insert_level(child, below, assigned);
        }
    }
}
