//! Gather every value of the requested fields found in a record tree.

use crate::record_tree::{FieldCategory, Record};
use crate::{DatatypeId, FieldId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValueCandidate {
    pub field: FieldId,
    pub record: RecordId,
    pub value: String,
    /// Nesting depth of `record` below the tree root.
    pub depth: usize,
}

/// Which field categories (and optionally which datatypes) may contribute
/// candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRules {
    categories: BTreeSet<FieldCategory>,
    datatypes: Option<BTreeSet<DatatypeId>>,
}

impl CollectRules {
    pub fn new(categories: impl IntoIterator<Item = FieldCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            datatypes: None,
        }
    }

    /// Categories usable in a filename.
    pub fn filename() -> Self {
        Self::new([
            FieldCategory::Integer,
            FieldCategory::Decimal,
            FieldCategory::ShortText,
            FieldCategory::MediumText,
            FieldCategory::DateTime,
            FieldCategory::SingleChoice,
        ])
    }

    /// Categories usable in a file header; long text is fine there.
    pub fn header() -> Self {
        Self::new([
            FieldCategory::Boolean,
            FieldCategory::Integer,
            FieldCategory::Decimal,
            FieldCategory::ShortText,
            FieldCategory::MediumText,
            FieldCategory::LongText,
            FieldCategory::Paragraph,
            FieldCategory::DateTime,
            FieldCategory::SingleChoice,
        ])
    }

    /// Only read fields of records whose datatype is in `datatypes`.
    pub fn within(mut self, datatypes: BTreeSet<DatatypeId>) -> Self {
        self.datatypes = Some(datatypes);
        self
    }

    pub fn allows(&self, category: FieldCategory) -> bool {
        self.categories.contains(&category)
    }

    fn reads(&self, datatype: DatatypeId) -> bool {
        self.datatypes
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&datatype))
    }
}

/// Walk `tree` in pre-order and return one candidate per record holding a
/// requested field. A field that exists with an empty value yields an empty
/// candidate; a missing field yields nothing. A record reachable twice (as a
/// child and through a link) is read at its first position only.
pub fn collect(tree: &Record, fields: &[FieldId], rules: &CollectRules) -> Vec<FieldValueCandidate> {
    let wanted: BTreeSet<FieldId> = fields.iter().copied().collect();
    let mut seen: BTreeSet<RecordId> = BTreeSet::new();
    let mut out = Vec::new();

    for (record, depth) in tree.walk() {
        if !seen.insert(record.id) || !rules.reads(record.datatype) {
            continue;
        }
        for (&field, value) in &record.fields {
            if !wanted.contains(&field) || !rules.allows(value.category()) {
                continue;
            }
            let Some(text) = value.render() else {
                continue;
            };
            out.push(FieldValueCandidate {
                field,
                record: record.id,
                value: text,
                depth,
            });
        }
    }

    out
}
