//! Nested records and the collaborators that supply and order them.

use crate::resolver::RecordLinks;
use crate::{DatatypeId, FieldId, RecordId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Dates at or after this value mean "no date entered".
pub const UNSET_DATE: (i32, u32, u32) = (9999, 12, 31);

// ============================================================================
// Field values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Boolean,
    Integer,
    Decimal,
    ShortText,
    MediumText,
    LongText,
    Paragraph,
    DateTime,
    SingleChoice,
    MultipleChoice,
    Tags,
    File,
    Image,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: u32,
    pub unique_id: String,
    pub original_name: String,
    /// Extension without the leading dot.
    pub ext: String,
    #[serde(default)]
    pub public_date: Option<NaiveDate>,
    /// `false` for generated image thumbnails.
    #[serde(default = "default_true")]
    pub is_original: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    /// Decimals keep the text the user entered.
    Decimal { original: String },
    ShortText(String),
    MediumText(String),
    LongText(String),
    Paragraph(String),
    DateTime(Option<NaiveDate>),
    SingleChoice(Option<ChoiceOption>),
    MultipleChoice(Vec<ChoiceOption>),
    Tags(Vec<String>),
    File(Vec<StoredFile>),
    Image(Vec<StoredFile>),
    Markdown,
}

impl FieldValue {
    pub fn category(&self) -> FieldCategory {
        match self {
            FieldValue::Boolean(_) => FieldCategory::Boolean,
            FieldValue::Integer(_) => FieldCategory::Integer,
            FieldValue::Decimal { .. } => FieldCategory::Decimal,
            FieldValue::ShortText(_) => FieldCategory::ShortText,
            FieldValue::MediumText(_) => FieldCategory::MediumText,
            FieldValue::LongText(_) => FieldCategory::LongText,
            FieldValue::Paragraph(_) => FieldCategory::Paragraph,
            FieldValue::DateTime(_) => FieldCategory::DateTime,
            FieldValue::SingleChoice(_) => FieldCategory::SingleChoice,
            FieldValue::MultipleChoice(_) => FieldCategory::MultipleChoice,
            FieldValue::Tags(_) => FieldCategory::Tags,
            FieldValue::File(_) => FieldCategory::File,
            FieldValue::Image(_) => FieldCategory::Image,
            FieldValue::Markdown => FieldCategory::Markdown,
        }
    }

    /// Text form of a single-valued field, `None` for categories that have
    /// no single text value (files, tags, multiple choice, markdown).
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Decimal { original } => Some(original.clone()),
            FieldValue::ShortText(s)
            | FieldValue::MediumText(s)
            | FieldValue::LongText(s)
            | FieldValue::Paragraph(s) => Some(s.clone()),
            FieldValue::DateTime(date) => Some(render_date(*date)),
            FieldValue::SingleChoice(selected) => Some(
                selected
                    .as_ref()
                    .map(|option| option.name.clone())
                    .unwrap_or_default(),
            ),
            FieldValue::MultipleChoice(_)
            | FieldValue::Tags(_)
            | FieldValue::File(_)
            | FieldValue::Image(_)
            | FieldValue::Markdown => None,
        }
    }

    /// Files stored in a file or image field. Image thumbnails are skipped.
    pub fn files(&self) -> Vec<&StoredFile> {
        match self {
            FieldValue::File(files) => files.iter().collect(),
            FieldValue::Image(images) => images.iter().filter(|i| i.is_original).collect(),
            _ => Vec::new(),
        }
    }
}

fn render_date(date: Option<NaiveDate>) -> String {
    let (y, m, d) = UNSET_DATE;
    match (date, NaiveDate::from_ymd_opt(y, m, d)) {
        (Some(date), Some(unset)) if date >= unset => String::new(),
        (Some(date), _) => date.format("%Y-%m-%d").to_string(),
        (None, _) => String::new(),
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub datatype: DatatypeId,
    /// Value of the datatype's name field, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<FieldId, FieldValue>,
    /// Child and linked descendant records, grouped by datatype.
    #[serde(default)]
    pub children: BTreeMap<DatatypeId, Vec<Record>>,
    /// Shadow copy of children taken before they were moved by a splice.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub original_children: BTreeMap<DatatypeId, Vec<Record>>,
}

impl Record {
    pub fn new(id: u32, datatype: u32) -> Self {
        Self {
            id: RecordId::new(id),
            datatype: DatatypeId::new(datatype),
            name: None,
            fields: BTreeMap::new(),
            children: BTreeMap::new(),
            original_children: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: u32, value: FieldValue) -> Self {
        self.fields.insert(FieldId::new(field), value);
        self
    }

    pub fn with_child(mut self, child: Record) -> Self {
        self.children.entry(child.datatype).or_default().push(child);
        self
    }

    pub fn children_of(&self, datatype: DatatypeId) -> &[Record] {
        self.children
            .get(&datatype)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pre-order walk yielding `(record, depth)`, children in stored order.
    pub fn walk(&self) -> Vec<(&Record, usize)> {
        let mut out = Vec::new();
        let mut stack = vec![(self, 0usize)];
        while let Some((record, depth)) = stack.pop() {
            out.push((record, depth));
            for children in record.children.values().rev() {
                for child in children.iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        out
    }

    pub fn find(&self, id: RecordId) -> Option<&Record> {
        self.walk()
            .into_iter()
            .map(|(record, _)| record)
            .find(|record| record.id == id)
    }

    pub fn record_ids(&self) -> BTreeSet<RecordId> {
        self.walk().into_iter().map(|(record, _)| record.id).collect()
    }

    /// Copy of this tree with every shadow copy removed.
    pub fn without_shadows(&self) -> Record {
        let mut out = self.clone();
        strip_shadows(&mut out);
        out
    }
}

fn strip_shadows(record: &mut Record) {
    record.original_children.clear();
    for children in record.children.values_mut() {
        for child in children {
            strip_shadows(child);
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Supplies the nested record tree below a record.
pub trait RecordTreeLoader {
    /// `None` when the record doesn't exist.
    fn load_tree(&self, root: RecordId) -> Option<Record>;
}

/// Orders records of one datatype before they are inserted by a splice.
pub trait RecordOrdering {
    fn sort_records(&self, datatype: DatatypeId, records: &mut [Record]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AscendingRecordId;

impl RecordOrdering for AscendingRecordId {
    fn sort_records(&self, _datatype: DatatypeId, records: &mut [Record]) {
        records.sort_by_key(|r| r.id);
    }
}

/// Sorts by record name, unnamed records last, ties by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByRecordName;

impl RecordOrdering for ByRecordName {
    fn sort_records(&self, _datatype: DatatypeId, records: &mut [Record]) {
        records.sort_by(|a, b| match (&a.name, &b.name) {
            (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()).then(a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Flat record store with parent pointers and a link table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecords {
    records: BTreeMap<RecordId, Record>,
    parents: BTreeMap<RecordId, RecordId>,
    /// (ancestor, descendant)
    links: BTreeSet<(RecordId, RecordId)>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store a record (its nested children are stored as its direct children).
    pub fn insert(&mut self, mut record: Record, parent: Option<RecordId>) {
        let children = std::mem::take(&mut record.children);
        record.original_children.clear();
        let id = record.id;
        if let Some(parent) = parent {
            self.parents.insert(id, parent);
        }
        self.records.insert(id, record);
        for child in children.into_values().flatten() {
            self.insert(child, Some(id));
        }
    }

    pub fn link(&mut self, ancestor: RecordId, descendant: RecordId) {
        self.links.insert((ancestor, descendant));
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    fn build(&self, id: RecordId, on_path: &mut BTreeSet<RecordId>) -> Option<Record> {
        let mut record = self.records.get(&id)?.clone();
        on_path.insert(id);

        let mut below: Vec<RecordId> = self
            .parents
            .iter()
            .filter(|(_, parent)| **parent == id)
            .map(|(&child, _)| child)
            .collect();
        below.extend(
            self.links
                .iter()
                .filter(|(ancestor, _)| *ancestor == id)
                .map(|(_, descendant)| *descendant),
        );
        below.sort();
        below.dedup();

        for child_id in below {
            if on_path.contains(&child_id) {
                tracing::warn!(record = %id, descendant = %child_id, "record links form a cycle");
                continue;
            }
            if let Some(child) = self.build(child_id, on_path) {
                record.children.entry(child.datatype).or_default().push(child);
            }
        }

        on_path.remove(&id);
        Some(record)
    }
}

impl RecordTreeLoader for InMemoryRecords {
    fn load_tree(&self, root: RecordId) -> Option<Record> {
        self.build(root, &mut BTreeSet::new())
    }
}

impl RecordLinks for InMemoryRecords {
    fn datatype_of(&self, record: RecordId) -> Option<DatatypeId> {
        self.records.get(&record).map(|r| r.datatype)
    }

    fn parent_of(&self, record: RecordId) -> Option<RecordId> {
        self.parents.get(&record).copied()
    }

    fn linked_ancestors_of(&self, record: RecordId) -> Vec<RecordId> {
        self.links
            .iter()
            .filter(|(_, descendant)| *descendant == record)
            .map(|(ancestor, _)| *ancestor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_render_per_category() {
        assert_eq!(FieldValue::Boolean(true).render().as_deref(), Some("1"));
        assert_eq!(FieldValue::Integer(-4).render().as_deref(), Some("-4"));
        assert_eq!(
            FieldValue::Decimal { original: "1.50".into() }.render().as_deref(),
            Some("1.50")
        );
        assert_eq!(FieldValue::DateTime(date(2021, 3, 9)).render().as_deref(), Some("2021-03-09"));
        assert_eq!(FieldValue::DateTime(date(9999, 12, 31)).render().as_deref(), Some(""));
        assert_eq!(FieldValue::DateTime(None).render().as_deref(), Some(""));
        assert_eq!(
            FieldValue::SingleChoice(Some(ChoiceOption { id: 2, name: "Basalt".into() }))
                .render()
                .as_deref(),
            Some("Basalt")
        );
        assert_eq!(FieldValue::SingleChoice(None).render().as_deref(), Some(""));
        assert_eq!(FieldValue::Tags(vec!["a".into()]).render(), None);
    }

    #[test]
    fn test_walk_is_preorder_in_stored_order() {
        let tree = Record::new(1, 1)
            .with_child(Record::new(3, 2).with_child(Record::new(5, 4)))
            .with_child(Record::new(2, 2))
            .with_child(Record::new(4, 3));

        let order: Vec<(u32, usize)> = tree.walk().iter().map(|(r, d)| (r.id.raw(), *d)).collect();
        assert_eq!(order, vec![(1, 0), (3, 1), (5, 2), (2, 1), (4, 1)]);
        assert_eq!(tree.find(RecordId::new(5)).map(|r| r.datatype), Some(DatatypeId::new(4)));
    }

    #[test]
    fn test_in_memory_store_builds_tree_with_linked_descendants() {
        let mut store = InMemoryRecords::new();
        store.insert(
            Record::new(1, 1).with_child(Record::new(2, 2)).with_child(Record::new(3, 2)),
            None,
        );
        store.insert(Record::new(9, 5), None);
        store.link(RecordId::new(2), RecordId::new(9));
        store.link(RecordId::new(9), RecordId::new(1));

        let tree = store.load_tree(RecordId::new(1)).unwrap();
        assert_eq!(tree.children_of(DatatypeId::new(2)).len(), 2);
        let linked = tree.children_of(DatatypeId::new(2))[0].children_of(DatatypeId::new(5));
        assert_eq!(linked.len(), 1);
        // link back to the root is cut
        assert!(linked[0].children.is_empty());

        assert_eq!(store.parent_of(RecordId::new(3)), Some(RecordId::new(1)));
        assert_eq!(store.linked_ancestors_of(RecordId::new(9)), vec![RecordId::new(2)]);
        assert!(store.load_tree(RecordId::new(77)).is_none());
    }

    #[test]
    fn test_orderings() {
        let mut records = vec![
            Record::new(3, 1).with_name("beta"),
            Record::new(1, 1),
            Record::new(2, 1).with_name("Alpha"),
        ];
        ByRecordName.sort_records(DatatypeId::new(1), &mut records);
        let ids: Vec<u32> = records.iter().map(|r| r.id.raw()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        AscendingRecordId.sort_records(DatatypeId::new(1), &mut records);
        let ids: Vec<u32> = records.iter().map(|r| r.id.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_record_json_shape() {
        let json = r#"{
            "id": 4, "datatype": 2, "name": "S-1",
            "fields": { "7": { "type": "short_text", "value": "abc" } },
            "children": { "3": [ { "id": 5, "datatype": 3 } ] }
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.fields[&FieldId::new(7)], FieldValue::ShortText("abc".into()));
        assert_eq!(record.children_of(DatatypeId::new(3))[0].id, RecordId::new(5));
    }
}
