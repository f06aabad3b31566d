//! Files to graph, and the filters that narrow them down.
//!
//! The records a filter graph is rendered for are usually not the records
//! holding the files: the prefix says how far down to go. Filter values can
//! come from anywhere along the way, so every value is finally re-pointed at
//! the records that actually hold a graph file.

use chrono::NaiveDate;
use odr_prefix_config::FilterGraphConfig;
use odr_prefix_core::{
    DatatypeId, FieldCategory, FieldId, FieldValue, PrefixPath, Record, RecordId, SchemaGraph,
    StoredFile,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::str::Chars;

// ============================================================================
// Graph files
// ============================================================================

/// A record at the end of the prefix, with the names of the records above it.
#[derive(Debug, Clone)]
pub struct GraphRecord<'a> {
    pub record: &'a Record,
    /// Names from the top-level record down to this one.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphFile {
    pub record: RecordId,
    pub labels: Vec<String>,
    pub file: StoredFile,
    pub is_public: bool,
}

/// Descend from `records` along `prefix` (whose first element is the
/// datatype of `records`).
pub fn graph_records<'a>(records: &'a [Record], prefix: &PrefixPath) -> Vec<GraphRecord<'a>> {
    let mut working: Vec<GraphRecord<'a>> = records
        .iter()
        .map(|record| GraphRecord {
            record,
            labels: vec![name_of(record)],
        })
        .collect();

    for &datatype in prefix.ids().iter().skip(1) {
        let next: Vec<GraphRecord<'a>> = working
            .iter()
            .flat_map(|parent| {
                parent
                    .record
                    .children_of(datatype)
                    .iter()
                    .map(move |child| {
                        let mut labels = parent.labels.clone();
                        labels.push(name_of(child));
                        GraphRecord {
                            record: child,
                            labels,
                        }
                    })
            })
            .collect();
        working = next;
    }
    working
}

fn name_of(record: &Record) -> String {
    record.name.clone().unwrap_or_default()
}

/// The first file of each graph record, from the primary field or else the
/// secondary one, sorted by label.
pub fn graph_files(
    records: &[Record],
    config: &FilterGraphConfig,
    today: NaiveDate,
) -> Vec<GraphFile> {
    let mut out: Vec<GraphFile> = graph_records(records, &config.prefix)
        .into_iter()
        .filter_map(|graph_record| {
            let file = config.file_fields().find_map(|field| {
                graph_record
                    .record
                    .fields
                    .get(&field)
                    .and_then(|value| value.files().into_iter().next().cloned())
            })?;
            let is_public = file.public_date.is_some_and(|date| date <= today);
            Some(GraphFile {
                record: graph_record.record.id,
                labels: graph_record.labels,
                file,
                is_public,
            })
        })
        .collect();

    out.sort_by(|a, b| compare_labels(&a.labels, &b.labels).then(a.record.cmp(&b.record)));
    out
}

fn compare_labels(a: &[String], b: &[String]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| natural_cmp(x, y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Case-insensitive comparison where digit runs compare as numbers, so
/// `file2` sorts before `file10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let l = digit_run(&mut left);
                let r = digit_run(&mut right);
                let l = l.trim_start_matches('0');
                let r = r.trim_start_matches('0');
                let ord = l.len().cmp(&r.len()).then_with(|| l.cmp(r));
                if ord.is_ne() {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

// ============================================================================
// Filter values
// ============================================================================

/// Categories that can be offered as a filter.
const FILTERABLE: [FieldCategory; 10] = [
    FieldCategory::Boolean,
    FieldCategory::Integer,
    FieldCategory::Decimal,
    FieldCategory::ShortText,
    FieldCategory::MediumText,
    FieldCategory::LongText,
    FieldCategory::Paragraph,
    FieldCategory::DateTime,
    FieldCategory::SingleChoice,
    FieldCategory::MultipleChoice,
];

/// Datafields (with their category) found on records of each datatype.
pub type DatatypeFields = BTreeMap<DatatypeId, BTreeMap<FieldId, FieldCategory>>;

/// Every field seen on `records` or their descendants, by datatype.
pub fn datatype_fields(records: &[Record]) -> DatatypeFields {
    let mut out = DatatypeFields::new();
    for root in records {
        for (record, _) in root.walk() {
            let entry = out.entry(record.datatype).or_default();
            for (&field, value) in &record.fields {
                entry.entry(field).or_insert(value.category());
            }
        }
    }
    out
}

/// Which fields of which datatypes to gather values for.
///
/// A descendant datatype is only included when it is the next prefix
/// element or allows a single record, so that each of its values can be
/// tied to exactly one graph record.
#[derive(Debug, Clone, Default)]
struct FilterPlan {
    fields: Vec<FieldId>,
    descendants: Vec<(DatatypeId, FilterPlan)>,
}

impl FilterPlan {
    fn build(
        graph: &SchemaGraph,
        fields: &DatatypeFields,
        datatype: DatatypeId,
        prefix: Option<&[DatatypeId]>,
        on_path: &mut BTreeSet<DatatypeId>,
    ) -> Self {
        on_path.insert(datatype);

        let own = fields
            .get(&datatype)
            .map(|known| {
                known
                    .iter()
                    .filter(|(_, category)| FILTERABLE.contains(*category))
                    .map(|(&field, _)| field)
                    .collect()
            })
            .unwrap_or_default();

        let next = prefix.and_then(|p| p.get(1)).copied();
        let mut descendants = Vec::new();
        for edge in graph.descendants(datatype) {
            let child = edge.descendant;
            let on_prefix = next == Some(child);
            if edge.multiple_allowed && !on_prefix {
                continue;
            }
            if on_path.contains(&child) {
                tracing::warn!(ancestor = %datatype, descendant = %child, "skipping cyclic edge");
                continue;
            }
            let child_prefix = if on_prefix { prefix.map(|p| &p[1..]) } else { None };
            descendants.push((child, Self::build(graph, fields, child, child_prefix, on_path)));
        }

        on_path.remove(&datatype);
        Self {
            fields: own,
            descendants,
        }
    }

    fn all_fields(&self, out: &mut Vec<FieldId>) {
        out.extend(&self.fields);
        for (_, plan) in &self.descendants {
            plan.all_fields(out);
        }
    }
}

fn filter_values(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::SingleChoice(selected) => {
            selected.iter().map(|option| option.name.clone()).collect()
        }
        FieldValue::MultipleChoice(options) => {
            options.iter().map(|option| option.name.clone()).collect()
        }
        other => other.render().filter(|text| !text.is_empty()).into_iter().collect(),
    }
}

/// Every filter value with the records carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterIndex {
    pub values: BTreeMap<FieldId, BTreeMap<String, Vec<RecordId>>>,
    /// Records without a value for the field.
    pub nulls: BTreeMap<FieldId, Vec<RecordId>>,
    /// Records without a graph file, mapped to related records that have one.
    pub lookup: BTreeMap<RecordId, Vec<RecordId>>,
}

/// The filters worth showing, with records already re-pointed at graph
/// records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReducedFilters {
    pub values: BTreeMap<FieldId, BTreeMap<String, Vec<RecordId>>>,
    pub nulls: BTreeMap<FieldId, Vec<RecordId>>,
}

impl FilterIndex {
    pub fn build(
        graph: &SchemaGraph,
        fields: &DatatypeFields,
        records: &[Record],
        prefix: &PrefixPath,
    ) -> Self {
        let plan = FilterPlan::build(
            graph,
            fields,
            prefix.root(),
            Some(prefix.ids()),
            &mut BTreeSet::new(),
        );
        let mut index = Self::default();
        index.gather(&plan, records, Some(prefix.ids()));
        index.combine_lookup();
        index
    }

    fn gather(&mut self, plan: &FilterPlan, records: &[Record], prefix: Option<&[DatatypeId]>) {
        let next = prefix.and_then(|p| p.get(1)).copied();

        for record in records {
            for &field in &plan.fields {
                let found = record
                    .fields
                    .get(&field)
                    .map(filter_values)
                    .unwrap_or_default();
                if found.is_empty() {
                    self.nulls.entry(field).or_default().push(record.id);
                }
                for value in found {
                    self.values
                        .entry(field)
                        .or_default()
                        .entry(value)
                        .or_default()
                        .push(record.id);
                }
            }

            for (datatype, child_plan) in &plan.descendants {
                let children = record.children_of(*datatype);
                if children.is_empty() {
                    // The record stands in for the missing descendants.
                    let mut missing = Vec::new();
                    child_plan.all_fields(&mut missing);
                    for field in missing {
                        self.nulls.entry(field).or_default().push(record.id);
                    }
                    continue;
                }

                let on_prefix = next == Some(*datatype);
                let child_prefix = if on_prefix { prefix.map(|p| &p[1..]) } else { None };
                self.gather(child_plan, children, child_prefix);

                if on_prefix {
                    self.lookup
                        .insert(record.id, children.iter().map(|c| c.id).collect());
                } else {
                    for child in children {
                        self.lookup.entry(child.id).or_default().push(record.id);
                    }
                }
            }
        }
    }

    /// Follow lookup entries until each points only at records that are not
    /// themselves in the lookup.
    fn combine_lookup(&mut self) {
        let mut closed = BTreeMap::new();
        for &source in self.lookup.keys() {
            let mut out = Vec::new();
            let mut visiting = BTreeSet::from([source]);
            self.expand(source, &mut visiting, &mut out);
            closed.insert(source, out);
        }
        self.lookup = closed;
    }

    fn expand(&self, source: RecordId, visiting: &mut BTreeSet<RecordId>, out: &mut Vec<RecordId>) {
        let Some(targets) = self.lookup.get(&source) else {
            return;
        };
        for &target in targets {
            if self.lookup.contains_key(&target) {
                if visiting.insert(target) {
                    self.expand(target, visiting, out);
                    visiting.remove(&target);
                }
            } else if !out.contains(&target) {
                out.push(target);
            }
        }
    }

    fn substitute(&self, records: &[RecordId]) -> Vec<RecordId> {
        let mut out = Vec::new();
        for record in records {
            let replacement = self
                .lookup
                .get(record)
                .map(Vec::as_slice)
                .unwrap_or(std::slice::from_ref(record));
            for &id in replacement {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Drop fields that can't split the graph records (a single value and
    /// no records without one), unless there is only one file to show.
    pub fn reduce(&self, only_one_file: bool) -> ReducedFilters {
        let mut out = ReducedFilters::default();

        for (field, values) in &self.values {
            if !only_one_file && values.len() < 2 && !self.nulls.contains_key(field) {
                continue;
            }
            let substituted = values
                .iter()
                .map(|(value, records)| (value.clone(), self.substitute(records)))
                .collect();
            out.values.insert(*field, substituted);
        }
        for (field, records) in &self.nulls {
            if !only_one_file && !self.values.contains_key(field) {
                continue;
            }
            out.nulls.insert(*field, self.substitute(records));
        }
        out
    }
}

// ============================================================================
// View
// ============================================================================

/// Everything a filter graph needs for one set of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGraphView {
    pub files: Vec<GraphFile>,
    pub filters: ReducedFilters,
    pub hidden_fields: Vec<FieldId>,
}

impl FilterGraphView {
    pub fn build(
        graph: &SchemaGraph,
        records: &[Record],
        config: &FilterGraphConfig,
        today: NaiveDate,
    ) -> Self {
        let files = graph_files(records, config, today);
        let fields = datatype_fields(records);
        let index = FilterIndex::build(graph, &fields, records, &config.prefix);
        let filters = index.reduce(files.len() == 1);

        tracing::debug!(
            prefix = %config.prefix,
            files = files.len(),
            filters = filters.values.len(),
            "built filter graph"
        );

        Self {
            files,
            filters,
            hidden_fields: config.hidden_fields.clone(),
        }
    }
}
