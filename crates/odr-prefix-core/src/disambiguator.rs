//! Narrow collected candidates to one value per field.
//!
//! A record tree loaded from the ultimate ancestor usually contains sibling
//! branches that have nothing to do with the record being processed. A
//! candidate whose source record lies on the resolved chain is the one that
//! belongs to this record; the rest are only used as a fallback.

use crate::collector::FieldValueCandidate;
use crate::error::{CoreError, CoreResult};
use crate::{FieldId, RecordId};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DisambiguatedValue {
    Value(String),
    NoValue,
    /// Several candidates on the chain, as `(source record, value)`.
    Ambiguous { candidates: Vec<(RecordId, String)> },
}

/// What to do when none of a field's candidates are on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Use the candidate with the lowest source record id.
    #[default]
    FirstByRecordId,
    /// Use a lone candidate; with several off-chain candidates there is no value.
    BlankWhenOffChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Disambiguation(BTreeMap<FieldId, DisambiguatedValue>);

impl Disambiguation {
    pub fn get(&self, field: FieldId) -> Option<&DisambiguatedValue> {
        self.0.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &DisambiguatedValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<FieldId, DisambiguatedValue> {
        self.0
    }

    /// Every field as text, failing on the first ambiguous one.
    /// Fields without a value become empty strings.
    pub fn strict(&self) -> CoreResult<BTreeMap<FieldId, String>> {
        self.0
            .iter()
            .map(|(&field, value)| match value {
                DisambiguatedValue::Value(v) => Ok((field, v.clone())),
                DisambiguatedValue::NoValue => Ok((field, String::new())),
                DisambiguatedValue::Ambiguous { .. } => Err(CoreError::AmbiguousField { field }),
            })
            .collect()
    }

    /// Every field as text; an ambiguous field is left blank.
    pub fn lenient(&self) -> BTreeMap<FieldId, String> {
        self.0
            .iter()
            .map(|(&field, value)| {
                let text = match value {
                    DisambiguatedValue::Value(v) => v.clone(),
                    DisambiguatedValue::NoValue => String::new(),
                    DisambiguatedValue::Ambiguous { candidates } => {
                        tracing::warn!(
                            field = %field,
                            candidates = candidates.len(),
                            "several values for field; leaving it blank"
                        );
                        String::new()
                    }
                };
                (field, text)
            })
            .collect()
    }
}

/// [`reduce_with`] using [`FallbackPolicy::FirstByRecordId`].
pub fn reduce(
    candidates: &[FieldValueCandidate],
    fields: &[FieldId],
    on_chain: &RoaringBitmap,
) -> Disambiguation {
    reduce_with(candidates, fields, on_chain, FallbackPolicy::default())
}

/// Reduce `candidates` to one entry per requested field.
pub fn reduce_with(
    candidates: &[FieldValueCandidate],
    fields: &[FieldId],
    on_chain: &RoaringBitmap,
    fallback: FallbackPolicy,
) -> Disambiguation {
    let mut out = BTreeMap::new();

    for &field in fields {
        let all: Vec<&FieldValueCandidate> = candidates.iter().filter(|c| c.field == field).collect();
        let on: Vec<&FieldValueCandidate> = all
            .iter()
            .copied()
            .filter(|c| on_chain.contains(c.record.raw()))
            .collect();

        let value = match (on.as_slice(), all.as_slice()) {
            (_, []) => DisambiguatedValue::NoValue,
            ([single], _) => DisambiguatedValue::Value(single.value.clone()),
            ([], [lone]) => DisambiguatedValue::Value(lone.value.clone()),
            ([], several) => match fallback {
                FallbackPolicy::FirstByRecordId => several
                    .iter()
                    .min_by_key(|c| c.record)
                    .map(|c| DisambiguatedValue::Value(c.value.clone()))
                    .unwrap_or(DisambiguatedValue::NoValue),
                FallbackPolicy::BlankWhenOffChain => DisambiguatedValue::NoValue,
            },
            (several, _) => DisambiguatedValue::Ambiguous {
                candidates: several.iter().map(|c| (c.record, c.value.clone())).collect(),
            },
        };
        out.insert(field, value);
    }

    Disambiguation(out)
}

/// Replace `placeholder` + field id with the field's value, highest field id
/// first so that `?:1` never eats the front of `?:17`.
pub fn substitute_placeholders(
    text: &str,
    placeholder: &str,
    values: &BTreeMap<FieldId, String>,
) -> String {
    let mut out = text.to_string();
    for (field, value) in values.iter().rev() {
        out = out.replace(&format!("{placeholder}{field}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(field: u32, record: u32, value: &str) -> FieldValueCandidate {
        FieldValueCandidate {
            field: FieldId::new(field),
            record: RecordId::new(record),
            value: value.to_string(),
            depth: 1,
        }
    }

    fn chain(ids: &[u32]) -> RoaringBitmap {
        ids.iter().copied().collect()
    }

    fn value(s: &str) -> DisambiguatedValue {
        DisambiguatedValue::Value(s.to_string())
    }

    #[test]
    fn test_on_chain_candidate_wins() {
        let candidates = [candidate(1, 5, "A"), candidate(1, 2, "B")];
        let out = reduce(&candidates, &[FieldId::new(1)], &chain(&[5]));
        assert_eq!(out.get(FieldId::new(1)), Some(&value("A")));
    }

    #[test]
    fn test_fallback_picks_lowest_record_id() {
        let candidates = [candidate(1, 5, "A"), candidate(1, 2, "B")];
        let out = reduce(&candidates, &[FieldId::new(1)], &chain(&[]));
        assert_eq!(out.get(FieldId::new(1)), Some(&value("B")));

        let blank = reduce_with(
            &candidates,
            &[FieldId::new(1)],
            &chain(&[]),
            FallbackPolicy::BlankWhenOffChain,
        );
        assert_eq!(blank.get(FieldId::new(1)), Some(&DisambiguatedValue::NoValue));
    }

    #[test]
    fn test_lone_off_chain_candidate_is_used_by_both_policies() {
        let candidates = [candidate(1, 8, "only")];
        for policy in [FallbackPolicy::FirstByRecordId, FallbackPolicy::BlankWhenOffChain] {
            let out = reduce_with(&candidates, &[FieldId::new(1)], &chain(&[3]), policy);
            assert_eq!(out.get(FieldId::new(1)), Some(&value("only")));
        }
    }

    #[test]
    fn test_every_requested_field_is_reported() {
        let out = reduce(&[], &[FieldId::new(4), FieldId::new(2)], &chain(&[1]));
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(FieldId::new(4)), Some(&DisambiguatedValue::NoValue));
        assert_eq!(out.strict().unwrap()[&FieldId::new(2)], "");
    }

    #[test]
    fn test_two_on_chain_candidates_are_ambiguous() {
        let candidates = [candidate(3, 1, "A"), candidate(3, 2, "B"), candidate(4, 1, "ok")];
        let out = reduce(&candidates, &[FieldId::new(3), FieldId::new(4)], &chain(&[1, 2]));

        assert_eq!(
            out.get(FieldId::new(3)),
            Some(&DisambiguatedValue::Ambiguous {
                candidates: vec![(RecordId::new(1), "A".into()), (RecordId::new(2), "B".into())]
            })
        );
        assert_eq!(out.strict(), Err(CoreError::AmbiguousField { field: FieldId::new(3) }));

        let lenient = out.lenient();
        assert_eq!(lenient[&FieldId::new(3)], "");
        assert_eq!(lenient[&FieldId::new(4)], "ok");
    }

    #[test]
    fn test_substitution_runs_highest_id_first() {
        let values = BTreeMap::from([
            (FieldId::new(1), "X".to_string()),
            (FieldId::new(17), "Y".to_string()),
        ]);
        assert_eq!(substitute_placeholders("?:17-?:1", "?:", &values), "Y-X");
        assert_eq!(substitute_placeholders("no tokens", "?:", &values), "no tokens");
    }
}
