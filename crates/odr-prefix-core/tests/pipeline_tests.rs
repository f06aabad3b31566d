use odr_prefix_core::*;
use std::collections::BTreeMap;

const SAMPLE_NAME: u32 = 21;
const SITE_NAME: u32 = 31;
const PROJECT_CODE: u32 = 11;

/// Project(1) ─ Sample(2) child, Project(1) ─ Site(3) child (multiple),
/// Site(3) ─ Sample(2) link.
fn graph() -> SchemaGraph {
    SchemaGraph::build([
        Edge::child(1, 2, false),
        Edge::child(1, 3, true),
        Edge::link(3, 2, false),
    ])
}

fn store(with_link: bool) -> InMemoryRecords {
    let mut store = InMemoryRecords::new();
    store.insert(
        Record::new(10, 1)
            .with_field(PROJECT_CODE, FieldValue::ShortText("PRJ".into()))
            .with_child(Record::new(30, 3).with_field(SITE_NAME, FieldValue::ShortText("North".into())))
            .with_child(Record::new(31, 3).with_field(SITE_NAME, FieldValue::ShortText("South".into())))
            .with_child(Record::new(20, 2).with_field(SAMPLE_NAME, FieldValue::ShortText("S-20".into())))
            .with_child(Record::new(25, 2).with_field(SAMPLE_NAME, FieldValue::ShortText("S-25".into()))),
        None,
    );
    if with_link {
        store.link(RecordId::new(31), RecordId::new(20));
    }
    store
}

fn field_ids() -> Vec<FieldId> {
    [PROJECT_CODE, SITE_NAME, SAMPLE_NAME]
        .into_iter()
        .map(FieldId::new)
        .collect()
}

#[test]
fn test_link_prefix_resolves_through_linking_site() {
    let graph = graph();
    let store = store(true);
    let prefix = PrefixPath::parse("1_3_2").unwrap();

    let chain = PathResolver::new(&graph, &store)
        .resolve(&prefix, RecordId::new(20))
        .unwrap();
    assert_eq!(
        chain.records(),
        &[RecordId::new(10), RecordId::new(31), RecordId::new(20)]
    );

    let tree = store.load_tree(chain.ultimate_ancestor()).unwrap();
    let candidates = collect(&tree, &field_ids(), &CollectRules::filename());
    let values = reduce(&candidates, &field_ids(), &chain.intermediate_record_ids())
        .strict()
        .unwrap();

    assert_eq!(values[&FieldId::new(PROJECT_CODE)], "PRJ");
    assert_eq!(values[&FieldId::new(SITE_NAME)], "South");
    assert_eq!(values[&FieldId::new(SAMPLE_NAME)], "S-20");

    let text = substitute_placeholders("?:11_?:31_?:21", "?:", &values);
    assert_eq!(text, "PRJ_South_S-20");
}

#[test]
fn test_missing_link_is_unsatisfiable() {
    let graph = graph();
    let store = store(false);
    let prefix = PrefixPath::parse("1_3_2").unwrap();

    let err = PathResolver::new(&graph, &store)
        .resolve(&prefix, RecordId::new(20))
        .unwrap_err();
    assert_eq!(err, CoreError::Unsatisfiable { record: RecordId::new(20) });
    assert!(err.is_recoverable());
}

#[test]
fn test_sibling_values_fall_back_to_lowest_record() {
    let graph = graph();
    let store = store(true);
    // sample 25 sits directly under the project; sites are off the chain
    let prefix = PrefixPath::parse("1_2").unwrap();
    let chain = PathResolver::new(&graph, &store)
        .resolve(&prefix, RecordId::new(25))
        .unwrap();

    let tree = store.load_tree(chain.ultimate_ancestor()).unwrap();
    let candidates = collect(&tree, &field_ids(), &CollectRules::header());
    let out = reduce(&candidates, &field_ids(), &chain.intermediate_record_ids());

    assert_eq!(
        out.get(FieldId::new(SAMPLE_NAME)),
        Some(&DisambiguatedValue::Value("S-25".into()))
    );
    assert_eq!(
        out.get(FieldId::new(SITE_NAME)),
        Some(&DisambiguatedValue::Value("North".into()))
    );

    let renamer_view = reduce_with(
        &candidates,
        &field_ids(),
        &chain.intermediate_record_ids(),
        FallbackPolicy::BlankWhenOffChain,
    );
    assert_eq!(
        renamer_view.get(FieldId::new(SITE_NAME)),
        Some(&DisambiguatedValue::NoValue)
    );
}

#[test]
fn test_prefix_choices_for_sample() {
    let graph = graph();
    let names = BTreeMap::from([
        (DatatypeId::new(1), "Project".to_string()),
        (DatatypeId::new(2), "Sample".to_string()),
        (DatatypeId::new(3), "Site".to_string()),
    ]);
    let labels: Vec<String> = PrefixPath::choices_to(&graph, DatatypeId::new(2), &names)
        .into_iter()
        .map(|c| c.label)
        .collect();
    assert_eq!(
        labels,
        vec![
            "Sample",
            "Project >> Sample",
            "Site >> Sample",
            "Project >> Site >> Sample"
        ]
    );
}
