use odr_prefix_core::splicer::{extract, insert};
use odr_prefix_core::{
    AscendingRecordId, DatatypeId, Edge, InMemoryRecords, PathResolver, PrefixPath, Record,
    RecordId, RecordLinks, SchemaGraph,
};
use proptest::prelude::*;

/// Project(1) -> Sample(2), Project(1) -> Site(3) (multiple), Site(3) -> Sample(2) link.
fn schema() -> SchemaGraph {
    SchemaGraph::build([
        Edge::child(1, 2, false),
        Edge::child(1, 3, true),
        Edge::link(3, 2, false),
    ])
}

#[derive(Debug, Clone)]
struct StoreCase {
    projects: u32,
    /// project index per site
    sites: Vec<u32>,
    /// project index per sample
    samples: Vec<u32>,
    /// (site index, sample index)
    links: Vec<(usize, usize)>,
}

fn store_case_strategy() -> impl Strategy<Value = StoreCase> {
    (1u32..4, 1usize..5, 1usize..6).prop_flat_map(|(projects, site_count, sample_count)| {
        (
            prop::collection::vec(0..projects, site_count),
            prop::collection::vec(0..projects, sample_count),
            prop::collection::vec((0..site_count, 0..sample_count), 0..8),
        )
            .prop_map(move |(sites, samples, links)| StoreCase {
                projects,
                sites,
                samples,
                links,
            })
    })
}

fn project_id(i: u32) -> u32 {
    100 + i
}
fn site_id(i: usize) -> u32 {
    300 + i as u32
}
fn sample_id(i: usize) -> u32 {
    200 + i as u32
}

fn build_store(case: &StoreCase) -> InMemoryRecords {
    let mut store = InMemoryRecords::new();
    for p in 0..case.projects {
        store.insert(Record::new(project_id(p), 1), None);
    }
    for (i, p) in case.sites.iter().enumerate() {
        store.insert(Record::new(site_id(i), 3), Some(RecordId::new(project_id(*p))));
    }
    for (i, p) in case.samples.iter().enumerate() {
        store.insert(Record::new(sample_id(i), 2), Some(RecordId::new(project_id(*p))));
    }
    for (site, sample) in &case.links {
        store.link(RecordId::new(site_id(*site)), RecordId::new(sample_id(*sample)));
    }
    store
}

fn sorted_tree_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(
        10u32..40,
        prop::collection::btree_set(100u32..200, 0..4),
        0..5,
    )
    .prop_map(|samples| {
        let mut root = Record::new(1, 1);
        for (sample, finds) in samples {
            let mut child = Record::new(sample, 2);
            for find in finds {
                child = child.with_child(Record::new(find, 4));
            }
            root = root.with_child(child);
        }
        root.with_child(Record::new(500, 3))
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn resolution_is_deterministic_and_sound(case in store_case_strategy()) {
        let graph = schema();
        let store = build_store(&case);
        let resolver = PathResolver::new(&graph, &store);
        let prefix = PrefixPath::parse("1_3_2").unwrap();

        for i in 0..case.samples.len() {
            let start = RecordId::new(sample_id(i));
            let first = resolver.resolve(&prefix, start);
            let second = resolver.resolve(&prefix, start);
            prop_assert_eq!(&first, &second);

            let linking_sites = store.linked_ancestors_of(start).len();
            match first {
                Ok(chain) => {
                    prop_assert_eq!(linking_sites, 1);
                    let [project, site, sample] = chain.records() else {
                        return Err(TestCaseError::fail("chain length"));
                    };
                    prop_assert_eq!(*sample, start);
                    prop_assert_eq!(store.datatype_of(*site), Some(DatatypeId::new(3)));
                    prop_assert_eq!(store.parent_of(*site), Some(*project));
                }
                Err(err) if err.is_recoverable() => prop_assert_eq!(linking_sites, 0),
                Err(_) => prop_assert!(linking_sites > 1),
            }
        }
    }

    #[test]
    fn extract_then_insert_restores_tree(tree in sorted_tree_strategy()) {
        // Several samples, each with its own finds, fan out on 1_2_4.
        for prefix in ["1_2", "1_3", "1_2_4"] {
            let path = PrefixPath::parse(prefix).unwrap();
            let (edited, moved) = extract(&tree, &path);
            prop_assert!(edited.children_of(path.target()).is_empty());

            let restored = insert(&edited, &path, moved, &AscendingRecordId).unwrap();
            prop_assert_eq!(restored.without_shadows(), tree.clone());
        }
    }

    #[test]
    fn deep_extract_moves_every_grandchild(tree in sorted_tree_strategy()) {
        let path = PrefixPath::parse("1_2_4").unwrap();
        let expected = tree
            .children_of(DatatypeId::new(2))
            .iter()
            .flat_map(|s| s.children_of(DatatypeId::new(4)).iter().map(|f| f.id))
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        let (edited, moved) = extract(&tree, &path);
        prop_assert_eq!(moved.len(), expected);
        prop_assert_eq!(edited.record_ids().len() + expected, tree.record_ids().len());
    }
}
