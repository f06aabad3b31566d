use odr_prefix_core::{DatatypeId, DescendantPolicy, Edge, IntegrityIssue, PrefixPath, SchemaGraph};
use proptest::prelude::*;
use std::collections::BTreeSet;

const MAX_DATATYPES: u32 = 9;
const MAX_EDGES: usize = 24;

#[derive(Debug, Clone)]
struct SchemaCase {
    edges: Vec<Edge>,
    target: u32,
}

/// Random DAGs: edges always run from a lower id to a higher one.
fn schema_case_strategy() -> impl Strategy<Value = SchemaCase> {
    (2u32..=MAX_DATATYPES).prop_flat_map(|count| {
        (
            prop::collection::vec(
                (0u32..count, 0u32..count, any::<bool>(), any::<bool>()),
                0..=MAX_EDGES,
            ),
            0u32..count,
        )
            .prop_map(|(raw, target)| SchemaCase {
                edges: raw
                    .into_iter()
                    .filter(|(a, d, _, _)| a < d)
                    .map(|(a, d, is_link, multiple_allowed)| Edge {
                        ancestor: DatatypeId::new(a),
                        descendant: DatatypeId::new(d),
                        is_link,
                        multiple_allowed,
                    })
                    .collect(),
                target,
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn enumerated_paths_validate_and_end_at_target(case in schema_case_strategy()) {
        let graph = SchemaGraph::build(case.edges.clone());
        let target = DatatypeId::new(case.target);
        let paths = PrefixPath::all_paths_to(&graph, target);

        prop_assert!(paths.contains(&PrefixPath::single(target)));
        let ancestors = graph.ancestors_of(target);
        for path in &paths {
            prop_assert!(path.validate(&graph).is_ok());
            prop_assert_eq!(path.target(), target);
            prop_assert!(path.root() == target || ancestors.contains(&path.root()));
            prop_assert_eq!(PrefixPath::parse(&path.to_string()).unwrap(), path.clone());
        }

        let unique: BTreeSet<_> = paths.iter().cloned().collect();
        prop_assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn injected_non_edge_fails_validation(case in schema_case_strategy(), a in 0u32..MAX_DATATYPES, d in 0u32..MAX_DATATYPES) {
        let graph = SchemaGraph::build(case.edges.clone());
        let (a, d) = (DatatypeId::new(a), DatatypeId::new(d));
        prop_assume!(graph.edge(a, d).is_none());

        let bad = PrefixPath::from_ids([a, d]).unwrap();
        prop_assert!(bad.validate(&graph).is_err());
    }

    #[test]
    fn every_ancestor_reaches_the_target(case in schema_case_strategy()) {
        let graph = SchemaGraph::build(case.edges.clone());
        let target = DatatypeId::new(case.target);
        for ancestor in graph.ancestors_of(target) {
            prop_assert!(graph
                .descendants_of(ancestor, DescendantPolicy::IncludeMultiple)
                .contains(&target));
        }
        let has_cycle = graph
            .issues()
            .iter()
            .any(|issue| matches!(issue, IntegrityIssue::Cycle { .. }));
        prop_assert!(!has_cycle);
    }
}
