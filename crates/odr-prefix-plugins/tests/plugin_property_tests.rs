use odr_prefix_core::FieldId;
use odr_prefix_plugins::filter_graph::natural_cmp;
use odr_prefix_plugins::{find_header_offset, replace_header, FileRenamer};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn renamer() -> FileRenamer {
    let options = BTreeMap::from([("field_list".to_string(), "1\nname-uuid".to_string())]);
    let directory = BTreeMap::from([("name-uuid".to_string(), FieldId::new(1))]);
    FileRenamer::from_options(&options, &directory).unwrap()
}

fn header_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9 :]{0,12}", 0..5).prop_map(|lines| {
        lines
            .iter()
            .map(|line| format!("#{line}\n"))
            .collect::<String>()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_accepted_base_filenames_are_clean(text in "\\PC{0,24}") {
        let values = BTreeMap::from([(FieldId::new(1), text)]);
        if let Ok(name) = renamer().base_filename(&values) {
            prop_assert!(!name.contains('.'));
            prop_assert!(!name.chars().any(|c| c.is_ascii_control()
                || "\\/:*?\"<>|".contains(c)));
            prop_assert!(!name.starts_with('-'));
            prop_assert_eq!(name.trim(), name.as_str());
        }
    }

    #[test]
    fn prop_replaced_header_is_found_again(
        old in header_strategy(),
        new in header_strategy(),
        body in "[a-z0-9,\n]{0,40}",
    ) {
        let content = format!("{old}{body}");
        let replaced = replace_header(content.as_bytes(), &new, "#");

        prop_assert_eq!(find_header_offset(&replaced, "#"), new.len());
        prop_assert_eq!(&replaced[new.len()..], body.as_bytes());
    }

    #[test]
    fn prop_natural_order_is_antisymmetric(a in "[a-cA-C0-9]{0,6}", b in "[a-cA-C0-9]{0,6}") {
        prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
    }
}
