use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use repodata_overlay::patch::{PatchCollector, PatchOperation, PatchSet};
use repodata_overlay::store::{Entry, OverlayStore};
use repodata_overlay::views::OverlayView;
use serde_json::{json, Value};

const SECTION: &str = "packages.conda";

fn key_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-f]-1-0\\.conda")
        .unwrap_or_else(|e| panic!("regex failed: {e}"))
}

fn baseline_strategy() -> impl Strategy<Value = BTreeMap<String, u8>> {
    prop::collection::btree_map(key_strategy(), any::<u8>(), 0..5)
}

fn document(records: &BTreeMap<String, u8>) -> Value {
    let section: serde_json::Map<String, Value> = records
        .iter()
        .map(|(k, n)| (k.clone(), json!({"name": k, "build_number": n, "license": "MIT"})))
        .collect();
    json!({ SECTION: section })
}

fn apply(baseline: &Value, operations: Vec<PatchOperation>) -> OverlayStore {
    let patch = PatchSet {
        from: "a".to_string(),
        to: "b".to_string(),
        patch: operations,
    };
    PatchCollector::new(baseline, usize::MAX)
        .apply(&OverlayStore::new(), [&patch])
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn additions_union_with_baseline(
        base in baseline_strategy(),
        added in prop::collection::btree_map(key_strategy(), any::<u8>(), 0..5),
    ) {
        let baseline = document(&base);
        let operations = added
            .iter()
            .map(|(k, n)| PatchOperation::add(format!("/{SECTION}/{k}"), json!({"added": n})))
            .collect();
        let overlay = apply(&baseline, operations);
        let view = OverlayView::new(&baseline, &overlay);

        let listed: Vec<&str> = view.enumerate(SECTION).map(|(k, _)| k).collect();
        let unique: BTreeSet<&str> = listed.iter().copied().collect();
        prop_assert_eq!(listed.len(), unique.len());

        let expected: BTreeSet<&str> = base.keys().chain(added.keys()).map(String::as_str).collect();
        prop_assert_eq!(unique, expected);

        for (key, n) in &added {
            prop_assert_eq!(view.lookup(SECTION, key), Some(&json!({"added": n})));
        }
    }

    #[test]
    fn removed_records_never_listed(
        base in baseline_strategy(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let baseline = document(&base);
        let keys: Vec<&String> = base.keys().collect();
        let removed: BTreeSet<&String> = if keys.is_empty() {
            BTreeSet::new()
        } else {
            picks.iter().map(|i| *i.get(&keys)).collect()
        };
        let operations = removed
            .iter()
            .map(|k| PatchOperation::remove(format!("/{SECTION}/{k}")))
            .collect();
        let overlay = apply(&baseline, operations);
        let view = OverlayView::new(&baseline, &overlay);

        for key in &removed {
            prop_assert!(view.lookup(SECTION, key).is_none());
            prop_assert!(view.enumerate(SECTION).all(|(k, _)| k != key.as_str()));
        }
        prop_assert_eq!(view.enumerate(SECTION).count(), base.len() - removed.len());
    }

    #[test]
    fn field_patch_changes_only_that_field(
        base in baseline_strategy().prop_filter("needs a record", |b| !b.is_empty()),
        pick in any::<prop::sample::Index>(),
        license in "[A-Z]{2,6}",
    ) {
        let baseline = document(&base);
        let keys: Vec<&String> = base.keys().collect();
        let key = *pick.get(&keys);

        let overlay = apply(
            &baseline,
            vec![PatchOperation::replace(format!("/{SECTION}/{key}/license"), json!(license))],
        );
        let view = OverlayView::new(&baseline, &overlay);

        let mut expected = baseline[SECTION][key.as_str()].clone();
        expected["license"] = json!(license);
        prop_assert_eq!(view.lookup(SECTION, key), Some(&expected));
        prop_assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn applying_twice_is_deterministic(
        base in baseline_strategy(),
        added in prop::collection::btree_map(key_strategy(), any::<u8>(), 0..4),
        fields in prop::collection::vec((key_strategy(), any::<u8>()), 0..4),
    ) {
        let baseline = document(&base);
        let mut operations: Vec<PatchOperation> = added
            .iter()
            .map(|(k, n)| PatchOperation::add(format!("/{SECTION}/{k}"), json!({"added": n})))
            .collect();
        for (key, n) in &fields {
            if base.contains_key(key) || added.contains_key(key) {
                operations.push(PatchOperation::add(format!("/{SECTION}/{key}/extra"), json!(n)));
            }
        }

        let first = apply(&baseline, operations.clone());
        let second = apply(&baseline, operations);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.byte_size(), second.byte_size());
    }

    #[test]
    fn put_then_tombstone_round_trip(key in key_strategy(), n in any::<u8>()) {
        let baseline = document(&BTreeMap::from([(key.clone(), 0u8)]));
        let mut overlay = OverlayStore::new();
        overlay.put(SECTION, &key, Entry::Present(json!({"n": n})));
        prop_assert_eq!(
            OverlayView::new(&baseline, &overlay).lookup(SECTION, &key),
            Some(&json!({"n": n}))
        );

        overlay.put(SECTION, &key, Entry::Deleted);
        prop_assert!(OverlayView::new(&baseline, &overlay).lookup(SECTION, &key).is_none());
    }
}
