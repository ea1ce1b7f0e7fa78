//! Property tests for merging and substitution.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{Map, Value};

use kiwi_exec::merge::deep_merge;
use kiwi_exec::subst::substitute_env;

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::Number(n.into())),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

fn arb_flat_map() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map("[a-e]", arb_scalar(), 0..6).prop_map(|m| {
        m.into_iter().collect()
    })
}

/// Interleaved literal text, `${VAR}` refs, and `${VAR:-default}` refs.
fn arb_subst_input() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z/]{0,6}".boxed(),
            "[A-Z]{1,3}".prop_map(|v| format!("${{{v}}}")).boxed(),
            ("[A-Z]{1,3}", "[a-z0-9]{0,4}")
                .prop_map(|(v, d)| format!("${{{v}:-{d}}}"))
                .boxed(),
        ],
        0..5,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    // For every key: the child value wins when present, else the parent's
    // survives.
    #[test]
    fn merge_child_wins_per_key(parent in arb_flat_map(), child in arb_flat_map()) {
        let merged = deep_merge(Value::Object(parent.clone()), Value::Object(child.clone()));
        let merged = merged.as_object().unwrap();

        for (key, value) in merged {
            match child.get(key) {
                Some(child_value) => prop_assert_eq!(value, child_value),
                None => prop_assert_eq!(value, parent.get(key).unwrap()),
            }
        }
        for key in parent.keys().chain(child.keys()) {
            prop_assert!(merged.contains_key(key));
        }
    }

    // Substituting an already-substituted string changes nothing when the
    // environment's own values carry no references.
    #[test]
    fn substitution_fixed_point(
        input in arb_subst_input(),
        env_pairs in proptest::collection::btree_map("[A-Z]{1,4}", "[a-z0-9/]{0,8}", 0..4),
    ) {
        let env: BTreeMap<String, String> = env_pairs;
        let once = substitute_env(&input, &env);
        let twice = substitute_env(&once, &env);
        prop_assert_eq!(once, twice);
    }

    // Merging with an empty child is the identity.
    #[test]
    fn merge_empty_child_is_identity(parent in arb_flat_map()) {
        let merged = deep_merge(Value::Object(parent.clone()), Value::Object(Map::new()));
        prop_assert_eq!(merged, Value::Object(parent));
    }
}
