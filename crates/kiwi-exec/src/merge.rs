//! Config merging across a chain.
//!
//! A chain is ordered leaf-first. Merging folds configs from the terminal
//! primitive up to the leaf, so the leaf wins on conflicts. Maps merge
//! recursively; every other type, including arrays, is replaced whole.

use serde_json::{Map, Value};

use crate::chain::ChainLink;

/// Merge the `config` blocks of a leaf-first chain; the leaf wins.
pub fn merge_chain_configs(chain: &[ChainLink]) -> Value {
    let mut merged = Value::Object(Map::new());
    for link in chain.iter().rev() {
        if let Some(config) = link.manifest.get("config") {
            if config.is_object() {
                merged = deep_merge(merged, config.clone());
            }
        }
    }
    merged
}

/// Deep merge: `overlay` wins; maps recurse, everything else replaces.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
