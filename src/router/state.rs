// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural diff and deep merge for persisted router state.

use serde_json::{Map, Value};

/// Top-level keys of `partial` whose value differs from `current`, in `partial`'s order.
pub fn changed_keys(current: &Map<String, Value>, partial: &Map<String, Value>) -> Vec<String> {
    partial
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Merge `patch` into `target`. Objects merge recursively; everything else,
/// arrays included, is replaced wholesale.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_changed_keys() {
        let current = map(json!({"a": 1, "b": {"x": [1, 2]}}));

        assert!(changed_keys(&current, &map(json!({"a": 1}))).is_empty());
        assert!(changed_keys(&current, &map(json!({"b": {"x": [1, 2]}}))).is_empty());
        assert_eq!(changed_keys(&current, &map(json!({"a": 2, "c": null}))), vec!["a", "c"]);
    }

    #[test]
    fn test_deep_merge_objects_recursively() {
        let mut target = json!({"net": {"host": "a", "port": 1}, "keep": true});
        deep_merge(&mut target, &json!({"net": {"port": 2}}));

        assert_eq!(target, json!({"net": {"host": "a", "port": 2}, "keep": true}));
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut target = json!({"peers": [1, 2, 3]});
        deep_merge(&mut target, &json!({"peers": [4]}));

        assert_eq!(target, json!({"peers": [4]}));
    }
}
