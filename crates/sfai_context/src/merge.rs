//! Recursive merging of JSON configuration maps.

use serde_json::{Map, Value};

/// Merge `source` into `target`.
///
/// Recursion only happens where both sides hold an object at the same key.
/// Every other combination, including an object replacing a scalar or a
/// scalar replacing an object, overwrites the target value.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (target.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_nested_keys_are_kept() {
        let mut target = object(json!({"a": {"b": 2, "c": 3}}));
        deep_merge(&mut target, &object(json!({"a": {"b": 1}})));
        assert_eq!(Value::Object(target), json!({"a": {"b": 1, "c": 3}}));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let mut target = object(json!({"a": {"b": 1}}));
        deep_merge(&mut target, &object(json!({"a": "x"})));
        assert_eq!(Value::Object(target), json!({"a": "x"}));
    }

    #[test]
    fn test_object_replaces_scalar() {
        let mut target = object(json!({"a": "x", "keep": true}));
        deep_merge(&mut target, &object(json!({"a": {"b": 1}})));
        assert_eq!(Value::Object(target), json!({"a": {"b": 1}, "keep": true}));
    }

    #[test]
    fn test_new_keys_are_added() {
        let mut target = object(json!({"mulesoft": {"profile": "default"}}));
        deep_merge(
            &mut target,
            &object(json!({"mulesoft": {"api_id": 7}, "public_url": "https://x"})),
        );
        assert_eq!(
            Value::Object(target),
            json!({"mulesoft": {"profile": "default", "api_id": 7}, "public_url": "https://x"})
        );
    }
}
