#![forbid(unsafe_code)]

//! Structural comparison over value trees.
//!
//! `Null` and an absent value compare equal everywhere in this module: a
//! field that was never given a default is pristine while it holds `Null`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::path::{FieldPath, Segment};

/// Structural equality with numeric comparison by value (`1 == 1.0`).
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(l), Some(r)) if l == r)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// [`deep_equal`] where `None` stands for `Null`.
#[must_use]
pub fn deep_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    deep_equal(a.unwrap_or(&Value::Null), b.unwrap_or(&Value::Null))
}

/// Whether `value` counts as "no input": `Null`, `""` or an empty sequence.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn child_path(prefix: Option<&FieldPath>, segment: Segment) -> FieldPath {
    match prefix {
        Some(p) => p.join(segment),
        None => FieldPath::from_segment(segment),
    }
}

fn children(value: &Value) -> Vec<(Segment, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (Segment::from_key(k), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Segment::Index(i), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn child<'a>(value: Option<&'a Value>, segment: &Segment) -> Option<&'a Value> {
    match (value?, segment) {
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        (Value::Object(map), segment) => map.get(&segment.to_key()),
        _ => None,
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Every scalar leaf path under `value`.
#[must_use]
pub fn leaf_paths(value: &Value) -> BTreeSet<FieldPath> {
    let mut out = BTreeSet::new();
    collect_leaves(value, None, &mut out);
    out
}

fn collect_leaves(value: &Value, prefix: Option<&FieldPath>, out: &mut BTreeSet<FieldPath>) {
    for (segment, v) in children(value) {
        let path = child_path(prefix, segment);
        if is_container(v) {
            collect_leaves(v, Some(&path), out);
        } else {
            out.insert(path);
        }
    }
}

/// Leaf paths of `values` whose value differs from `defaults`.
///
/// Only leaves present in `values` are reported; a container in `values`
/// with no container counterpart in `defaults` reports every leaf under it.
#[must_use]
pub fn dirty_leaves(defaults: &Value, values: &Value) -> BTreeSet<FieldPath> {
    let mut out = BTreeSet::new();
    collect_dirty(Some(defaults), values, None, &mut out);
    out
}

fn collect_dirty(
    defaults: Option<&Value>,
    values: &Value,
    prefix: Option<&FieldPath>,
    out: &mut BTreeSet<FieldPath>,
) {
    for (segment, v) in children(values) {
        let default = child(defaults, &segment);
        let path = child_path(prefix, segment);
        if is_container(v) {
            collect_dirty(default, v, Some(&path), out);
        } else if !deep_equal_opt(default, Some(v)) {
            out.insert(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(paths: &[&str]) -> BTreeSet<FieldPath> {
        paths
            .iter()
            .map(|p| FieldPath::parse(p).expect("valid path"))
            .collect()
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(!deep_equal(&json!(1), &json!(2)));
        assert!(deep_equal(&json!({ "a": [1, { "b": 2 }] }), &json!({ "a": [1.0, { "b": 2 }] })));
        assert!(!deep_equal(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
    }

    #[test]
    fn null_matches_absent() {
        assert!(deep_equal_opt(None, Some(&Value::Null)));
        assert!(!deep_equal_opt(None, Some(&json!(""))));
    }

    #[test]
    fn emptiness() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!({})));
    }

    #[test]
    fn dirty_leaves_reports_changed_scalars() {
        let defaults = json!({ "name": "a", "tags": ["x"], "nested": { "n": 1 } });
        let values = json!({ "name": "b", "tags": ["x", "y"], "nested": { "n": 1 } });
        assert_eq!(dirty_leaves(&defaults, &values), set(&["name", "tags.1"]));
    }

    #[test]
    fn dirty_leaves_marks_new_containers_fully() {
        let defaults = json!({ "list": 3 });
        let values = json!({ "list": [{ "a": 1 }, { "a": 2 }] });
        assert_eq!(dirty_leaves(&defaults, &values), set(&["list.0.a", "list.1.a"]));
    }

    #[test]
    fn leaf_paths_walks_everything() {
        let tree = json!({ "a": [1, { "b": null }], "c": "x" });
        assert_eq!(leaf_paths(&tree), set(&["a.0", "a.1.b", "c"]));
    }
}
