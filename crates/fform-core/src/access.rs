#![forbid(unsafe_code)]

//! Reading and writing a value tree at a [`FieldPath`].
//!
//! The value tree is a [`serde_json::Value`]: mappings are objects, sequences
//! are arrays, everything else is a leaf.
//!
//! # Invariants
//!
//! 1. [`get`] never fails: a missing intermediate segment is an ordinary
//!    `None`.
//! 2. A `Null` sequence slot is a hole and reads as absent, so
//!    `get_or(tree, p, d)` after `unset(tree, p)` is `d`.
//! 3. After `set(tree, p, v)`, `get_or(tree, p, Value::Null) == v`.
//! 4. [`set`] creates a sequence for an index segment and a mapping for a key
//!    segment whenever the existing container is absent or of the wrong kind.
//! 5. [`unset`] on a sequence slot leaves a hole so sibling indices stay
//!    stable; containers left empty (or all holes) are pruned upward,
//!    stopping at the root.
//!
//! # Failure Modes
//!
//! - An index above [`MAX_INDEX`] never allocates: [`set`] leaves the tree
//!   unchanged. Parsed paths cannot carry one; hand-built segments can.

use serde_json::{Map, Value};

use crate::path::{FieldPath, MAX_INDEX, Segment};

/// Borrow the value at `path`, if every segment resolves to something other
/// than a hole.
#[must_use]
pub fn get<'a>(tree: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| step(node, segment))
}

/// Clone of the value at `path`, or `default` when absent.
#[must_use]
pub fn get_or(tree: &Value, path: &FieldPath, default: Value) -> Value {
    get(tree, path).cloned().unwrap_or(default)
}

/// Mutable borrow of the slot at `path`, if it exists. Holes are returned
/// as `Null` so callers can fill them.
pub fn get_mut<'a>(tree: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = step_mut(node, segment)?;
    }
    Some(node)
}

fn step<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (node, segment) {
        (Value::Array(items), Segment::Index(i)) => items.get(*i).filter(|v| !v.is_null()),
        (Value::Object(map), segment) => map.get(&segment.to_key()),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Array(items), Segment::Index(i)) => items.get_mut(*i),
        (Value::Object(map), segment) => map.get_mut(&segment.to_key()),
        _ => None,
    }
}

/// Write `value` at `path`, creating intermediate containers as needed.
pub fn set(tree: &mut Value, path: &FieldPath, value: Value) {
    let segments = path.segments();
    let oversized = segments
        .iter()
        .any(|segment| matches!(segment, Segment::Index(i) if *i > MAX_INDEX));
    if oversized {
        tracing::debug!(message = "access.set.oversized", path = %path);
        return;
    }
    let mut node = tree;
    for (depth, segment) in segments.iter().enumerate() {
        let is_last = depth + 1 == segments.len();
        let slot = slot_mut(node, segment);
        if is_last {
            *slot = value;
            return;
        }
        node = slot;
    }
}

/// Make `node` a container able to hold `segment`, returning the child slot.
/// Indices are bounded by [`MAX_INDEX`] before this is reached.
fn slot_mut<'a>(node: &'a mut Value, segment: &Segment) -> &'a mut Value {
    ensure_container(node, segment);
    match (node, segment) {
        (Value::Array(items), Segment::Index(i)) => {
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            &mut items[*i]
        }
        (Value::Object(map), segment) => map.entry(segment.to_key()).or_insert(Value::Null),
        // ensure_container guarantees one of the arms above.
        (node, _) => node,
    }
}

fn ensure_container(node: &mut Value, next: &Segment) {
    let fits = match (&*node, next) {
        (Value::Array(_), Segment::Index(_)) => true,
        (Value::Object(_), _) => true,
        _ => false,
    };
    if !fits {
        *node = match next {
            Segment::Index(_) => Value::Array(Vec::new()),
            Segment::Key(_) => Value::Object(Map::new()),
        };
    }
}

/// Remove the leaf at `path`, returning it, and prune emptied ancestors.
pub fn unset(tree: &mut Value, path: &FieldPath) -> Option<Value> {
    let removed = match path.parent() {
        None => remove_child(tree, path.last()),
        Some(parent) => remove_child(get_mut(tree, &parent)?, path.last()),
    }?;
    let mut cursor = path.parent();
    while let Some(container) = cursor {
        let prune = get(tree, &container).is_some_and(is_vacant);
        if !prune {
            break;
        }
        match container.parent() {
            None => {
                remove_child(tree, container.last());
            }
            Some(parent) => {
                if let Some(holder) = get_mut(tree, &parent) {
                    remove_child(holder, container.last());
                }
            }
        }
        cursor = container.parent();
    }
    Some(removed)
}

fn remove_child(node: &mut Value, segment: &Segment) -> Option<Value> {
    match (node, segment) {
        (Value::Array(items), Segment::Index(i)) => {
            let slot = items.get_mut(*i)?;
            Some(std::mem::replace(slot, Value::Null))
        }
        (Value::Object(map), segment) => map.remove(&segment.to_key()),
        _ => None,
    }
}

fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.iter().all(Value::is_null),
        _ => false,
    }
}
