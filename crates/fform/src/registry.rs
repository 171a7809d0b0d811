#![forbid(unsafe_code)]

//! Field Registry and Names Registry.
//!
//! # Design
//!
//! The registry is a flat `BTreeMap` keyed by [`FieldPath`]. Path ordering
//! keeps every subtree contiguous, so "all fields under `p`" is a range scan
//! and re-keying a field array touches only its own slice.
//!
//! Descriptors hold the binding's control handle weakly: the binding owns
//! its control, and a dropped control simply stops receiving writes.
//!
//! # Invariants
//!
//! 1. At most one descriptor per path.
//! 2. `seq` is assigned once at first registration and survives merges and
//!    field-array re-keying, so it orders fields by registration.
//! 3. Re-keying with an [`ArrayOp`] moves every entry below the array root
//!    to where [`ArrayOp::map_index`] sends its index; entries whose index
//!    does not survive are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use fform_core::{ArrayOp, FieldPath, Segment, access};
use serde_json::Value;

use crate::rules::RegisterOptions;

/// The binding-side control a field is attached to.
///
/// Every method has a no-op default so bindings implement only what their
/// control supports.
pub trait FieldHandle {
    /// Move input focus here. Returns false if the control cannot take focus.
    fn focus(&self) -> bool {
        false
    }

    /// Select the control's contents.
    fn select(&self) {}

    fn set_disabled(&self, _disabled: bool) {}

    /// Reflect a value written by the form.
    fn write_value(&self, _value: &Value) {}
}

/// Registration record for one field path.
pub struct FieldDescriptor {
    pub name: FieldPath,
    pub rules: RegisterOptions,
    handle: Option<Weak<dyn FieldHandle>>,
    /// Last value written to this field.
    pub value: Value,
    pub mount: bool,
    pub disabled: bool,
    pub(crate) seq: u64,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: FieldPath, rules: RegisterOptions, seq: u64) -> Self {
        let disabled = rules.disabled.unwrap_or(false);
        Self {
            name,
            rules,
            handle: None,
            value: Value::Null,
            mount: true,
            disabled,
            seq,
        }
    }

    /// Attach the binding's control. Only a weak reference is kept.
    pub fn attach(&mut self, handle: &Rc<dyn FieldHandle>) {
        self.handle = Some(Rc::downgrade(handle));
    }

    pub fn detach(&mut self) {
        self.handle = None;
    }

    /// The attached control, if it is still alive.
    #[must_use]
    pub fn handle(&self) -> Option<Rc<dyn FieldHandle>> {
        self.handle.as_ref().and_then(Weak::upgrade)
    }

    /// Registration order.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("mount", &self.mount)
            .field("disabled", &self.disabled)
            .field("attached", &self.handle().is_some())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Every registered field, keyed by path.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: BTreeMap<FieldPath, FieldDescriptor>,
    next_seq: u64,
}

impl FieldRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.fields.contains_key(path)
    }

    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&FieldDescriptor> {
        self.fields.get(path)
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut FieldDescriptor> {
        self.fields.get_mut(path)
    }

    /// Insert a fresh descriptor, or merge `rules` into the existing one.
    /// Returns true when the path was new.
    pub fn upsert(&mut self, path: &FieldPath, rules: RegisterOptions) -> bool {
        if let Some(existing) = self.fields.get_mut(path) {
            if let Some(disabled) = rules.disabled {
                existing.disabled = disabled;
            }
            existing.rules.merge(rules);
            existing.mount = true;
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.fields
            .insert(path.clone(), FieldDescriptor::new(path.clone(), rules, seq));
        true
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<FieldDescriptor> {
        self.fields.remove(path)
    }

    /// Remove `path` and every descriptor below it.
    pub fn remove_under(&mut self, path: &FieldPath) -> Vec<FieldDescriptor> {
        let keys = self.paths_under(path);
        keys.iter().filter_map(|k| self.fields.remove(k)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldDescriptor)> {
        self.fields.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.fields.keys()
    }

    /// `path` itself, if registered, and every registered path below it.
    #[must_use]
    pub fn paths_under(&self, path: &FieldPath) -> Vec<FieldPath> {
        self.fields
            .range(path.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with_path(path))
            .cloned()
            .collect()
    }

    /// Refresh each descriptor at or below `under` (everything when `None`)
    /// from the value tree, returning the handles to notify.
    pub fn sync_values(
        &mut self,
        values: &Value,
        under: Option<&FieldPath>,
    ) -> Vec<(Rc<dyn FieldHandle>, Value)> {
        let mut writes = Vec::new();
        for (path, descriptor) in &mut self.fields {
            if under.is_some_and(|u| !path.starts_with_path(u)) {
                continue;
            }
            let current = access::get(values, path).cloned().unwrap_or(Value::Null);
            if descriptor.value != current {
                descriptor.value = current.clone();
                if let Some(handle) = descriptor.handle() {
                    writes.push((handle, current));
                }
            }
        }
        writes
    }

    /// Re-key every descriptor below `array` after `op` ran over `len` entries.
    pub fn rekey(&mut self, array: &FieldPath, op: &ArrayOp, len: usize) {
        rekey_map(&mut self.fields, array, op, len);
        for (path, descriptor) in &mut self.fields {
            if array.is_ancestor_of(path) {
                descriptor.name = path.clone();
            }
        }
    }
}

/// Where `path` lands after `op` re-orders the array at `array`.
///
/// Paths outside the array, or below it through a non-index segment, are
/// returned unchanged. `None` means the entry was removed or replaced.
#[must_use]
pub fn rekey_path(path: &FieldPath, array: &FieldPath, op: &ArrayOp, len: usize) -> Option<FieldPath> {
    let Some(rest) = path.strip_prefix(array) else {
        return Some(path.clone());
    };
    match rest.split_first() {
        Some((Segment::Index(i), tail)) => {
            let moved = op.map_index(*i, len)?;
            Some(array.child_index(moved).concat(tail))
        }
        _ => Some(path.clone()),
    }
}

/// Re-key the entries of `map` that live below `array`.
pub(crate) fn rekey_map<V>(
    map: &mut BTreeMap<FieldPath, V>,
    array: &FieldPath,
    op: &ArrayOp,
    len: usize,
) {
    let moved: Vec<(FieldPath, V)> = {
        let keys: Vec<FieldPath> = map
            .keys()
            .filter(|k| array.is_ancestor_of(k))
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|k| map.remove(&k).map(|v| (k, v)))
            .collect()
    };
    for (path, value) in moved {
        if let Some(target) = rekey_path(&path, array, op, len) {
            map.insert(target, value);
        }
    }
}

/// Re-key the members of `set` that live below `array`.
pub(crate) fn rekey_set(set: &mut BTreeSet<FieldPath>, array: &FieldPath, op: &ArrayOp, len: usize) {
    let below: Vec<FieldPath> = set
        .iter()
        .filter(|k| array.is_ancestor_of(k))
        .cloned()
        .collect();
    for path in &below {
        set.remove(path);
    }
    set.extend(
        below
            .iter()
            .filter_map(|p| rekey_path(p, array, op, len)),
    );
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// Path classifications used to scope notifications and focus.
#[derive(Debug, Clone, Default)]
pub struct Names {
    /// Currently registered and mounted fields.
    pub mount: BTreeSet<FieldPath>,
    /// Field-array roots.
    pub array: BTreeSet<FieldPath>,
    pub disabled: BTreeSet<FieldPath>,
    /// Paths read through `watch`.
    pub watch: BTreeSet<FieldPath>,
    /// `watch()` with no names was called.
    pub watch_all: bool,
    /// Field to focus once the current mutation settles.
    pub focus: Option<FieldPath>,
}

impl Names {
    /// The field-array root strictly above `path`, nearest first.
    #[must_use]
    pub fn array_root_of(&self, path: &FieldPath) -> Option<&FieldPath> {
        path.ancestors()
            .find_map(|ancestor| self.array.get(&ancestor))
    }

    /// Whether `path` is a field-array root or lives inside one.
    #[must_use]
    pub fn is_array_covered(&self, path: &FieldPath) -> bool {
        self.array.contains(path) || self.array_root_of(path).is_some()
    }

    /// Whether a change at `path` is visible to a `watch` call.
    #[must_use]
    pub fn is_watched(&self, path: &FieldPath) -> bool {
        self.watch_all || self.watch.iter().any(|w| w.overlaps(path))
    }
}
