#![forbid(unsafe_code)]

//! Keyed handle over one sequence-valued field.
//!
//! # Design
//!
//! A [`FieldArray`] owns one [`FieldKey`] per entry. Keys follow entries
//! through every operation, so a renderer can keep per-entry state across
//! re-orders. Each operation computes the new values with the pure
//! functions in [`fform_core::array`], hands them to the control together
//! with the [`ArrayOp`] that produced them, and replays the same op over
//! its own keys.
//!
//! Other handles bound to the same path learn about the change through the
//! array subject and replay the op too. A change with no op (a reset, or a
//! `set_value` on the array root) regenerates every key.
//!
//! # Invariants
//!
//! 1. `keys().len()` equals the length of the array value after every
//!    operation and every array notification.
//! 2. Moves and swaps preserve keys; inserted, updated and replaced entries
//!    get fresh ones.
//! 3. A handle ignores notifications it caused itself.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use fform_core::array as ops;
use fform_core::{ArrayOp, FieldKey, FieldPath, Subscription, access};
use serde_json::{Map, Value};

use crate::control::{ArrayUpdate, FormControl};
use crate::options::FocusOptions;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Replay `update` over `keys`, or regenerate them when it carries no op for
/// `name`.
fn follow(keys: &mut Vec<FieldKey>, name: &FieldPath, update: &ArrayUpdate) {
    let affected = match &update.name {
        None => true,
        Some(changed) => changed == name || changed.is_ancestor_of(name),
    };
    if !affected {
        return;
    }
    let len = access::get(&update.values, name)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    match (&update.name, &update.op) {
        (Some(changed), Some(op)) if changed == name => {
            *keys = op.apply(keys.as_slice(), FieldKey::generate);
        }
        _ => *keys = FieldKey::generate_n(len),
    }
    if keys.len() != len {
        *keys = FieldKey::generate_n(len);
    }
}

/// Handle to the field array at one path.
pub struct FieldArray {
    control: FormControl,
    name: FieldPath,
    id: u64,
    keys: Rc<RefCell<Vec<FieldKey>>>,
    _subscription: Subscription,
}

impl fmt::Debug for FieldArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldArray")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("len", &self.keys.borrow().len())
            .finish()
    }
}

impl FieldArray {
    pub(crate) fn new(control: FormControl, name: FieldPath) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let len = control
            .get_value(&name)
            .as_ref()
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let keys = Rc::new(RefCell::new(FieldKey::generate_n(len)));
        let weak: Weak<RefCell<Vec<FieldKey>>> = Rc::downgrade(&keys);
        let watched = name.clone();
        let subscription = control.subjects().array.subscribe(move |update| {
            if update.source == Some(id) {
                return;
            }
            if let Some(keys) = weak.upgrade() {
                follow(&mut keys.borrow_mut(), &watched, update);
            }
        });
        Self {
            control,
            name,
            id,
            keys,
            _subscription: subscription,
        }
    }

    #[must_use]
    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    /// Current entry values.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match self.control.get_value(&self.name) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn keys(&self) -> Vec<FieldKey> {
        self.keys.borrow().clone()
    }

    /// Entries paired with their keys.
    #[must_use]
    pub fn entries(&self) -> Vec<(FieldKey, Value)> {
        let values = self.values();
        let mut keys = self.keys.borrow_mut();
        if keys.len() != values.len() {
            *keys = FieldKey::generate_n(values.len());
        }
        keys.iter().copied().zip(values).collect()
    }

    /// Entries with their key merged in under the form's key name. A
    /// non-object entry is wrapped as `{ <key>: .., "value": .. }`.
    #[must_use]
    pub fn fields(&self) -> Vec<Value> {
        let key_name = self.control.key_name();
        self.entries()
            .into_iter()
            .map(|(key, value)| {
                let key = Value::String(key.to_string());
                match value {
                    Value::Object(mut map) => {
                        map.insert(key_name.clone(), key);
                        Value::Object(map)
                    }
                    other => {
                        let mut map = Map::new();
                        map.insert(key_name.clone(), key);
                        map.insert("value".to_string(), other);
                        Value::Object(map)
                    }
                }
            })
            .collect()
    }

    // ─── Operations ──────────────────────────────────────────────────────

    pub fn append(&self, values: Vec<Value>, focus: FocusOptions) {
        let current = self.values();
        let last = (current.len() + values.len()).saturating_sub(1);
        let op = ArrayOp::Append { count: values.len() };
        self.commit(op, ops::append(&current, values), true, self.focus_target(last, &focus));
    }

    pub fn prepend(&self, values: Vec<Value>, focus: FocusOptions) {
        let current = self.values();
        let op = ArrayOp::Prepend { count: values.len() };
        self.commit(op, ops::prepend(&current, values), true, self.focus_target(0, &focus));
    }

    /// Insert `values` before `index`; an index past the end appends.
    pub fn insert(&self, index: usize, values: Vec<Value>, focus: FocusOptions) {
        let current = self.values();
        let at = index.min(current.len());
        let op = ArrayOp::Insert {
            index,
            count: values.len(),
        };
        self.commit(op, ops::insert(&current, index, values), true, self.focus_target(at, &focus));
    }

    /// Remove the entries at `indices`, or every entry when `None`.
    /// Out-of-range indices are ignored.
    pub fn remove(&self, indices: Option<&[usize]>) {
        let current = self.values();
        let op = ArrayOp::Remove {
            indices: indices.map(<[usize]>::to_vec),
        };
        self.commit(op, ops::remove(&current, indices), true, None);
    }

    pub fn move_item(&self, from: usize, to: usize) {
        let current = self.values();
        self.commit(ArrayOp::Move { from, to }, ops::move_item(&current, from, to), true, None);
    }

    pub fn swap(&self, a: usize, b: usize) {
        let current = self.values();
        self.commit(ArrayOp::Swap { a, b }, ops::swap(&current, a, b), true, None);
    }

    /// Replace the entry at `index`. The entry gets a fresh key; per-path
    /// state below it stays where it is.
    pub fn update(&self, index: usize, value: Value) {
        let current = self.values();
        if index >= current.len() {
            return;
        }
        self.commit(ArrayOp::Update { index }, ops::update(&current, index, value), false, None);
    }

    /// Replace every entry.
    pub fn replace(&self, values: Vec<Value>) {
        let op = ArrayOp::Replace { len: values.len() };
        self.commit(op, ops::replace(values), false, None);
    }

    /// Run deferred work (array-root validation, focus) after operations.
    pub async fn settle(&self) {
        self.control.settle().await;
    }

    fn focus_target(&self, index: usize, focus: &FocusOptions) -> Option<FieldPath> {
        if !focus.should_focus {
            return None;
        }
        match &focus.focus_name {
            Some(name) => self.control.path(name).ok(),
            None => Some(self.name.child_index(focus.focus_index.unwrap_or(index))),
        }
    }

    fn commit(
        &self,
        op: ArrayOp,
        next: Vec<Value>,
        update_fields_and_state: bool,
        focus: Option<FieldPath>,
    ) {
        {
            let mut keys = self.keys.borrow_mut();
            let replayed = op.apply(keys.as_slice(), FieldKey::generate);
            *keys = if replayed.len() == next.len() {
                replayed
            } else {
                FieldKey::generate_n(next.len())
            };
        }
        if focus.is_some() {
            self.control.core_mut().names.focus = focus;
        }
        self.control
            .update_field_array(&self.name, next, op, Some(self.id), update_fields_and_state);
    }
}

impl Drop for FieldArray {
    fn drop(&mut self) {
        let should_unregister = match self.control.shared.core.try_borrow_mut() {
            Ok(mut core) => {
                match core.array_handles.get_mut(&self.name) {
                    Some(count) if *count > 1 => {
                        *count -= 1;
                        return;
                    }
                    _ => {
                        core.array_handles.remove(&self.name);
                    }
                }
                core.options.should_unregister
            }
            Err(_) => return,
        };
        if should_unregister {
            self.control
                .unregister(&self.name, crate::options::UnregisterOptions::default());
        } else if let Ok(mut core) = self.control.shared.core.try_borrow_mut() {
            core.names.array.remove(&self.name);
            core.array_rules.remove(&self.name);
        }
    }
}
