#![forbid(unsafe_code)]

//! Form Control: the aggregate that owns values, registry, state and
//! subjects for one form, and orchestrates every mutation.
//!
//! # Design
//!
//! [`FormControl`] is a cheap clonable handle to shared single-threaded
//! state (`Rc`). Mutable state lives in one `RefCell<ControlCore>`; the
//! three subjects live beside it so delivery never needs the core borrow.
//!
//! Every operation follows the same shape: borrow the core, mutate and
//! build the outgoing notifications, release the borrow, then emit and call
//! binding handles. Observers may therefore call back into the control from
//! inside a notification.
//!
//! Validation is the only suspension point. Async operations snapshot their
//! inputs, release the borrow, await the validators, then re-borrow and
//! commit only results whose path revision is unchanged.
//!
//! # Invariants
//!
//! 1. The core is never borrowed across an `.await`, a subject emission, or
//!    a call into a [`FieldHandle`].
//! 2. `is_dirty` equals `!deep_equal(values, default_values)` after every
//!    operation that reports it.
//! 3. Every key in `errors`, `dirty_fields` and `touched_fields` is, or was,
//!    registered, or lies under a field-array root.
//!
//! # Failure Modes
//!
//! - **Unregistered path**: operations that need a registered field are
//!   no-ops and report `false`/`None`.
//! - **Stale validation**: a result whose path changed while it ran is
//!   dropped and logged as `form.validate.stale`.

mod array;
mod lifecycle;
mod submit;
mod validation;
mod values;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use fform_core::compare::{deep_equal, deep_equal_opt, dirty_leaves};
use fform_core::{ArrayOp, FieldPath, PathCache, Subject, Subscription, access};
use serde_json::Value;

use crate::error::Result;
use crate::field_error::FieldErrors;
use crate::options::{DefaultValues, FormOptions};
use crate::proxy::{ProxyTracker, StateKeys, should_subscribe_by_name};
use crate::registry::{FieldHandle, FieldRegistry, Names};
use crate::revision::Revisions;
use crate::rules::RegisterOptions;
use crate::state::{FieldState, FormStateSnapshot, FormStateUpdate};

pub use submit::SubmitOutcome;
pub use values::FieldEvent;

// ─── Subject payloads ────────────────────────────────────────────────────────

/// What caused a values notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEventKind {
    Change,
    Set,
    Reset,
    Array,
    Unregister,
}

/// Payload of the values subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesUpdate {
    /// The field that changed; `None` for form-wide changes.
    pub name: Option<FieldPath>,
    pub kind: ValueEventKind,
    pub values: Value,
}

/// Payload of the array-structure subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayUpdate {
    /// The array that changed; `None` when every array may have changed.
    pub name: Option<FieldPath>,
    /// The surgery applied, when the change was a field-array operation.
    pub op: Option<ArrayOp>,
    /// Field-array handle that performed the surgery.
    pub source: Option<u64>,
    pub values: Value,
}

/// The three per-form subjects.
#[derive(Debug, Default)]
pub struct FormSubjects {
    pub state: Subject<FormStateUpdate>,
    pub values: Subject<ValuesUpdate>,
    pub array: Subject<ArrayUpdate>,
}

// ─── Core ────────────────────────────────────────────────────────────────────

/// Mutable state of one form.
///
/// `state.values` and `state.default_values` are unused here; the live trees
/// are `values` and `default_values` and are spliced in by
/// [`ControlCore::snapshot`].
pub(crate) struct ControlCore {
    pub(crate) options: FormOptions,
    pub(crate) values: Value,
    pub(crate) default_values: Value,
    pub(crate) state: FormStateSnapshot,
    pub(crate) registry: FieldRegistry,
    pub(crate) names: Names,
    /// Rules for field-array roots, validated at `<root>.root`.
    pub(crate) array_rules: BTreeMap<FieldPath, RegisterOptions>,
    /// Live [`FieldArray`](crate::FieldArray) handles per array root.
    pub(crate) array_handles: BTreeMap<FieldPath, usize>,
    pub(crate) paths: PathCache,
    pub(crate) revisions: Revisions,
    /// Deferred work run by [`FormControl::settle`].
    pub(crate) pending: Pending,
}

#[derive(Debug, Default)]
pub(crate) struct Pending {
    pub(crate) valid: bool,
    pub(crate) arrays: BTreeSet<FieldPath>,
}

impl ControlCore {
    fn new(options: FormOptions) -> Self {
        let (defaults, is_loading) = match &options.default_values {
            DefaultValues::Value(v) => (v.clone(), false),
            DefaultValues::Async(_) => (Value::Object(serde_json::Map::new()), true),
        };
        let default_values = options.values.clone().unwrap_or(defaults);
        let state = FormStateSnapshot {
            disabled: options.disabled,
            is_loading,
            ..FormStateSnapshot::default()
        };
        Self {
            values: default_values.clone(),
            default_values,
            state,
            registry: FieldRegistry::new(),
            names: Names::default(),
            array_rules: BTreeMap::new(),
            array_handles: BTreeMap::new(),
            paths: PathCache::new(),
            revisions: Revisions::default(),
            pending: Pending::default(),
            options,
        }
    }

    pub(crate) fn snapshot(&self) -> FormStateSnapshot {
        let mut snapshot = self.state.clone();
        snapshot.values = self.values.clone();
        snapshot.default_values = self.default_values.clone();
        snapshot
    }

    /// Stamp a write at `path` for stale-result detection.
    pub(crate) fn bump(&mut self, path: &FieldPath) {
        let below = self.registry.paths_under(path);
        self.revisions.bump(path, &below);
    }

    /// Write `value` at `path` and refresh registry mirrors. Returns the
    /// binding writes to perform once the borrow is released.
    pub(crate) fn write_value(&mut self, path: &FieldPath, value: Value) -> HandleWrites {
        access::set(&mut self.values, path, value);
        self.bump(path);
        self.registry.sync_values(&self.values, None)
    }

    /// Recompute `dirty_fields` below `path`, and `is_dirty`.
    pub(crate) fn refresh_dirty_under(&mut self, path: &FieldPath) {
        self.state.dirty_fields.retain(|p| !p.starts_with_path(path));
        let value = access::get(&self.values, path);
        let default = access::get(&self.default_values, path);
        match value {
            Some(v @ (Value::Object(_) | Value::Array(_))) => {
                let base = default.cloned().unwrap_or(Value::Null);
                self.state.dirty_fields.extend(
                    dirty_leaves(&base, v)
                        .into_iter()
                        .map(|rel| path.concat(rel.segments())),
                );
            }
            _ => {
                if !deep_equal_opt(default, value) {
                    self.state.dirty_fields.insert(path.clone());
                }
            }
        }
        self.refresh_is_dirty();
    }

    pub(crate) fn refresh_dirty_all(&mut self) {
        self.state.dirty_fields = dirty_leaves(&self.default_values, &self.values);
        self.refresh_is_dirty();
    }

    pub(crate) fn refresh_is_dirty(&mut self) {
        self.state.is_dirty = !deep_equal(&self.values, &self.default_values);
    }

    pub(crate) fn is_registered(&self, path: &FieldPath) -> bool {
        self.registry.contains(path) || self.names.array.contains(path)
    }
}

impl fmt::Debug for ControlCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlCore")
            .field("values", &self.values)
            .field("fields", &self.registry.len())
            .field("arrays", &self.names.array)
            .finish_non_exhaustive()
    }
}

pub(crate) type HandleWrites = Vec<(Rc<dyn FieldHandle>, Value)>;

pub(crate) fn apply_handle_writes(writes: HandleWrites) {
    for (handle, value) in writes {
        handle.write_value(&value);
    }
}

pub(crate) struct Shared {
    pub(crate) core: RefCell<ControlCore>,
    pub(crate) subjects: FormSubjects,
    /// Union of every consumer's observed keys.
    pub(crate) proxy: ProxyTracker,
}

// ─── FormControl ─────────────────────────────────────────────────────────────

/// Handle to one form's engine. Clones share the same form.
#[derive(Clone)]
pub struct FormControl {
    pub(crate) shared: Rc<Shared>,
}

impl fmt::Debug for FormControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.core.try_borrow() {
            Ok(core) => f.debug_tuple("FormControl").field(&*core).finish(),
            Err(_) => f.write_str("FormControl(<borrowed>)"),
        }
    }
}

impl Default for FormControl {
    fn default() -> Self {
        Self::new(FormOptions::default())
    }
}

impl FormControl {
    #[must_use]
    pub fn new(options: FormOptions) -> Self {
        let mut core = ControlCore::new(options);
        core.refresh_dirty_all();
        Self {
            shared: Rc::new(Shared {
                core: RefCell::new(core),
                subjects: FormSubjects::default(),
                proxy: ProxyTracker::new(),
            }),
        }
    }

    pub(crate) fn core(&self) -> Ref<'_, ControlCore> {
        self.shared.core.borrow()
    }

    pub(crate) fn core_mut(&self) -> RefMut<'_, ControlCore> {
        self.shared.core.borrow_mut()
    }

    pub(crate) fn emit_state(&self, update: FormStateUpdate) {
        self.shared.subjects.state.next(update);
    }

    pub(crate) fn emit_values(&self, name: Option<FieldPath>, kind: ValueEventKind) {
        let values = self.core().values.clone();
        self.shared
            .subjects
            .values
            .next(ValuesUpdate { name, kind, values });
    }

    /// Parse `path` once per distinct string for this form.
    pub fn path(&self, path: &str) -> Result<FieldPath> {
        Ok(self.core_mut().paths.get_or_parse(path)?)
    }

    #[must_use]
    pub fn subjects(&self) -> &FormSubjects {
        &self.shared.subjects
    }

    #[must_use]
    pub fn key_name(&self) -> String {
        self.core().options.key_name.clone()
    }

    /// Mark `keys` as observed at form level, enabling their lazy upkeep.
    pub fn observe(&self, keys: StateKeys) {
        self.shared.proxy.mark(keys);
    }

    #[must_use]
    pub fn observed(&self) -> StateKeys {
        self.shared.proxy.observed()
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    /// The whole value tree.
    #[must_use]
    pub fn get_values(&self) -> Value {
        self.core().values.clone()
    }

    /// Value at `path`, if present.
    #[must_use]
    pub fn get_value(&self, path: &FieldPath) -> Option<Value> {
        access::get(&self.core().values, path).cloned()
    }

    #[must_use]
    pub fn get_default_values(&self) -> Value {
        self.core().default_values.clone()
    }

    /// Untracked copy of the whole form state.
    #[must_use]
    pub fn get_form_state(&self) -> FormStateSnapshot {
        self.core().snapshot()
    }

    #[must_use]
    pub fn get_field_state(&self, path: &FieldPath) -> FieldState {
        let core = self.core();
        let under = |set: &BTreeSet<FieldPath>| set.iter().any(|p| p.starts_with_path(path));
        FieldState {
            invalid: core.state.errors.has_under(path),
            is_dirty: under(&core.state.dirty_fields),
            is_touched: under(&core.state.touched_fields),
            is_validating: under(&core.state.validating_fields),
            error: core.state.errors.get(path).cloned(),
        }
    }

    #[must_use]
    pub fn errors(&self) -> FieldErrors {
        self.core().state.errors.clone()
    }

    #[must_use]
    pub fn is_registered(&self, path: &FieldPath) -> bool {
        self.core().registry.contains(path)
    }

    /// Number of field descriptors.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.core().registry.len()
    }

    // ─── Subscriptions ───────────────────────────────────────────────────

    /// Raw state-subject subscription.
    pub fn subscribe_state(&self, callback: impl Fn(&FormStateUpdate) + 'static) -> Subscription {
        self.shared.subjects.state.subscribe(callback)
    }

    /// Raw values-subject subscription.
    pub fn subscribe_values(&self, callback: impl Fn(&ValuesUpdate) + 'static) -> Subscription {
        self.shared.subjects.values.subscribe(callback)
    }

    /// Push the value at `path` to `callback` whenever a change overlaps it.
    pub fn watch_field(
        &self,
        path: &FieldPath,
        callback: impl Fn(Option<&Value>) + 'static,
    ) -> Subscription {
        self.core_mut().names.watch.insert(path.clone());
        let watched = [path.clone()];
        self.shared.subjects.values.subscribe(move |update| {
            if should_subscribe_by_name(&watched, update.name.as_ref(), false) {
                callback(access::get(&update.values, &watched[0]));
            }
        })
    }

    /// Current value at `path`, marking it watched.
    pub fn watch(&self, path: &FieldPath) -> Value {
        let mut core = self.core_mut();
        core.names.watch.insert(path.clone());
        access::get(&core.values, path).cloned().unwrap_or(Value::Null)
    }

    /// The whole value tree, marking every field watched.
    pub fn watch_all(&self) -> Value {
        let mut core = self.core_mut();
        core.names.watch_all = true;
        core.values.clone()
    }

    // ─── Deferred work ───────────────────────────────────────────────────

    /// Run deferred post-mutation work: field-array root validation, pending
    /// focus, and the validity refresh.
    pub async fn settle(&self) {
        let arrays: Vec<FieldPath> = {
            let mut core = self.core_mut();
            std::mem::take(&mut core.pending.arrays).into_iter().collect()
        };
        for array in arrays {
            self.validate_array_root(&array).await;
        }
        self.focus_pending();
        let valid_pending = std::mem::take(&mut self.core_mut().pending.valid);
        if valid_pending {
            self.update_valid(false).await;
        }
    }

    fn focus_pending(&self) {
        let target = self.core_mut().names.focus.take();
        if let Some(path) = target {
            self.focus_under(&path);
        }
    }

    /// Focus the earliest-registered field at or below `path`.
    pub(crate) fn focus_under(&self, path: &FieldPath) -> bool {
        let handles: Vec<Rc<dyn FieldHandle>> = {
            let core = self.core();
            let mut fields: Vec<_> = core
                .registry
                .iter()
                .filter(|(p, d)| p.starts_with_path(path) && d.mount)
                .map(|(_, d)| d)
                .collect();
            fields.sort_by_key(|d| d.seq());
            fields.iter().filter_map(|d| d.handle()).collect()
        };
        handles.iter().any(|h| h.focus())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn construction_uses_defaults_then_controlled_values() {
        let form = FormControl::new(FormOptions::new().default_values(json!({ "a": 1 })));
        assert_eq!(form.get_values(), json!({ "a": 1 }));
        assert!(!form.get_form_state().is_dirty);

        let form = FormControl::new(
            FormOptions::new()
                .default_values(json!({ "a": 1 }))
                .values(json!({ "a": 2 })),
        );
        assert_eq!(form.get_values(), json!({ "a": 2 }));
        assert_eq!(form.get_default_values(), json!({ "a": 2 }));
    }

    #[test]
    fn async_defaults_start_loading() {
        let form = FormControl::new(
            FormOptions::new().async_default_values(|| async { json!({ "a": 1 }) }.boxed_local()),
        );
        assert!(form.get_form_state().is_loading);
        assert_eq!(form.get_values(), json!({}));
    }

    #[test]
    fn path_cache_is_per_form() {
        let form = FormControl::default();
        let first = form.path("a.b[0]").expect("valid path");
        let again = form.path("a.b[0]").expect("valid path");
        assert_eq!(first, again);
        assert_eq!(form.core().paths.hits(), 1);
        assert!(form.path("a..b").is_err());
    }

    #[test]
    fn refresh_dirty_under_tracks_leaves() {
        let form = FormControl::new(
            FormOptions::new().default_values(json!({ "user": { "name": "a", "age": 1 } })),
        );
        {
            let mut core = form.core_mut();
            access::set(&mut core.values, &p("user.name"), json!("b"));
            core.refresh_dirty_under(&p("user"));
        }
        let state = form.get_form_state();
        assert!(state.is_dirty);
        assert_eq!(state.dirty_fields, BTreeSet::from([p("user.name")]));

        {
            let mut core = form.core_mut();
            access::set(&mut core.values, &p("user.name"), json!("a"));
            core.refresh_dirty_under(&p("user.name"));
        }
        let state = form.get_form_state();
        assert!(!state.is_dirty);
        assert!(state.dirty_fields.is_empty());
    }

    #[test]
    fn watch_field_filters_by_overlap() {
        let form = FormControl::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = form.watch_field(&p("user.name"), move |v| {
            sink.borrow_mut().push(v.cloned());
        });
        form.core_mut().values = json!({ "user": { "name": "x" } });
        form.emit_values(Some(p("user")), ValueEventKind::Set);
        form.emit_values(Some(p("other")), ValueEventKind::Set);
        form.emit_values(None, ValueEventKind::Reset);
        assert_eq!(*seen.borrow(), vec![Some(json!("x")), Some(json!("x"))]);
    }

    #[test]
    fn unregister_forgets_revisions_below_the_path() {
        let form = FormControl::new(FormOptions::new().default_values(json!({ "rows": {} })));
        for i in 0..20 {
            let path = p(&format!("rows.r{i}.name"));
            let _ = form.register(&path, crate::rules::RegisterOptions::new());
            form.core_mut().bump(&path);
        }
        let before = form.core().revisions.tracked();
        assert!(form.unregister(&p("rows"), crate::options::UnregisterOptions::default()));
        let after = form.core().revisions.tracked();
        assert!(after < before);
        assert_eq!(after, 1);
    }
}
