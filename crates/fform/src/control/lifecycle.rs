#![forbid(unsafe_code)]

//! Registration, unregistration, reset and disabled-state transitions.

use std::rc::Rc;

use fform_core::{FieldPath, access};
use serde_json::Value;

use super::{FormControl, ValueEventKind, apply_handle_writes};
use crate::options::{KeepStateOptions, ResetFieldOptions, UnregisterOptions};
use crate::registration::FieldRegistration;
use crate::registry::FieldHandle;
use crate::rules::RegisterOptions;
use crate::state::FormStateUpdate;

impl FormControl {
    /// Register the field at `path`, or merge `options` into its existing
    /// registration.
    ///
    /// A new field takes, in order: its current value, `options.value`, or
    /// its default value. Registering never overwrites a current value.
    pub fn register(&self, path: &FieldPath, options: RegisterOptions) -> FieldRegistration {
        let (writes, disabled_change) = {
            let mut core = self.core_mut();
            let previous = core.registry.get(path).map(|d| d.disabled);
            let initial = options.value.clone();
            let explicit_disabled = options.disabled;
            let form_disabled = core.options.disabled;
            let is_new = core.registry.upsert(path, options);
            core.names.mount.insert(path.clone());

            let mut writes = Vec::new();
            let mut disabled_change = None;
            if is_new {
                if access::get(&core.values, path).is_none() {
                    let init =
                        initial.or_else(|| access::get(&core.default_values, path).cloned());
                    if let Some(value) = init {
                        writes = core.write_value(path, value);
                    }
                }
                let current = access::get(&core.values, path).cloned().unwrap_or(Value::Null);
                let disabled = explicit_disabled.unwrap_or(form_disabled);
                if let Some(descriptor) = core.registry.get_mut(path) {
                    descriptor.value = current;
                    descriptor.disabled = disabled;
                }
                if disabled {
                    core.names.disabled.insert(path.clone());
                }
                core.pending.valid = true;
            } else if let Some(disabled) = explicit_disabled
                && previous != Some(disabled)
            {
                disabled_change = Some(disabled);
            }
            tracing::debug!(message = "form.register", path = %path, new = is_new);
            (writes, disabled_change)
        };
        apply_handle_writes(writes);
        if let Some(disabled) = disabled_change {
            self.update_disabled_field(path, disabled);
        }
        FieldRegistration::new(self.clone(), path.clone())
    }

    /// Attach a binding control to a registered field and push the current
    /// value and disabled state into it.
    pub(crate) fn attach_handle(&self, path: &FieldPath, handle: &Rc<dyn FieldHandle>) -> bool {
        let state = {
            let mut core = self.core_mut();
            let state = core.registry.get_mut(path).map(|descriptor| {
                descriptor.attach(handle);
                descriptor.mount = true;
                (descriptor.value.clone(), descriptor.disabled)
            });
            if state.is_some() {
                core.names.mount.insert(path.clone());
            }
            state
        };
        let Some((value, disabled)) = state else {
            return false;
        };
        handle.write_value(&value);
        if disabled {
            handle.set_disabled(true);
        }
        true
    }

    /// The binding control went away. Unmounts the field, and unregisters
    /// it when `should_unregister` applies and no field array holds it.
    pub(crate) fn detach_handle(&self, path: &FieldPath) {
        let unregister = {
            let mut core = self.core_mut();
            let form_policy = core.options.should_unregister;
            let covered = core.names.array_root_of(path).is_some();
            core.names.mount.remove(path);
            match core.registry.get_mut(path) {
                Some(descriptor) => {
                    descriptor.detach();
                    descriptor.mount = false;
                    descriptor.rules.should_unregister.unwrap_or(form_policy) && !covered
                }
                None => false,
            }
        };
        if unregister {
            self.unregister(path, UnregisterOptions::default());
        }
    }

    /// Remove the field at `path` (and anything registered below it).
    ///
    /// A path inside an active field array only loses its descriptor; its
    /// value and state stay with the array. Returns false when nothing was
    /// registered at or below `path`.
    pub fn unregister(&self, path: &FieldPath, options: UnregisterOptions) -> bool {
        let update = {
            let mut core = self.core_mut();
            let registered = !core.registry.paths_under(path).is_empty()
                || core.names.array.iter().any(|a| a.starts_with_path(path));
            if !registered {
                return false;
            }
            core.revisions.retire(path);
            core.registry.remove_under(path);
            core.names.mount.retain(|p| !p.starts_with_path(path));

            if let Some(root) = core.names.array_root_of(path).cloned() {
                tracing::debug!(
                    message = "form.unregister",
                    path = %path,
                    kept_by = %root
                );
                return true;
            }

            core.names.array.retain(|p| !p.starts_with_path(path));
            core.names.disabled.retain(|p| !p.starts_with_path(path));
            core.array_rules.retain(|p, _| !p.starts_with_path(path));
            if !options.keep_value {
                access::unset(&mut core.values, path);
            }
            if !options.keep_error {
                core.state.errors.remove_under(path);
            }
            if !options.keep_dirty {
                core.state.dirty_fields.retain(|p| !p.starts_with_path(path));
            }
            if !options.keep_touched {
                core.state.touched_fields.retain(|p| !p.starts_with_path(path));
            }
            if !options.keep_is_validating {
                core.state.validating_fields.retain(|p| !p.starts_with_path(path));
                core.state.is_validating = !core.state.validating_fields.is_empty();
            }
            if !core.options.should_unregister && !options.keep_default_value {
                access::unset(&mut core.default_values, path);
            }
            core.refresh_is_dirty();
            if !options.keep_is_valid {
                core.pending.valid = true;
            }
            tracing::debug!(message = "form.unregister", path = %path);
            FormStateUpdate::full(&core.snapshot())
        };
        self.emit_values(None, ValueEventKind::Unregister);
        self.emit_state(update);
        true
    }

    /// Unregister every mounted field.
    pub fn unregister_all(&self, options: UnregisterOptions) {
        let mounted: Vec<FieldPath> = self.core().names.mount.iter().cloned().collect();
        for path in mounted {
            self.unregister(&path, options);
        }
    }

    /// Reset values and form state.
    ///
    /// `values` become the new defaults (unless kept) and the new values;
    /// `None` resets to the current defaults. Registrations survive.
    pub fn reset(&self, values: Option<Value>, keep: KeepStateOptions) {
        let (writes, update) = {
            let mut core = self.core_mut();
            let updated = values.unwrap_or_else(|| core.default_values.clone());
            if !keep.keep_default_values {
                core.default_values = updated.clone();
            }
            if !keep.keep_values {
                let mut next = updated;
                if keep.keep_dirty_values {
                    let dirty: Vec<FieldPath> = core.state.dirty_fields.iter().cloned().collect();
                    for path in dirty {
                        if let Some(current) = access::get(&core.values, &path).cloned() {
                            access::set(&mut next, &path, current);
                        }
                    }
                }
                core.values = next;
            }
            core.revisions.reset();
            let values = core.values.clone();
            let writes = core.registry.sync_values(&values, None);

            let state = &mut core.state;
            if !keep.keep_submit_count {
                state.submit_count = 0;
            }
            if !keep.keep_is_submitted {
                state.is_submitted = false;
            }
            if !keep.keep_is_submit_successful {
                state.is_submit_successful = false;
            }
            state.is_submitting = false;
            if !keep.keep_touched {
                state.touched_fields.clear();
            }
            if !keep.keep_errors {
                state.errors.clear();
            }
            if keep.keep_dirty {
                core.refresh_is_dirty();
            } else {
                core.refresh_dirty_all();
            }
            if !keep.keep_is_valid {
                core.pending.valid = true;
            }
            core.names.focus = None;
            tracing::debug!(
                message = "form.reset",
                keep_values = keep.keep_values,
                keep_defaults = keep.keep_default_values
            );
            (writes, FormStateUpdate::full(&core.snapshot()))
        };
        apply_handle_writes(writes);
        if !keep.keep_values {
            let values = self.get_values();
            self.shared.subjects.array.next(super::ArrayUpdate {
                name: None,
                op: None,
                source: None,
                values,
            });
            self.emit_values(None, ValueEventKind::Reset);
        }
        self.emit_state(update);
    }

    /// Reset one registered field to its default, or to a new default.
    /// Returns false when `path` is not registered.
    pub fn reset_field(&self, path: &FieldPath, options: ResetFieldOptions) -> bool {
        let (writes, update) = {
            let mut core = self.core_mut();
            if !core.registry.contains(path) {
                return false;
            }
            if let Some(default) = &options.default_value {
                access::set(&mut core.default_values, path, default.clone());
            }
            let writes = match access::get(&core.default_values, path).cloned() {
                Some(default) => core.write_value(path, default),
                None => {
                    access::unset(&mut core.values, path);
                    core.bump(path);
                    let values = core.values.clone();
                    core.registry.sync_values(&values, None)
                }
            };
            if !options.keep_touched {
                core.state.touched_fields.retain(|p| !p.starts_with_path(path));
            }
            if options.keep_dirty {
                core.refresh_is_dirty();
            } else {
                core.refresh_dirty_under(path);
            }
            if !options.keep_error {
                core.state.errors.remove_under(path);
                core.pending.valid = true;
            }
            (writes, FormStateUpdate::full(&core.snapshot()))
        };
        apply_handle_writes(writes);
        self.emit_values(Some(path.clone()), ValueEventKind::Set);
        self.emit_state(update);
        true
    }

    /// Apply externally controlled values with the configured reset options.
    pub fn apply_values(&self, values: Value) {
        let keep = self.core().options.reset_options;
        self.reset(Some(values), keep);
    }

    /// Resolve async default values and reset the form to them.
    ///
    /// No-op unless the form was built with async defaults.
    pub async fn load_default_values(&self) {
        let producer = match &self.core().options.default_values {
            crate::options::DefaultValues::Async(producer) => Rc::clone(producer),
            crate::options::DefaultValues::Value(_) => return,
        };
        let values = producer().await;
        let keep = self.core().options.reset_options;
        self.reset(Some(values), keep);
        self.core_mut().state.is_loading = false;
        self.emit_state(FormStateUpdate::new().is_loading(false));
        self.settle().await;
    }

    /// Enable or disable the whole form. Fields with an explicit `disabled`
    /// rule keep it.
    pub fn disable_form(&self, disabled: bool) {
        let handles = {
            let mut core = self.core_mut();
            core.options.disabled = disabled;
            core.state.disabled = disabled;
            let mut handles = Vec::new();
            let mut changed = Vec::new();
            for (path, descriptor) in core.registry.iter() {
                if descriptor.rules.disabled.is_none() {
                    changed.push(path.clone());
                }
            }
            for path in &changed {
                if let Some(descriptor) = core.registry.get_mut(path) {
                    descriptor.disabled = disabled;
                    if let Some(handle) = descriptor.handle() {
                        handles.push(handle);
                    }
                }
                if disabled {
                    core.names.disabled.insert(path.clone());
                } else {
                    core.names.disabled.remove(path);
                }
            }
            handles
        };
        self.emit_state(FormStateUpdate::new().disabled(disabled));
        for handle in handles {
            handle.set_disabled(disabled);
        }
    }

    /// Change one field's disabled flag. Returns false when `path` is not
    /// registered.
    pub fn update_disabled_field(&self, path: &FieldPath, disabled: bool) -> bool {
        let (handle, update) = {
            let mut core = self.core_mut();
            let Some(descriptor) = core.registry.get_mut(path) else {
                return false;
            };
            descriptor.disabled = disabled;
            let handle = descriptor.handle();
            if disabled {
                core.names.disabled.insert(path.clone());
            } else {
                core.names.disabled.remove(path);
            }
            core.refresh_dirty_under(path);
            core.pending.valid = true;
            let update = FormStateUpdate::new()
                .named(path.clone())
                .dirty_fields(core.state.dirty_fields.clone())
                .is_dirty(core.state.is_dirty);
            (handle, update)
        };
        self.emit_state(update);
        if let Some(handle) = handle {
            handle.set_disabled(disabled);
        }
        true
    }
}
