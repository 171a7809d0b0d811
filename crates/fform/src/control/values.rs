#![forbid(unsafe_code)]

//! Value writes: `set_value` and the change/blur events bindings forward.

use std::collections::BTreeSet;

use fform_core::FieldPath;
use serde_json::{Number, Value};

use super::{ArrayUpdate, FormControl, ValueEventKind, apply_handle_writes};
use crate::options::{Mode, SetValueOptions};
use crate::state::FormStateUpdate;
use crate::validate::skip_validation;

/// An interaction reported by a field binding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    Change(Value),
    Blur,
}

/// Numeric strings become numbers, an empty string becomes `Null`.
fn coerce_number(value: Value) -> Value {
    let text = match &value {
        Value::String(s) => s.trim().to_string(),
        _ => return value,
    };
    if text.is_empty() {
        return Value::Null;
    }
    match text.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
        Ok(f) => Number::from_f64(f).map_or(value, Value::Number),
        Err(_) => value,
    }
}

impl FormControl {
    /// Write `value` at `path`.
    ///
    /// Works for unregistered paths too. A mapping written above registered
    /// fields reaches each of them; writing a field-array root refreshes the
    /// array's identities.
    pub async fn set_value(&self, path: &FieldPath, value: Value, options: SetValueOptions) {
        let (writes, is_array, update, watched) = {
            let mut core = self.core_mut();
            let is_array = core.names.array.contains(path);
            let writes = core.write_value(path, value);
            let mut update = FormStateUpdate::new().named(path.clone());
            if options.should_dirty {
                core.refresh_dirty_under(path);
                update = update
                    .dirty_fields(core.state.dirty_fields.clone())
                    .is_dirty(core.state.is_dirty);
            }
            if options.should_touch {
                let mut targets = core.registry.paths_under(path);
                if targets.is_empty() {
                    targets.push(path.clone());
                }
                core.state.touched_fields.extend(targets);
                update = update.touched_fields(core.state.touched_fields.clone());
            }
            if !options.should_validate {
                core.pending.valid = true;
            }
            (writes, is_array, update, core.names.is_watched(path))
        };
        apply_handle_writes(writes);
        if is_array {
            let values = self.get_values();
            self.shared.subjects.array.next(ArrayUpdate {
                name: Some(path.clone()),
                op: None,
                source: None,
                values,
            });
        }
        if !update.is_empty() {
            self.emit_state(update);
        }
        if watched {
            self.emit_state(FormStateUpdate::full(&self.get_form_state()));
        }
        self.emit_values(Some(path.clone()), ValueEventKind::Set);
        if options.should_validate {
            self.trigger(Some(std::slice::from_ref(path))).await;
        } else {
            self.settle().await;
        }
    }

    /// Apply a binding's change or blur event to the field at `path`.
    ///
    /// Returns false when `path` is not registered.
    pub async fn handle_field_event(&self, path: &FieldPath, event: FieldEvent) -> bool {
        let is_blur = event == FieldEvent::Blur;
        let prepared = {
            let mut core = self.core_mut();
            let Some(descriptor) = core.registry.get(path) else {
                return false;
            };
            let rules = descriptor.rules.clone();
            let mut field_update = FormStateUpdate::new().named(path.clone());
            let mut writes = Vec::new();

            match event {
                FieldEvent::Change(raw) => {
                    let value = if rules.value_as_number {
                        coerce_number(raw)
                    } else {
                        raw
                    };
                    if let Some(d) = core.registry.get_mut(path) {
                        d.value = value.clone();
                    }
                    writes = core.write_value(path, value);
                    let before: BTreeSet<FieldPath> = core.state.dirty_fields.clone();
                    let was_dirty = core.state.is_dirty;
                    core.refresh_dirty_under(path);
                    if before != core.state.dirty_fields || was_dirty != core.state.is_dirty {
                        field_update = field_update
                            .dirty_fields(core.state.dirty_fields.clone())
                            .is_dirty(core.state.is_dirty);
                    }
                }
                FieldEvent::Blur => {
                    if core.state.touched_fields.insert(path.clone()) {
                        field_update =
                            field_update.touched_fields(core.state.touched_fields.clone());
                    }
                }
            }

            let options = &core.options;
            let nothing_to_check = !rules.has_validation()
                && options.resolver.is_none()
                && !core.state.errors.contains(path)
                && rules.deps.is_empty();
            let skip = nothing_to_check
                || skip_validation(
                    is_blur,
                    core.state.touched_fields.contains(path),
                    core.state.is_submitted,
                    options.re_validate_mode,
                    options.mode,
                );
            if skip && (options.mode != Mode::OnBlur || is_blur) {
                core.pending.valid = true;
            }
            let watched = core.names.is_watched(path);
            (writes, field_update, skip, watched, rules.deps)
        };
        let (writes, field_update, skip, watched, deps) = prepared;
        apply_handle_writes(writes);
        if !is_blur {
            self.emit_values(Some(path.clone()), ValueEventKind::Change);
        }

        if skip {
            if watched {
                self.emit_state(FormStateUpdate::new().named(path.clone()));
            } else if !field_update.is_empty() {
                self.emit_state(field_update);
            }
            self.settle().await;
            return true;
        }

        if !is_blur && watched {
            self.emit_state(FormStateUpdate::full(&self.get_form_state()));
        }
        let outcome = self
            .validate_and_commit(Some(vec![path.clone()]), field_update)
            .await;
        if outcome.committed > 0 && !deps.is_empty() {
            self.trigger(Some(deps.as_slice())).await;
        }
        self.settle().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_coercion() {
        assert_eq!(coerce_number(json!("42")), json!(42));
        assert_eq!(coerce_number(json!(" 1.5 ")), json!(1.5));
        assert_eq!(coerce_number(json!("")), Value::Null);
        assert_eq!(coerce_number(json!("abc")), json!("abc"));
        assert_eq!(coerce_number(json!(7)), json!(7));
    }
}
