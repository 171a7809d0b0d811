#![forbid(unsafe_code)]

//! Field-array surgery on the control side: values, registry keys and
//! per-path state move together.

use fform_core::{ArrayOp, FieldPath, access};
use serde_json::Value;

use super::{ArrayUpdate, FormControl, ValueEventKind, apply_handle_writes};
use crate::error::{FormError, Result};
use crate::field_array::FieldArray;
use crate::registry::{rekey_map, rekey_set};
use crate::rules::RegisterOptions;
use crate::state::FormStateUpdate;

impl FormControl {
    /// Bind a [`FieldArray`] to the sequence at `path`.
    ///
    /// A missing value counts as an empty array. `rules` validate the array
    /// as a whole; failures are recorded at `<path>.root`.
    pub fn use_field_array(
        &self,
        path: &FieldPath,
        rules: Option<RegisterOptions>,
    ) -> Result<FieldArray> {
        {
            let mut core = self.core_mut();
            match access::get(&core.values, path) {
                None | Some(Value::Null | Value::Array(_)) => {}
                Some(_) => return Err(FormError::NotFieldArray { path: path.clone() }),
            }
            core.names.array.insert(path.clone());
            *core.array_handles.entry(path.clone()).or_default() += 1;
            if let Some(rules) = rules {
                core.array_rules.insert(path.clone(), rules);
            }
            tracing::debug!(message = "field_array.bind", path = %path);
        }
        Ok(FieldArray::new(self.clone(), path.clone()))
    }

    /// Store `values` as the array at `array` after `op` produced them.
    ///
    /// With `update_fields_and_state`, registered fields and the per-path
    /// error and touched entries below the array follow their entries to
    /// their new indices. A disabled form only stores the values.
    pub(crate) fn update_field_array(
        &self,
        array: &FieldPath,
        values: Vec<Value>,
        op: ArrayOp,
        source: Option<u64>,
        update_fields_and_state: bool,
    ) {
        let (writes, update) = {
            let mut core = self.core_mut();
            let old_len = access::get(&core.values, array)
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let new_len = values.len();
            access::set(&mut core.values, array, Value::Array(values));
            if core.options.disabled {
                return;
            }
            if update_fields_and_state {
                core.registry.rekey(array, &op, old_len);
                rekey_map(core.state.errors.entries_mut(), array, &op, old_len);
                rekey_set(&mut core.state.touched_fields, array, &op, old_len);
                rekey_set(&mut core.names.mount, array, &op, old_len);
                rekey_set(&mut core.names.disabled, array, &op, old_len);
            }
            core.revisions.retire(array);
            core.refresh_dirty_under(array);
            let current = core.values.clone();
            let writes = core.registry.sync_values(&current, Some(array));
            core.pending.arrays.insert(array.clone());
            core.pending.valid = true;
            tracing::debug!(
                message = "field_array.mutate",
                path = %array,
                op = op.name(),
                from = old_len,
                to = new_len
            );
            let update = FormStateUpdate::new()
                .named(array.clone())
                .dirty_fields(core.state.dirty_fields.clone())
                .is_dirty(core.state.is_dirty)
                .errors(core.state.errors.clone())
                .touched_fields(core.state.touched_fields.clone());
            (writes, update)
        };
        apply_handle_writes(writes);
        let values = self.get_values();
        self.shared.subjects.array.next(ArrayUpdate {
            name: Some(array.clone()),
            op: Some(op),
            source,
            values,
        });
        self.emit_values(Some(array.clone()), ValueEventKind::Array);
        self.emit_state(update);
    }
}
