#![forbid(unsafe_code)]

//! Form State Snapshot and the partial updates pushed on the state subject.

use std::collections::BTreeSet;

use fform_core::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field_error::{FieldError, FieldErrors};
use crate::proxy::StateKeys;

/// Aggregate observable state of one form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStateSnapshot {
    pub values: Value,
    pub default_values: Value,
    pub errors: FieldErrors,
    /// Leaf paths whose value differs from its default.
    pub dirty_fields: BTreeSet<FieldPath>,
    pub touched_fields: BTreeSet<FieldPath>,
    pub validating_fields: BTreeSet<FieldPath>,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
    pub is_submitted: bool,
    pub is_submitting: bool,
    pub is_submit_successful: bool,
    pub submit_count: u32,
    pub disabled: bool,
    pub is_loading: bool,
}

/// A partial Form State change.
///
/// Only the `Some` slices changed. `name` scopes the update to one field for
/// name-filtered subscribers; `None` means form-wide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormStateUpdate {
    pub name: Option<FieldPath>,
    pub values: Option<Value>,
    pub default_values: Option<Value>,
    pub errors: Option<FieldErrors>,
    pub dirty_fields: Option<BTreeSet<FieldPath>>,
    pub touched_fields: Option<BTreeSet<FieldPath>>,
    pub validating_fields: Option<BTreeSet<FieldPath>>,
    pub is_dirty: Option<bool>,
    pub is_valid: Option<bool>,
    pub is_validating: Option<bool>,
    pub is_submitted: Option<bool>,
    pub is_submitting: Option<bool>,
    pub is_submit_successful: Option<bool>,
    pub submit_count: Option<u32>,
    pub disabled: Option<bool>,
    pub is_loading: Option<bool>,
}

macro_rules! update_setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        $(
            #[must_use]
            pub fn $field(mut self, value: $ty) -> Self {
                self.$field = Some(value);
                self
            }
        )*
    };
}

impl FormStateUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope the update to `path`.
    #[must_use]
    pub fn named(mut self, path: FieldPath) -> Self {
        self.name = Some(path);
        self
    }

    update_setters! {
        values: Value,
        default_values: Value,
        errors: FieldErrors,
        dirty_fields: BTreeSet<FieldPath>,
        touched_fields: BTreeSet<FieldPath>,
        validating_fields: BTreeSet<FieldPath>,
        is_dirty: bool,
        is_valid: bool,
        is_validating: bool,
        is_submitted: bool,
        is_submitting: bool,
        is_submit_successful: bool,
        submit_count: u32,
        disabled: bool,
        is_loading: bool,
    }

    /// Every slice of `snapshot`, as a form-wide update.
    #[must_use]
    pub fn full(snapshot: &FormStateSnapshot) -> Self {
        let s = snapshot.clone();
        Self {
            name: None,
            values: Some(s.values),
            default_values: Some(s.default_values),
            errors: Some(s.errors),
            dirty_fields: Some(s.dirty_fields),
            touched_fields: Some(s.touched_fields),
            validating_fields: Some(s.validating_fields),
            is_dirty: Some(s.is_dirty),
            is_valid: Some(s.is_valid),
            is_validating: Some(s.is_validating),
            is_submitted: Some(s.is_submitted),
            is_submitting: Some(s.is_submitting),
            is_submit_successful: Some(s.is_submit_successful),
            submit_count: Some(s.submit_count),
            disabled: Some(s.disabled),
            is_loading: Some(s.is_loading),
        }
    }

    /// The state keys this update carries.
    #[must_use]
    pub fn keys(&self) -> StateKeys {
        let mut keys = StateKeys::empty();
        let mut mark = |present: bool, key: StateKeys| {
            if present {
                keys |= key;
            }
        };
        mark(self.values.is_some(), StateKeys::VALUES);
        mark(self.default_values.is_some(), StateKeys::DEFAULT_VALUES);
        mark(self.errors.is_some(), StateKeys::ERRORS);
        mark(self.dirty_fields.is_some(), StateKeys::DIRTY_FIELDS);
        mark(self.touched_fields.is_some(), StateKeys::TOUCHED_FIELDS);
        mark(self.validating_fields.is_some(), StateKeys::VALIDATING_FIELDS);
        mark(self.is_dirty.is_some(), StateKeys::IS_DIRTY);
        mark(self.is_valid.is_some(), StateKeys::IS_VALID);
        mark(self.is_validating.is_some(), StateKeys::IS_VALIDATING);
        mark(self.is_submitted.is_some(), StateKeys::IS_SUBMITTED);
        mark(self.is_submitting.is_some(), StateKeys::IS_SUBMITTING);
        mark(
            self.is_submit_successful.is_some(),
            StateKeys::IS_SUBMIT_SUCCESSFUL,
        );
        mark(self.submit_count.is_some(), StateKeys::SUBMIT_COUNT);
        mark(self.disabled.is_some(), StateKeys::DISABLED);
        mark(self.is_loading.is_some(), StateKeys::IS_LOADING);
        keys
    }

    /// Whether no slice is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Copy every present slice into `snapshot`.
    pub fn apply_to(&self, snapshot: &mut FormStateSnapshot) {
        fn put<T: Clone>(slot: &mut T, value: Option<&T>) {
            if let Some(v) = value {
                slot.clone_from(v);
            }
        }
        put(&mut snapshot.values, self.values.as_ref());
        put(&mut snapshot.default_values, self.default_values.as_ref());
        put(&mut snapshot.errors, self.errors.as_ref());
        put(&mut snapshot.dirty_fields, self.dirty_fields.as_ref());
        put(&mut snapshot.touched_fields, self.touched_fields.as_ref());
        put(&mut snapshot.validating_fields, self.validating_fields.as_ref());
        put(&mut snapshot.is_dirty, self.is_dirty.as_ref());
        put(&mut snapshot.is_valid, self.is_valid.as_ref());
        put(&mut snapshot.is_validating, self.is_validating.as_ref());
        put(&mut snapshot.is_submitted, self.is_submitted.as_ref());
        put(&mut snapshot.is_submitting, self.is_submitting.as_ref());
        put(
            &mut snapshot.is_submit_successful,
            self.is_submit_successful.as_ref(),
        );
        put(&mut snapshot.submit_count, self.submit_count.as_ref());
        put(&mut snapshot.disabled, self.disabled.as_ref());
        put(&mut snapshot.is_loading, self.is_loading.as_ref());
    }
}

/// Per-field view derived from the form state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub invalid: bool,
    pub is_dirty: bool,
    pub is_touched: bool,
    pub is_validating: bool,
    pub error: Option<FieldError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_error::ErrorType;

    #[test]
    fn keys_reflect_present_slices() {
        let update = FormStateUpdate::new().is_valid(true).submit_count(2);
        assert_eq!(update.keys(), StateKeys::IS_VALID | StateKeys::SUBMIT_COUNT);
        assert!(FormStateUpdate::new().is_empty());
    }

    #[test]
    fn apply_only_touches_present_slices() {
        let mut snapshot = FormStateSnapshot {
            submit_count: 3,
            is_valid: false,
            ..FormStateSnapshot::default()
        };
        let mut errors = FieldErrors::new();
        errors.set(FieldPath::key("a"), FieldError::new(ErrorType::Required));
        FormStateUpdate::new()
            .is_valid(true)
            .errors(errors.clone())
            .apply_to(&mut snapshot);
        assert!(snapshot.is_valid);
        assert_eq!(snapshot.errors, errors);
        assert_eq!(snapshot.submit_count, 3);
    }

    #[test]
    fn full_update_covers_every_key() {
        let update = FormStateUpdate::full(&FormStateSnapshot::default());
        assert_eq!(update.keys(), StateKeys::all());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(FormStateSnapshot::default()).expect("serialize");
        assert!(json.get("isSubmitSuccessful").is_some());
        assert!(json.get("dirtyFields").is_some());
    }
}
