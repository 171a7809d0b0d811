#![forbid(unsafe_code)]

//! Form-wide configuration and per-call option structs.

use std::fmt;
use std::rc::Rc;

use fform_core::FieldPath;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::Resolver;

/// When a field is first validated, before the form has been submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    OnSubmit,
    OnBlur,
    OnChange,
    /// First validation on blur, then on every change.
    OnTouched,
    All,
}

/// When a field is re-validated after the form has been submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReValidateMode {
    #[default]
    OnChange,
    OnBlur,
    OnSubmit,
}

impl From<ReValidateMode> for Mode {
    fn from(mode: ReValidateMode) -> Self {
        match mode {
            ReValidateMode::OnChange => Self::OnChange,
            ReValidateMode::OnBlur => Self::OnBlur,
            ReValidateMode::OnSubmit => Self::OnSubmit,
        }
    }
}

/// Stop at the first failing rule, or collect all of them into
/// [`FieldError::types`](crate::FieldError::types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CriteriaMode {
    #[default]
    FirstError,
    All,
}

/// Async producer of default values.
pub type DefaultValuesFn = Rc<dyn Fn() -> LocalBoxFuture<'static, Value>>;

/// Where the initial default values come from.
#[derive(Clone)]
pub enum DefaultValues {
    Value(Value),
    /// Resolved by [`FormControl::load_default_values`](crate::FormControl::load_default_values);
    /// the form reports `is_loading` until then.
    Async(DefaultValuesFn),
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self::Value(Value::Object(serde_json::Map::new()))
    }
}

impl fmt::Debug for DefaultValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// Configuration for one form instance.
#[derive(Clone)]
pub struct FormOptions {
    pub mode: Mode,
    pub re_validate_mode: ReValidateMode,
    pub criteria_mode: CriteriaMode,
    /// Focus the first errored field after an invalid submit.
    pub should_focus_error: bool,
    /// Drop values of unregistered fields instead of keeping them.
    pub should_unregister: bool,
    /// Key under which field-array identities appear in `fields()`.
    pub key_name: String,
    pub disabled: bool,
    pub resolver: Option<Rc<dyn Resolver>>,
    pub default_values: DefaultValues,
    /// Externally controlled values; they win over `default_values` for the
    /// current values.
    pub values: Option<Value>,
    /// Keep flags applied when async defaults or controlled values arrive.
    pub reset_options: KeepStateOptions,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            mode: Mode::OnSubmit,
            re_validate_mode: ReValidateMode::OnChange,
            criteria_mode: CriteriaMode::FirstError,
            should_focus_error: true,
            should_unregister: false,
            key_name: "id".to_string(),
            disabled: false,
            resolver: None,
            default_values: DefaultValues::default(),
            values: None,
            reset_options: KeepStateOptions::default(),
        }
    }
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("mode", &self.mode)
            .field("re_validate_mode", &self.re_validate_mode)
            .field("criteria_mode", &self.criteria_mode)
            .field("should_focus_error", &self.should_focus_error)
            .field("should_unregister", &self.should_unregister)
            .field("key_name", &self.key_name)
            .field("disabled", &self.disabled)
            .field("resolver", &self.resolver.is_some())
            .field("default_values", &self.default_values)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl FormOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn re_validate_mode(mut self, mode: ReValidateMode) -> Self {
        self.re_validate_mode = mode;
        self
    }

    #[must_use]
    pub fn criteria_mode(mut self, mode: CriteriaMode) -> Self {
        self.criteria_mode = mode;
        self
    }

    #[must_use]
    pub fn should_focus_error(mut self, on: bool) -> Self {
        self.should_focus_error = on;
        self
    }

    #[must_use]
    pub fn should_unregister(mut self, on: bool) -> Self {
        self.should_unregister = on;
        self
    }

    #[must_use]
    pub fn key_name(mut self, key: impl Into<String>) -> Self {
        self.key_name = key.into();
        self
    }

    #[must_use]
    pub fn disabled(mut self, on: bool) -> Self {
        self.disabled = on;
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    #[must_use]
    pub fn default_values(mut self, values: Value) -> Self {
        self.default_values = DefaultValues::Value(values);
        self
    }

    #[must_use]
    pub fn async_default_values(
        mut self,
        producer: impl Fn() -> LocalBoxFuture<'static, Value> + 'static,
    ) -> Self {
        self.default_values = DefaultValues::Async(Rc::new(producer));
        self
    }

    #[must_use]
    pub fn values(mut self, values: Value) -> Self {
        self.values = Some(values);
        self
    }

    #[must_use]
    pub fn reset_options(mut self, keep: KeepStateOptions) -> Self {
        self.reset_options = keep;
        self
    }
}

// ─── Per-call options ────────────────────────────────────────────────────────

/// Which parts of the form state survive a [`reset`](crate::FormControl::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepStateOptions {
    pub keep_errors: bool,
    pub keep_dirty: bool,
    /// Keep current values where the user changed them; update the rest.
    pub keep_dirty_values: bool,
    pub keep_values: bool,
    pub keep_default_values: bool,
    pub keep_is_submitted: bool,
    pub keep_is_submit_successful: bool,
    pub keep_touched: bool,
    pub keep_is_valid: bool,
    pub keep_submit_count: bool,
}

/// Side effects of [`set_value`](crate::FormControl::set_value).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    pub should_validate: bool,
    pub should_dirty: bool,
    pub should_touch: bool,
}

impl SetValueOptions {
    #[must_use]
    pub fn validate(mut self) -> Self {
        self.should_validate = true;
        self
    }

    #[must_use]
    pub fn dirty(mut self) -> Self {
        self.should_dirty = true;
        self
    }

    #[must_use]
    pub fn touch(mut self) -> Self {
        self.should_touch = true;
        self
    }
}

/// What survives [`unregister`](crate::FormControl::unregister).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnregisterOptions {
    pub keep_value: bool,
    pub keep_error: bool,
    pub keep_dirty: bool,
    pub keep_touched: bool,
    pub keep_is_validating: bool,
    pub keep_default_value: bool,
    pub keep_is_valid: bool,
}

/// What survives [`reset_field`](crate::FormControl::reset_field).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetFieldOptions {
    pub keep_error: bool,
    pub keep_dirty: bool,
    pub keep_touched: bool,
    /// New default for the field; the value is reset to it.
    pub default_value: Option<Value>,
}

/// Post-insert focus behaviour for field-array operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusOptions {
    pub should_focus: bool,
    /// Index of the entry to focus; defaults to the inserted entry.
    pub focus_index: Option<usize>,
    /// Full path to focus instead of an entry.
    pub focus_name: Option<String>,
}

impl Default for FocusOptions {
    fn default() -> Self {
        Self {
            should_focus: true,
            focus_index: None,
            focus_name: None,
        }
    }
}

impl FocusOptions {
    #[must_use]
    pub fn none() -> Self {
        Self {
            should_focus: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.focus_index = Some(index);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.focus_name = Some(name.into());
        self
    }
}

/// Options for [`set_error`](crate::FormControl::set_error).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetErrorOptions {
    pub should_focus: bool,
}

/// Name filter for state subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Only updates about these paths are delivered; empty means all.
    pub names: Vec<FieldPath>,
    /// Require an exact path match instead of ancestor/descendant overlap.
    pub exact: bool,
    /// Deliver nothing while set.
    pub disabled: bool,
}

impl SubscribeOptions {
    #[must_use]
    pub fn name(mut self, path: FieldPath) -> Self {
        self.names.push(path);
        self
    }

    #[must_use]
    pub fn exact(mut self, on: bool) -> Self {
        self.exact = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = FormOptions::default();
        assert_eq!(opts.mode, Mode::OnSubmit);
        assert_eq!(opts.re_validate_mode, ReValidateMode::OnChange);
        assert_eq!(opts.criteria_mode, CriteriaMode::FirstError);
        assert!(opts.should_focus_error);
        assert!(!opts.should_unregister);
        assert_eq!(opts.key_name, "id");
    }

    #[test]
    fn modes_use_camel_case_names() {
        let json = serde_json::to_string(&Mode::OnTouched).expect("serialize");
        assert_eq!(json, "\"onTouched\"");
        let mode: ReValidateMode = serde_json::from_str("\"onBlur\"").expect("deserialize");
        assert_eq!(mode, ReValidateMode::OnBlur);
    }

    #[test]
    fn keep_options_deserialize_partially() {
        let keep: KeepStateOptions =
            serde_json::from_str(r#"{ "keep_errors": true }"#).expect("deserialize");
        assert!(keep.keep_errors);
        assert!(!keep.keep_dirty);
    }
}
