#![forbid(unsafe_code)]

//! Declarative per-field validation rules.
//!
//! Rules are plain data plus optional user validators. Registering the same
//! path again merges a new [`RegisterOptions`] into the stored one with
//! [`RegisterOptions::merge`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use fform_core::FieldPath;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use regex::Regex;
use serde_json::Value;

/// A rule value with an optional custom message.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<T> {
    pub value: T,
    pub message: Option<String>,
}

impl<T> Rule<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: Some(message.into()),
        }
    }
}

/// Bound for `min`/`max`: numeric, or compared lexically (dates, times).
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Number(f64),
    Text(String),
}

impl From<f64> for Bound {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Bound {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Bound {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Bound {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Outcome of a user validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateResult {
    Valid,
    /// Failed, with an optional message.
    Invalid(Option<String>),
}

impl ValidateResult {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<bool> for ValidateResult {
    fn from(ok: bool) -> Self {
        if ok { Self::Valid } else { Self::Invalid(None) }
    }
}

impl From<&str> for ValidateResult {
    fn from(message: &str) -> Self {
        Self::Invalid(Some(message.to_string()))
    }
}

impl From<String> for ValidateResult {
    fn from(message: String) -> Self {
        Self::Invalid(Some(message))
    }
}

impl From<Option<String>> for ValidateResult {
    fn from(message: Option<String>) -> Self {
        match message {
            None => Self::Valid,
            Some(m) => Self::Invalid(Some(m)),
        }
    }
}

type ValidatorFn = dyn Fn(Value, Value) -> LocalBoxFuture<'static, ValidateResult>;

/// A user validator: receives the field value and the whole value tree.
#[derive(Clone)]
pub struct Validator(Rc<ValidatorFn>);

impl Validator {
    /// Wrap a synchronous check.
    pub fn new<R, F>(check: F) -> Self
    where
        R: Into<ValidateResult>,
        F: Fn(&Value, &Value) -> R + 'static,
    {
        Self(Rc::new(move |value, values| {
            let result = check(&value, &values).into();
            futures::future::ready(result).boxed_local()
        }))
    }

    /// Wrap an asynchronous check.
    pub fn new_async<F>(check: F) -> Self
    where
        F: Fn(Value, Value) -> LocalBoxFuture<'static, ValidateResult> + 'static,
    {
        Self(Rc::new(check))
    }

    #[must_use]
    pub fn call(&self, value: Value, values: Value) -> LocalBoxFuture<'static, ValidateResult> {
        (self.0)(value, values)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

/// Custom validation: one function, or several keyed by error type.
#[derive(Debug, Clone)]
pub enum Validate {
    Single(Validator),
    Named(BTreeMap<String, Validator>),
}

/// Rules and behaviour supplied when registering a field.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub required: Option<Rule<bool>>,
    pub min: Option<Rule<Bound>>,
    pub max: Option<Rule<Bound>>,
    pub min_length: Option<Rule<usize>>,
    pub max_length: Option<Rule<usize>>,
    pub pattern: Option<Rule<Regex>>,
    pub validate: Option<Validate>,
    /// Coerce numeric strings written through `on_change` into numbers.
    pub value_as_number: bool,
    pub disabled: Option<bool>,
    /// Initial value when the path has none yet.
    pub value: Option<Value>,
    /// Paths re-validated whenever this field changes.
    pub deps: Vec<FieldPath>,
    pub should_unregister: Option<bool>,
}

impl RegisterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = Some(Rule::new(true));
        self
    }

    #[must_use]
    pub fn required_with(mut self, message: impl Into<String>) -> Self {
        self.required = Some(Rule::with_message(true, message));
        self
    }

    #[must_use]
    pub fn min(mut self, bound: impl Into<Bound>) -> Self {
        self.min = Some(Rule::new(bound.into()));
        self
    }

    #[must_use]
    pub fn min_with(mut self, bound: impl Into<Bound>, message: impl Into<String>) -> Self {
        self.min = Some(Rule::with_message(bound.into(), message));
        self
    }

    #[must_use]
    pub fn max(mut self, bound: impl Into<Bound>) -> Self {
        self.max = Some(Rule::new(bound.into()));
        self
    }

    #[must_use]
    pub fn max_with(mut self, bound: impl Into<Bound>, message: impl Into<String>) -> Self {
        self.max = Some(Rule::with_message(bound.into(), message));
        self
    }

    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(Rule::new(len));
        self
    }

    #[must_use]
    pub fn min_length_with(mut self, len: usize, message: impl Into<String>) -> Self {
        self.min_length = Some(Rule::with_message(len, message));
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(Rule::new(len));
        self
    }

    #[must_use]
    pub fn max_length_with(mut self, len: usize, message: impl Into<String>) -> Self {
        self.max_length = Some(Rule::with_message(len, message));
        self
    }

    #[must_use]
    pub fn pattern(mut self, regex: Regex) -> Self {
        self.pattern = Some(Rule::new(regex));
        self
    }

    #[must_use]
    pub fn pattern_with(mut self, regex: Regex, message: impl Into<String>) -> Self {
        self.pattern = Some(Rule::with_message(regex, message));
        self
    }

    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validate = Some(Validate::Single(validator));
        self
    }

    /// Add a named validator; its failures use `name` as the error type.
    #[must_use]
    pub fn validate_named(mut self, name: impl Into<String>, validator: Validator) -> Self {
        let mut named = match self.validate.take() {
            Some(Validate::Named(map)) => map,
            _ => BTreeMap::new(),
        };
        named.insert(name.into(), validator);
        self.validate = Some(Validate::Named(named));
        self
    }

    #[must_use]
    pub fn value_as_number(mut self) -> Self {
        self.value_as_number = true;
        self
    }

    #[must_use]
    pub fn disabled(mut self, on: bool) -> Self {
        self.disabled = Some(on);
        self
    }

    #[must_use]
    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn deps(mut self, deps: impl IntoIterator<Item = FieldPath>) -> Self {
        self.deps = deps.into_iter().collect();
        self
    }

    #[must_use]
    pub fn should_unregister(mut self, on: bool) -> Self {
        self.should_unregister = Some(on);
        self
    }

    /// Whether any rule would make the built-in validator do work.
    #[must_use]
    pub fn has_validation(&self) -> bool {
        self.required.as_ref().is_some_and(|r| r.value)
            || self.min.is_some()
            || self.max.is_some()
            || self.min_length.is_some()
            || self.max_length.is_some()
            || self.pattern.is_some()
            || self.validate.is_some()
    }

    /// Overlay `other` onto `self`: every rule `other` sets replaces ours.
    pub fn merge(&mut self, other: Self) {
        fn overlay<T>(slot: &mut Option<T>, new: Option<T>) {
            if new.is_some() {
                *slot = new;
            }
        }
        overlay(&mut self.required, other.required);
        overlay(&mut self.min, other.min);
        overlay(&mut self.max, other.max);
        overlay(&mut self.min_length, other.min_length);
        overlay(&mut self.max_length, other.max_length);
        overlay(&mut self.pattern, other.pattern);
        overlay(&mut self.validate, other.validate);
        overlay(&mut self.disabled, other.disabled);
        overlay(&mut self.value, other.value);
        overlay(&mut self.should_unregister, other.should_unregister);
        self.value_as_number |= other.value_as_number;
        if !other.deps.is_empty() {
            self.deps = other.deps;
        }
    }
}
