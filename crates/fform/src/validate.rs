#![forbid(unsafe_code)]

//! Validation orchestrator: built-in rule evaluation, the delegated
//! resolver seam, and the mode gate deciding whether an event validates.
//!
//! # Design
//!
//! Built-in validation works on one field at a time. [`validate_field`]
//! owns everything it reads (a [`FieldCheck`] plus a clone of the value
//! tree) so the returned future can outlive any borrow of the form; the
//! control snapshots inputs, awaits, then commits with a revision check.
//!
//! Rules run in a fixed order: `required`, `min`/`max`, `minLength`/
//! `maxLength`, `pattern`, `validate`. Under [`CriteriaMode::FirstError`]
//! the first failure is returned; under [`CriteriaMode::All`] every failure
//! is collected into [`FieldError::types`] and the first one stays primary.
//!
//! # Invariants
//!
//! 1. A disabled or unmounted field never produces an error.
//! 2. `min`, `max` and `pattern` never fail on an empty value; only
//!    `required` reports emptiness.
//! 3. A field-array root is checked on its sequence length, not on its
//!    entries.

use std::cmp::Ordering;

use fform_core::FieldPath;
use fform_core::compare::is_empty_value;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::field_error::{ErrorType, FieldError, FieldErrors};
use crate::options::{CriteriaMode, Mode, ReValidateMode};
use crate::rules::{Bound, RegisterOptions, Rule, Validate, ValidateResult};

// ─── Built-in rules ──────────────────────────────────────────────────────────

/// Owned inputs for validating one field.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    pub path: FieldPath,
    pub rules: RegisterOptions,
    pub value: Value,
    pub disabled: bool,
    pub mounted: bool,
    /// Validate the value as a field-array root.
    pub is_field_array: bool,
}

impl FieldCheck {
    #[must_use]
    pub fn new(path: FieldPath, rules: RegisterOptions, value: Value) -> Self {
        Self {
            path,
            rules,
            value,
            disabled: false,
            mounted: true,
            is_field_array: false,
        }
    }

    #[must_use]
    pub fn field_array(mut self) -> Self {
        self.is_field_array = true;
        self
    }
}

/// Accumulates failures according to the criteria mode.
struct Failures {
    criteria: CriteriaMode,
    first: Option<FieldError>,
}

impl Failures {
    fn new(criteria: CriteriaMode) -> Self {
        Self {
            criteria,
            first: None,
        }
    }

    /// Record a failure. Returns true when evaluation should stop.
    fn push(&mut self, kind: ErrorType, message: Option<String>) -> bool {
        let collect_all = self.criteria == CriteriaMode::All;
        match &mut self.first {
            None => {
                let mut error = FieldError::new(kind.clone());
                error.message = message.clone();
                if collect_all {
                    error.types.insert(kind.to_string(), message);
                }
                self.first = Some(error);
            }
            Some(error) => {
                error.types.entry(kind.to_string()).or_insert(message);
            }
        }
        !collect_all
    }

    fn finish(self) -> Option<FieldError> {
        self.first
    }
}

fn is_required_empty(value: &Value, is_field_array: bool) -> bool {
    if is_field_array {
        return !matches!(value, Value::Array(items) if !items.is_empty());
    }
    is_empty_value(value) || *value == Value::Bool(false)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// How `value` orders against `bound`; `None` when they are not comparable.
fn compare_bound(value: &Value, bound: &Bound) -> Option<Ordering> {
    match bound {
        Bound::Number(limit) => as_number(value)?.partial_cmp(limit),
        Bound::Text(limit) => Some(value.as_str()?.cmp(limit.as_str())),
    }
}

fn measured_len(value: &Value, is_field_array: bool) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) if is_field_array => Some(items.len()),
        _ => None,
    }
}

fn check_bound(
    failures: &mut Failures,
    rule: Option<&Rule<Bound>>,
    value: &Value,
    kind: ErrorType,
    fails_on: Ordering,
) -> bool {
    match rule {
        Some(rule) if compare_bound(value, &rule.value) == Some(fails_on) => {
            failures.push(kind, rule.message.clone())
        }
        _ => false,
    }
}

fn check_len(
    failures: &mut Failures,
    rule: Option<&Rule<usize>>,
    len: Option<usize>,
    kind: ErrorType,
    fails: impl Fn(usize, usize) -> bool,
) -> bool {
    match (rule, len) {
        (Some(rule), Some(len)) if fails(len, rule.value) => {
            failures.push(kind, rule.message.clone())
        }
        _ => false,
    }
}

/// Run `check`'s built-in rules and validators against its value.
///
/// `form_values` is handed to user validators as their second argument.
pub async fn validate_field(
    check: FieldCheck,
    form_values: Value,
    criteria: CriteriaMode,
) -> Option<FieldError> {
    if check.disabled || !check.mounted {
        return None;
    }
    let error = evaluate(&check, form_values, criteria).await;
    let kind = error.as_ref().map_or("", |e| e.kind.as_str());
    tracing::debug!(
        message = "form.validate",
        path = %check.path,
        failed = error.is_some(),
        kind
    );
    error
}

async fn evaluate(
    check: &FieldCheck,
    form_values: Value,
    criteria: CriteriaMode,
) -> Option<FieldError> {
    let rules = &check.rules;
    let value = &check.value;
    let mut failures = Failures::new(criteria);

    if let Some(required) = &rules.required
        && required.value
        && is_required_empty(value, check.is_field_array)
        && failures.push(ErrorType::Required, required.message.clone())
    {
        return failures.finish();
    }

    if !is_empty_value(value) {
        let max = rules.max.as_ref();
        let min = rules.min.as_ref();
        if check_bound(&mut failures, max, value, ErrorType::Max, Ordering::Greater)
            || check_bound(&mut failures, min, value, ErrorType::Min, Ordering::Less)
        {
            return failures.finish();
        }

        let len = measured_len(value, check.is_field_array);
        if check_len(
            &mut failures,
            rules.max_length.as_ref(),
            len,
            ErrorType::MaxLength,
            |n, l| n > l,
        ) || check_len(
            &mut failures,
            rules.min_length.as_ref(),
            len,
            ErrorType::MinLength,
            |n, l| n < l,
        ) {
            return failures.finish();
        }

        if let (Some(pattern), Some(text)) = (&rules.pattern, value.as_str())
            && !pattern.value.is_match(text)
            && failures.push(ErrorType::Pattern, pattern.message.clone())
        {
            return failures.finish();
        }
    } else if check.is_field_array {
        // An empty sequence still has a length.
        let len = measured_len(value, true);
        if check_len(
            &mut failures,
            rules.min_length.as_ref(),
            len,
            ErrorType::MinLength,
            |n, l| n < l,
        ) {
            return failures.finish();
        }
    }

    match &rules.validate {
        Some(Validate::Single(validator)) => {
            if let ValidateResult::Invalid(message) =
                validator.call(value.clone(), form_values).await
            {
                failures.push(ErrorType::Validate, message);
            }
        }
        Some(Validate::Named(validators)) => {
            for (name, validator) in validators {
                if let ValidateResult::Invalid(message) =
                    validator.call(value.clone(), form_values.clone()).await
                    && failures.push(ErrorType::from(name.as_str()), message)
                {
                    break;
                }
            }
        }
        None => {}
    }

    failures.finish()
}

// ─── Delegated resolver ──────────────────────────────────────────────────────

/// Inputs handed to a [`Resolver`] besides the value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Fields the caller cares about; empty means all.
    pub names: Vec<FieldPath>,
    pub criteria_mode: CriteriaMode,
}

/// A resolver's verdict over the whole value tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverResult {
    /// Values as the resolver wants them submitted.
    pub values: Value,
    pub errors: FieldErrors,
}

/// Whole-form validation delegated to an external schema.
pub trait Resolver {
    fn resolve(
        &self,
        values: Value,
        options: ResolverOptions,
    ) -> LocalBoxFuture<'static, ResolverResult>;
}

impl<F> Resolver for F
where
    F: Fn(Value, ResolverOptions) -> LocalBoxFuture<'static, ResolverResult>,
{
    fn resolve(
        &self,
        values: Value,
        options: ResolverOptions,
    ) -> LocalBoxFuture<'static, ResolverResult> {
        self(values, options)
    }
}

// ─── Mode gate ───────────────────────────────────────────────────────────────

/// Whether a change or blur event skips validation.
///
/// Before the first submit `mode` decides; afterwards `re_validate_mode`
/// does. [`Mode::OnTouched`] validates on blur, then on every change once
/// the field is touched.
#[must_use]
pub fn skip_validation(
    is_blur_event: bool,
    is_touched: bool,
    is_submitted: bool,
    re_validate_mode: ReValidateMode,
    mode: Mode,
) -> bool {
    if mode == Mode::All {
        return false;
    }
    if !is_submitted && mode == Mode::OnTouched {
        return !(is_touched || is_blur_event);
    }
    let active = if is_submitted {
        Mode::from(re_validate_mode)
    } else {
        mode
    };
    match active {
        Mode::OnBlur => !is_blur_event,
        Mode::OnChange => is_blur_event,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Validator;
    use regex::Regex;
    use serde_json::json;

    fn path() -> FieldPath {
        FieldPath::key("field")
    }

    fn run(rules: RegisterOptions, value: Value) -> Option<FieldError> {
        pollster::block_on(validate_field(
            FieldCheck::new(path(), rules, value),
            json!({}),
            CriteriaMode::FirstError,
        ))
    }

    fn kind(error: Option<FieldError>) -> Option<ErrorType> {
        error.map(|e| e.kind)
    }

    #[test]
    fn required_flags_empty_values() {
        let rules = RegisterOptions::new().required_with("needed");
        let err = run(rules.clone(), json!("")).expect("empty string fails");
        assert_eq!(err.kind, ErrorType::Required);
        assert_eq!(err.message.as_deref(), Some("needed"));
        assert!(run(rules.clone(), Value::Null).is_some());
        assert!(run(rules.clone(), json!(false)).is_some());
        assert!(run(rules.clone(), json!(0)).is_none());
        assert!(run(rules, json!("x")).is_none());
    }

    #[test]
    fn min_max_on_numbers_and_numeric_strings() {
        let rules = RegisterOptions::new().min(2).max(10);
        assert_eq!(kind(run(rules.clone(), json!(1))), Some(ErrorType::Min));
        assert_eq!(kind(run(rules.clone(), json!("11"))), Some(ErrorType::Max));
        assert!(run(rules.clone(), json!(5)).is_none());
        assert!(run(rules, json!("")).is_none(), "empty skips min/max");
    }

    #[test]
    fn text_bounds_compare_lexically() {
        let rules = RegisterOptions::new().min("2024-01-01");
        assert_eq!(
            kind(run(rules.clone(), json!("2023-12-31"))),
            Some(ErrorType::Min)
        );
        assert!(run(rules, json!("2024-02-01")).is_none());
    }

    #[test]
    fn length_rules_count_chars() {
        let rules = RegisterOptions::new().min_length(2).max_length(3);
        assert_eq!(kind(run(rules.clone(), json!("é"))), Some(ErrorType::MinLength));
        assert_eq!(kind(run(rules.clone(), json!("abcd"))), Some(ErrorType::MaxLength));
        assert!(run(rules, json!("ééé")).is_none());
    }

    #[test]
    fn pattern_only_checks_strings() {
        let re = Regex::new(r"^\d+$").expect("valid regex");
        let rules = RegisterOptions::new().pattern_with(re, "digits");
        let err = run(rules.clone(), json!("12a")).expect("pattern fails");
        assert_eq!(err.kind, ErrorType::Pattern);
        assert_eq!(err.message.as_deref(), Some("digits"));
        assert!(run(rules, json!("123")).is_none());
    }

    #[test]
    fn validators_report_their_type() {
        let rules = RegisterOptions::new().validate(Validator::new(|v: &Value, _: &Value| {
            if v.as_str() == Some("bad") {
                ValidateResult::from("no bad")
            } else {
                ValidateResult::Valid
            }
        }));
        let err = run(rules, json!("bad")).expect("validator fails");
        assert_eq!(err.kind, ErrorType::Validate);
        assert_eq!(err.message.as_deref(), Some("no bad"));

        let rules = RegisterOptions::new()
            .validate_named("positive", Validator::new(|v: &Value, _: &Value| v.as_i64() > Some(0)));
        let err = run(rules, json!(-1)).expect("named validator fails");
        assert_eq!(err.kind, ErrorType::Custom("positive".into()));
    }

    #[test]
    fn criteria_all_collects_every_failure() {
        let re = Regex::new("^[a-z]+$").expect("valid regex");
        let rules = RegisterOptions::new().min_length(5).pattern(re);
        let err = pollster::block_on(validate_field(
            FieldCheck::new(path(), rules, json!("A1")),
            json!({}),
            CriteriaMode::All,
        ))
        .expect("fails");
        assert_eq!(err.kind, ErrorType::MinLength);
        assert!(err.types.contains_key("minLength"));
        assert!(err.types.contains_key("pattern"));
    }

    #[test]
    fn disabled_and_unmounted_fields_pass() {
        let mut check = FieldCheck::new(path(), RegisterOptions::new().required(), Value::Null);
        check.disabled = true;
        let out = pollster::block_on(validate_field(check.clone(), json!({}), CriteriaMode::All));
        assert!(out.is_none());
        check.disabled = false;
        check.mounted = false;
        let out = pollster::block_on(validate_field(check, json!({}), CriteriaMode::All));
        assert!(out.is_none());
    }

    #[test]
    fn field_array_rules_use_length() {
        let rules = RegisterOptions::new().required().min_length(2);
        let check = |value: Value| {
            pollster::block_on(validate_field(
                FieldCheck::new(path(), rules.clone(), value).field_array(),
                json!({}),
                CriteriaMode::FirstError,
            ))
        };
        assert_eq!(kind(check(json!([]))), Some(ErrorType::Required));
        assert_eq!(kind(check(json!([{ "a": 1 }]))), Some(ErrorType::MinLength));
        assert!(check(json!([{ "a": 1 }, { "a": 2 }])).is_none());
    }

    #[test]
    fn mode_gate_table() {
        use ReValidateMode as R;
        // Before submit.
        assert!(!skip_validation(false, false, false, R::OnChange, Mode::All));
        assert!(skip_validation(false, false, false, R::OnChange, Mode::OnSubmit));
        assert!(!skip_validation(false, false, false, R::OnChange, Mode::OnChange));
        assert!(skip_validation(true, false, false, R::OnChange, Mode::OnChange));
        assert!(!skip_validation(true, false, false, R::OnChange, Mode::OnBlur));
        assert!(skip_validation(false, false, false, R::OnChange, Mode::OnBlur));
        assert!(skip_validation(false, false, false, R::OnChange, Mode::OnTouched));
        assert!(!skip_validation(false, true, false, R::OnChange, Mode::OnTouched));
        assert!(!skip_validation(true, false, false, R::OnChange, Mode::OnTouched));
        // After submit the re-validate mode decides.
        assert!(!skip_validation(false, false, true, R::OnChange, Mode::OnSubmit));
        assert!(skip_validation(false, false, true, R::OnBlur, Mode::OnSubmit));
        assert!(skip_validation(false, false, true, R::OnSubmit, Mode::OnChange));
    }
}
