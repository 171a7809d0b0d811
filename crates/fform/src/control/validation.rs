#![forbid(unsafe_code)]

//! Validation passes, error-slice operations, and validity upkeep.

use std::rc::Rc;

use fform_core::{FieldPath, access};
use serde_json::Value;
use tracing::Instrument;

use super::{ControlCore, FormControl};
use crate::field_error::{FieldError, FieldErrors, array_root_error_path};
use crate::options::{Mode, ReValidateMode, SetErrorOptions};
use crate::proxy::StateKeys;
use crate::revision::Ticket;
use crate::state::FormStateUpdate;
use crate::validate::{FieldCheck, Resolver, ResolverOptions, validate_field};

/// One field's validation, captured before suspending.
struct Job {
    check: FieldCheck,
    error_path: FieldPath,
    ticket: Ticket,
}

/// Result of a committed validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Outcome {
    /// Every validated field passed.
    pub(crate) valid: bool,
    pub(crate) committed: usize,
    pub(crate) stale: usize,
    /// Values returned by the resolver, when one ran.
    pub(crate) values: Option<Value>,
}

fn covered(path: &FieldPath, names: Option<&[FieldPath]>) -> bool {
    names.is_none_or(|names| names.iter().any(|n| n.overlaps(path)))
}

fn field_jobs(core: &ControlCore, names: Option<&[FieldPath]>) -> Vec<Job> {
    let form_disabled = core.options.disabled;
    let mut jobs: Vec<Job> = core
        .registry
        .iter()
        .filter(|(path, _)| covered(path, names))
        .map(|(path, descriptor)| {
            let value = access::get(&core.values, path).cloned().unwrap_or(Value::Null);
            let mut check = FieldCheck::new(path.clone(), descriptor.rules.clone(), value);
            check.disabled = descriptor.disabled || form_disabled;
            check.mounted = descriptor.mount;
            Job {
                check,
                error_path: path.clone(),
                ticket: core.revisions.ticket(path),
            }
        })
        .collect();
    jobs.extend(
        core.array_rules
            .keys()
            .filter(|array| covered(array, names))
            .filter_map(|array| array_root_job(core, array)),
    );
    jobs
}

fn array_root_job(core: &ControlCore, array: &FieldPath) -> Option<Job> {
    let rules = core.array_rules.get(array)?;
    let value = access::get(&core.values, array).cloned().unwrap_or(Value::Null);
    let mut check = FieldCheck::new(array.clone(), rules.clone(), value).field_array();
    check.disabled = core.options.disabled;
    Some(Job {
        check,
        error_path: array_root_error_path(array),
        ticket: core.revisions.ticket(array),
    })
}

/// Store `fresh` at `path` unless it matches what is there. Returns whether
/// the error slice changed.
fn diff_and_store(errors: &mut FieldErrors, path: &FieldPath, fresh: Option<FieldError>) -> bool {
    match (errors.get(path), fresh) {
        (Some(old), Some(new)) if old.same_failure(&new) => false,
        (None, None) => false,
        (_, Some(new)) => {
            errors.set(path.clone(), new);
            true
        }
        (Some(_), None) => {
            errors.remove(path);
            true
        }
    }
}

fn log_stale(path: &FieldPath) {
    tracing::debug!(message = "form.validate.stale", path = %path);
}

impl FormControl {
    fn resolver(&self) -> Option<Rc<dyn Resolver>> {
        self.core().options.resolver.clone()
    }

    /// Add or remove `paths` from `validating_fields`, notifying observers.
    fn mark_validating(&self, paths: &[FieldPath], on: bool) {
        if paths.is_empty() {
            return;
        }
        let update = {
            let mut core = self.core_mut();
            for path in paths {
                if on {
                    core.state.validating_fields.insert(path.clone());
                } else {
                    core.state.validating_fields.remove(path);
                }
            }
            core.state.is_validating = !core.state.validating_fields.is_empty();
            FormStateUpdate::new()
                .validating_fields(core.state.validating_fields.clone())
                .is_validating(core.state.is_validating)
        };
        if self
            .shared
            .proxy
            .is_observed(StateKeys::VALIDATING_FIELDS | StateKeys::IS_VALIDATING)
        {
            self.emit_state(update);
        }
    }

    /// Validate `names` (every field when `None`), commit fresh results, and
    /// emit one state update merging `base` with whatever changed.
    pub(crate) async fn validate_and_commit(
        &self,
        names: Option<Vec<FieldPath>>,
        base: FormStateUpdate,
    ) -> Outcome {
        match self.resolver() {
            Some(resolver) => self.resolve_and_commit(resolver, names, base).await,
            None => {
                let jobs = {
                    let core = self.core();
                    field_jobs(&core, names.as_deref())
                };
                self.run_jobs(jobs, base, names.is_none()).await
            }
        }
    }

    async fn run_jobs(&self, jobs: Vec<Job>, base: FormStateUpdate, full: bool) -> Outcome {
        let (values, criteria) = {
            let core = self.core();
            (core.values.clone(), core.options.criteria_mode)
        };
        let paths: Vec<FieldPath> = jobs.iter().map(|j| j.check.path.clone()).collect();
        self.mark_validating(&paths, true);
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let error = validate_field(job.check.clone(), values.clone(), criteria).await;
            results.push((job, error));
        }
        self.mark_validating(&paths, false);

        let mut outcome = Outcome {
            valid: true,
            ..Outcome::default()
        };
        let update = {
            let mut core = self.core_mut();
            let mut changed = false;
            for (job, error) in results {
                let path = &job.check.path;
                if !core.is_registered(path) || !core.revisions.is_current(path, job.ticket) {
                    outcome.stale += 1;
                    log_stale(path);
                    continue;
                }
                outcome.committed += 1;
                outcome.valid &= error.is_none();
                changed |= diff_and_store(&mut core.state.errors, &job.error_path, error);
            }
            let update = self.finish_commit(&mut core, base, changed, outcome.valid, full);
            // Validity from a partial commit is provisional.
            if outcome.stale > 0 {
                core.pending.valid = true;
            }
            update
        };
        if !update.is_empty() {
            self.emit_state(update);
        }
        outcome
    }

    async fn resolve_and_commit(
        &self,
        resolver: Rc<dyn Resolver>,
        names: Option<Vec<FieldPath>>,
        base: FormStateUpdate,
    ) -> Outcome {
        let full = names.is_none();
        let (values, criteria, scope) = {
            let core = self.core();
            let scope: Vec<(FieldPath, Ticket)> = match &names {
                Some(names) => names
                    .iter()
                    .map(|n| (n.clone(), core.revisions.ticket(n)))
                    .collect(),
                None => core
                    .registry
                    .paths()
                    .chain(core.names.array.iter())
                    .map(|p| (p.clone(), core.revisions.ticket(p)))
                    .collect(),
            };
            (core.values.clone(), core.options.criteria_mode, scope)
        };
        let paths: Vec<FieldPath> = scope.iter().map(|(p, _)| p.clone()).collect();
        self.mark_validating(&paths, true);
        let result = resolver
            .resolve(
                values,
                ResolverOptions {
                    names: names.clone().unwrap_or_default(),
                    criteria_mode: criteria,
                },
            )
            .await;
        self.mark_validating(&paths, false);

        let form_valid = result.errors.is_empty();
        let mut outcome = Outcome {
            valid: match &names {
                Some(names) => !result
                    .errors
                    .paths()
                    .any(|key| names.iter().any(|name| key.starts_with_path(name))),
                None => form_valid,
            },
            ..Outcome::default()
        };
        let update = {
            let mut core = self.core_mut();
            let mut changed = false;
            for (path, ticket) in &scope {
                if !core.revisions.is_current(path, *ticket) {
                    outcome.stale += 1;
                    log_stale(path);
                    continue;
                }
                outcome.committed += 1;
                let stale_keys: Vec<FieldPath> = core
                    .state
                    .errors
                    .paths()
                    .filter(|k| k.starts_with_path(path) && !result.errors.contains(k))
                    .cloned()
                    .collect();
                for key in stale_keys {
                    changed |= diff_and_store(&mut core.state.errors, &key, None);
                }
                for (key, error) in result.errors.iter().filter(|(k, _)| k.starts_with_path(path)) {
                    changed |= diff_and_store(&mut core.state.errors, key, Some(error.clone()));
                }
            }
            if full {
                // Errors the resolver reports outside any registered field.
                for (key, error) in result.errors.iter() {
                    if !scope.iter().any(|(p, _)| key.starts_with_path(p)) {
                        changed |= diff_and_store(&mut core.state.errors, key, Some(error.clone()));
                    }
                }
            }
            let update = self.finish_commit(&mut core, base, changed, form_valid, full);
            if outcome.stale > 0 {
                core.pending.valid = true;
            }
            update
        };
        if !update.is_empty() {
            self.emit_state(update);
        }
        outcome.values = Some(result.values);
        outcome
    }

    /// Fold the committed error slice and validity into `base`.
    fn finish_commit(
        &self,
        core: &mut ControlCore,
        base: FormStateUpdate,
        errors_changed: bool,
        valid: bool,
        full: bool,
    ) -> FormStateUpdate {
        let mut update = base;
        if errors_changed {
            update = update.errors(core.state.errors.clone());
        }
        let observes_valid = self.shared.proxy.is_observed(StateKeys::IS_VALID);
        if full {
            core.state.is_valid = valid;
            update = update.is_valid(valid);
        } else if !valid && core.state.is_valid {
            core.state.is_valid = false;
            if observes_valid {
                update = update.is_valid(false);
            }
        } else if valid {
            core.pending.valid = true;
        }
        update
    }

    /// Validate `names`, or every field when `None`. Returns whether every
    /// validated field passed: with names, only errors at or below them
    /// count, while `is_valid` still tracks the whole form.
    pub async fn trigger(&self, names: Option<&[FieldPath]>) -> bool {
        let label = names.map_or_else(
            || "*".to_string(),
            |n| n.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
        );
        let span = tracing::debug_span!("form.trigger", names = %label);
        async {
            let base = match names {
                Some([single]) => FormStateUpdate::new().named(single.clone()),
                _ => FormStateUpdate::new(),
            };
            let outcome = self.validate_and_commit(names.map(<[_]>::to_vec), base).await;
            self.settle().await;
            outcome.valid
        }
        .instrument(span)
        .await
    }

    /// Validate the field-array root at `array` after a structural change,
    /// when the validation modes call for it.
    pub(crate) async fn validate_array_root(&self, array: &FieldPath) {
        let job = {
            let core = self.core();
            let mode = core.options.mode;
            let revalidate = core.options.re_validate_mode;
            let due = (mode != Mode::OnSubmit || core.state.is_submitted)
                && revalidate != ReValidateMode::OnSubmit;
            if !due || !core.names.array.contains(array) {
                return;
            }
            if core.options.resolver.is_some() {
                None
            } else {
                match array_root_job(&core, array) {
                    Some(job) => Some(job),
                    None => return,
                }
            }
        };
        let base = FormStateUpdate::new().named(array.clone());
        match job {
            Some(job) => {
                self.run_jobs(vec![job], base, false).await;
            }
            None => {
                self.validate_and_commit(Some(vec![array.clone()]), base).await;
            }
        }
    }

    /// Recompute `is_valid` without touching the error slice.
    ///
    /// Runs only while `is_valid` is observed, unless `force` is set.
    pub async fn update_valid(&self, force: bool) {
        let observed = self.shared.proxy.is_observed(StateKeys::IS_VALID);
        if !force && !observed {
            return;
        }
        let (clock, values, criteria, jobs) = {
            let core = self.core();
            (
                core.revisions.clock(),
                core.values.clone(),
                core.options.criteria_mode,
                field_jobs(&core, None),
            )
        };
        let valid = match self.resolver() {
            Some(resolver) => {
                let options = ResolverOptions {
                    names: Vec::new(),
                    criteria_mode: criteria,
                };
                resolver.resolve(values, options).await.errors.is_empty()
            }
            None => {
                let mut valid = true;
                for job in jobs {
                    if validate_field(job.check, values.clone(), criteria)
                        .await
                        .is_some()
                    {
                        valid = false;
                        break;
                    }
                }
                valid
            }
        };
        let changed = {
            let mut core = self.core_mut();
            if core.revisions.clock() != clock {
                tracing::debug!(message = "form.validate.stale", scope = "is_valid");
                core.pending.valid = true;
                return;
            }
            let changed = core.state.is_valid != valid;
            core.state.is_valid = valid;
            changed
        };
        if changed && observed {
            self.emit_state(FormStateUpdate::new().is_valid(valid));
        }
    }

    // ─── Error slice ─────────────────────────────────────────────────────

    /// Record `error` at `path`. The path need not be registered.
    pub fn set_error(&self, path: &FieldPath, error: FieldError, options: SetErrorOptions) {
        let update = {
            let mut core = self.core_mut();
            core.state.errors.set(path.clone(), error);
            core.state.is_valid = false;
            FormStateUpdate::new()
                .named(path.clone())
                .errors(core.state.errors.clone())
                .is_valid(false)
        };
        self.emit_state(update);
        if options.should_focus {
            self.set_focus(path, false);
        }
    }

    /// Remove errors at and below each of `paths`, or every error.
    pub fn clear_errors(&self, paths: Option<&[FieldPath]>) {
        let update = {
            let mut core = self.core_mut();
            match paths {
                Some(paths) => {
                    for path in paths {
                        core.state.errors.remove_under(path);
                    }
                }
                None => core.state.errors.clear(),
            }
            FormStateUpdate::new().errors(core.state.errors.clone())
        };
        self.emit_state(update);
    }

    /// Replace the whole error slice.
    pub fn set_errors(&self, errors: FieldErrors) {
        let update = {
            let mut core = self.core_mut();
            core.state.is_valid = errors.is_empty();
            core.state.errors = errors;
            FormStateUpdate::new()
                .errors(core.state.errors.clone())
                .is_valid(core.state.is_valid)
        };
        self.emit_state(update);
    }

    /// Focus the control attached at `path`, optionally selecting its
    /// contents. Returns false if no live control took focus.
    pub fn set_focus(&self, path: &FieldPath, should_select: bool) -> bool {
        let handle = self.core().registry.get(path).and_then(|d| d.handle());
        let Some(handle) = handle else {
            return false;
        };
        let focused = handle.focus();
        if focused && should_select {
            handle.select();
        }
        focused
    }

    /// Focus the first errored, mounted field in registration order.
    pub(crate) fn focus_first_error(&self) -> bool {
        let handles = {
            let core = self.core();
            let mut fields: Vec<_> = core
                .registry
                .iter()
                .filter(|(path, d)| d.mount && core.state.errors.has_under(path))
                .map(|(_, d)| d)
                .collect();
            fields.sort_by_key(|d| d.seq());
            fields.iter().filter_map(|d| d.handle()).collect::<Vec<_>>()
        };
        handles.iter().any(|h| h.focus())
    }
}
