#![forbid(unsafe_code)]

//! Submission: validate everything, then hand the values to a callback.

use std::future::Future;

use fform_core::access;
use serde_json::Value;
use tracing::Instrument;

use super::FormControl;
use crate::error::{FormError, Result, SubmitFailure};
use crate::field_error::{ErrorType, FieldError, FieldErrors, server_error_path};
use crate::state::FormStateUpdate;

/// How a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation passed and the valid callback succeeded.
    Valid,
    /// Validation failed; the invalid callback ran.
    Invalid { error_count: usize },
    /// Validation passed but the valid callback reported a failure.
    Failed(SubmitFailure),
}

impl SubmitOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid { error_count } => Err(FormError::Invalid { count: error_count }),
            Self::Failed(failure) => Err(FormError::Submit(failure)),
        }
    }
}

impl FormControl {
    /// Validate every field and, if the form is valid, call `on_valid` with
    /// the submitted values.
    pub async fn handle_submit<F, Fut>(&self, on_valid: F) -> SubmitOutcome
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<(), SubmitFailure>>,
    {
        self.handle_submit_with(on_valid, |_| async {}).await
    }

    /// Like [`handle_submit`](Self::handle_submit), calling `on_invalid`
    /// with the error map when validation fails.
    ///
    /// Submitted values exclude disabled fields. A resolver's transformed
    /// values replace the form values. A failure from `on_valid` is recorded
    /// at `root.server`.
    pub async fn handle_submit_with<F, Fut, I, IFut>(
        &self,
        on_valid: F,
        on_invalid: I,
    ) -> SubmitOutcome
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<(), SubmitFailure>>,
        I: FnOnce(FieldErrors) -> IFut,
        IFut: Future<Output = ()>,
    {
        let span = tracing::debug_span!("form.handle_submit");
        async move {
            self.core_mut().state.is_submitting = true;
            self.emit_state(FormStateUpdate::new().is_submitting(true));

            let outcome = self.validate_and_commit(None, FormStateUpdate::new()).await;
            let (values, errors, focus_errors) = {
                let mut core = self.core_mut();
                let mut values = outcome
                    .values
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| core.values.clone());
                for path in &core.names.disabled {
                    access::unset(&mut values, path);
                }
                core.state.errors.clear_form_level();
                (values, core.state.errors.clone(), core.options.should_focus_error)
            };

            let result = if errors.is_empty() {
                match on_valid(values).await {
                    Ok(()) => SubmitOutcome::Valid,
                    Err(failure) => {
                        let error = FieldError::new(ErrorType::Custom("server".to_string()))
                            .with_message(failure.message.clone());
                        self.core_mut().state.errors.set(server_error_path(), error);
                        SubmitOutcome::Failed(failure)
                    }
                }
            } else {
                let error_count = errors.len();
                on_invalid(errors).await;
                if focus_errors {
                    self.focus_first_error();
                }
                SubmitOutcome::Invalid { error_count }
            };

            let update = {
                let mut core = self.core_mut();
                let state = &mut core.state;
                state.is_submitted = true;
                state.is_submitting = false;
                state.is_submit_successful = result.is_success();
                state.submit_count = state.submit_count.saturating_add(1);
                if !state.errors.is_empty() {
                    state.is_valid = false;
                }
                tracing::debug!(
                    message = "form.submit",
                    outcome = ?result,
                    submit_count = state.submit_count
                );
                FormStateUpdate::new()
                    .is_submitted(true)
                    .is_submitting(false)
                    .is_submit_successful(state.is_submit_successful)
                    .submit_count(state.submit_count)
                    .errors(state.errors.clone())
                    .is_valid(state.is_valid)
            };
            self.emit_state(update);
            self.settle().await;
            result
        }
        .instrument(span)
        .await
    }
}
