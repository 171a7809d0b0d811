#![forbid(unsafe_code)]

//! Usage errors and the submit-failure type.

use fform_core::{FieldPath, PathError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormError>;

/// Usage errors reported by the form engine.
///
/// Validation failures are never `FormError`s: they are recorded as
/// [`FieldError`](crate::FieldError)s in the form state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("invalid field path: {0}")]
    Path(#[from] PathError),

    #[error("field is not registered: {path}")]
    NotRegistered { path: FieldPath },

    #[error("value at {path} is not a field array")]
    NotFieldArray { path: FieldPath },

    #[error("form has {count} invalid field(s)")]
    Invalid { count: usize },

    #[error("submission failed: {0}")]
    Submit(SubmitFailure),
}

/// Failure reported by a submit callback.
///
/// Recorded at `root.server` so transport errors render through the same
/// error slice as field errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubmitFailure {
    pub message: String,
}

impl SubmitFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
