#![forbid(unsafe_code)]

//! Reactive form-state engine.
//!
//! A [`FormControl`] owns one form: its value tree, the registered fields,
//! the derived form state, and three subjects that push targeted
//! notifications to subscribers. Bindings reach it through
//! [`FieldRegistration`], [`FieldArray`] and [`FormStateHandle`].
//!
//! Everything is single-threaded. Validation is the only async step; it
//! suspends without holding any borrow, and a result whose field changed in
//! the meantime is discarded.
//!
//! # Example
//!
//! ```
//! use fform::{FormControl, FormOptions, RegisterOptions};
//! use serde_json::json;
//!
//! let form = FormControl::new(FormOptions::new().default_values(json!({ "name": "" })));
//! let name = form.path("name").unwrap();
//! let field = form.register(&name, RegisterOptions::new().required());
//! pollster::block_on(field.on_change(json!("Ada")));
//! assert!(form.get_form_state().is_dirty);
//! ```

mod control;
pub mod error;
pub mod field_array;
pub mod field_error;
pub mod form_state;
pub mod options;
pub mod proxy;
pub mod registration;
pub mod registry;
mod revision;
pub mod rules;
pub mod state;
pub mod validate;

pub use control::{
    ArrayUpdate, FieldEvent, FormControl, FormSubjects, SubmitOutcome, ValueEventKind,
    ValuesUpdate,
};
pub use error::{FormError, Result, SubmitFailure};
pub use field_array::FieldArray;
pub use field_error::{ErrorType, FieldError, FieldErrors};
pub use form_state::FormStateHandle;
pub use options::{
    CriteriaMode, DefaultValues, FocusOptions, FormOptions, KeepStateOptions, Mode,
    ReValidateMode, ResetFieldOptions, SetErrorOptions, SetValueOptions, SubscribeOptions,
    UnregisterOptions,
};
pub use proxy::StateKeys;
pub use registration::FieldRegistration;
pub use registry::FieldHandle;
pub use rules::{Bound, RegisterOptions, Rule, Validate, ValidateResult, Validator};
pub use state::{FieldState, FormStateSnapshot, FormStateUpdate};
pub use validate::{Resolver, ResolverOptions, ResolverResult};

pub use fform_core::{ArrayOp, FieldKey, FieldPath, PathError, Segment, Subscription};
