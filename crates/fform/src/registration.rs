#![forbid(unsafe_code)]

//! The binding returned by [`FormControl::register`].

use std::rc::Rc;

use fform_core::FieldPath;
use serde_json::Value;

use crate::control::{FieldEvent, FormControl};
use crate::error::{FormError, Result};
use crate::registry::FieldHandle;

/// Connects one input control to one registered field.
#[derive(Debug, Clone)]
pub struct FieldRegistration {
    control: FormControl,
    name: FieldPath,
}

impl FieldRegistration {
    pub(crate) fn new(control: FormControl, name: FieldPath) -> Self {
        Self { control, name }
    }

    #[must_use]
    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    #[must_use]
    pub fn control(&self) -> &FormControl {
        &self.control
    }

    /// Current value of the field.
    #[must_use]
    pub fn value(&self) -> Value {
        self.control.get_value(&self.name).unwrap_or(Value::Null)
    }

    /// Forward a change event. Returns false if the field was unregistered.
    pub async fn on_change(&self, value: Value) -> bool {
        self.control
            .handle_field_event(&self.name, FieldEvent::Change(value))
            .await
    }

    /// Forward a blur event. Returns false if the field was unregistered.
    pub async fn on_blur(&self) -> bool {
        self.control
            .handle_field_event(&self.name, FieldEvent::Blur)
            .await
    }

    /// Attach the live control. It receives the current value right away
    /// and every programmatic write after that.
    ///
    /// The registration holds the control weakly; keep your own `Rc`.
    pub fn attach(&self, handle: &Rc<dyn FieldHandle>) -> Result<()> {
        if self.control.attach_handle(&self.name, handle) {
            Ok(())
        } else {
            Err(FormError::NotRegistered {
                path: self.name.clone(),
            })
        }
    }

    /// The live control went away.
    pub fn detach(&self) {
        self.control.detach_handle(&self.name);
    }
}
