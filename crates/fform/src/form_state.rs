#![forbid(unsafe_code)]

//! Tracked, subscribed view of the form state.
//!
//! A [`FormStateHandle`] keeps its own copy of the form state, updated from
//! the state subject. Reading a slice through an accessor marks that key as
//! observed, both locally and on the control. An incoming update bumps
//! [`FormStateHandle::renders`] when it is form-wide or touches an observed
//! key, so the render count measures how often a consumer would actually
//! redraw.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use fform_core::{FieldPath, Subscription};
use serde_json::Value;

use crate::control::FormControl;
use crate::field_error::FieldErrors;
use crate::options::SubscribeOptions;
use crate::proxy::{ProxyTracker, StateKeys, should_render_form_state, should_subscribe_by_name};
use crate::state::{FieldState, FormStateSnapshot};

pub struct FormStateHandle {
    control: FormControl,
    state: Rc<RefCell<FormStateSnapshot>>,
    tracker: Rc<ProxyTracker>,
    renders: Rc<Cell<u64>>,
    _subscription: Subscription,
}

impl fmt::Debug for FormStateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStateHandle")
            .field("observed", &self.tracker.observed())
            .field("renders", &self.renders.get())
            .finish_non_exhaustive()
    }
}

macro_rules! tracked {
    ($($(#[$meta:meta])* $name:ident: $ty:ty => $key:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $name(&self) -> $ty {
                self.track(StateKeys::$key);
                self.state.borrow().$name.clone()
            }
        )*
    };
}

impl FormStateHandle {
    pub(crate) fn new(control: FormControl, options: SubscribeOptions) -> Self {
        let state = Rc::new(RefCell::new(control.get_form_state()));
        let tracker = Rc::new(ProxyTracker::new());
        let renders = Rc::new(Cell::new(0));
        let subscription = if options.disabled {
            Subscription::empty()
        } else {
            let state = Rc::clone(&state);
            let tracker = Rc::clone(&tracker);
            let renders = Rc::clone(&renders);
            control.subscribe_state(move |update| {
                if !should_subscribe_by_name(&options.names, update.name.as_ref(), options.exact) {
                    return;
                }
                let render = should_render_form_state(update, tracker.observed(), |u| {
                    u.apply_to(&mut state.borrow_mut());
                });
                if render {
                    renders.set(renders.get() + 1);
                }
            })
        };
        Self {
            control,
            state,
            tracker,
            renders,
            _subscription: subscription,
        }
    }

    fn track(&self, keys: StateKeys) {
        let newly_valid = keys.contains(StateKeys::IS_VALID)
            && !self.control.observed().contains(StateKeys::IS_VALID);
        self.tracker.mark(keys);
        self.control.observe(keys);
        if newly_valid && let Ok(mut core) = self.control.shared.core.try_borrow_mut() {
            core.pending.valid = true;
        }
    }

    /// How many delivered updates touched an observed key.
    #[must_use]
    pub fn renders(&self) -> u64 {
        self.renders.get()
    }

    /// Keys read through this handle so far.
    #[must_use]
    pub fn observed(&self) -> StateKeys {
        self.tracker.observed()
    }

    /// Untracked copy of the local state.
    #[must_use]
    pub fn snapshot(&self) -> FormStateSnapshot {
        self.state.borrow().clone()
    }

    tracked! {
        values: Value => VALUES,
        default_values: Value => DEFAULT_VALUES,
        errors: FieldErrors => ERRORS,
        dirty_fields: BTreeSet<FieldPath> => DIRTY_FIELDS,
        touched_fields: BTreeSet<FieldPath> => TOUCHED_FIELDS,
        validating_fields: BTreeSet<FieldPath> => VALIDATING_FIELDS,
        is_dirty: bool => IS_DIRTY,
        /// Only kept live while some consumer reads it.
        is_valid: bool => IS_VALID,
        is_validating: bool => IS_VALIDATING,
        is_submitted: bool => IS_SUBMITTED,
        is_submitting: bool => IS_SUBMITTING,
        is_submit_successful: bool => IS_SUBMIT_SUCCESSFUL,
        submit_count: u32 => SUBMIT_COUNT,
        disabled: bool => DISABLED,
        is_loading: bool => IS_LOADING,
    }

    /// Per-field view derived from the local copy.
    #[must_use]
    pub fn field_state(&self, path: &FieldPath) -> FieldState {
        self.track(
            StateKeys::ERRORS
                | StateKeys::DIRTY_FIELDS
                | StateKeys::TOUCHED_FIELDS
                | StateKeys::VALIDATING_FIELDS,
        );
        let state = self.state.borrow();
        let under = |set: &BTreeSet<FieldPath>| set.iter().any(|p| p.starts_with_path(path));
        FieldState {
            invalid: state.errors.has_under(path),
            is_dirty: under(&state.dirty_fields),
            is_touched: under(&state.touched_fields),
            is_validating: under(&state.validating_fields),
            error: state.errors.get(path).cloned(),
        }
    }
}

impl FormControl {
    /// Subscribe a tracked form-state view.
    pub fn use_form_state(&self, options: SubscribeOptions) -> FormStateHandle {
        FormStateHandle::new(self.clone(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FormOptions;
    use crate::state::FormStateUpdate;
    use serde_json::json;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn unobserved_slices_do_not_render() {
        let form = FormControl::new(FormOptions::new().default_values(json!({ "a": 1 })));
        let view = form.use_form_state(SubscribeOptions::default());
        let _ = view.touched_fields();
        form.emit_state(FormStateUpdate::new().named(p("a")).dirty_fields([p("a")].into()));
        assert_eq!(view.renders(), 0);
        assert!(view.snapshot().dirty_fields.contains(&p("a")));
        form.emit_state(FormStateUpdate::new().named(p("a")).touched_fields([p("a")].into()));
        assert_eq!(view.renders(), 1);
        assert!(view.touched_fields().contains(&p("a")));
    }

    #[test]
    fn form_wide_updates_render_for_every_consumer() {
        let form = FormControl::default();
        let view = form.use_form_state(SubscribeOptions::default());
        let _ = view.errors();
        form.emit_state(FormStateUpdate::new().is_submitting(true));
        assert_eq!(view.renders(), 1);
        assert!(view.snapshot().is_submitting);
    }

    #[test]
    fn name_filter_drops_unrelated_updates() {
        let form = FormControl::default();
        let view = form.use_form_state(SubscribeOptions::default().name(p("user")));
        let _ = view.touched_fields();
        form.emit_state(
            FormStateUpdate::new()
                .named(p("other"))
                .touched_fields([p("other")].into()),
        );
        assert_eq!(view.renders(), 0);
        form.emit_state(
            FormStateUpdate::new()
                .named(p("user.name"))
                .touched_fields([p("user.name")].into()),
        );
        assert_eq!(view.renders(), 1);
    }

    #[test]
    fn reading_is_valid_marks_the_control() {
        let form = FormControl::default();
        let view = form.use_form_state(SubscribeOptions::default());
        assert!(!form.observed().contains(StateKeys::IS_VALID));
        let _ = view.is_valid();
        assert!(form.observed().contains(StateKeys::IS_VALID));
    }
}
