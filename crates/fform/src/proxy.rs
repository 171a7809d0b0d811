#![forbid(unsafe_code)]

//! Observed-key tracking for lazily maintained form-state slices.
//!
//! # Design
//!
//! Every Form State consumer owns a [`StateKeys`] set recording which
//! top-level keys it has read. Reads go through accessor methods that mark
//! the key before returning the value; there is no interception of field
//! access. The control keeps the union of all consumers' sets and skips
//! recomputing the [`StateKeys::LAZY`] slices nobody has read.
//!
//! # Invariants
//!
//! 1. A set only grows: once observed, a key stays observed for the life of
//!    its consumer.
//! 2. [`should_render_form_state`] always applies the update to the local
//!    copy, whether or not it reports a render.
//! 3. A form-wide update (no `name`), an update with no slices, or one
//!    carrying every lazy slice always renders.

use std::cell::Cell;

use fform_core::FieldPath;

use crate::state::FormStateUpdate;

bitflags::bitflags! {
    /// Top-level Form State keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateKeys: u16 {
        const VALUES               = 1 << 0;
        const DEFAULT_VALUES       = 1 << 1;
        const ERRORS               = 1 << 2;
        const DIRTY_FIELDS         = 1 << 3;
        const TOUCHED_FIELDS       = 1 << 4;
        const VALIDATING_FIELDS    = 1 << 5;
        const IS_DIRTY             = 1 << 6;
        const IS_VALID             = 1 << 7;
        const IS_VALIDATING        = 1 << 8;
        const IS_SUBMITTED         = 1 << 9;
        const IS_SUBMITTING        = 1 << 10;
        const IS_SUBMIT_SUCCESSFUL = 1 << 11;
        const SUBMIT_COUNT         = 1 << 12;
        const DISABLED             = 1 << 13;
        const IS_LOADING           = 1 << 14;

        /// Slices that are only kept live while observed.
        const LAZY = Self::IS_DIRTY.bits()
            | Self::DIRTY_FIELDS.bits()
            | Self::TOUCHED_FIELDS.bits()
            | Self::VALIDATING_FIELDS.bits()
            | Self::IS_VALIDATING.bits()
            | Self::IS_VALID.bits()
            | Self::ERRORS.bits();
    }
}

/// Interior-mutable observed-key set.
#[derive(Debug, Default)]
pub struct ProxyTracker {
    observed: Cell<StateKeys>,
}

impl ProxyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, keys: StateKeys) {
        self.observed.set(self.observed.get() | keys);
    }

    #[must_use]
    pub fn observed(&self) -> StateKeys {
        self.observed.get()
    }

    #[must_use]
    pub fn is_observed(&self, keys: StateKeys) -> bool {
        self.observed.get().intersects(keys)
    }
}

/// Apply `update` through `update_fn`, then decide whether a consumer
/// observing `observed` should recompute.
///
/// Updates without a field name are form-wide and always render; named
/// updates render only when they touch an observed key.
pub fn should_render_form_state(
    update: &FormStateUpdate,
    observed: StateKeys,
    update_fn: impl FnOnce(&FormStateUpdate),
) -> bool {
    update_fn(update);
    if update.name.is_none() {
        return true;
    }
    let keys = update.keys();
    keys.is_empty() || keys.contains(StateKeys::LAZY) || keys.intersects(observed)
}

/// Whether an update about `signal` concerns a subscriber to `names`.
///
/// No filter, or a form-wide update, always matches. Otherwise `exact`
/// requires equality and the default accepts ancestors and descendants.
#[must_use]
pub fn should_subscribe_by_name(
    names: &[FieldPath],
    signal: Option<&FieldPath>,
    exact: bool,
) -> bool {
    let Some(signal) = signal else {
        return true;
    };
    if names.is_empty() {
        return true;
    }
    names.iter().any(|name| {
        if exact {
            name == signal
        } else {
            name.overlaps(signal)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FormStateSnapshot;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn unobserved_slice_does_not_render() {
        let mut local = FormStateSnapshot::default();
        let update = FormStateUpdate::new().named(p("a")).is_valid(true);
        let render = should_render_form_state(&update, StateKeys::ERRORS, |u| u.apply_to(&mut local));
        assert!(!render);
        assert!(local.is_valid, "local copy updated regardless");
    }

    #[test]
    fn observed_slice_renders() {
        let update = FormStateUpdate::new().named(p("a")).errors(Default::default());
        assert!(should_render_form_state(&update, StateKeys::ERRORS, |_| {}));
    }

    #[test]
    fn form_wide_update_always_renders() {
        let update = FormStateUpdate::new().is_submitting(true);
        assert!(should_render_form_state(&update, StateKeys::ERRORS, |_| {}));
        assert!(should_render_form_state(&update, StateKeys::empty(), |_| {}));
    }

    #[test]
    fn empty_and_full_updates_always_render() {
        assert!(should_render_form_state(
            &FormStateUpdate::new().named(p("a")),
            StateKeys::empty(),
            |_| {}
        ));
        let full = FormStateUpdate::full(&FormStateSnapshot::default());
        assert!(should_render_form_state(&full, StateKeys::empty(), |_| {}));
    }

    #[test]
    fn tracker_only_grows() {
        let tracker = ProxyTracker::new();
        tracker.mark(StateKeys::IS_VALID);
        tracker.mark(StateKeys::ERRORS);
        assert!(tracker.is_observed(StateKeys::IS_VALID));
        assert!(tracker.is_observed(StateKeys::ERRORS | StateKeys::IS_DIRTY));
        assert!(!tracker.is_observed(StateKeys::IS_DIRTY));
    }

    #[test]
    fn name_filter() {
        let names = [p("user.name")];
        assert!(should_subscribe_by_name(&names, None, true));
        assert!(should_subscribe_by_name(&[], Some(&p("x")), true));
        assert!(should_subscribe_by_name(&names, Some(&p("user")), false));
        assert!(should_subscribe_by_name(&names, Some(&p("user.name.first")), false));
        assert!(!should_subscribe_by_name(&names, Some(&p("user")), true));
        assert!(!should_subscribe_by_name(&names, Some(&p("other")), false));
    }
}
