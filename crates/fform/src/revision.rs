#![forbid(unsafe_code)]

//! Per-path revision counters guarding async validation commits.
//!
//! Every write advances one shared clock and stamps the written path, its
//! ancestors and the given descendants with the new clock value. A
//! validation captures a [`Ticket`] before suspending and commits only if
//! the ticket is still current when it resumes.
//!
//! Removing a subtree ([`Revisions::retire`]) drops every stamp below it and
//! leaves one tombstone at its root. A ticket also records the newest
//! tombstone on its path, so a field that goes away and comes back never
//! sees an old ticket become current again.
//!
//! # Invariants
//!
//! 1. The clock never goes backwards, so a stamp never repeats for a path.
//! 2. [`Revisions::reset`] invalidates every outstanding ticket.
//! 3. After `retire(p)`, no stamp or tombstone strictly below `p` remains.

use ahash::AHashMap;
use fform_core::FieldPath;

/// A path's revision at the moment a validation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    epoch: u64,
    rev: u64,
    retired: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Revisions {
    clock: u64,
    epoch: u64,
    by_path: AHashMap<FieldPath, u64>,
    /// Tombstones of removed subtrees.
    retired: AHashMap<FieldPath, u64>,
}

impl Revisions {
    /// Stamp `path`, its ancestors and `descendants`.
    pub(crate) fn bump<'a>(
        &mut self,
        path: &FieldPath,
        descendants: impl IntoIterator<Item = &'a FieldPath>,
    ) {
        let stamp = self.tick();
        self.by_path.insert(path.clone(), stamp);
        for ancestor in path.ancestors() {
            self.by_path.insert(ancestor, stamp);
        }
        for descendant in descendants {
            self.by_path.insert(descendant.clone(), stamp);
        }
    }

    /// Invalidate every ticket at or below `path` and forget the stamps
    /// there. Ancestors are stamped as by [`Revisions::bump`].
    pub(crate) fn retire(&mut self, path: &FieldPath) {
        let stamp = self.tick();
        self.by_path.retain(|p, _| !p.starts_with_path(path));
        self.retired.retain(|p, _| !p.starts_with_path(path));
        self.retired.insert(path.clone(), stamp);
        for ancestor in path.ancestors() {
            self.by_path.insert(ancestor, stamp);
        }
    }

    /// Invalidate everything, as after a form reset.
    pub(crate) fn reset(&mut self) {
        self.epoch += 1;
        self.tick();
        self.by_path.clear();
        self.retired.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub(crate) fn ticket(&self, path: &FieldPath) -> Ticket {
        let retired = std::iter::once(path.clone())
            .chain(path.ancestors())
            .filter_map(|p| self.retired.get(&p).copied())
            .max()
            .unwrap_or(0);
        Ticket {
            epoch: self.epoch,
            rev: self.by_path.get(path).copied().unwrap_or(0),
            retired,
        }
    }

    pub(crate) fn is_current(&self, path: &FieldPath, ticket: Ticket) -> bool {
        self.ticket(path) == ticket
    }

    /// Advances on every write anywhere in the form.
    pub(crate) fn clock(&self) -> u64 {
        self.clock
    }

    /// Stamps and tombstones currently held.
    pub(crate) fn tracked(&self) -> usize {
        self.by_path.len() + self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn bump_invalidates_path_and_ancestors() {
        let mut revs = Revisions::default();
        let field = revs.ticket(&p("a.b"));
        let parent = revs.ticket(&p("a"));
        let sibling = revs.ticket(&p("a.c"));
        revs.bump(&p("a.b"), []);
        assert!(!revs.is_current(&p("a.b"), field));
        assert!(!revs.is_current(&p("a"), parent));
        assert!(revs.is_current(&p("a.c"), sibling));
    }

    #[test]
    fn bump_reaches_listed_descendants() {
        let mut revs = Revisions::default();
        let child = p("items.0.name");
        let ticket = revs.ticket(&child);
        revs.bump(&p("items"), [&child]);
        assert!(!revs.is_current(&child, ticket));
    }

    #[test]
    fn retire_prunes_the_subtree() {
        let mut revs = Revisions::default();
        let rows: Vec<FieldPath> = (0..50).map(|i| p(&format!("rows.{i}.name"))).collect();
        for row in &rows {
            revs.bump(row, []);
        }
        let before = revs.tracked();
        revs.retire(&p("rows"));
        assert!(revs.tracked() < before);
        assert_eq!(revs.tracked(), 1);
    }

    #[test]
    fn retired_tickets_stay_stale_after_pruning() {
        let mut revs = Revisions::default();
        let field = p("user.name");
        let fresh = revs.ticket(&field);
        let sibling = revs.ticket(&p("other"));
        revs.retire(&p("user"));
        assert!(!revs.is_current(&field, fresh));
        assert!(revs.is_current(&p("other"), sibling));
    }

    #[test]
    fn sibling_writes_do_not_retire() {
        let mut revs = Revisions::default();
        let name = revs.ticket(&p("user.name"));
        revs.bump(&p("user.email"), []);
        assert!(revs.is_current(&p("user.name"), name));
    }

    #[test]
    fn reset_invalidates_all_tickets() {
        let mut revs = Revisions::default();
        let ticket = revs.ticket(&p("untouched"));
        let clock = revs.clock();
        revs.reset();
        assert!(!revs.is_current(&p("untouched"), ticket));
        assert!(revs.clock() > clock);
    }
}
