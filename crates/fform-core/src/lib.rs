#![forbid(unsafe_code)]

//! Core: field paths, value-tree access, subjects, and field-array ordering.
//!
//! Nothing in this crate knows about forms. It provides the leaf pieces the
//! form engine in `fform` is assembled from:
//!
//! - [`path`]: parsed [`FieldPath`]s and a per-instance [`PathCache`].
//! - [`access`]: get/set/unset over a `serde_json::Value` tree.
//! - [`subject`]: synchronous multi-subscriber [`Subject`]s.
//! - [`array`]: pure ordering transforms and the replayable [`ArrayOp`].
//! - [`key`]: opaque [`FieldKey`] identities for array entries.
//! - [`compare`]: deep equality and dirty-leaf diffing.

pub mod access;
pub mod array;
pub mod compare;
pub mod key;
pub mod path;
pub mod subject;

pub use array::ArrayOp;
pub use key::FieldKey;
pub use path::{FieldPath, PathCache, PathError, Segment};
pub use subject::{Subject, Subscription};
