#![forbid(unsafe_code)]

//! Opaque identity keys for field-array entries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};

static NEXT_FIELD_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of one field-array entry, independent of its value.
///
/// Keys are unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldKey(u64);

impl FieldKey {
    /// Generate a fresh key.
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_FIELD_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// `count` fresh keys.
    #[must_use]
    pub fn generate_n(count: usize) -> Vec<Self> {
        (0..count).map(|_| Self::generate()).collect()
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fk-{:08x}", self.0)
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
