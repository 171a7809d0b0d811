#![forbid(unsafe_code)]

//! Parsed field paths.
//!
//! A [`FieldPath`] addresses one location in a value tree. The textual form
//! uses `.` for mapping descent and numeric segments for sequence indices
//! (`items.0.name`); the bracket form `items[0].name` is accepted and
//! normalised on parse.
//!
//! # Invariants
//!
//! 1. A parsed path has at least one segment and no empty key segment.
//! 2. A decimal segment without leading zeros is always an index.
//! 3. `FieldPath::parse(p.to_string()) == p` for every parsed `p`.
//! 4. Ordering is lexicographic by segment, with indices ordered numerically,
//!    so all descendants of a path sort directly after it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("empty segment at byte {offset} in `{path}`")]
    EmptySegment { path: String, offset: usize },

    #[error("unbalanced bracket in `{path}`")]
    UnbalancedBracket { path: String },

    #[error("bracket segment `{segment}` in `{path}` is not an index")]
    NonNumericBracket { path: String, segment: String },

    #[error("index `{segment}` in `{path}` does not fit in usize")]
    IndexOverflow { path: String, segment: String },

    #[error("index `{segment}` in `{path}` exceeds the limit of {max}", max = MAX_INDEX)]
    IndexTooLarge { path: String, segment: String },
}

/// Largest sequence index a path may address.
pub const MAX_INDEX: usize = 1 << 20;

pub type Result<T> = std::result::Result<T, PathError>;

/// Decimal digits without a leading zero (except `"0"` itself).
fn is_canonical_index(raw: &str) -> bool {
    !raw.is_empty()
        && raw.bytes().all(|c| c.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'))
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Sequence index.
    Index(usize),
    /// Mapping key.
    Key(String),
}

impl Segment {
    /// The index, if this segment addresses a sequence slot.
    #[must_use]
    pub const fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(_) => None,
        }
    }

    /// Segment for a mapping key as it appears in a value tree.
    ///
    /// Digit-only keys become indices so the path round-trips through text.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        if is_canonical_index(key)
            && let Ok(i) = key.parse::<usize>()
        {
            return Self::Index(i);
        }
        Self::Key(key.to_string())
    }

    /// Mapping key for this segment. Indices render as decimal keys.
    #[must_use]
    pub fn to_key(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Key(k) => k.clone(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

/// A validated, parsed field path.
///
/// Cloning is cheap: segments live behind an `Arc`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Arc<[Segment]>,
}

impl FieldPath {
    /// Parse a path string.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        let bytes = input.as_bytes();
        let mut start = 0;
        let mut i = 0;
        // Set after a closing bracket: the next byte must be `.`, `[` or end.
        let mut after_bracket = false;

        while i <= bytes.len() {
            let at_end = i == bytes.len();
            let b = if at_end { b'.' } else { bytes[i] };
            match b {
                b'.' | b'[' => {
                    if after_bracket {
                        if i != start {
                            return Err(PathError::UnbalancedBracket {
                                path: input.to_string(),
                            });
                        }
                        after_bracket = false;
                        if b == b'.' && !at_end {
                            // `a[0].b`: the dot only separates.
                            start = i + 1;
                            i += 1;
                            continue;
                        }
                    } else {
                        let raw = &input[start..i];
                        if raw.is_empty() {
                            return Err(PathError::EmptySegment {
                                path: input.to_string(),
                                offset: start,
                            });
                        }
                        segments.push(Self::classify(input, raw)?);
                    }
                    if at_end {
                        break;
                    }
                    if b == b'[' {
                        let close = input[i + 1..].find(']').map(|o| i + 1 + o).ok_or_else(|| {
                            PathError::UnbalancedBracket {
                                path: input.to_string(),
                            }
                        })?;
                        let raw = &input[i + 1..close];
                        if raw.is_empty() || !raw.bytes().all(|c| c.is_ascii_digit()) {
                            return Err(PathError::NonNumericBracket {
                                path: input.to_string(),
                                segment: raw.to_string(),
                            });
                        }
                        segments.push(Self::classify(input, raw)?);
                        after_bracket = true;
                        i = close + 1;
                        start = i;
                        continue;
                    }
                    start = i + 1;
                }
                b']' => {
                    return Err(PathError::UnbalancedBracket {
                        path: input.to_string(),
                    });
                }
                _ => {}
            }
            i += 1;
        }

        Ok(Self {
            segments: segments.into(),
        })
    }

    fn classify(input: &str, raw: &str) -> Result<Segment> {
        if is_canonical_index(raw) {
            let index = raw.parse::<usize>().map_err(|_| PathError::IndexOverflow {
                path: input.to_string(),
                segment: raw.to_string(),
            })?;
            if index > MAX_INDEX {
                return Err(PathError::IndexTooLarge {
                    path: input.to_string(),
                    segment: raw.to_string(),
                });
            }
            Ok(Segment::Index(index))
        } else {
            Ok(Segment::Key(raw.to_string()))
        }
    }

    /// Build a path from segments. Returns `None` for an empty list.
    #[must_use]
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Option<Self> {
        let segments: Vec<Segment> = segments.into_iter().collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self {
                segments: segments.into(),
            })
        }
    }

    /// Single-segment path.
    #[must_use]
    pub fn from_segment(segment: Segment) -> Self {
        Self {
            segments: Arc::from([segment]),
        }
    }

    /// Single-segment path for a mapping key.
    #[must_use]
    pub fn key(key: &str) -> Self {
        Self {
            segments: Arc::from([Segment::from_key(key)]),
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false: parsed paths have at least one segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }

    /// Path without its last segment; `None` for single-segment paths.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        Self::from_segments(self.segments[..self.segments.len() - 1].iter().cloned())
    }

    /// Every proper ancestor, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> + '_ {
        (1..self.segments.len())
            .rev()
            .map(|n| Self {
                segments: self.segments[..n].into(),
            })
    }

    /// Append one segment.
    #[must_use]
    pub fn join(&self, segment: Segment) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(segment);
        Self {
            segments: segments.into(),
        }
    }

    /// Append a mapping key.
    #[must_use]
    pub fn join_key(&self, key: &str) -> Self {
        self.join(Segment::from_key(key))
    }

    /// Append a sequence index.
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        self.join(Segment::Index(index))
    }

    /// Append every segment of `rest`.
    #[must_use]
    pub fn concat(&self, rest: &[Segment]) -> Self {
        let mut segments = self.segments.to_vec();
        segments.extend_from_slice(rest);
        Self {
            segments: segments.into(),
        }
    }

    /// True when `self` equals `other` or is an ancestor of it.
    #[must_use]
    pub fn starts_with_path(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// True when `self` is a proper ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with_path(self)
    }

    /// Segments of `self` below `prefix`, if `prefix` covers `self`.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<&[Segment]> {
        if self.starts_with_path(prefix) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }

    /// Whether this path and `other` lie on one root-to-leaf chain.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.starts_with_path(other) || other.starts_with_path(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({self})")
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ─── PathCache ───────────────────────────────────────────────────────────────

/// Parse-once cache from source strings to parsed paths.
///
/// Owned by a single form instance; never shared.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: AHashMap<String, FieldPath>,
    hits: u64,
}

impl PathCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached parse of `input`, parsing on first use.
    ///
    /// Malformed strings are not cached.
    pub fn get_or_parse(&mut self, input: &str) -> Result<FieldPath> {
        if let Some(path) = self.entries.get(input) {
            self.hits += 1;
            return Ok(path.clone());
        }
        let path = FieldPath::parse(input)?;
        self.entries.insert(input.to_string(), path.clone());
        Ok(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups served without parsing.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn parses_dotted_keys_and_indices() {
        let path = p("a.b.0.c");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(0),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(path.to_string(), "a.b.0.c");
    }

    #[test]
    fn brackets_normalise_to_dots() {
        assert_eq!(p("items[2].name"), p("items.2.name"));
        assert_eq!(p("grid[1][3]"), p("grid.1.3"));
        assert_eq!(p("items[2]").to_string(), "items.2");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            FieldPath::parse("a..b"),
            Err(PathError::EmptySegment { offset: 2, .. })
        ));
        assert!(matches!(
            FieldPath::parse(".a"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a."),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a[0"),
            Err(PathError::UnbalancedBracket { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a]"),
            Err(PathError::UnbalancedBracket { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a[x]"),
            Err(PathError::NonNumericBracket { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a[0]b"),
            Err(PathError::UnbalancedBracket { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a.99999999999999999999999"),
            Err(PathError::IndexOverflow { .. })
        ));
        assert!(matches!(
            FieldPath::parse("a.18446744073709551615"),
            Err(PathError::IndexTooLarge { .. })
        ));
        assert!(matches!(
            FieldPath::parse(&format!("a[{}]", MAX_INDEX + 1)),
            Err(PathError::IndexTooLarge { .. })
        ));
        assert_eq!(
            FieldPath::parse(&format!("a.{MAX_INDEX}")).map(|p| p.len()),
            Ok(2)
        );
    }

    #[test]
    fn ancestry_helpers() {
        let root = p("test");
        let child = p("test.1.name");
        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(root.overlaps(&child));
        assert_eq!(
            child.strip_prefix(&root),
            Some(&[Segment::Index(1), Segment::Key("name".into())][..])
        );
        assert_eq!(child.parent(), Some(p("test.1")));
        assert_eq!(root.parent(), None);
        let ancestors: Vec<String> = child.ancestors().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["test.1", "test"]);
    }

    #[test]
    fn descendants_sort_after_their_root() {
        let mut paths = vec![p("b"), p("a.1"), p("a"), p("a.0.x"), p("ab")];
        paths.sort();
        let shown: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["a", "a.0.x", "a.1", "ab", "b"]);
    }

    #[test]
    fn cache_parses_once() {
        let mut cache = PathCache::new();
        let first = cache.get_or_parse("a.b").expect("parse");
        let second = cache.get_or_parse("a.b").expect("parse");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
        assert!(cache.get_or_parse("a..b").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn serde_uses_canonical_text() {
        let path = p("list[0].v");
        let json = serde_json::to_string(&path).expect("serialize");
        assert_eq!(json, "\"list.0.v\"");
        let back: FieldPath = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, path);
    }
}
