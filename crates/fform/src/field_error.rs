#![forbid(unsafe_code)]

//! Per-field validation errors and the form-wide error map.

use std::collections::BTreeMap;
use std::fmt;

use fform_core::FieldPath;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which rule produced an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorType {
    Required,
    Min,
    Max,
    MinLength,
    MaxLength,
    Pattern,
    /// A single unnamed `validate` function.
    Validate,
    /// A named validator, a `set_error` type, or a resolver-defined type.
    Custom(String),
}

impl ErrorType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Required => "required",
            Self::Min => "min",
            Self::Max => "max",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::Validate => "validate",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for ErrorType {
    fn from(s: &str) -> Self {
        match s {
            "required" => Self::Required,
            "min" => Self::Min,
            "max" => Self::Max,
            "minLength" => Self::MinLength,
            "maxLength" => Self::MaxLength,
            "pattern" => Self::Pattern,
            "validate" => Self::Validate,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// One field's validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Every failing rule, keyed by type, when all criteria are collected.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub types: BTreeMap<String, Option<String>>,
}

impl FieldError {
    #[must_use]
    pub fn new(kind: impl Into<ErrorType>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            types: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Same rule and message; `types` are not compared.
    #[must_use]
    pub fn same_failure(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl From<ErrorType> for FieldError {
    fn from(kind: ErrorType) -> Self {
        Self::new(kind)
    }
}

/// Errors keyed by field path.
///
/// A field-array root keeps its own error at `<root>.root`, distinct from its
/// children's entries; form-level errors live under `root`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors {
    entries: BTreeMap<FieldPath, FieldError>,
}

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&FieldError> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Whether `path` or anything below it has an error.
    #[must_use]
    pub fn has_under(&self, path: &FieldPath) -> bool {
        self.entries
            .range(path.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with_path(path))
    }

    pub fn set(&mut self, path: FieldPath, error: FieldError) -> Option<FieldError> {
        self.entries.insert(path, error)
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<FieldError> {
        self.entries.remove(path)
    }

    /// Remove `path` and every error below it. Returns how many were removed.
    pub fn remove_under(&mut self, path: &FieldPath) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with_path(path));
        before - self.entries.len()
    }

    /// Drop every form-level (`root`, `root.*`) entry.
    pub fn clear_form_level(&mut self) -> usize {
        self.remove_under(&root_path())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldError)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.entries.keys()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<FieldPath, FieldError> {
        &mut self.entries
    }
}

impl FromIterator<(FieldPath, FieldError)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (FieldPath, FieldError)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// The form-level error namespace.
#[must_use]
pub fn root_path() -> FieldPath {
    FieldPath::key("root")
}

/// Where a field-array root's own error lives.
#[must_use]
pub fn array_root_error_path(array: &FieldPath) -> FieldPath {
    array.join_key("root")
}

/// Where a submission transport failure lives.
#[must_use]
pub fn server_error_path() -> FieldPath {
    root_path().join_key("server")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn error_type_text_round_trip() {
        for text in ["required", "min", "maxLength", "pattern", "validate", "server"] {
            assert_eq!(ErrorType::from(text).as_str(), text);
        }
        assert_eq!(ErrorType::from("test"), ErrorType::Custom("test".into()));
    }

    #[test]
    fn serializes_with_type_key() {
        let err = FieldError::new(ErrorType::Required).with_message("needed");
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "required", "message": "needed" }));
    }

    #[test]
    fn remove_under_clears_subtree_only() {
        let mut errors = FieldErrors::new();
        errors.set(p("list.0.a"), FieldError::new(ErrorType::Required));
        errors.set(p("list.root"), FieldError::new(ErrorType::MinLength));
        errors.set(p("lister"), FieldError::new(ErrorType::Required));
        assert!(errors.has_under(&p("list")));
        assert_eq!(errors.remove_under(&p("list")), 2);
        assert!(!errors.has_under(&p("list")));
        assert!(errors.contains(&p("lister")));
    }

    #[test]
    fn form_level_errors_are_separate() {
        let mut errors = FieldErrors::new();
        errors.set(server_error_path(), FieldError::new("server"));
        errors.set(p("name"), FieldError::new(ErrorType::Required));
        assert_eq!(errors.clear_form_level(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(array_root_error_path(&p("items")).to_string(), "items.root");
    }
}
