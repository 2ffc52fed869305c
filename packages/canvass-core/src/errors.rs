//! Error types for canvass-core
//!
//! Two disjoint families, per the validation contract:
//! - [`CanvassError`]: structural errors that abort the whole analysis
//!   (schema problems, cycles, unsatisfiable domains, cancellation).
//! - [`ItemError`]: per-item errors that are attached to the item's record
//!   while the rest of the analysis continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural error: aborts the analysis of the questionnaire.
#[derive(Debug, Error)]
pub enum CanvassError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML syntax or missing/invalid required keys
    #[error("schema error: {0}")]
    Schema(String),

    /// Two items share the same id
    #[error("duplicate item id: {0}")]
    DuplicateItemId(String),

    /// Questionnaire contains no items
    #[error("questionnaire contains no items")]
    EmptyQuestionnaire,

    /// Dependency cycle; the path repeats its first element at the end
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// An identifier in a predicate or code fragment resolves to nothing
    #[error("unresolved identifier `{name}` in item `{item}` at offset {offset}")]
    UnresolvedIdentifier {
        item: String,
        name: String,
        offset: usize,
    },

    /// Expression outside the analyzable sublanguage (non-linear arithmetic,
    /// loops or other control flow in code fragments)
    #[error("unsupported expression in item `{item}` at offset {offset}: {message}")]
    UnsupportedExpression {
        item: String,
        message: String,
        offset: usize,
    },

    /// A declared answer domain is unsatisfiable on its own
    #[error("empty answer domain for item `{0}`")]
    EmptyDomain(String),

    /// Cooperative cancellation observed between items
    #[error("analysis cancelled")]
    Cancelled,
}

/// Result type alias for canvass operations
pub type Result<T> = std::result::Result<T, CanvassError>;

/// Per-item error kind. These do not abort the analysis; the item's record
/// carries them and classification for that item is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ItemErrorKind {
    ParseError,
    UnknownFunction,
    TypeMismatch,
    SolverUndecided,
}

impl std::fmt::Display for ItemErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseError => write!(f, "ParseError"),
            Self::UnknownFunction => write!(f, "UnknownFunction"),
            Self::TypeMismatch => write!(f, "TypeMismatch"),
            Self::SolverUndecided => write!(f, "SolverUndecided"),
        }
    }
}

/// Per-item error record, attached to the item's classification output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
    /// Character offset into the predicate or fragment text, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl ItemError {
    pub fn new(kind: ItemErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: None,
        }
    }

    pub fn at(kind: ItemErrorKind, message: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: Some(offset),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(off) => write!(f, "{}: {} (offset {})", self.kind, self.message, off),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = CanvassError::CycleDetected(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_item_error_display() {
        let err = ItemError::at(ItemErrorKind::ParseError, "unexpected token", 7);
        assert_eq!(err.to_string(), "ParseError: unexpected token (offset 7)");
    }
}
