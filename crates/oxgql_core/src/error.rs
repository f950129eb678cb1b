//! Structured GraphQL errors and the taxonomy used for status mapping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Where in the pipeline an error originated.
///
/// The kind never crosses the wire; transports use it to choose an HTTP
/// status code. The serialized form carries only message, path, and
/// extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// No transport matched, or the request shape was unusable.
    Transport,
    /// Malformed JSON or multipart payload.
    Decode,
    /// Query syntax errors.
    Parse,
    /// Schema violations, unknown fields, variable type mismatches.
    Validation,
    /// Operation-type/transport mismatches and malformed upload maps.
    Protocol,
    /// Resolver-raised errors, including recovered panics.
    #[default]
    Execution,
    /// Errors raised by handler extensions (complexity, persisted queries).
    Extension,
}

/// A segment of a path into the response tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// A single structured GraphQL error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[error("{message}")]
pub struct GqlError {
    /// Human-readable message.
    pub message: String,
    /// Path into the response tree, when the error is localized to a field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Machine-readable extension data (`code` by convention).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
    #[serde(skip, default)]
    pub kind: ErrorKind,
}

impl GqlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
            kind,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    pub fn extension(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extension, message)
    }

    /// Attaches a path into the response tree.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Attaches a path unless one is already set.
    pub fn with_path_if_missing(mut self, path: Vec<PathSegment>) -> Self {
        if self.path.is_none() {
            self.path = Some(path);
        }
        self
    }

    /// Adds an extension entry.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the machine-readable `code` extension.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", Value::String(code.into()))
    }

    /// Returns the `code` extension, if set.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(|v| v.as_str())
    }
}

/// An ordered list of errors, as produced by parsing and validation.
pub type ErrorList = Vec<GqlError>;

/// The most severe kind in a list, used for status selection.
///
/// Request-shaping failures win over execution failures so that transports
/// report 4xx for inputs that never reached a resolver.
pub fn dominant_kind(errors: &[GqlError]) -> ErrorKind {
    let mut kind = ErrorKind::Execution;
    for err in errors {
        match err.kind {
            ErrorKind::Parse | ErrorKind::Validation | ErrorKind::Protocol | ErrorKind::Decode => {
                return err.kind;
            }
            other => kind = other,
        }
    }
    kind
}
