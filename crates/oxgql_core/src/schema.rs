//! The executable-schema boundary.
//!
//! Parsing, validation, and resolution are the schema's business; the
//! executor only drives them. Implementations typically wrap generated
//! resolver tables, but anything satisfying the trait can be served.

use crate::context::FieldContext;
use crate::document::{Document, Field, Operation};
use crate::error::{ErrorList, GqlError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use std::sync::Arc;

#[async_trait]
pub trait ExecutableSchema: Send + Sync + 'static {
    /// Parses raw query text into a document. Syntax failures carry
    /// parse-kind errors.
    fn parse(&self, query: &str) -> Result<Arc<Document>, ErrorList>;

    /// Checks a parsed document against the schema.
    fn validate(&self, _doc: &Document) -> Result<(), ErrorList> {
        Ok(())
    }

    /// Static cost of one operation. The default charges one point per
    /// field selection, recursively.
    fn complexity(&self, operation: &Operation, _variables: &Map<String, Value>) -> usize {
        operation.selection_set.iter().map(field_complexity).sum()
    }

    /// Declared type of a field, e.g. `Episode!`. Drives the parent type of
    /// child selections and shows up in tracing output. Schemas that do not
    /// track types may leave the default.
    fn field_type(&self, _parent_type: &str, _field: &str) -> String {
        String::new()
    }

    /// Resolves a single field against its parent value.
    async fn resolve(&self, ctx: FieldContext) -> Result<Value, GqlError>;

    /// Opens the event source behind a subscription root field.
    async fn subscribe(&self, _ctx: FieldContext) -> Result<BoxStream<'static, Value>, GqlError> {
        Err(GqlError::validation("subscriptions are not supported"))
    }
}

/// One point per field, recursively.
pub fn field_complexity(field: &Field) -> usize {
    1 + field.selection_set.iter().map(field_complexity).sum::<usize>()
}

/// Innermost named type of a type-reference string (`[Episode!]!` →
/// `Episode`).
pub fn named_type(mut ty: &str) -> &str {
    loop {
        ty = ty.trim_end_matches('!');
        match ty.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            Some(inner) => ty = inner,
            None => return ty,
        }
    }
}
