//! The operation-document contract at the parser/validator boundary.
//!
//! The query-language parser and validator are external collaborators; the
//! executor only consumes this minimal, already-structured document shape.

use crate::error::GqlError;
use serde_json::Value;
use std::fmt;

/// The kind of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Conventional root type name for the kind.
    pub fn root_type(&self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
            Self::Subscription => "Subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(s)
    }
}

/// A parsed, validated query document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub operations: Vec<Operation>,
}

impl Document {
    /// Selects the named operation, or the sole operation when unambiguous.
    pub fn operation_index(&self, name: Option<&str>) -> Result<usize, GqlError> {
        match name {
            Some(n) => self
                .operations
                .iter()
                .position(|op| op.name.as_deref() == Some(n))
                .ok_or_else(|| GqlError::validation(format!("operation {n} not found"))),
            None if self.operations.len() == 1 => Ok(0),
            None if self.operations.is_empty() => {
                Err(GqlError::validation("document contains no operations"))
            }
            None => Err(GqlError::validation(
                "operation name is required when document contains multiple operations",
            )),
        }
    }
}

/// One operation inside a document.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub selection_set: Vec<Field>,
}

/// A declared operation variable.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
}

/// A type reference in a variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// The innermost named type.
    pub fn named(&self) -> &str {
        match self {
            Self::Named(n) => n,
            Self::NonNull(inner) | Self::List(inner) => inner.named(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(n) => f.write_str(n),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A field selection.
#[derive(Debug, Clone)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, Argument)>,
    pub selection_set: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selection_set: Vec::new(),
        }
    }

    /// The key this field occupies in the response object.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An argument value: a literal, or a reference to a bound variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    Variable(String),
}
