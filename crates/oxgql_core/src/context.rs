//! Per-request operation context and per-field resolver context.

use crate::document::{Document, Field, Operation};
use crate::error::{GqlError, PathSegment};
use crate::params::{RawParams, Upload};
use crate::time::TraceTiming;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex};

/// The per-request unit of work.
///
/// Created exactly once per request by the executor, shared read-only across
/// the interceptor chains, and dropped when the response has been written.
/// Extension statistics live in a `TypeId`-keyed side table so extensions
/// can attach data without coordinating key names.
pub struct OperationContext {
    pub raw: RawParams,
    pub doc: Arc<Document>,
    pub variables: Map<String, Value>,
    pub read_time: TraceTiming,
    operation_index: Option<usize>,
    disable_introspection: bool,
    stats: Mutex<FxHashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    errors: Mutex<Vec<GqlError>>,
}

impl OperationContext {
    pub fn new(
        raw: RawParams,
        doc: Arc<Document>,
        operation_index: usize,
        variables: Map<String, Value>,
    ) -> Self {
        let read_time = raw.read_time;
        Self {
            raw,
            doc,
            variables,
            read_time,
            operation_index: Some(operation_index),
            disable_introspection: true,
            stats: Mutex::new(FxHashMap::default()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// A context with no runnable operation, for pre-operation failures.
    pub fn empty(raw: RawParams) -> Self {
        let read_time = raw.read_time;
        Self {
            raw,
            doc: Arc::new(Document::default()),
            variables: Map::new(),
            read_time,
            operation_index: None,
            disable_introspection: true,
            stats: Mutex::new(FxHashMap::default()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// The selected operation, if one was bound.
    pub fn operation(&self) -> Option<&Operation> {
        self.doc.operations.get(self.operation_index?)
    }

    pub fn introspection_disabled(&self) -> bool {
        self.disable_introspection
    }

    /// Allows `__schema`/`__type` selections for this request.
    pub fn enable_introspection(&mut self) {
        self.disable_introspection = false;
    }

    /// Attaches (or replaces) an extension statistic.
    pub fn set_stat<T: Send + Sync + 'static>(&self, value: T) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.insert(TypeId::of::<T>(), Box::new(value));
        }
    }

    /// Reads an extension statistic by type.
    pub fn stat<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let stats = self.stats.lock().ok()?;
        stats
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Mutates an extension statistic in place, if present.
    pub fn with_stat_mut<T: Send + Sync + 'static, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut stats = self.stats.lock().ok()?;
        stats
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
            .map(f)
    }

    /// Appends to the request's shared error list.
    pub fn push_error(&self, err: GqlError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(err);
        }
    }

    /// Snapshot of the errors accumulated so far.
    pub fn errors(&self) -> Vec<GqlError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.lock().map(|e| !e.is_empty()).unwrap_or(false)
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("query", &self.raw.query)
            .field("operation_name", &self.raw.operation_name)
            .field("operation_index", &self.operation_index)
            .finish()
    }
}

/// Context for a single field resolution.
///
/// The resolver contract: a resolver receives a fully bound operation
/// context, a resolved argument set, and the path identifying its position
/// in the result tree.
#[derive(Debug, Clone)]
pub struct FieldContext {
    pub op: Arc<OperationContext>,
    pub field: Field,
    /// Name of the type the field is selected on; root fields use the
    /// conventional root type names.
    pub parent_type: String,
    pub path: Vec<PathSegment>,
    /// The resolved parent value; `Value::Null` for root fields.
    pub parent: Value,
    /// Arguments with variable references already substituted.
    pub arguments: Map<String, Value>,
}

impl FieldContext {
    pub fn response_key(&self) -> &str {
        self.field.response_key()
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Resolves an upload bound to this field's argument.
    pub fn upload(&self, name: &str) -> Option<&Upload> {
        self.op.raw.upload_for(self.argument(name)?)
    }
}
