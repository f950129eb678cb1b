//! The executor: raw parameters in, lazy response stream out.
//!
//! Dispatch happens in two phases:
//! - `create_operation_context`: parameter mutation, cached parse,
//!   validation, operation selection, variable binding, context mutation.
//! - `dispatch_operation`: the around-operation chain wrapping the
//!   execution strategy for the bound operation kind.
//!
//! Failures in the first phase are funneled through `dispatch_error` so
//! every outcome ships as the same wire shape.

use crate::cache::{Cache, NoCache};
use crate::context::{FieldContext, OperationContext};
use crate::document::{Argument, Document, Field, OperationKind, Operation, TypeRef};
use crate::error::{ErrorList, GqlError, PathSegment};
use crate::interceptor::{
    FieldHandler, Interceptor, NextField, NextOperation, NextResponse, OperationHandler,
    ResponseHandler,
};
use crate::params::RawParams;
use crate::response::{Response, ResponseStream};
use crate::schema::{named_type, ExecutableSchema};
use crate::time::{MonotonicClock, SharedClock, TraceTiming};
use futures::future::BoxFuture;
use futures::{future, stream, FutureExt, StreamExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Converts a recovered panic into the error reported to the client.
pub type RecoverFn = Arc<dyn Fn(&OperationContext, &str) -> GqlError + Send + Sync>;

/// Parse and validation spans, attached to the operation context as a
/// statistic for tracing extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationTimings {
    pub parsing: TraceTiming,
    pub validation: TraceTiming,
}

/// A pre-dispatch failure: the context it happened under plus the errors.
pub struct DispatchFailure {
    pub ctx: OperationContext,
    pub errors: ErrorList,
}

/// The request dispatch pipeline. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Executor {
    schema: Arc<dyn ExecutableSchema>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    doc_cache: Arc<dyn Cache<Arc<Document>>>,
    clock: SharedClock,
    recover: RecoverFn,
}

impl Executor {
    pub fn new(schema: Arc<dyn ExecutableSchema>) -> Self {
        Self {
            schema,
            interceptors: Vec::new(),
            doc_cache: Arc::new(NoCache),
            clock: Arc::new(MonotonicClock::new()),
            recover: Arc::new(|_ctx, _msg| GqlError::execution("internal system error")),
        }
    }

    /// Appends an interceptor; chains run in registration order.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Installs a parsed-document cache keyed by raw query text.
    pub fn with_document_cache(mut self, cache: Arc<dyn Cache<Arc<Document>>>) -> Self {
        self.doc_cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the panic-to-error hook.
    pub fn with_recover(mut self, recover: RecoverFn) -> Self {
        self.recover = recover;
        self
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn schema(&self) -> &Arc<dyn ExecutableSchema> {
        &self.schema
    }

    /// Phase one: turns raw parameters into a bound operation context.
    pub fn create_operation_context(
        &self,
        mut params: RawParams,
    ) -> Result<OperationContext, DispatchFailure> {
        for interceptor in &self.interceptors {
            if let Err(err) = interceptor.mutate_params(&mut params) {
                return Err(DispatchFailure {
                    ctx: OperationContext::empty(params),
                    errors: vec![err],
                });
            }
        }

        let parse_start = self.clock.now();
        let (doc, cache_hit) = match self.doc_cache.get(&params.query) {
            Some(doc) => (doc, true),
            None => match self.schema.parse(&params.query) {
                Ok(doc) => (doc, false),
                Err(errors) => {
                    return Err(DispatchFailure {
                        ctx: OperationContext::empty(params),
                        errors,
                    });
                }
            },
        };
        let parsing = TraceTiming {
            start: parse_start,
            end: self.clock.now(),
        };

        let validate_start = self.clock.now();
        if let Err(errors) = self.schema.validate(&doc) {
            return Err(DispatchFailure {
                ctx: OperationContext::empty(params),
                errors,
            });
        }
        let validation = TraceTiming {
            start: validate_start,
            end: self.clock.now(),
        };
        // only known-good documents enter the cache
        if !cache_hit {
            self.doc_cache.insert(params.query.clone(), doc.clone());
        }

        let index = match doc.operation_index(params.operation_name.as_deref()) {
            Ok(index) => index,
            Err(err) => {
                return Err(DispatchFailure {
                    ctx: OperationContext::empty(params),
                    errors: vec![err],
                });
            }
        };

        let variables = match bind_variables(&doc.operations[index], &params.variables) {
            Ok(variables) => variables,
            Err(errors) => {
                return Err(DispatchFailure {
                    ctx: OperationContext::empty(params),
                    errors,
                });
            }
        };

        let mut ctx = OperationContext::new(params, doc, index, variables);
        ctx.set_stat(OperationTimings {
            parsing,
            validation,
        });

        for interceptor in &self.interceptors {
            if let Err(err) = interceptor.mutate_context(&mut ctx) {
                return Err(DispatchFailure {
                    ctx,
                    errors: vec![err],
                });
            }
        }

        let introspects = ctx
            .operation()
            .map(|op| {
                op.selection_set
                    .iter()
                    .any(|f| f.name == "__schema" || f.name == "__type")
            })
            .unwrap_or(false);
        if introspects && ctx.introspection_disabled() {
            return Err(DispatchFailure {
                ctx,
                errors: vec![GqlError::validation("introspection disabled")],
            });
        }

        Ok(ctx)
    }

    /// Phase two: runs the around-operation chain over the bound context.
    pub async fn dispatch_operation(&self, ctx: Arc<OperationContext>) -> ResponseStream {
        if let Some(op) = ctx.operation() {
            debug!(kind = %op.kind, name = op.name.as_deref(), "dispatching operation");
        }
        let exec = self.clone();
        let terminal: OperationHandler = Arc::new(move |ctx| {
            let exec = exec.clone();
            Box::pin(async move { exec.execute(ctx).await })
        });
        NextOperation::new(self.interceptors.clone(), terminal)
            .run(ctx)
            .await
    }

    /// Funnel for pre-dispatch failures. Pushes the errors into the context
    /// exactly once, then produces the error response through the
    /// around-response chain so extensions see failed requests through the
    /// same seam as successful ones.
    pub async fn dispatch_error(&self, ctx: OperationContext, errors: ErrorList) -> Response {
        for err in errors {
            ctx.push_error(err);
        }
        let producer: ResponseHandler = Arc::new(|ctx: Arc<OperationContext>| {
            Box::pin(async move {
                Response {
                    data: Value::Null,
                    errors: ctx.errors(),
                    extensions: IndexMap::new(),
                }
            })
        });
        self.run_response_chain(Arc::new(ctx), producer).await
    }

    /// Full pipeline for single-response requests.
    pub async fn execute_once(&self, params: RawParams) -> Response {
        match self.create_operation_context(params) {
            Ok(ctx) => {
                let mut responses = self.dispatch_operation(Arc::new(ctx)).await;
                responses.next().await.unwrap_or_else(|| {
                    Response::from_error(GqlError::execution("empty response stream"))
                })
            }
            Err(failure) => self.dispatch_error(failure.ctx, failure.errors).await,
        }
    }

    async fn execute(&self, ctx: Arc<OperationContext>) -> ResponseStream {
        let kind = match ctx.operation() {
            Some(op) => op.kind,
            None => {
                let err = GqlError::execution("no operation bound");
                return stream::once(future::ready(Response::from_error(err))).boxed();
            }
        };
        match kind {
            OperationKind::Query | OperationKind::Mutation => {
                let exec = self.clone();
                stream::once(async move {
                    let producer_exec = exec.clone();
                    let producer: ResponseHandler = Arc::new(move |ctx| {
                        let exec = producer_exec.clone();
                        Box::pin(async move { exec.execute_root(ctx).await })
                    });
                    exec.run_response_chain(ctx, producer).await
                })
                .boxed()
            }
            OperationKind::Subscription => self.execute_subscription(ctx).await,
        }
    }

    /// Runs the around-response chain with panic containment. A panicking
    /// resolver costs the request, never the process.
    pub async fn run_response_chain(
        &self,
        ctx: Arc<OperationContext>,
        producer: ResponseHandler,
    ) -> Response {
        let next = NextResponse::new(self.interceptors.clone(), producer);
        match AssertUnwindSafe(next.run(ctx.clone())).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let msg = panic_message(panic);
                error!(message = %msg, "recovered panic during response production");
                Response::from_error((self.recover)(&ctx, &msg))
            }
        }
    }

    async fn execute_root(&self, ctx: Arc<OperationContext>) -> Response {
        let (kind, selection) = match ctx.operation() {
            Some(op) => (op.kind, op.selection_set.clone()),
            None => return Response::from_error(GqlError::execution("no operation bound")),
        };
        let root_type = kind.root_type().to_string();
        let data = match kind {
            OperationKind::Query => self.resolve_concurrent(ctx.clone(), selection, root_type).await,
            OperationKind::Mutation => {
                self.resolve_sequential(ctx.clone(), selection, root_type).await
            }
            // subscriptions take the streaming strategy, never this path
            OperationKind::Subscription => Value::Null,
        };
        Response {
            data,
            errors: ctx.errors(),
            extensions: IndexMap::new(),
        }
    }

    /// Root query fields resolve concurrently; results assemble in document
    /// order.
    async fn resolve_concurrent(
        &self,
        ctx: Arc<OperationContext>,
        fields: Vec<Field>,
        parent_type: String,
    ) -> Value {
        let mut handles = Vec::with_capacity(fields.len());
        for field in fields {
            let key = field.response_key().to_string();
            let exec = self.clone();
            let ctx = ctx.clone();
            let parent_type = parent_type.clone();
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let path = vec![PathSegment::Field(task_key)];
                exec.resolve_field(ctx, field, parent_type, path, Value::Null)
                    .await
            });
            handles.push((key, handle));
        }
        let mut object = Map::new();
        for (key, handle) in handles {
            match handle.await {
                Ok(value) => {
                    object.insert(key, value);
                }
                Err(join_err) => {
                    let msg = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "field task cancelled".to_string()
                    };
                    error!(message = %msg, "recovered panic in root field");
                    ctx.push_error((self.recover)(&ctx, &msg));
                    // a failed sibling still occupies its slot, nulled
                    object.insert(key, Value::Null);
                }
            }
        }
        Value::Object(object)
    }

    /// Mutation root fields resolve strictly in document order.
    async fn resolve_sequential(
        &self,
        ctx: Arc<OperationContext>,
        fields: Vec<Field>,
        parent_type: String,
    ) -> Value {
        let mut object = Map::new();
        for field in fields {
            let key = field.response_key().to_string();
            let path = vec![PathSegment::Field(key.clone())];
            let value = self
                .resolve_field(ctx.clone(), field, parent_type.clone(), path, Value::Null)
                .await;
            object.insert(key, value);
        }
        Value::Object(object)
    }

    /// Resolves one field through the around-field chain, then completes
    /// the value against the field's selection set. Field errors are
    /// recorded on the context with the field's path; the slot nulls out.
    fn resolve_field(
        &self,
        ctx: Arc<OperationContext>,
        field: Field,
        parent_type: String,
        path: Vec<PathSegment>,
        parent: Value,
    ) -> BoxFuture<'static, Value> {
        let exec = self.clone();
        Box::pin(async move {
            let arguments = exec.resolve_arguments(&ctx, &field);
            let fc = FieldContext {
                op: ctx.clone(),
                field: field.clone(),
                parent_type: parent_type.clone(),
                path: path.clone(),
                parent,
                arguments,
            };
            let terminal_exec = exec.clone();
            let terminal: FieldHandler = Arc::new(move |fc| {
                let exec = terminal_exec.clone();
                Box::pin(async move { exec.schema.resolve(fc).await })
            });
            let result = NextField::new(exec.interceptors.clone(), terminal)
                .run(fc)
                .await;
            match result {
                Ok(value) => {
                    exec.complete_value(ctx, &field, &parent_type, value, path)
                        .await
                }
                Err(err) => {
                    ctx.push_error(err.with_path_if_missing(path));
                    Value::Null
                }
            }
        })
    }

    fn complete_value(
        &self,
        ctx: Arc<OperationContext>,
        field: &Field,
        parent_type: &str,
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'static, Value> {
        let exec = self.clone();
        let field = field.clone();
        let parent_type = parent_type.to_string();
        Box::pin(async move {
            if field.selection_set.is_empty() {
                return value;
            }
            match value {
                Value::Null => Value::Null,
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        let mut item_path = path.clone();
                        item_path.push(PathSegment::Index(i));
                        out.push(
                            exec.complete_value(ctx.clone(), &field, &parent_type, item, item_path)
                                .await,
                        );
                    }
                    Value::Array(out)
                }
                parent => {
                    let declared = exec.schema.field_type(&parent_type, &field.name);
                    let child_type = if declared.is_empty() {
                        parent_type.clone()
                    } else {
                        named_type(&declared).to_string()
                    };
                    let mut object = Map::new();
                    for child in field.selection_set.clone() {
                        let key = child.response_key().to_string();
                        let mut child_path = path.clone();
                        child_path.push(PathSegment::Field(key.clone()));
                        let value = exec
                            .resolve_field(
                                ctx.clone(),
                                child,
                                child_type.clone(),
                                child_path,
                                parent.clone(),
                            )
                            .await;
                        object.insert(key, value);
                    }
                    Value::Object(object)
                }
            }
        })
    }

    async fn execute_subscription(&self, ctx: Arc<OperationContext>) -> ResponseStream {
        let field = {
            let Some(op) = ctx.operation() else {
                let err = GqlError::execution("no operation bound");
                return stream::once(future::ready(Response::from_error(err))).boxed();
            };
            if op.selection_set.len() != 1 {
                let err = GqlError::validation(
                    "subscriptions must select exactly one top-level field",
                );
                return stream::once(future::ready(Response::from_error(err))).boxed();
            }
            op.selection_set[0].clone()
        };
        let key = field.response_key().to_string();
        let arguments = self.resolve_arguments(&ctx, &field);
        let fc = FieldContext {
            op: ctx.clone(),
            field: field.clone(),
            parent_type: OperationKind::Subscription.root_type().to_string(),
            path: vec![PathSegment::Field(key.clone())],
            parent: Value::Null,
            arguments,
        };
        let source = match self.schema.subscribe(fc).await {
            Ok(source) => source,
            Err(err) => return stream::once(future::ready(Response::from_error(err))).boxed(),
        };

        let exec = self.clone();
        source
            .then(move |event| {
                let exec = exec.clone();
                let ctx = ctx.clone();
                let field = field.clone();
                let key = key.clone();
                async move {
                    let producer_exec = exec.clone();
                    let producer: ResponseHandler = Arc::new(move |ctx: Arc<OperationContext>| {
                        let exec = producer_exec.clone();
                        let field = field.clone();
                        let key = key.clone();
                        let event = event.clone();
                        Box::pin(async move {
                            let before = ctx.errors().len();
                            let path = vec![PathSegment::Field(key.clone())];
                            let value = exec
                                .complete_value(
                                    ctx.clone(),
                                    &field,
                                    OperationKind::Subscription.root_type(),
                                    event,
                                    path,
                                )
                                .await;
                            let mut all_errors = ctx.errors();
                            let errors = all_errors.split_off(before.min(all_errors.len()));
                            let mut data = Map::new();
                            data.insert(key, value);
                            Response {
                                data: Value::Object(data),
                                errors,
                                extensions: IndexMap::new(),
                            }
                        }) as BoxFuture<'static, Response>
                    });
                    exec.run_response_chain(ctx, producer).await
                }
            })
            .boxed()
    }

    fn resolve_arguments(&self, ctx: &OperationContext, field: &Field) -> Map<String, Value> {
        let mut args = Map::new();
        for (name, arg) in &field.arguments {
            let value = match arg {
                Argument::Literal(value) => value.clone(),
                Argument::Variable(var) => ctx.variables.get(var).cloned().unwrap_or(Value::Null),
            };
            args.insert(name.clone(), value);
        }
        args
    }
}

/// Binds provided variables against the operation's declarations: defaults
/// apply, missing non-null variables reject, scalar shapes must line up.
fn bind_variables(
    op: &Operation,
    provided: &Map<String, Value>,
) -> Result<Map<String, Value>, ErrorList> {
    let mut bound = Map::new();
    let mut errors = Vec::new();
    for def in &op.variable_definitions {
        match provided.get(&def.name) {
            Some(value) if value.is_null() && def.ty.is_non_null() => {
                errors.push(GqlError::validation(format!(
                    "variable ${} must not be null",
                    def.name
                )));
            }
            Some(value) => match scalar_mismatch(&def.name, &def.ty, value) {
                Some(err) => errors.push(err),
                None => {
                    bound.insert(def.name.clone(), value.clone());
                }
            },
            None => match &def.default {
                Some(default) => {
                    bound.insert(def.name.clone(), default.clone());
                }
                None if def.ty.is_non_null() => {
                    errors.push(GqlError::validation(format!(
                        "variable ${} must be defined",
                        def.name
                    )));
                }
                None => {}
            },
        }
    }
    if errors.is_empty() {
        Ok(bound)
    } else {
        Err(errors)
    }
}

/// Shape check for the built-in scalars; unknown named types pass through
/// for the schema to judge.
fn scalar_mismatch(name: &str, ty: &TypeRef, value: &Value) -> Option<GqlError> {
    match ty {
        TypeRef::NonNull(inner) => scalar_mismatch(name, inner, value),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items.iter().find_map(|v| scalar_mismatch(name, inner, v)),
            Value::Null => None,
            _ => Some(mismatch(name, ty)),
        },
        TypeRef::Named(named) => {
            let ok = match named.as_str() {
                "Int" => value.is_i64() || value.is_u64(),
                "Float" => value.is_number(),
                "String" | "ID" | "Upload" => value.is_string(),
                "Boolean" => value.is_boolean(),
                _ => true,
            };
            if ok || value.is_null() {
                None
            } else {
                Some(mismatch(name, ty))
            }
        }
    }
}

fn mismatch(name: &str, ty: &TypeRef) -> GqlError {
    GqlError::validation(format!("variable ${name} cannot be coerced to {ty}"))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MapCache;
    use crate::document::VariableDefinition;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Ignores query text and serves a fixed document, except for a couple
    /// of trigger substrings.
    struct StaticSchema {
        doc: Arc<Document>,
        parses: AtomicUsize,
    }

    impl StaticSchema {
        fn new(doc: Document) -> Self {
            Self {
                doc: Arc::new(doc),
                parses: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExecutableSchema for StaticSchema {
        fn parse(&self, query: &str) -> Result<Arc<Document>, ErrorList> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            if query.contains("syntax") {
                return Err(vec![GqlError::parse("unexpected token")]);
            }
            Ok(self.doc.clone())
        }

        async fn resolve(&self, ctx: FieldContext) -> Result<Value, GqlError> {
            match ctx.field.name.as_str() {
                "name" => Ok(json!("test")),
                "user" => Ok(json!({"id": 7})),
                "id" => Ok(ctx.parent["id"].clone()),
                "echo" => Ok(ctx.argument("value").cloned().unwrap_or(Value::Null)),
                "boom" => Err(GqlError::execution("resolver blew up")),
                "panics" => panic!("resolver exploded"),
                _ => Ok(Value::Null),
            }
        }

        async fn subscribe(
            &self,
            _ctx: FieldContext,
        ) -> Result<BoxStream<'static, Value>, GqlError> {
            Ok(stream::iter(vec![json!(1), json!(2), json!(3)]).boxed())
        }
    }

    fn op(kind: OperationKind, selection: Vec<Field>) -> Operation {
        Operation {
            kind,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: selection,
        }
    }

    fn query_doc(selection: Vec<Field>) -> Document {
        Document {
            operations: vec![op(OperationKind::Query, selection)],
        }
    }

    fn executor(doc: Document) -> Executor {
        Executor::new(Arc::new(StaticSchema::new(doc)))
    }

    #[tokio::test]
    async fn query_resolves_selected_fields() {
        let mut user = Field::new("user");
        user.selection_set = vec![Field::new("id")];
        let exec = executor(query_doc(vec![Field::new("name"), user]));
        let resp = exec.execute_once(RawParams::new("{name user{id}}")).await;
        assert!(resp.errors.is_empty(), "{:?}", resp.errors);
        assert_eq!(resp.data, json!({"name": "test", "user": {"id": 7}}));
    }

    #[tokio::test]
    async fn parse_failure_reports_through_dispatch_error() {
        let exec = executor(query_doc(vec![Field::new("name")]));
        let resp = exec.execute_once(RawParams::new("syntax error")).await;
        assert!(resp.data.is_null());
        assert_eq!(resp.errors[0].message, "unexpected token");
        assert_eq!(resp.errors[0].kind, ErrorKind::Parse);
    }

    #[tokio::test]
    async fn resolver_error_nulls_the_slot_and_records_the_path() {
        let exec = executor(query_doc(vec![Field::new("name"), Field::new("boom")]));
        let resp = exec.execute_once(RawParams::new("{name boom}")).await;
        assert_eq!(resp.data["name"], json!("test"));
        assert_eq!(resp.data["boom"], Value::Null);
        let err = &resp.errors[0];
        assert_eq!(err.message, "resolver blew up");
        assert_eq!(err.path, Some(vec!["boom".into()]));
    }

    #[tokio::test]
    async fn panicking_query_resolver_becomes_generic_error() {
        let exec = executor(query_doc(vec![Field::new("name"), Field::new("panics")]));
        let resp = exec.execute_once(RawParams::new("{name panics}")).await;
        assert_eq!(resp.errors[0].message, "internal system error");
        // the failed sibling's slot is present and nulled
        assert_eq!(resp.data, json!({"name": "test", "panics": null}));
    }

    #[tokio::test]
    async fn panicking_mutation_resolver_is_contained() {
        let doc = Document {
            operations: vec![op(OperationKind::Mutation, vec![Field::new("panics")])],
        };
        let exec = executor(doc);
        let resp = exec.execute_once(RawParams::new("mutation {panics}")).await;
        assert_eq!(resp.errors[0].message, "internal system error");
    }

    #[tokio::test]
    async fn document_cache_skips_reparse() {
        let schema = Arc::new(StaticSchema::new(query_doc(vec![Field::new("name")])));
        let exec = Executor::new(schema.clone()).with_document_cache(Arc::new(MapCache::new()));
        exec.execute_once(RawParams::new("{name}")).await;
        exec.execute_once(RawParams::new("{name}")).await;
        assert_eq!(schema.parses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preseeded_cache_document_is_served_without_parsing() {
        let schema = Arc::new(StaticSchema::new(query_doc(vec![Field::new("name")])));
        let cache = Arc::new(MapCache::new());
        // the cached document deliberately differs from what a parse of the
        // same text would yield
        let mut user = Field::new("user");
        user.selection_set = vec![Field::new("id")];
        cache.insert("{name}".to_string(), Arc::new(query_doc(vec![user])));
        let exec = Executor::new(schema.clone()).with_document_cache(cache);
        let resp = exec.execute_once(RawParams::new("{name}")).await;
        assert_eq!(resp.data, json!({"user": {"id": 7}}));
        assert_eq!(schema.parses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_error_runs_the_response_chain() {
        struct Counter(Arc<AtomicUsize>);

        impl Interceptor for Counter {
            fn name(&self) -> &'static str {
                "counter"
            }

            fn around_response<'a>(
                &'a self,
                ctx: Arc<OperationContext>,
                next: NextResponse,
            ) -> BoxFuture<'a, Response> {
                self.0.fetch_add(1, Ordering::SeqCst);
                next.run(ctx)
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(query_doc(vec![Field::new("name")]))
            .with_interceptor(Arc::new(Counter(calls.clone())));
        let resp = exec.execute_once(RawParams::new("syntax error")).await;
        assert_eq!(resp.errors[0].message, "unexpected token");
        assert!(resp.data.is_null());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_non_null_variable_is_rejected() {
        let mut doc = query_doc(vec![Field::new("echo")]);
        doc.operations[0].variable_definitions = vec![VariableDefinition {
            name: "value".to_string(),
            ty: TypeRef::NonNull(Box::new(TypeRef::Named("String".to_string()))),
            default: None,
        }];
        let exec = executor(doc);
        let resp = exec
            .execute_once(RawParams::new("query($value: String!) {echo}"))
            .await;
        assert_eq!(resp.errors[0].message, "variable $value must be defined");
        assert_eq!(resp.errors[0].kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn variable_default_feeds_arguments() {
        let mut echo = Field::new("echo");
        echo.arguments = vec![(
            "value".to_string(),
            Argument::Variable("value".to_string()),
        )];
        let mut doc = query_doc(vec![echo]);
        doc.operations[0].variable_definitions = vec![VariableDefinition {
            name: "value".to_string(),
            ty: TypeRef::Named("String".to_string()),
            default: Some(json!("fallback")),
        }];
        let exec = executor(doc);
        let resp = exec
            .execute_once(RawParams::new("query($value: String = \"fallback\") {echo(value: $value)}"))
            .await;
        assert_eq!(resp.data["echo"], json!("fallback"));
    }

    #[tokio::test]
    async fn scalar_type_mismatch_is_a_validation_error() {
        let mut doc = query_doc(vec![Field::new("echo")]);
        doc.operations[0].variable_definitions = vec![VariableDefinition {
            name: "value".to_string(),
            ty: TypeRef::Named("Int".to_string()),
            default: None,
        }];
        let exec = executor(doc);
        let mut params = RawParams::new("query($value: Int) {echo}");
        params.variables = json!({"value": "nope"}).as_object().cloned().unwrap_or_default();
        let resp = exec.execute_once(params).await;
        assert_eq!(
            resp.errors[0].message,
            "variable $value cannot be coerced to Int"
        );
    }

    #[tokio::test]
    async fn subscription_yields_one_response_per_event() {
        let doc = Document {
            operations: vec![op(OperationKind::Subscription, vec![Field::new("ticks")])],
        };
        let exec = executor(doc);
        let ctx = match exec.create_operation_context(RawParams::new("subscription {ticks}")) {
            Ok(ctx) => Arc::new(ctx),
            Err(failure) => panic!("unexpected failure: {:?}", failure.errors),
        };
        let responses: Vec<Response> = exec.dispatch_operation(ctx).await.collect().await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].data, json!({"ticks": 1}));
        assert_eq!(responses[2].data, json!({"ticks": 3}));
    }

    #[tokio::test]
    async fn introspection_is_rejected_by_default() {
        let exec = executor(query_doc(vec![Field::new("__schema")]));
        let resp = exec.execute_once(RawParams::new("{__schema}")).await;
        assert_eq!(resp.errors[0].message, "introspection disabled");
    }

    #[tokio::test]
    async fn operation_timings_are_recorded() {
        let exec = executor(query_doc(vec![Field::new("name")]));
        let ctx = match exec.create_operation_context(RawParams::new("{name}")) {
            Ok(ctx) => ctx,
            Err(failure) => panic!("unexpected failure: {:?}", failure.errors),
        };
        let timings: OperationTimings = match ctx.stat() {
            Some(t) => t,
            None => panic!("timings missing"),
        };
        assert!(timings.validation.start >= timings.parsing.start);
    }
}
