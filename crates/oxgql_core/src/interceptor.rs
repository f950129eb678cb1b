//! Interceptor chains wrapping operation dispatch, response production,
//! and field resolution.
//!
//! Three nested chains, outermost first:
//! - around-operation: wraps one whole operation dispatch
//! - around-response: wraps production of each emitted response
//! - around-field: wraps each field resolver call
//!
//! Chains run in registration order. Each link receives a `Next*`
//! continuation; not calling it short-circuits the rest of the chain.

use crate::context::{FieldContext, OperationContext};
use crate::error::GqlError;
use crate::params::RawParams;
use crate::response::{Response, ResponseStream};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Innermost handler of the around-operation chain.
pub type OperationHandler =
    Arc<dyn Fn(Arc<OperationContext>) -> BoxFuture<'static, ResponseStream> + Send + Sync>;

/// Innermost handler of the around-response chain.
pub type ResponseHandler =
    Arc<dyn Fn(Arc<OperationContext>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Innermost handler of the around-field chain.
pub type FieldHandler =
    Arc<dyn Fn(FieldContext) -> BoxFuture<'static, Result<Value, GqlError>> + Send + Sync>;

/// A pipeline extension point.
///
/// Every method has a passthrough default; implementors override only the
/// hooks they care about.
pub trait Interceptor: Send + Sync + 'static {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Runs before parsing; may rewrite the raw request parameters.
    fn mutate_params(&self, _params: &mut RawParams) -> Result<(), GqlError> {
        Ok(())
    }

    /// Runs once the operation is bound; may adjust the context or reject
    /// the request before dispatch.
    fn mutate_context(&self, _ctx: &mut OperationContext) -> Result<(), GqlError> {
        Ok(())
    }

    fn around_operation<'a>(
        &'a self,
        ctx: Arc<OperationContext>,
        next: NextOperation,
    ) -> BoxFuture<'a, ResponseStream> {
        next.run(ctx)
    }

    fn around_response<'a>(
        &'a self,
        ctx: Arc<OperationContext>,
        next: NextResponse,
    ) -> BoxFuture<'a, Response> {
        next.run(ctx)
    }

    fn around_field<'a>(
        &'a self,
        ctx: FieldContext,
        next: NextField,
    ) -> BoxFuture<'a, Result<Value, GqlError>> {
        next.run(ctx)
    }
}

macro_rules! next_chain {
    ($(#[$doc:meta])* $name:ident, $ctx:ty, $out:ty, $terminal:ty, $method:ident) => {
        $(#[$doc])*
        pub struct $name {
            chain: Vec<Arc<dyn Interceptor>>,
            terminal: $terminal,
        }

        impl $name {
            pub fn new(chain: Vec<Arc<dyn Interceptor>>, terminal: $terminal) -> Self {
                Self { chain, terminal }
            }

            /// Invokes the remainder of the chain.
            pub fn run(mut self, ctx: $ctx) -> BoxFuture<'static, $out> {
                if self.chain.is_empty() {
                    return (self.terminal)(ctx);
                }
                let head = self.chain.remove(0);
                Box::pin(async move { head.$method(ctx, self).await })
            }
        }
    };
}

next_chain!(
    /// Continuation of the around-operation chain.
    NextOperation,
    Arc<OperationContext>,
    ResponseStream,
    OperationHandler,
    around_operation
);

next_chain!(
    /// Continuation of the around-response chain.
    NextResponse,
    Arc<OperationContext>,
    Response,
    ResponseHandler,
    around_response
);

next_chain!(
    /// Continuation of the around-field chain.
    NextField,
    FieldContext,
    Result<Value, GqlError>,
    FieldHandler,
    around_field
);

/// Adapts a closure into an around-operation interceptor.
pub struct AroundOperation<F>(pub F);

impl<F> Interceptor for AroundOperation<F>
where
    F: Fn(Arc<OperationContext>, NextOperation) -> BoxFuture<'static, ResponseStream>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        "around_operation_fn"
    }

    fn around_operation<'a>(
        &'a self,
        ctx: Arc<OperationContext>,
        next: NextOperation,
    ) -> BoxFuture<'a, ResponseStream> {
        (self.0)(ctx, next)
    }
}

/// Adapts a closure into an around-response interceptor.
pub struct AroundResponse<F>(pub F);

impl<F> Interceptor for AroundResponse<F>
where
    F: Fn(Arc<OperationContext>, NextResponse) -> BoxFuture<'static, Response>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        "around_response_fn"
    }

    fn around_response<'a>(
        &'a self,
        ctx: Arc<OperationContext>,
        next: NextResponse,
    ) -> BoxFuture<'a, Response> {
        (self.0)(ctx, next)
    }
}

/// Adapts a closure into an around-field interceptor.
pub struct AroundField<F>(pub F);

impl<F> Interceptor for AroundField<F>
where
    F: Fn(FieldContext, NextField) -> BoxFuture<'static, Result<Value, GqlError>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        "around_field_fn"
    }

    fn around_field<'a>(
        &'a self,
        ctx: FieldContext,
        next: NextField,
    ) -> BoxFuture<'a, Result<Value, GqlError>> {
        (self.0)(ctx, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Field, Operation, OperationKind};
    use serde_json::json;
    use std::sync::Mutex;

    fn ctx() -> Arc<OperationContext> {
        let doc = Document {
            operations: vec![Operation {
                kind: OperationKind::Query,
                name: None,
                variable_definitions: Vec::new(),
                selection_set: vec![Field::new("name")],
            }],
        };
        Arc::new(OperationContext::new(
            RawParams::new("{name}"),
            Arc::new(doc),
            0,
            serde_json::Map::new(),
        ))
    }

    struct Labeler {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Interceptor for Labeler {
        fn name(&self) -> &'static str {
            "labeler"
        }

        fn around_response<'a>(
            &'a self,
            ctx: Arc<OperationContext>,
            next: NextResponse,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(self.label);
                next.run(ctx).await
            })
        }
    }

    #[tokio::test]
    async fn response_chain_runs_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Labeler {
                label: "first",
                seen: seen.clone(),
            }),
            Arc::new(Labeler {
                label: "second",
                seen: seen.clone(),
            }),
        ];
        let terminal: ResponseHandler =
            Arc::new(|_ctx| Box::pin(async { Response::ok(json!({"ok": true})) }));
        let resp = NextResponse::new(chain, terminal).run(ctx()).await;
        assert_eq!(resp.data, json!({"ok": true}));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit() {
        struct Blocker;
        impl Interceptor for Blocker {
            fn name(&self) -> &'static str {
                "blocker"
            }

            fn around_response<'a>(
                &'a self,
                _ctx: Arc<OperationContext>,
                _next: NextResponse,
            ) -> BoxFuture<'a, Response> {
                Box::pin(async { Response::from_error(GqlError::extension("blocked")) })
            }
        }
        let terminal: ResponseHandler =
            Arc::new(|_ctx| Box::pin(async { panic!("terminal must not run") }));
        let resp = NextResponse::new(vec![Arc::new(Blocker)], terminal)
            .run(ctx())
            .await;
        assert_eq!(resp.errors[0].message, "blocked");
    }

    #[tokio::test]
    async fn field_chain_wraps_resolver_result() {
        let interceptor = AroundField(|fc: FieldContext, next: NextField| {
            Box::pin(async move {
                let value = next.run(fc).await?;
                Ok(json!({ "wrapped": value }))
            }) as BoxFuture<'static, Result<Value, GqlError>>
        });
        let terminal: FieldHandler = Arc::new(|_fc| Box::pin(async { Ok(json!("inner")) }));
        let fc = FieldContext {
            op: ctx(),
            field: Field::new("name"),
            parent_type: "Query".to_string(),
            path: vec!["name".into()],
            parent: Value::Null,
            arguments: serde_json::Map::new(),
        };
        let out = NextField::new(vec![Arc::new(interceptor)], terminal)
            .run(fc)
            .await
            .unwrap();
        assert_eq!(out, json!({"wrapped": "inner"}));
    }
}
