//! Apollo-style tracing: per-phase and per-resolver timings attached under
//! `extensions.tracing` on every response.
//!
//! All timestamps come from the executor's clock relative to the moment
//! the request body was read, as integer nanoseconds.

use futures::future::BoxFuture;
use oxgql_core::{
    ExecutableSchema, GqlError, Interceptor, NextField, NextResponse, OperationContext,
    OperationTimings, PathSegment, Response, SharedClock, TraceTiming,
};
use oxgql_core::FieldContext;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolverTiming {
    path: Vec<PathSegment>,
    parent_type: String,
    field_name: String,
    return_type: String,
    start_offset: u64,
    duration: u64,
}

#[derive(Debug, Clone, Default)]
struct TracingData {
    resolvers: Vec<ResolverTiming>,
}

pub struct ApolloTracing {
    schema: Arc<dyn ExecutableSchema>,
    clock: SharedClock,
}

impl ApolloTracing {
    pub fn new(schema: Arc<dyn ExecutableSchema>, clock: SharedClock) -> Self {
        Self { schema, clock }
    }
}

fn nanos(d: Duration) -> u64 {
    d.as_nanos() as u64
}

fn offset(origin: Duration, at: Duration) -> u64 {
    nanos(at.saturating_sub(origin))
}

fn phase(origin: Duration, timing: TraceTiming) -> Value {
    serde_json::json!({
        "startOffset": offset(origin, timing.start),
        "duration": nanos(timing.duration()),
    })
}

impl Interceptor for ApolloTracing {
    fn name(&self) -> &'static str {
        "ApolloTracing"
    }

    fn mutate_context(&self, ctx: &mut OperationContext) -> Result<(), GqlError> {
        ctx.set_stat(TracingData::default());
        Ok(())
    }

    fn around_field<'a>(
        &'a self,
        ctx: FieldContext,
        next: NextField,
    ) -> BoxFuture<'a, Result<Value, GqlError>> {
        let clock = self.clock.clone();
        let return_type = self.schema.field_type(&ctx.parent_type, &ctx.field.name);
        Box::pin(async move {
            let op = ctx.op.clone();
            let origin = op.read_time.start;
            let path = ctx.path.clone();
            let parent_type = ctx.parent_type.clone();
            let field_name = ctx.field.name.clone();
            let start = clock.now();
            let result = next.run(ctx).await;
            let end = clock.now();
            op.with_stat_mut::<TracingData, _>(|data| {
                data.resolvers.push(ResolverTiming {
                    path,
                    parent_type,
                    field_name,
                    return_type,
                    start_offset: offset(origin, start),
                    duration: nanos(end.saturating_sub(start)),
                });
            });
            result
        })
    }

    fn around_response<'a>(
        &'a self,
        ctx: Arc<OperationContext>,
        next: NextResponse,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx.clone()).await;
            let end = self.clock.now();
            let origin = ctx.read_time.start;
            let timings: OperationTimings = ctx.stat().unwrap_or_default();
            let data: TracingData = ctx.stat().unwrap_or_default();
            let resolvers = serde_json::to_value(&data.resolvers).unwrap_or(Value::Null);
            let payload = serde_json::json!({
                "version": 1,
                "startTime": nanos(origin),
                "endTime": nanos(end),
                "duration": offset(origin, end),
                "parsing": phase(origin, timings.parsing),
                "validation": phase(origin, timings.validation),
                "execution": {"resolvers": resolvers},
            });
            response.with_extension("tracing", payload)
        })
    }
}
