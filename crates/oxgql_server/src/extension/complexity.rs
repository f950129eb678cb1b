//! Operation complexity ceiling.

use oxgql_core::{ExecutableSchema, GqlError, Interceptor, OperationContext};
use std::sync::Arc;

/// Complexity figures recorded on the operation context, whether or not
/// the ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityStats {
    pub complexity_limit: usize,
    pub complexity: usize,
}

type LimitFn = Arc<dyn Fn(&OperationContext) -> usize + Send + Sync>;

/// Rejects operations whose static complexity exceeds a limit. The limit
/// may depend on the request, e.g. per-client quotas.
pub struct ComplexityLimit {
    schema: Arc<dyn ExecutableSchema>,
    limit: LimitFn,
}

impl ComplexityLimit {
    pub fn new(schema: Arc<dyn ExecutableSchema>, limit: usize) -> Self {
        Self {
            schema,
            limit: Arc::new(move |_| limit),
        }
    }

    pub fn with_fn(
        schema: Arc<dyn ExecutableSchema>,
        limit: impl Fn(&OperationContext) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema,
            limit: Arc::new(limit),
        }
    }
}

impl Interceptor for ComplexityLimit {
    fn name(&self) -> &'static str {
        "ComplexityLimit"
    }

    fn mutate_context(&self, ctx: &mut OperationContext) -> Result<(), GqlError> {
        let Some(op) = ctx.operation() else {
            return Ok(());
        };
        let complexity = self.schema.complexity(op, &ctx.variables);
        let limit = (self.limit)(ctx);
        // stats land on the context even when the operation passes
        ctx.set_stat(ComplexityStats {
            complexity_limit: limit,
            complexity,
        });
        if complexity > limit {
            return Err(GqlError::extension(format!(
                "operation has complexity {complexity}, which exceeds the limit of {limit}"
            ))
            .with_code("COMPLEXITY_LIMIT_EXCEEDED"));
        }
        Ok(())
    }
}
