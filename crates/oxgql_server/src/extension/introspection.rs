//! Opt-in introspection gate. Without this extension registered,
//! `__schema` and `__type` selections are rejected before dispatch.

use oxgql_core::{GqlError, Interceptor, OperationContext};

pub struct Introspection;

impl Interceptor for Introspection {
    fn name(&self) -> &'static str {
        "Introspection"
    }

    fn mutate_context(&self, ctx: &mut OperationContext) -> Result<(), GqlError> {
        ctx.enable_introspection();
        Ok(())
    }
}
