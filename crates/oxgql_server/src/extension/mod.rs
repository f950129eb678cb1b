//! Bundled handler extensions, each an [`oxgql_core::Interceptor`].

mod apollo_tracing;
mod apq;
mod complexity;
mod introspection;

pub use apollo_tracing::ApolloTracing;
pub use apq::AutomaticPersistedQuery;
pub use complexity::{ComplexityLimit, ComplexityStats};
pub use introspection::Introspection;
