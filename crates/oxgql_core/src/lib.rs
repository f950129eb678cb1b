//! Transport-agnostic GraphQL dispatch pipeline.
//!
//! - wire shapes: [`params::RawParams`], [`response::Response`],
//!   [`error::GqlError`]
//! - the operation-document contract consumed from the parser/validator
//! - three interceptor chains around dispatch, responses, and fields
//! - the [`executor::Executor`] driving it all
//!
//! Transports and bundled extensions live in `oxgql_server`.

pub mod cache;
pub mod context;
pub mod document;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod params;
pub mod response;
pub mod schema;
pub mod time;

pub use cache::{Cache, LruCache, MapCache, NoCache};
pub use context::{FieldContext, OperationContext};
pub use document::{Argument, Document, Field, Operation, OperationKind, TypeRef, VariableDefinition};
pub use error::{dominant_kind, ErrorKind, ErrorList, GqlError, PathSegment};
pub use executor::{DispatchFailure, Executor, OperationTimings, RecoverFn};
pub use interceptor::{
    AroundField, AroundOperation, AroundResponse, FieldHandler, Interceptor, NextField,
    NextOperation, NextResponse, OperationHandler, ResponseHandler,
};
pub use params::{RawParams, Upload};
pub use response::{Response, ResponseStream};
pub use schema::ExecutableSchema;
pub use time::{Clock, MonotonicClock, SharedClock, TraceTiming};
