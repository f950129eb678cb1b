//! Server assembly: transport selection in front of a configured executor.

use crate::extension::{
    ApolloTracing, AutomaticPersistedQuery, ComplexityLimit, Introspection,
};
use crate::request::{WireRequest, WireResponse};
use crate::transport::{HttpGet, HttpPost, MultipartForm, Options, Transport, Websocket};
use futures::future::BoxFuture;
use http::StatusCode;
use oxgql_core::{
    AroundField, AroundOperation, AroundResponse, Cache, Document, ExecutableSchema, Executor,
    FieldContext, GqlError, Interceptor, LruCache, MonotonicClock, NextField, NextOperation,
    NextResponse, OperationContext, RecoverFn, Response, ResponseStream, SharedClock,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_QUERY_CACHE_SIZE: usize = 1000;

/// A configured GraphQL server: ordered transports over one executor.
pub struct Server {
    exec: Executor,
    transports: Vec<Arc<dyn Transport>>,
}

impl Server {
    pub fn build(schema: Arc<dyn ExecutableSchema>) -> ServerBuilder {
        ServerBuilder::new(schema)
    }

    /// The standard transport set with sensible defaults: websocket
    /// subscriptions, OPTIONS/HEAD, GET, JSON POST, and multipart uploads,
    /// plus a bounded query cache.
    pub fn new_default(schema: Arc<dyn ExecutableSchema>) -> Self {
        Self::build(schema)
            .transport(Websocket::new())
            .transport(Options)
            .transport(HttpGet)
            .transport(HttpPost)
            .transport(MultipartForm::new())
            .query_cache(Arc::new(LruCache::new(DEFAULT_QUERY_CACHE_SIZE)))
            .finish()
    }

    pub fn executor(&self) -> &Executor {
        &self.exec
    }

    /// First-match transport dispatch. A request no transport claims is a
    /// 400 with a single transport error.
    pub async fn handle(&self, request: WireRequest) -> WireResponse {
        for transport in &self.transports {
            if transport.supports(&request) {
                return transport.handle(&self.exec, request).await;
            }
        }
        debug!(method = %request.method, "no transport claimed request");
        WireResponse::graphql(
            StatusCode::BAD_REQUEST,
            &Response::from_error(GqlError::transport("transport not supported")),
        )
    }
}

/// Assembles a [`Server`]. Transports and interceptors keep registration
/// order; the bundled extensions slot in ahead of user interceptors.
pub struct ServerBuilder {
    schema: Arc<dyn ExecutableSchema>,
    transports: Vec<Arc<dyn Transport>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cache: Option<Arc<dyn Cache<Arc<Document>>>>,
    clock: Option<SharedClock>,
    recover: Option<RecoverFn>,
    apq: Option<Arc<dyn Cache<String>>>,
    apq_enabled: bool,
    complexity: Option<usize>,
    tracing_enabled: bool,
    introspection: bool,
}

impl ServerBuilder {
    fn new(schema: Arc<dyn ExecutableSchema>) -> Self {
        Self {
            schema,
            transports: Vec::new(),
            interceptors: Vec::new(),
            cache: None,
            clock: None,
            recover: None,
            apq: None,
            apq_enabled: false,
            complexity: None,
            tracing_enabled: false,
            introspection: false,
        }
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transports.push(Arc::new(transport));
        self
    }

    pub fn extension(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn around_operation<F>(self, f: F) -> Self
    where
        F: Fn(Arc<OperationContext>, NextOperation) -> BoxFuture<'static, ResponseStream>
            + Send
            + Sync
            + 'static,
    {
        self.extension(AroundOperation(f))
    }

    pub fn around_response<F>(self, f: F) -> Self
    where
        F: Fn(Arc<OperationContext>, NextResponse) -> BoxFuture<'static, Response>
            + Send
            + Sync
            + 'static,
    {
        self.extension(AroundResponse(f))
    }

    pub fn around_field<F>(self, f: F) -> Self
    where
        F: Fn(FieldContext, NextField) -> BoxFuture<'static, Result<Value, GqlError>>
            + Send
            + Sync
            + 'static,
    {
        self.extension(AroundField(f))
    }

    /// Parsed-document cache keyed by raw query text.
    pub fn query_cache(mut self, cache: Arc<dyn Cache<Arc<Document>>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn recover(mut self, recover: RecoverFn) -> Self {
        self.recover = Some(recover);
        self
    }

    /// Enables automatic persisted queries with the default bounded cache.
    pub fn automatic_persisted_queries(mut self) -> Self {
        self.apq_enabled = true;
        self
    }

    /// Enables automatic persisted queries backed by the given cache.
    pub fn persisted_query_cache(mut self, cache: Arc<dyn Cache<String>>) -> Self {
        self.apq_enabled = true;
        self.apq = Some(cache);
        self
    }

    /// Caps operation complexity at a fixed limit.
    pub fn complexity_limit(mut self, limit: usize) -> Self {
        self.complexity = Some(limit);
        self
    }

    /// Attaches Apollo-style tracing to every response.
    pub fn apollo_tracing(mut self) -> Self {
        self.tracing_enabled = true;
        self
    }

    /// Permits `__schema`/`__type` selections.
    pub fn introspection(mut self) -> Self {
        self.introspection = true;
        self
    }

    pub fn finish(self) -> Server {
        let clock: SharedClock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let mut exec = Executor::new(self.schema.clone()).with_clock(clock.clone());

        let mut chain: Vec<Arc<dyn Interceptor>> = Vec::new();
        if self.apq_enabled {
            chain.push(match self.apq {
                Some(cache) => Arc::new(AutomaticPersistedQuery::with_cache(cache)),
                None => Arc::new(AutomaticPersistedQuery::new()),
            });
        }
        if let Some(limit) = self.complexity {
            chain.push(Arc::new(ComplexityLimit::new(self.schema.clone(), limit)));
        }
        if self.tracing_enabled {
            chain.push(Arc::new(ApolloTracing::new(
                self.schema.clone(),
                clock.clone(),
            )));
        }
        if self.introspection {
            chain.push(Arc::new(Introspection));
        }
        chain.extend(self.interceptors);
        for interceptor in chain {
            exec = exec.with_interceptor(interceptor);
        }
        if let Some(cache) = self.cache {
            exec = exec.with_document_cache(cache);
        }
        if let Some(recover) = self.recover {
            exec = exec.with_recover(recover);
        }

        Server {
            exec,
            transports: self.transports,
        }
    }
}
