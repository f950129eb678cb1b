//! Bundled extension behavior over the wire.

use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use oxgql_core::Clock;
use oxgql_server::extension::ComplexityStats;
use oxgql_server::{testserver, HttpPost, Server, WireRequest};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn post(body: &str) -> WireRequest {
    WireRequest::new(Method::POST, "/graphql")
        .with_header(CONTENT_TYPE, "application/json")
        .with_body(body.to_string())
}

#[tokio::test]
async fn complexity_over_the_limit_is_rejected_at_200() {
    let server = Server::build(testserver::schema())
        .transport(HttpPost)
        .complexity_limit(2)
        .finish();
    let resp = server
        .handle(post(r#"{"query":"{ name find(id: 1) { name age } }"}"#))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    assert_eq!(
        parsed.errors[0].message,
        "operation has complexity 4, which exceeds the limit of 2"
    );
    assert_eq!(parsed.errors[0].code(), Some("COMPLEXITY_LIMIT_EXCEEDED"));
    assert!(parsed.data.is_null());
}

#[tokio::test]
async fn complexity_stats_are_recorded_even_when_allowed() {
    let captured: Arc<Mutex<Option<ComplexityStats>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let server = Server::build(testserver::schema())
        .transport(HttpPost)
        .complexity_limit(100)
        .around_response(move |ctx, next| {
            let sink = sink.clone();
            Box::pin(async move {
                *sink.lock().unwrap() = ctx.stat::<ComplexityStats>();
                next.run(ctx).await
            }) as BoxFuture<'static, _>
        })
        .finish();
    let resp = server
        .handle(post(r#"{"query":"{ name find(id: 1) { name age } }"}"#))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let stats = captured.lock().unwrap().unwrap();
    assert_eq!(
        stats,
        ComplexityStats {
            complexity_limit: 100,
            complexity: 4
        }
    );
}

fn sha256_hex(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

#[tokio::test]
async fn persisted_query_miss_register_hit() {
    let server = Server::build(testserver::schema())
        .transport(HttpPost)
        .automatic_persisted_queries()
        .finish();
    let query = "{ name }";
    let hash = sha256_hex(query);
    let hash_only = json!({
        "extensions": {"persistedQuery": {"version": 1, "sha256Hash": hash}}
    });

    let resp = server.handle(post(&hash_only.to_string())).await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    assert_eq!(parsed.errors[0].message, "PersistedQueryNotFound");
    assert_eq!(parsed.errors[0].code(), Some("PERSISTED_QUERY_NOT_FOUND"));

    let with_query = json!({
        "query": query,
        "extensions": {"persistedQuery": {"version": 1, "sha256Hash": hash}}
    });
    let resp = server.handle(post(&with_query.to_string())).await;
    assert_eq!(resp.body_json().unwrap().data["name"], json!("test"));

    let resp = server.handle(post(&hash_only.to_string())).await;
    assert_eq!(resp.body_json().unwrap().data["name"], json!("test"));
}

#[tokio::test]
async fn persisted_query_with_wrong_hash_is_rejected() {
    let server = Server::build(testserver::schema())
        .transport(HttpPost)
        .automatic_persisted_queries()
        .finish();
    let body = json!({
        "query": "{ name }",
        "extensions": {"persistedQuery": {"version": 1, "sha256Hash": "bogus"}}
    });
    let resp = server.handle(post(&body.to_string())).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "provided sha does not match query"
    );
}

/// Advances 100ns on every reading, making timing output exact.
#[derive(Default)]
struct SteppingClock(AtomicU64);

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.0.fetch_add(100, Ordering::SeqCst))
    }
}

#[tokio::test]
async fn tracing_payload_reports_phase_and_resolver_timings() {
    let server = Server::build(testserver::schema())
        .transport(HttpPost)
        .clock(Arc::new(SteppingClock::default()))
        .apollo_tracing()
        .finish();
    let resp = server.handle(post(r#"{"query":"{ name }"}"#)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let parsed = resp.body_json().unwrap();
    let tracing = &parsed.extensions["tracing"];

    assert_eq!(tracing["version"], json!(1));
    assert_eq!(tracing["startTime"], json!(0));
    assert_eq!(tracing["parsing"], json!({"startOffset": 200, "duration": 100}));
    assert_eq!(
        tracing["validation"],
        json!({"startOffset": 400, "duration": 100})
    );
    let resolver = &tracing["execution"]["resolvers"][0];
    assert_eq!(resolver["path"], json!(["name"]));
    assert_eq!(resolver["parentType"], json!("Query"));
    assert_eq!(resolver["fieldName"], json!("name"));
    assert_eq!(resolver["returnType"], json!("String!"));
    assert_eq!(resolver["startOffset"], json!(600));
    assert_eq!(resolver["duration"], json!(100));
    assert_eq!(tracing["endTime"], json!(800));
    assert_eq!(tracing["duration"], json!(800));
}

#[tokio::test]
async fn introspection_is_gated() {
    let locked = Server::build(testserver::schema())
        .transport(HttpPost)
        .finish();
    let resp = locked.handle(post(r#"{"query":"{ __schema }"}"#)).await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.body_json().unwrap().errors[0].message,
        "introspection disabled"
    );

    let open = Server::build(testserver::schema())
        .transport(HttpPost)
        .introspection()
        .finish();
    let resp = open.handle(post(r#"{"query":"{ __schema }"}"#)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body_json().unwrap().data["__schema"]["queryType"]["name"],
        json!("Query")
    );
}
