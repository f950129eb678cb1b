//! GET transport: query-string encoded operations, queries only.

use crate::request::{status_for, WireRequest, WireResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use futures::StreamExt;
use http::{Method, StatusCode};
use oxgql_core::{Executor, GqlError, OperationKind, RawParams};
use std::sync::Arc;
use tracing::debug;

pub struct HttpGet;

#[async_trait]
impl Transport for HttpGet {
    fn supports(&self, request: &WireRequest) -> bool {
        request.method == Method::GET && request.header(http::header::UPGRADE).is_none()
    }

    async fn handle(&self, exec: &Executor, request: WireRequest) -> WireResponse {
        let started = exec.clock().now();
        let pairs: Vec<(String, String)> =
            match serde_urlencoded::from_str(request.query_string()) {
                Ok(pairs) => pairs,
                Err(err) => {
                    return WireResponse::error(
                        StatusCode::BAD_REQUEST,
                        GqlError::decode(format!("query string could not be decoded: {err}")),
                    );
                }
            };

        let mut params = RawParams::default();
        for (key, value) in pairs {
            match key.as_str() {
                "query" => params.query = value,
                "operationName" => params.operation_name = Some(value),
                "variables" => match serde_json::from_str(&value) {
                    Ok(variables) => params.variables = variables,
                    Err(_) => {
                        return WireResponse::error(
                            StatusCode::BAD_REQUEST,
                            GqlError::decode("variables could not be decoded"),
                        );
                    }
                },
                "extensions" => match serde_json::from_str(&value) {
                    Ok(extensions) => params.extensions = extensions,
                    Err(_) => {
                        return WireResponse::error(
                            StatusCode::BAD_REQUEST,
                            GqlError::decode("extensions could not be decoded"),
                        );
                    }
                },
                _ => debug!(key, "ignoring unknown query parameter"),
            }
        }
        params.read_time.start = started;
        params.read_time.end = exec.clock().now();

        match exec.create_operation_context(params) {
            Ok(ctx) => {
                let is_query = ctx
                    .operation()
                    .map(|op| op.kind == OperationKind::Query)
                    .unwrap_or(false);
                if !is_query {
                    return WireResponse::error(
                        StatusCode::NOT_ACCEPTABLE,
                        GqlError::protocol("GET requests only allow query operations"),
                    );
                }
                let mut responses = exec.dispatch_operation(Arc::new(ctx)).await;
                let response = responses.next().await.unwrap_or_default();
                WireResponse::graphql(StatusCode::OK, &response)
            }
            Err(failure) => {
                let response = exec.dispatch_error(failure.ctx, failure.errors).await;
                WireResponse::graphql(status_for(&response.errors), &response)
            }
        }
    }
}
