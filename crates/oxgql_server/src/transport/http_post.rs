//! POST transport for `application/json` bodies.

use crate::request::{WireRequest, WireResponse};
use crate::transport::{dispatch_single, Transport};
use async_trait::async_trait;
use http::{Method, StatusCode};
use oxgql_core::{Executor, GqlError, RawParams};

pub struct HttpPost;

#[async_trait]
impl Transport for HttpPost {
    fn supports(&self, request: &WireRequest) -> bool {
        request.method == Method::POST
            && request
                .content_type()
                .map(|mime| mime.essence_str() == mime::APPLICATION_JSON.essence_str())
                .unwrap_or(false)
    }

    async fn handle(&self, exec: &Executor, request: WireRequest) -> WireResponse {
        let started = exec.clock().now();
        let mut params: RawParams = match serde_json::from_slice(&request.body) {
            Ok(params) => params,
            Err(err) => {
                return WireResponse::error(
                    StatusCode::BAD_REQUEST,
                    GqlError::decode(format!("json body could not be decoded: {err}")),
                );
            }
        };
        params.read_time.start = started;
        params.read_time.end = exec.clock().now();
        dispatch_single(exec, params).await
    }
}
