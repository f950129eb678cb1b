//! Request transports.
//!
//! A transport claims a wire request (`supports`) and turns it into one or
//! more executed operations (`handle`). The server asks transports in
//! registration order and takes the first match.

use crate::request::{status_for, WireRequest, WireResponse};
use async_trait::async_trait;
use http::StatusCode;
use oxgql_core::{Executor, RawParams};
use std::sync::Arc;

mod http_get;
mod http_post;
mod multipart;
mod options;
mod websocket;

pub use http_get::HttpGet;
pub use http_post::HttpPost;
pub use multipart::MultipartForm;
pub use options::Options;
pub use websocket::{Websocket, WsMessage};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn supports(&self, request: &WireRequest) -> bool;
    async fn handle(&self, exec: &Executor, request: WireRequest) -> WireResponse;
}

/// Shared single-response dispatch: context creation failures map to their
/// kind's status, anything dispatched ships as 200.
pub(crate) async fn dispatch_single(exec: &Executor, params: RawParams) -> WireResponse {
    match exec.create_operation_context(params) {
        Ok(ctx) => {
            use futures::StreamExt;
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
