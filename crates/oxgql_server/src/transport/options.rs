//! OPTIONS/HEAD handling.

use crate::request::{WireRequest, WireResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use http::header::ALLOW;
use http::{Method, StatusCode};
use oxgql_core::Executor;

pub struct Options;

#[async_trait]
impl Transport for Options {
    fn supports(&self, request: &WireRequest) -> bool {
        request.method == Method::OPTIONS || request.method == Method::HEAD
    }

    async fn handle(&self, _exec: &Executor, request: WireRequest) -> WireResponse {
        match request.method {
            Method::OPTIONS => WireResponse::new(StatusCode::OK)
                .with_header(ALLOW, "OPTIONS, GET, POST"),
            _ => WireResponse::new(StatusCode::METHOD_NOT_ALLOWED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testserver;

    #[tokio::test]
    async fn options_advertises_allowed_methods() {
        let exec = testserver::executor();
        let resp = Options
            .handle(&exec, WireRequest::new(Method::OPTIONS, "/graphql"))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers.get(ALLOW).unwrap(), "OPTIONS, GET, POST");
    }

    #[tokio::test]
    async fn head_is_rejected() {
        let exec = testserver::executor();
        let resp = Options
            .handle(&exec, WireRequest::new(Method::HEAD, "/graphql"))
            .await;
        assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
