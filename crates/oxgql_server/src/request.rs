//! Decoded wire request/response pair the transports operate on.
//!
//! Transports never touch a socket: the HTTP runner buffers the body and
//! hands over a [`WireRequest`], so the whole transport layer is drivable
//! in-process from tests.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::{Extensions, Method, StatusCode, Uri};
use oxgql_core::{dominant_kind, ErrorKind, GqlError, Response};

/// An HTTP request after body buffering.
#[derive(Debug, Default)]
pub struct WireRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Side-channel for connection-level handles (websocket upgrades).
    pub extensions: Extensions,
}

impl WireRequest {
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().parse().unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: http::header::HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Parsed media type of the request body.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.header(CONTENT_TYPE)?.parse().ok()
    }

    pub fn query_string(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(http::header::CONTENT_LENGTH)?.parse().ok()
    }
}

/// An HTTP response ready for the runner to write out.
#[derive(Debug)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A JSON-encoded GraphQL response body.
    pub fn graphql(status: StatusCode, response: &Response) -> Self {
        let body = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Single-error GraphQL body; status derived from the error kind
    /// unless overridden.
    pub fn error(status: StatusCode, err: GqlError) -> Self {
        Self::graphql(status, &Response::from_error(err))
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body_json(&self) -> Option<Response> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Maps a response's error kinds onto an HTTP status.
///
/// Request-shaping failures are client errors; anything that made it to a
/// resolver ships as 200 with errors in the body.
pub fn status_for(errors: &[GqlError]) -> StatusCode {
    if errors.is_empty() {
        return StatusCode::OK;
    }
    match dominant_kind(errors) {
        ErrorKind::Transport | ErrorKind::Decode => StatusCode::BAD_REQUEST,
        ErrorKind::Parse | ErrorKind::Validation | ErrorKind::Protocol => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::Execution | ErrorKind::Extension => StatusCode::OK,
    }
}
