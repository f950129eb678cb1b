//! The wire layer over `oxgql_core`: transports, bundled extensions, and
//! the HTTP runner.
//!
//! ```no_run
//! use oxgql_server::{http, testserver, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::new_default(testserver::schema());
//!     http::serve(([127, 0, 0, 1], 8080).into(), server).await
//! }
//! ```

pub mod extension;
pub mod http;
pub mod request;
pub mod server;
pub mod testserver;
pub mod transport;

pub use request::{status_for, WireRequest, WireResponse};
pub use server::{Server, ServerBuilder};
pub use transport::{HttpGet, HttpPost, MultipartForm, Options, Transport, Websocket};
