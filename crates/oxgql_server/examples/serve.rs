//! Serves the canned test schema on localhost with the default transports.
//!
//! ```sh
//! cargo run --example serve
//! curl -s localhost:8080/graphql -H 'content-type: application/json' \
//!   -d '{"query":"{ name }"}'
//! ```

use oxgql_server::{http, testserver, Server};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,oxgql_core=debug,oxgql_server=debug".into()),
        )
        .init();

    let server = Server::new_default(testserver::schema());
    http::serve(([127, 0, 0, 1], 8080).into(), server).await
}
