//! HTTP runner: binds a listener and feeds connections into the server.

use crate::request::WireRequest;
use crate::server::Server;
use bytes::Bytes;
use http::{Extensions, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

const PLAYGROUND_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <title>oxgql playground</title>
    <link rel="stylesheet" href="https://unpkg.com/graphiql/graphiql.min.css" />
  </head>
  <body style="margin:0">
    <div id="graphiql" style="height:100vh"></div>
    <script src="https://unpkg.com/react/umd/react.production.min.js"></script>
    <script src="https://unpkg.com/react-dom/umd/react-dom.production.min.js"></script>
    <script src="https://unpkg.com/graphiql/graphiql.min.js"></script>
    <script>
      ReactDOM.render(
        React.createElement(GraphiQL, {
          fetcher: GraphiQL.createFetcher({ url: "/graphql" }),
        }),
        document.getElementById("graphiql"),
      );
    </script>
  </body>
</html>
"#;

/// Serves GraphQL over HTTP/1.1 until the listener fails.
///
/// Routes: `/health` for liveness, `/` for the playground, everything else
/// through transport selection (upgrades included).
pub async fn serve(addr: SocketAddr, server: Server) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "graphql server listening");
    let server = Arc::new(server);
    loop {
        let (stream, peer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let server = server.clone();
                async move { Ok::<_, Infallible>(route(&server, req).await) }
            });
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();
            if let Err(err) = conn.await {
                debug!(%peer, %err, "connection closed with error");
            }
        });
    }
}

async fn route(server: &Server, req: Request<Incoming>) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => plain(StatusCode::OK, "ok"),
        (&Method::GET, "/") if req.uri().query().is_none() => {
            let mut resp = plain(StatusCode::OK, PLAYGROUND_HTML);
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/html; charset=utf-8"),
            );
            resp
        }
        _ => match buffer_request(req).await {
            Ok(wire) => {
                let wire_resp = server.handle(wire).await;
                let mut resp = Response::new(Full::new(wire_resp.body));
                *resp.status_mut() = wire_resp.status;
                *resp.headers_mut() = wire_resp.headers;
                resp
            }
            Err(err) => {
                debug!(%err, "failed to buffer request body");
                plain(StatusCode::BAD_REQUEST, "could not read request body")
            }
        },
    }
}

async fn buffer_request(mut req: Request<Incoming>) -> Result<WireRequest, hyper::Error> {
    // the upgrade handle must be taken before the body is consumed
    let on_upgrade = hyper::upgrade::on(&mut req);
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let mut extensions = Extensions::new();
    extensions.insert(on_upgrade);
    Ok(WireRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        extensions,
    })
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp
}
