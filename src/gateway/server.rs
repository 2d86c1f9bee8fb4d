//! Gateway HTTP server
//!
//! Accepts connections in front of the origin, routes every request
//! through the interception router, and implements pass-through by
//! proxying to the configured origin.

use anyhow::Result;
use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE, HOST};
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::gateway::router::{FetchInterceptionRouter, RouteOutcome};
use crate::module::marshal::RequestEnvelope;

/// The gateway's front server.
pub struct GatewayServer {
    addr: SocketAddr,
    origin: String,
    router: Arc<FetchInterceptionRouter>,
    client: reqwest::Client,
}

impl GatewayServer {
    /// Create a server that listens on `addr` and fronts `origin`
    /// (a base URL such as `http://127.0.0.1:8080`).
    pub fn new(
        addr: SocketAddr,
        origin: impl Into<String>,
        router: Arc<FetchInterceptionRouter>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            addr,
            origin: origin.into(),
            router,
            client,
        }
    }

    /// Accept and serve connections until the task is dropped.
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("gateway listening on {}, fronting {}", self.addr, self.origin);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("new connection from {}", peer);
                    let router = Arc::clone(&self.router);
                    let client = self.client.clone();
                    let origin = self.origin.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            handle_request(
                                Arc::clone(&router),
                                client.clone(),
                                origin.clone(),
                                req,
                            )
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("connection from {} closed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_request(
    router: Arc<FetchInterceptionRouter>,
    client: reqwest::Client,
    origin: String,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {}", e);
            return Ok(plain_response(StatusCode::BAD_REQUEST, "unreadable request body"));
        }
    };

    let envelope = RequestEnvelope {
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body_bytes).into_owned(),
    };

    match router.route(envelope).await {
        Ok(RouteOutcome::Intercepted(response)) => {
            let mut out = Response::new(Full::new(Bytes::from(response.content)));
            out.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(crate::module::marshal::RESPONSE_CONTENT_TYPE),
            );
            Ok(out)
        }
        Ok(RouteOutcome::PassThrough) => {
            match proxy_to_origin(&client, &origin, parts, body_bytes).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    warn!("origin pass-through failed: {}", e);
                    Ok(plain_response(StatusCode::BAD_GATEWAY, "origin unreachable"))
                }
            }
        }
        Err(e) => {
            error!("module request failed: {}", e);
            Ok(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "module request failed"))
        }
    }
}

/// Forward a non-intercepted request to the origin and relay the
/// response.
async fn proxy_to_origin(
    client: &reqwest::Client,
    origin: &str,
    parts: http::request::Parts,
    body: Bytes,
) -> Result<Response<Full<Bytes>>, reqwest::Error> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", origin.trim_end_matches('/'), path_and_query);

    let mut upstream = client.request(parts.method, &url);
    for (name, value) in parts.headers.iter() {
        if name != HOST && !is_hop_by_hop(name) {
            upstream = upstream.header(name, value);
        }
    }

    let response = upstream.body(body).send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.bytes().await?;

    let mut out = Response::new(Full::new(bytes));
    *out.status_mut() = status;
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name) {
            out.headers_mut().append(name, value.clone());
        }
    }
    Ok(out)
}

/// Headers that describe the connection, not the message; never
/// forwarded in either direction.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
