//! Request forwarding to a backend on `localhost`.
//!
//! # Responsibilities
//! - Rewrite the target to `http://localhost:{port}` keeping path and query
//! - Set `Host` to the backend and record the original in `X-Forwarded-Host`
//! - Drop hop-by-hop headers in both directions
//! - Stream the response back without buffering

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    KEEP_ALIVE,
    PROXY_CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request has no host")]
    MissingHost,
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("backend on port {port} unreachable: {reason}")]
    BackendUnreachable { port: u16, reason: String },
    #[error("backend on port {0} did not respond in time")]
    BackendTimeout(u16),
    #[error("invalid backend target: {0}")]
    InvalidTarget(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::MissingHost => StatusCode::BAD_REQUEST,
            ForwardError::UnknownHost(_) => StatusCode::NOT_FOUND,
            ForwardError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
            ForwardError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = match &self {
            ForwardError::BackendUnreachable { .. } => "Bad Gateway".to_string(),
            ForwardError::BackendTimeout(_) => "Gateway Timeout".to_string(),
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}

/// HTTP/1.1 client for `localhost` backends. Cheap to clone.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl Forwarder {
    /// `request_timeout` bounds the wait for response headers, not the body stream.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, request_timeout }
    }

    /// Forward `request` to `localhost:{port}`.
    ///
    /// `original_host` is the Host the client asked for; `client_addr` is appended to
    /// `X-Forwarded-For` when known. Failures are never retried.
    pub async fn forward(
        &self,
        port: u16,
        request: Request<Body>,
        original_host: &str,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response, ForwardError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = backend_uri(port, &parts.uri)?;
        parts.version = Version::HTTP_11;
        rewrite_request_headers(&mut parts.headers, port, original_host, client_addr)?;

        let request = Request::from_parts(parts, body);
        let response = match tokio::time::timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(ForwardError::BackendUnreachable {
                    port,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(ForwardError::BackendTimeout(port)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// The Host the client addressed: the `Host` header, or the URI authority for HTTP/2.
pub fn original_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_owned()))
        .filter(|host| !host.trim().is_empty())
}

pub fn backend_uri(port: u16, uri: &Uri) -> Result<Uri, ForwardError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://localhost:{port}{path_and_query}")
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| ForwardError::InvalidTarget(e.to_string()))
}

/// Apply the outbound header policy in place.
pub fn rewrite_request_headers(
    headers: &mut HeaderMap,
    port: u16,
    original_host: &str,
    client_addr: Option<SocketAddr>,
) -> Result<(), ForwardError> {
    strip_hop_by_hop(headers);

    let host = HeaderValue::from_str(&format!("localhost:{port}"))
        .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
    headers.insert(header::HOST, host);

    let forwarded_host = HeaderValue::from_str(original_host).map_err(|_| ForwardError::MissingHost)?;
    headers.insert(X_FORWARDED_HOST, forwarded_host);
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let prior: Vec<&str> = headers
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let chain = if prior.is_empty() {
            ip
        } else {
            format!("{}, {ip}", prior.join(", "))
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    Ok(())
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
