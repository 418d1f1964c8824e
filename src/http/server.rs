//! Proxy server setup.
//!
//! # Responsibilities
//! - Build the Axum routers for the TLS and plaintext listeners
//! - Wire up middleware (request ID, tracing)
//! - Run both accept loops until shutdown, then drain open connections
//! - Resolve each request's Host through the switchboard and forward it

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::server::TlsStream;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::certs::{CertificateCache, ChallengeStore};
use crate::config::ProxyConfig;
use crate::http::forward::{original_host, ForwardError, Forwarder};
use crate::http::redirect::plaintext_router;
use crate::lifecycle::Shutdown;
use crate::net::{tls, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::{canonicalize, SharedSwitchboard};

/// State injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub switchboard: SharedSwitchboard,
    pub forwarder: Forwarder,
}

/// Router for traffic arriving over TLS.
pub fn proxy_router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Both listeners, bound and ready to serve.
pub struct ProxyServer {
    plaintext: TcpListener,
    tls: Listener,
    app: Router,
    certs: CertificateCache,
    challenges: ChallengeStore,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Bind the plaintext and TLS listeners. Either failing is fatal.
    pub async fn bind(
        config: &ProxyConfig,
        switchboard: SharedSwitchboard,
        certs: CertificateCache,
        challenges: ChallengeStore,
    ) -> Result<Self, ListenerError> {
        let http_address = &config.listener.http_address;
        let plaintext = TcpListener::bind(http_address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: http_address.clone(),
                source,
            })?;
        tracing::info!(address = %http_address, "Plaintext listener bound");

        let tls = Listener::bind(&config.listener.https_address, config.listener.max_connections).await?;

        let forwarder = Forwarder::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.request_secs),
        );
        let app = proxy_router(AppState { switchboard, forwarder });

        Ok(Self {
            plaintext,
            tls,
            app,
            certs,
            challenges,
            handshake_timeout: config.tls.handshake_timeout(),
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.plaintext.local_addr()
    }

    pub fn https_addr(&self) -> std::io::Result<SocketAddr> {
        self.tls.local_addr()
    }

    /// Serve until `shutdown` fires, then let it drain open connections.
    pub async fn run(self, shutdown: &Shutdown) -> std::io::Result<()> {
        let Self {
            plaintext,
            tls,
            app,
            certs,
            challenges,
            handshake_timeout,
            tracker,
        } = self;

        let redirect = plaintext_router(challenges, tls.local_addr()?.port());
        let mut plaintext_shutdown = shutdown.subscribe();
        let plaintext = async move {
            axum::serve(plaintext, redirect)
                .with_graceful_shutdown(async move {
                    let _ = plaintext_shutdown.recv().await;
                })
                .await
        };

        let secure = serve_tls(
            tls,
            app,
            certs,
            handshake_timeout,
            tracker.clone(),
            shutdown.subscribe(),
        );

        let (plaintext_result, ()) = tokio::join!(plaintext, secure);

        shutdown.drain(&tracker).await;

        tracing::info!("Proxy server stopped");
        plaintext_result
    }
}

async fn serve_tls(
    listener: Listener,
    app: Router,
    certs: CertificateCache,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let guard = tracker.track();
        let app = app.clone();
        let certs = certs.clone();
        let connection_shutdown = shutdown.resubscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;

            let (stream, server_name) = match tls::accept(stream, &certs, handshake_timeout).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                    metrics::record_handshake_failure(e.reason());
                    return;
                }
            };

            tracing::trace!(peer = %peer, server_name = %server_name, "TLS established");
            serve_connection(stream, peer, app, connection_shutdown).await;
        });
    }

    tracing::info!("TLS listener stopped accepting");
}

async fn serve_connection(
    stream: TlsStream<TcpStream>,
    peer: SocketAddr,
    app: Router,
    mut shutdown: broadcast::Receiver<()>,
) {
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(request)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

/// Resolves the Host and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (host_label, response) = match route(&state, request, client_addr).await {
        Ok((host, response)) => (host, response),
        Err((host, e)) => {
            match &e {
                ForwardError::UnknownHost(_) | ForwardError::MissingHost => {
                    tracing::debug!(error = %e, "Rejected request")
                }
                _ => tracing::warn!(error = %e, "Forwarding failed"),
            }
            (host, e.into_response())
        }
    };

    metrics::record_request(&method, response.status().as_u16(), &host_label, start);
    response
}

/// Returns the canonical host alongside the outcome so it can label metrics.
async fn route(
    state: &AppState,
    request: Request<Body>,
    client_addr: Option<SocketAddr>,
) -> Result<(String, Response), (String, ForwardError)> {
    let Some(host) = original_host(&request) else {
        return Err(("none".to_string(), ForwardError::MissingHost));
    };

    let canonical = canonicalize(&host);
    let Some(port) = state.switchboard.load().resolve(&canonical) else {
        return Err(("unknown".to_string(), ForwardError::UnknownHost(canonical)));
    };

    tracing::debug!(host = %host, port, "Forwarding request");
    match state.forwarder.forward(port, request, &host, client_addr).await {
        Ok(response) => Ok((canonical, response)),
        Err(e) => Err((canonical, e)),
    }
}
