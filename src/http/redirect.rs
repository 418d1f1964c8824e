//! Plaintext listener: HTTP-01 challenges and redirects to HTTPS.
//!
//! Nothing on this listener is proxied.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::certs::ChallengeStore;
use crate::routing::host::strip_port;

#[derive(Clone)]
struct RedirectState {
    challenges: ChallengeStore,
    https_port: u16,
}

/// Router for the plaintext listener. `https_port` is the port clients are sent to.
pub fn plaintext_router(challenges: ChallengeStore, https_port: u16) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(challenge_handler))
        .fallback(redirect_handler)
        .with_state(RedirectState { challenges, https_port })
        .layer(TraceLayer::new_for_http())
}

async fn challenge_handler(State(state): State<RedirectState>, Path(token): Path<String>) -> Response {
    match state.challenges.get(&token) {
        Some(key_authorization) => {
            tracing::info!(token = %token, "Serving HTTP-01 challenge");
            ([(header::CONTENT_TYPE, "text/plain")], key_authorization).into_response()
        }
        None => {
            tracing::debug!(token = %token, "Unknown challenge token");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn redirect_handler(
    State(state): State<RedirectState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::BAD_REQUEST, "Use HTTPS").into_response();
    }

    let Some(host) = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| strip_port(h.trim()))
        .filter(|h| !h.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
    };

    let location = https_location(host, state.https_port, &uri);
    tracing::debug!(location = %location, "Redirecting to HTTPS");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn https_location(host: &str, https_port: u16, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    if https_port == 443 {
        format!("https://{host}{path_and_query}")
    } else {
        format!("https://{host}:{https_port}{path_and_query}")
    }
}
