//! HTTP surface over [`AccessGate`].
//!
//! Handlers are thin: extract, hand the synchronous gate call to
//! `spawn_blocking`, map the result. Status codes come from
//! [`GateError`]'s `IntoResponse` impl in [`error`].

pub mod error;
mod handlers;

use crate::gate::AccessGate;
use crate::GateError;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The gate all handlers delegate to.
    pub gate: Arc<AccessGate>,
}

impl AppState {
    /// Wrap a gate.
    pub fn new(gate: Arc<AccessGate>) -> Self {
        Self { gate }
    }
}

/// Build the router with every public endpoint.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`;
/// the unlock callback reads the peer address.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(handlers::upload))
        .route("/api/verify-key", post(handlers::verify_key))
        .route("/key/{resource_id}", get(handlers::issue_key))
        .route("/verify/{resource_id}", get(handlers::verify_snippet))
        .route("/signed/{resource_id}", get(handlers::signed))
        .route("/raw/{resource_id}", get(handlers::raw))
        .route("/loader/{resource_id}", get(handlers::loader))
        .with_state(state)
}

/// Run a gate call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, GateError>
where
    F: FnOnce() -> Result<T, GateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GateError::Internal(format!("blocking task failed: {}", e)))?
}

/// Client address used for throttling and completion checks.
///
/// The first `X-Forwarded-For` hop is used only when `trust_forwarded_for`
/// is set; otherwise the socket peer address.
pub fn client_address(trust_forwarded_for: bool, headers: &HeaderMap, peer: SocketAddr) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.0.2.7:40000".parse().unwrap()
    }

    #[test]
    fn test_peer_address_without_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_address(false, &headers, peer()), "192.0.2.7");
    }

    #[test]
    fn test_forwarded_first_hop_with_trust() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_address(true, &headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_trust_without_header_falls_back() {
        assert_eq!(client_address(true, &HeaderMap::new(), peer()), "192.0.2.7");
    }
}
