//! Demo application served by the `autotls` binary.
//!
//! `/` greets the requested host so a successful handshake for a new domain is
//! easy to confirm in a browser; `/health` is a liveness probe for load
//! balancers and systemd.

use axum::{middleware, routing::get, Router};
use axum_extra::extract::Host;
use tower_http::trace::TraceLayer;

use crate::http::SECURE_SERVER_NAME;
use crate::middleware::request_span_layer;

pub fn create_router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(SECURE_SERVER_NAME, request_span_layer))
}

async fn index(Host(host): Host) -> String {
    format!("Hello from {} over TLS\n", host)
}

/// Liveness probe: the process can answer HTTP.
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = create_router()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::HOST, "example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(get_body("/health").await, (StatusCode::OK, "ok".to_string()));
    }

    #[tokio::test]
    async fn index_names_host() {
        let (status, body) = get_body("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("example.com"));
    }
}
