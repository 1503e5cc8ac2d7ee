//! HTTP to HTTPS redirect server.
//!
//! The plaintext listener has a single fallback handler: every request, whatever
//! its method or path, gets a `301 Moved Permanently` to the same host and
//! request target over HTTPS. The host comes from the `Host` header as sent;
//! forwarding headers are ignored.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

use super::server::HttpServer;
use crate::middleware::request_span_layer;

/// Name used for the redirect listener in logs and errors.
pub const REDIRECT_SERVER_NAME: &str = "redirect";

/// Router answering every request with a redirect to HTTPS.
pub fn redirect_router() -> Router {
    Router::new()
        .fallback(any(|headers: HeaderMap, uri: Uri| async move {
            redirect_to_https(request_host(&headers, &uri), &uri)
        }))
        .layer(axum::middleware::from_fn_with_state(
            REDIRECT_SERVER_NAME,
            request_span_layer,
        ))
}

/// Plaintext server bound to `addr` serving [`redirect_router`].
pub fn new_redirect_server(addr: SocketAddr) -> HttpServer {
    HttpServer::plain(REDIRECT_SERVER_NAME, addr, redirect_router())
}

/// Host the client addressed: the `Host` header, else the request-target
/// authority, else empty.
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
}

/// `https://` + host + path-and-query; the host is kept verbatim.
pub fn https_target(host: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("https://{}{}", host, path_and_query)
}

fn redirect_to_https(host: &str, uri: &Uri) -> Response {
    let target = https_target(host, uri);
    tracing::debug!(from = %uri, to = %target, "Redirecting HTTP to HTTPS");

    let location = HeaderValue::try_from(target.as_str()).unwrap_or_else(|e| {
        tracing::debug!(host, error = %e, "Unusable redirect target, dropping host");
        HeaderValue::from_static("https:///")
    });
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}
