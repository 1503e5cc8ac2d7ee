//! Request logging middleware shared by both listeners.
//!
//! Every request gets a UUID v4 and a tracing span naming the listener that
//! accepted it, so redirect traffic and application traffic can be told apart
//! in the logs.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Request ID, available to handlers through request extensions.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Wrap a request in a span tagged with `listener` and log its completion.
///
/// Install with `axum::middleware::from_fn_with_state(listener, request_span_layer)`
/// as the outermost layer.
pub async fn request_span_layer(
    State(listener): State<&'static str>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        listener,
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    request.extensions_mut().insert(RequestId(request_id));

    async move {
        let response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::debug!(status = response.status().as_u16(), duration_ms, "Request completed");

        response
    }
    .instrument(span)
    .await
}
