//! Correlation-ID propagation.
//!
//! Every request carries an `X-Correlation-ID`: the caller's value when
//! supplied, otherwise a fresh UUID. The ID is stored in request extensions
//! for log enrichment and echoed on the response so callers can stitch
//! request and server logs together.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::info_span;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation ID.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Injects or echoes the correlation ID and wraps the request in a span
/// carrying it.
pub async fn propagate(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(correlation_id.clone());

    let span = info_span!("request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
