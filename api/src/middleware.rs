//! Middleware for the read API server.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request logging middleware.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = Instant::now();

    debug!("Incoming request: {} {}", method, uri);

    let response = next.run(request).await;

    let duration = start_time.elapsed();
    let status = response.status();

    if status.is_success() {
        info!("{} {} - {} ({:?})", method, uri, status, duration);
    } else {
        warn!("{} {} - {} ({:?})", method, uri, status, duration);
    }

    response
}

/// Request timeout middleware (§6: a fetch/call-level timeout, not a
/// per-request HTTP one; this guards the server loop against a handler that
/// hangs on a misbehaving adapter).
pub async fn request_timeout(request: Request, next: Next) -> Result<Response, StatusCode> {
    let timeout_duration = std::time::Duration::from_secs(30);

    match tokio::time::timeout(timeout_duration, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            warn!("Request timed out after {:?}", timeout_duration);
            Err(StatusCode::REQUEST_TIMEOUT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn request_logging_passes_the_response_through_unchanged() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_logging));

        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
