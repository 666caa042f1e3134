//! HTTP endpoint exposing the worker's registry for scraping.

use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use super::prometheus::{export_metrics, REGISTRY};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
///
/// Returns 503 until [`init_metrics`](super::init_metrics) has run.
pub async fn metrics_handler() -> Response {
    if REGISTRY.get().is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_FORMAT)],
        export_metrics(),
    )
        .into_response()
}

/// Router with the single `/metrics` route.
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves `/metrics` on `addr` until `shutdown` fires or its sender is dropped.
pub async fn serve_metrics(
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Serving metrics");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{init_metrics, JobOutcome, MetricsCollector};
    use crate::scheduler::JobKind;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_route_serves_job_counters() {
        init_metrics().expect("init metrics");
        MetricsCollector::new().record_job(JobKind::EnrichProduct, JobOutcome::Completed, 0.25);

        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("styling_jobs_jobs_total"));
        assert!(text.contains("styling_jobs_job_duration_seconds"));
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let server = tokio::spawn(serve_metrics("127.0.0.1:0".parse().unwrap(), rx));
        tx.send(()).unwrap();
        assert!(server.await.unwrap().is_ok());
    }
}
