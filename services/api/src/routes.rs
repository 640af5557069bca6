use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use rent_linkage::linkage::{linkage_router, IndexStore, ProjectionAggregator};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_linkage_routes<S>(aggregator: Arc<ProjectionAggregator<S>>) -> axum::Router
where
    S: IndexStore + 'static,
{
    linkage_router(aggregator)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use rent_linkage::linkage::InMemoryIndexStore;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    const CSV: &str = "index_type,date,value\ncpi,2023-01,100.0\ncpi,2024-01,103.5\n";

    fn app(ready: bool) -> axum::Router {
        let store = InMemoryIndexStore::from_csv_reader(CSV.as_bytes()).expect("csv loads");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_linkage_routes(Arc::new(ProjectionAggregator::new(Arc::new(store))))
            .layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
    }

    #[tokio::test]
    async fn readiness_tracks_the_startup_flag() {
        let (status, body) = get(app(false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("initializing"));

        let (status, _) = get(app(true), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_linkage_routes_share_the_router() {
        let (status, body) = get(app(true), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ok"));

        let (status, body) = get(app(true), "/api/v1/indices/cpi/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"2024-01\""));
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let (status, _) = get(app(true), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }
}
