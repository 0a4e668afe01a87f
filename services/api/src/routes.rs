use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use docverify::workflows::verification::{
    background_check_router, document_router, BackgroundCheckCoordinator, DocumentLifecycle,
    DocumentStore, NotificationSink,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_verification_routes<R, N>(
    lifecycle: Arc<DocumentLifecycle<R, N>>,
    background_checks: Arc<BackgroundCheckCoordinator>,
) -> Router
where
    R: DocumentStore + 'static,
    N: NotificationSink + 'static,
{
    document_router(lifecycle)
        .merge(background_check_router(background_checks))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
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
    use crate::infra::{
        InMemoryDocumentStore, LocalStorage, LoggingNotificationSink, StubAnalysisBackend,
    };
    use axum::body::Body;
    use axum::http::Request;
    use docverify::workflows::verification::{AccessTokenIssuer, AnalysisAdapter};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(ready: bool) -> (Router, Arc<AtomicBool>) {
        let issuer = Arc::new(AccessTokenIssuer::new(
            Arc::new(LocalStorage::new("http://local", "secret")),
            "documents",
        ));
        let analysis = Arc::new(AnalysisAdapter::new(
            Arc::new(StubAnalysisBackend),
            Duration::from_secs(5),
        ));
        let lifecycle = Arc::new(DocumentLifecycle::new(
            Arc::new(InMemoryDocumentStore::default()),
            Arc::new(LoggingNotificationSink),
            issuer,
            analysis,
        ));
        let readiness = Arc::new(AtomicBool::new(ready));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = with_verification_routes(
            lifecycle,
            Arc::new(BackgroundCheckCoordinator::in_memory()),
        )
        .layer(Extension(state));
        (router, readiness)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let (router, _) = app(false);
        let response = router.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_flag() {
        let (router, readiness) = app(false);
        let response = router
            .clone()
            .oneshot(get_request("/ready"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::Release);
        let response = router.oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn workflow_routes_are_mounted() {
        let (router, _) = app(true);

        let response = router
            .clone()
            .oneshot(get_request("/api/v1/owners/U1/documents"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(get_request(
                "/api/v1/background-checks/6f1c2a8e-8a53-4a8e-9d0b-1f2a3b4c5d6e",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_are_rendered_as_text() {
        let (router, _) = app(true);
        let response = router.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
