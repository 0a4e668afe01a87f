use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryDocumentStore, LocalStorage, LoggingNotificationSink, StubAnalysisBackend,
};
use crate::routes::with_verification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use docverify::config::AppConfig;
use docverify::error::AppError;
use docverify::telemetry;
use docverify::workflows::verification::{
    AccessTokenIssuer, AnalysisAdapter, BackgroundCheckCoordinator, DocumentLifecycle,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let storage = Arc::new(
        LocalStorage::new(&config.storage.base_url, &config.storage.signing_key)
            .accepting_signed_uploads(),
    );
    let issuer = Arc::new(AccessTokenIssuer::new(
        storage,
        config.storage.container.clone(),
    ));
    let analysis = Arc::new(AnalysisAdapter::new(
        Arc::new(StubAnalysisBackend),
        config.analysis.timeout,
    ));
    let lifecycle = Arc::new(
        DocumentLifecycle::new(
            Arc::new(InMemoryDocumentStore::default()),
            Arc::new(LoggingNotificationSink),
            issuer.clone(),
            analysis,
        )
        .with_upload_policy(config.upload.clone()),
    );
    let background_checks = Arc::new(BackgroundCheckCoordinator::in_memory());

    let app = with_verification_routes(lifecycle, background_checks)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    issuer.ensure_container().await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        container = %config.storage.container,
        "document verification service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
