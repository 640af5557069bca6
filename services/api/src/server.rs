use crate::cli::ServeArgs;
use crate::infra::{load_store, AppState};
use crate::routes::with_linkage_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rent_linkage::config::AppConfig;
use rent_linkage::error::AppError;
use rent_linkage::linkage::{ProjectionAggregator, ProjectionSettings};
use rent_linkage::telemetry;
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
    if let Some(data) = args.data.take() {
        config.engine.index_data_path = Some(data);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    telemetry::describe_metrics();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = load_store(config.engine.index_data_path.as_deref())?;
    let aggregator = Arc::new(
        ProjectionAggregator::new(Arc::new(store))
            .with_settings(ProjectionSettings::from(&config.engine)),
    );

    let app = with_linkage_routes(aggregator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        publication_day = config.engine.publication_day,
        "rent linkage service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
