use crate::cli::ServeArgs;
use crate::infra::{context, open_store, AppState, Backend};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use opportunity_ranker::buildings::{opportunity_router, BuildingStore};
use opportunity_ranker::config::AppConfig;
use opportunity_ranker::error::AppError;
use opportunity_ranker::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
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

    let backend = open_store(&config.database).await?;
    info!(store = backend.label(), "building store ready");
    match backend {
        Backend::Postgres(store) => serve(config, store).await,
        Backend::Memory(store) => serve(config, store).await,
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: BuildingStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let context = context(store, &config);
    let policy = context.rescorer().policy();

    let app = with_operational_routes(opportunity_router(context))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        rescore_policy = policy.label(),
        "opportunity ranker ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
