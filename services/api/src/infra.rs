use metrics_exporter_prometheus::PrometheusHandle;
use opportunity_ranker::buildings::{
    BuildingStore, MemoryBuildingStore, OpportunityContext, OpportunityScorer, PgBuildingStore,
    SeededSaleActivity,
};
use opportunity_ranker::config::{AppConfig, DatabaseConfig, ScoringConfig};
use opportunity_ranker::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store selected from the database settings.
pub(crate) enum Backend {
    Postgres(Arc<PgBuildingStore>),
    Memory(Arc<MemoryBuildingStore>),
}

impl Backend {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => "postgres",
            Backend::Memory(_) => "memory",
        }
    }
}

pub(crate) async fn open_store(config: &DatabaseConfig) -> Result<Backend, AppError> {
    match config.url.as_deref() {
        Some(url) => {
            let store = PgBuildingStore::connect(url, config.max_connections).await?;
            store.ensure_schema().await?;
            info!(max_connections = config.max_connections, "connected to postgres");
            Ok(Backend::Postgres(Arc::new(store)))
        }
        None => {
            warn!("DATABASE_URL not set; using an empty in-memory store");
            Ok(Backend::Memory(Arc::new(MemoryBuildingStore::default())))
        }
    }
}

pub(crate) fn sale_activity(config: &ScoringConfig) -> SeededSaleActivity {
    match config.sale_activity_seed {
        Some(seed) => SeededSaleActivity::from_seed(seed),
        None => SeededSaleActivity::from_entropy(),
    }
}

pub(crate) fn scorer(config: &ScoringConfig) -> OpportunityScorer {
    config
        .reference_year
        .map(OpportunityScorer::new)
        .unwrap_or_else(OpportunityScorer::current)
}

pub(crate) fn context<S>(
    store: Arc<S>,
    config: &AppConfig,
) -> OpportunityContext<S, SeededSaleActivity>
where
    S: BuildingStore + 'static,
{
    OpportunityContext::new(
        store,
        Arc::new(sale_activity(&config.scoring)),
        scorer(&config.scoring),
    )
    .with_failure_policy(config.scoring.failure_policy)
}
