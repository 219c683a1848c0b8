use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_compliance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use casework::config::{AppConfig, StorageConfig};
use casework::error::AppError;
use casework::telemetry;
use casework::workflows::cases::compliance::{
    ComplianceService, InMemoryCaseDirectory, InMemoryComplianceStore, SqliteComplianceStore,
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

    // Case records come from the case-tracking system; this process only mirrors them.
    let cases = Arc::new(InMemoryCaseDirectory::default());
    let routes = match &config.storage {
        StorageConfig::Memory => {
            info!("using in-memory compliance store");
            let store = Arc::new(InMemoryComplianceStore::default());
            with_compliance_routes(Arc::new(ComplianceService::new(store, cases)))
        }
        StorageConfig::Sqlite { path } => {
            info!(path = %path.display(), "opening sqlite compliance store");
            let store = Arc::new(SqliteComplianceStore::open(path)?);
            with_compliance_routes(Arc::new(ComplianceService::new(store, cases)))
        }
    };

    let app = routes
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "casework compliance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
