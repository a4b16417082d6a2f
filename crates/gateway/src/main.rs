//! CiteTree API Gateway
//!
//! The HTTP entry point for citation tree requests.
//! Handles:
//! - Root lookup by DOI, ArXiv id or keyword query
//! - Citation tree expansion
//! - Health and readiness checks
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{routing::get, Router};
use citetree_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, UPSTREAM_BUCKETS},
    scholar::SemanticScholarClient,
    MetadataFetcher, PublicationStore,
};
use citetree_engine::{BuilderConfig, CitationTreeBuilder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn PublicationStore>,
    pub fetcher: Arc<dyn MetadataFetcher>,
    pub builder: Arc<CitationTreeBuilder>,
    /// Cancelled on shutdown; every build runs on a child of this token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn PublicationStore>,
        fetcher: Arc<dyn MetadataFetcher>,
        shutdown: CancellationToken,
    ) -> Self {
        let builder = CitationTreeBuilder::new(
            store.clone(),
            fetcher.clone(),
            BuilderConfig::from(&config.tree),
        );

        Self {
            config,
            store,
            fetcher,
            builder: Arc::new(builder),
            shutdown,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load()?);
    init_tracing(&config.observability);

    info!("Starting CiteTree API Gateway v{}", citetree_common::VERSION);

    if config.observability.metrics_port != 0 {
        metrics_builder(&config.observability)?.install()?;
        info!(
            port = config.observability.metrics_port,
            service = %config.observability.service_name,
            "Prometheus exporter listening"
        );
    }
    metrics::register_metrics();

    info!("Connecting to database...");
    let pool = DbPool::new(&config.database).await?;
    pool.ensure_schema().await?;
    let store: Arc<dyn PublicationStore> = Arc::new(Repository::new(pool));

    let fetcher: Arc<dyn MetadataFetcher> = Arc::new(SemanticScholarClient::new(&config.scholar)?);

    let shutdown = CancellationToken::new();
    let state = AppState::new(config.clone(), store, fetcher, shutdown.clone());
    info!(
        workers = state.builder.workers(),
        max_depth_limit = config.tree.max_depth_limit,
        "Tree builder ready"
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Prometheus exporter settings; every series carries the `service` label
fn metrics_builder(config: &ObservabilityConfig) -> anyhow::Result<PrometheusBuilder> {
    let builder = PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_tree_build_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_upstream_duration_seconds", METRICS_PREFIX)),
            UPSTREAM_BUCKETS,
        )?;
    Ok(builder)
}

/// Create the main application router
pub(crate) fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    let api_routes = Router::new().route("/paper", get(handlers::papers::get_paper_tree));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
///
/// Cancels `shutdown` once a signal arrives so in-flight builds stop
/// expanding and return what they have.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    shutdown.cancel();
}
