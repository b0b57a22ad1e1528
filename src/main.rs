//! Symbol News Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the cache tiers, auth, origin client,
//! enrichment, and the worker pool.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use symbol_news_service::api::{create_router, AppState};
use symbol_news_service::config::ServiceConfig;
use symbol_news_service::metrics::Metrics;
use symbol_news_service::origin::{AuthGate, AuthManager, NewsOrigin, OriginFetcher};
use symbol_news_service::pipeline::CachePipeline;
use symbol_news_service::store::{self, HotCache, WarmStore};
use symbol_news_service::translate::build_translator;
use symbol_news_service::worker::WorkerPool;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("symbol_news_service=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ServiceConfig::from_env()?;
    let metrics = Metrics::init();

    let warm = Arc::new(WarmStore::open(&cfg.warm_db_path)?);
    let hot = Arc::new(HotCache::new());
    let auth = Arc::new(AuthManager::new(cfg.auth_config(), warm.clone()));
    let gate: Arc<dyn AuthGate> = auth.clone();
    let origin: Arc<dyn NewsOrigin> =
        Arc::new(OriginFetcher::new(cfg.api_url.clone(), gate.clone()));
    let translator = build_translator(cfg.openai_api_key.clone());

    let pipeline = Arc::new(CachePipeline::new(
        hot.clone(),
        warm.clone(),
        origin,
        gate,
        translator,
    ));
    let pool = Arc::new(WorkerPool::start(
        pipeline,
        cfg.worker_count,
        cfg.submit_timeout,
    ));

    store::spawn_hot_sweep(hot.clone());
    store::spawn_warm_purge(warm.clone(), cfg.retention_days);

    let state = AppState {
        pool,
        auth,
        hot,
        warm,
    };
    let router = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, workers = cfg.worker_count, "symbol news service listening");
    axum::serve(listener, router).await?;
    Ok(())
}
