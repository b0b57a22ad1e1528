use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::origin::AuthManager;
use crate::store::{HotCache, WarmStore};
use crate::worker::{ServiceReply, WorkerPool};

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub auth: Arc<AuthManager>,
    pub hot: Arc<HotCache>,
    pub warm: Arc<WarmStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news/{symbol}", get(get_news))
        .route("/stats", get(stats))
        .route("/admin/refresh-token", post(refresh_token))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct NewsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

/// Errors never cross this boundary as exceptions: degraded outcomes come
/// back as a one-element `msg` list with the matching status code.
async fn get_news(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<NewsQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    let limit = q.limit.unwrap_or(10).clamp(1, 50);
    let reply = state.pool.submit(&symbol, limit).await;
    let status = match &reply {
        ServiceReply::Articles(_) => StatusCode::OK,
        ServiceReply::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServiceReply::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(reply.body_json()))
}

#[derive(serde::Serialize)]
struct StatsResp {
    auth: crate::origin::AuthStatus,
    hot_entries: usize,
    hot_window_symbols: HashMap<String, usize>,
    warm: Option<crate::store::WarmStats>,
    service_status: &'static str,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    let warm = state.warm.clone();
    let warm_stats = tokio::task::spawn_blocking(move || warm.stats().ok())
        .await
        .ok()
        .flatten();

    Json(StatsResp {
        auth: state.auth.status(),
        hot_entries: state.hot.len(),
        hot_window_symbols: state.hot.window_counts(),
        warm: warm_stats,
        service_status: "running",
    })
}

#[derive(serde::Serialize)]
struct RefreshResp {
    success: bool,
}

/// Operator recovery: re-enter the login path regardless of auth state.
async fn refresh_token(State(state): State<AppState>) -> Json<RefreshResp> {
    let success = state.auth.force_refresh().await;
    Json(RefreshResp { success })
}
