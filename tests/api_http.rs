// tests/api_http.rs
//! In-process router tests: status-code mapping for degraded replies and
//! the happy path over a seeded hot cache.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt; // for oneshot

use common::{article, MockOrigin};
use symbol_news_service::api::{create_router, AppState};
use symbol_news_service::origin::auth::{AuthConfig, AuthManager, STATUS_LOGIN_FAILURE};
use symbol_news_service::origin::AuthGate;
use symbol_news_service::pipeline::CachePipeline;
use symbol_news_service::store::{HotCache, WarmStore};
use symbol_news_service::translate::FixedTranslator;
use symbol_news_service::worker::WorkerPool;

struct App {
    router: Router,
    hot: Arc<HotCache>,
    warm: Arc<WarmStore>,
    origin: Arc<MockOrigin>,
}

/// Full wiring over an in-memory warm store, a scripted origin, and a real
/// AuthManager pointed at unreachable endpoints (its stored state still
/// drives the cooldown gate).
fn build_app(origin_articles: Vec<symbol_news_service::model::Article>) -> App {
    let hot = Arc::new(HotCache::new());
    let warm = Arc::new(WarmStore::open_in_memory().expect("warm store"));
    let auth = Arc::new(AuthManager::new(
        AuthConfig {
            auth_url: "http://127.0.0.1:9/authenticate".into(),
            username: "user".into(),
            password: "pass".into(),
            client_id: "client".into(),
        },
        warm.clone(),
    ));
    let origin = MockOrigin::new(origin_articles);
    let gate: Arc<dyn AuthGate> = auth.clone();
    let pipeline = Arc::new(CachePipeline::new(
        hot.clone(),
        warm.clone(),
        origin.clone(),
        gate,
        Arc::new(FixedTranslator { prefix: "CN:" }),
    ));
    let pool = Arc::new(WorkerPool::start(pipeline, 2, Duration::from_secs(5)));

    let state = AppState {
        pool,
        auth,
        hot: hot.clone(),
        warm: warm.clone(),
    };
    App {
        router: create_router(state),
        hot,
        warm,
        origin,
    }
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .expect("router response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let app = build_app(vec![]);
    let resp = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn news_serves_the_hot_cache() {
    let app = build_app(vec![]);
    app.hot.upsert_if_absent("TSLA", &[article("h1", "TSLA", 1)]);

    let (status, body) = get_json(&app.router, "/news/TSLA?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().expect("array body");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Title h1");
    assert_eq!(items[0]["tickers"], serde_json::json!(["TSLA"]));
    assert!(items[0]["score"].as_i64().is_some());
    assert_eq!(app.origin.call_count(), 0);
}

#[tokio::test]
async fn cooldown_maps_to_503_with_the_msg_body() {
    let app = build_app(vec![article("o1", "AAPL", 1)]);
    app.warm
        .set_status(STATUS_LOGIN_FAILURE, &chrono::Utc::now().to_rfc3339())
        .unwrap();

    let (status, body) = get_json(&app.router, "/news/AAPL").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, serde_json::json!([{ "msg": "NewsFilter Fail" }]));
    assert_eq!(app.origin.call_count(), 0);
}

#[tokio::test]
async fn empty_results_are_a_200_with_an_empty_list() {
    let app = build_app(vec![]);
    let (status, body) = get_json(&app.router, "/news/TSLA").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
    assert_eq!(app.origin.call_count(), 1);
}

#[tokio::test]
async fn stats_reports_the_wiring() {
    let app = build_app(vec![]);
    app.hot.upsert_if_absent("TSLA", &[article("h1", "TSLA", 1)]);

    let (status, body) = get_json(&app.router, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_status"], "running");
    assert_eq!(body["hot_entries"], 1);
    assert_eq!(body["auth"]["phase"], "no_token");
    assert_eq!(body["warm"]["total_articles"], 0);
}
