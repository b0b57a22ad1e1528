// tests/common/mod.rs
//! Shared fixtures: a scripted origin, a stub auth gate, and article
//! builders. Each integration suite wires these into a real CachePipeline
//! over an in-memory warm store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde_json::json;

use symbol_news_service::model::Article;
use symbol_news_service::origin::{AuthGate, NewsOrigin};
use symbol_news_service::pipeline::CachePipeline;
use symbol_news_service::store::{HotCache, WarmStore};
use symbol_news_service::translate::FixedTranslator;

/// Provider-shaped JSON for one article, published `age_days` ago.
pub fn provider_json(id: &str, age_days: i64) -> serde_json::Value {
    let published = (Utc::now() - chrono::Duration::days(age_days)).to_rfc3339();
    json!({
        "title": format!("Title {id}"),
        "description": format!("Summary {id}"),
        "publishedAt": published,
        "url": format!("https://example.com/{id}"),
        "source": {"name": "Newswire"}
    })
}

/// Provider-shaped JSON whose publish string does not parse.
pub fn provider_json_undated(id: &str) -> serde_json::Value {
    json!({
        "title": format!("Title {id}"),
        "description": format!("Summary {id}"),
        "publishedAt": "sometime last week",
        "url": format!("https://example.com/{id}"),
        "source": {"name": "Newswire"}
    })
}

pub fn article(id: &str, symbol: &str, age_days: i64) -> Article {
    Article::from_provider(&provider_json(id, age_days), symbol)
}

pub fn article_undated(id: &str, symbol: &str) -> Article {
    Article::from_provider(&provider_json_undated(id), symbol)
}

/// Auth gate stub: cooldown is a flag, headers are always available.
pub struct StubGate {
    pub cooldown: AtomicBool,
}

impl StubGate {
    pub fn new(cooldown: bool) -> Arc<Self> {
        Arc::new(Self {
            cooldown: AtomicBool::new(cooldown),
        })
    }
}

#[async_trait::async_trait]
impl AuthGate for StubGate {
    fn is_in_cooldown(&self) -> bool {
        self.cooldown.load(Ordering::Acquire)
    }

    fn remaining_cooldown_secs(&self) -> i64 {
        if self.is_in_cooldown() {
            900
        } else {
            0
        }
    }

    async fn auth_headers(&self) -> Option<HeaderMap> {
        Some(HeaderMap::new())
    }
}

/// Scripted origin: serves a fixed article list, counts calls, tracks
/// in-flight concurrency, and can be told to sleep or fail.
pub struct MockOrigin {
    articles: parking_lot::Mutex<Vec<Article>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockOrigin {
    pub fn new(articles: Vec<Article>) -> Arc<Self> {
        Self::with_delay(articles, Duration::ZERO)
    }

    pub fn with_delay(articles: Vec<Article>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            articles: parking_lot::Mutex::new(articles),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl NewsOrigin for MockOrigin {
    async fn fetch(&self, symbol: &str, limit: usize) -> Result<Vec<Article>> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let now_active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_active.fetch_max(now_active, Ordering::AcqRel);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::AcqRel);

        if self.fail.load(Ordering::Acquire) {
            anyhow::bail!("provider unreachable (scripted)");
        }

        let out: Vec<Article> = self
            .articles
            .lock()
            .iter()
            .take(limit)
            .map(|a| {
                let mut a = a.clone();
                a.symbol = symbol.to_ascii_uppercase();
                a
            })
            .collect();
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct TestRig {
    pub hot: Arc<HotCache>,
    pub warm: Arc<WarmStore>,
    pub origin: Arc<MockOrigin>,
    pub gate: Arc<StubGate>,
    pub pipeline: Arc<CachePipeline>,
}

/// A pipeline over empty tiers and the given scripted origin articles.
pub fn rig(origin_articles: Vec<Article>) -> TestRig {
    rig_with(MockOrigin::new(origin_articles), StubGate::new(false))
}

pub fn rig_with(origin: Arc<MockOrigin>, gate: Arc<StubGate>) -> TestRig {
    let hot = Arc::new(HotCache::new());
    let warm = Arc::new(WarmStore::open_in_memory().expect("in-memory warm store"));
    let pipeline = Arc::new(CachePipeline::new(
        hot.clone(),
        warm.clone(),
        origin.clone(),
        gate.clone(),
        Arc::new(FixedTranslator { prefix: "CN:" }),
    ));
    TestRig {
        hot,
        warm,
        origin,
        gate,
        pipeline,
    }
}

/// Poll until `check` passes or ~2 seconds elapse. For asserting on the
/// asynchronous translation write-back.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
