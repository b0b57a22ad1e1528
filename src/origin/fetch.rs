// src/origin/fetch.rs
//! Provider client. One POST per lookup, spaced at least 500 ms apart so a
//! burst of cache misses cannot trip the provider's rate limiter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use metrics::counter;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{auth::AuthGate, NewsOrigin};
use crate::model::Article;

/// Minimum spacing between outbound provider calls.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
/// Pause before the narrowed retry after an empty result.
const RETRY_PAUSE: Duration = Duration::from_secs(1);
/// Provider page size; the caller's `limit` truncates afterwards.
const PAGE_SIZE: usize = 50;

pub struct OriginFetcher {
    http: reqwest::Client,
    api_url: String,
    auth: Arc<dyn AuthGate>,
    /// Next instant an outbound call is allowed.
    next_allowed: tokio::sync::Mutex<Instant>,
}

impl OriginFetcher {
    pub fn new(api_url: String, auth: Arc<dyn AuthGate>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_url,
            auth,
            next_allowed: tokio::sync::Mutex::new(Instant::now()),
        }
    }

    /// Wait until the spacing window allows another call.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + MIN_REQUEST_INTERVAL;
    }

    /// One provider POST. `Ok(None)` = soft denial (rate limit / stale
    /// token), `Ok(Some(..))` = the `articles` array, `Err` = the fetch
    /// itself failed.
    async fn post_articles(
        &self,
        headers: &HeaderMap,
        query: &str,
    ) -> Result<Option<Vec<Value>>> {
        let payload = json!({
            "type": "filterArticles",
            "isPublic": false,
            "queryString": query,
            "from": 0,
            "size": PAGE_SIZE,
        });

        let resp = self
            .http
            .post(&self.api_url)
            .headers(headers.clone())
            .json(&payload)
            .send()
            .await
            .context("provider request failed")?;

        match resp.status() {
            StatusCode::OK => {
                let body: Value = resp.json().await.context("provider body did not parse")?;
                let articles = body
                    .get("articles")
                    .and_then(Value::as_array)
                    .cloned()
                    .context("provider body carried no articles array")?;
                Ok(Some(articles))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("provider rate limited the call");
                counter!("origin_rate_limited_total").increment(1);
                Ok(None)
            }
            StatusCode::UNAUTHORIZED => {
                // Token refresh is an explicit upstream operation, not an
                // inline retry.
                warn!("provider rejected the token");
                counter!("origin_unauthorized_total").increment(1);
                Ok(None)
            }
            other => anyhow::bail!("provider returned {other}"),
        }
    }
}

#[async_trait::async_trait]
impl NewsOrigin for OriginFetcher {
    async fn fetch(&self, symbol: &str, limit: usize) -> Result<Vec<Article>> {
        let symbol = symbol.to_ascii_uppercase();

        if self.auth.is_in_cooldown() {
            debug!(%symbol, "origin skipped: auth cooldown");
            return Ok(Vec::new());
        }
        let Some(headers) = self.auth.auth_headers().await else {
            warn!(%symbol, "origin skipped: no auth headers");
            return Ok(Vec::new());
        };

        self.rate_limit_wait().await;
        counter!("origin_fetch_total").increment(1);

        // Full-text query first; it can over-constrain, so an empty result
        // gets one retry with the bare symbol.
        let query = format!(r#"title:"{symbol}" OR description:"{symbol}" OR symbols:"{symbol}""#);
        let mut articles = match self.post_articles(&headers, &query).await {
            Ok(Some(a)) => a,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                counter!("origin_errors_total").increment(1);
                return Err(e);
            }
        };

        if articles.is_empty() {
            debug!(%symbol, "empty result, retrying with narrowed query");
            tokio::time::sleep(RETRY_PAUSE).await;
            articles = match self.post_articles(&headers, &symbol).await {
                Ok(Some(a)) => a,
                Ok(None) => return Ok(Vec::new()),
                Err(e) => {
                    counter!("origin_errors_total").increment(1);
                    return Err(e);
                }
            };
        }

        let out: Vec<Article> = articles
            .iter()
            .take(limit)
            .map(|raw| Article::from_provider(raw, &symbol))
            .collect();
        debug!(%symbol, count = out.len(), "origin fetch complete");
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "newsfilter"
    }
}
