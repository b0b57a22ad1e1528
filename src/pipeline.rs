// src/pipeline.rs
//! Lookup chain: hot cache → warm store → origin, with write-through on the
//! way back up, enrichment (scoring + translation) on the result set, and
//! asynchronous write-back of fresh translations into both tiers.
//!
//! The caller-facing contract is one-directional: reads flow down the
//! tiers, translation patches flow back through a spawned write-back stage,
//! never through a re-entrant lookup.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, warn};

use crate::analyze::KeywordScorer;
use crate::model::{Article, EnrichedArticle};
use crate::origin::{AuthGate, NewsOrigin};
use crate::store::{hot_window, HotCache, WarmStore};
use crate::translate::{usable_translation, DynTranslator};

/// Articles older than this never reach enrichment (and therefore never
/// burn a translation call).
pub const RECENCY_WINDOW_DAYS: i64 = 10;

#[derive(Debug)]
pub enum LookupError {
    /// Auth cooldown is active; no store or origin call was made.
    ServiceUnavailable { retry_secs: i64 },
    /// The origin fetch itself failed — distinct from "no news found".
    Origin(anyhow::Error),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUnavailable { retry_secs } => {
                write!(f, "service unavailable, retry in {retry_secs}s")
            }
            Self::Origin(e) => write!(f, "origin fetch failed: {e}"),
        }
    }
}

impl std::error::Error for LookupError {}

/// A translation destined for both tiers, keyed by fingerprint.
#[derive(Debug, Clone)]
pub struct TranslationPatch {
    pub fingerprint: String,
    pub title_cn: String,
    pub summary_cn: String,
}

pub struct CachePipeline {
    hot: Arc<HotCache>,
    warm: Arc<WarmStore>,
    origin: Arc<dyn NewsOrigin>,
    auth: Arc<dyn AuthGate>,
    scorer: KeywordScorer,
    translator: DynTranslator,
}

impl CachePipeline {
    pub fn new(
        hot: Arc<HotCache>,
        warm: Arc<WarmStore>,
        origin: Arc<dyn NewsOrigin>,
        auth: Arc<dyn AuthGate>,
        translator: DynTranslator,
    ) -> Self {
        Self {
            hot,
            warm,
            origin,
            auth,
            scorer: KeywordScorer::new(),
            translator,
        }
    }

    /// Resolve up to `limit` enriched articles for `symbol`.
    pub async fn lookup(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<EnrichedArticle>, LookupError> {
        let symbol = symbol.to_ascii_uppercase();

        if self.auth.is_in_cooldown() {
            counter!("lookup_cooldown_rejections_total").increment(1);
            return Err(LookupError::ServiceUnavailable {
                retry_secs: self.auth.remaining_cooldown_secs(),
            });
        }

        // 1) Hot tier.
        let hot_hits = self.hot.read_recent(&symbol, limit, hot_window());
        if !hot_hits.is_empty() {
            debug!(%symbol, count = hot_hits.len(), "hot cache hit");
            counter!("lookup_hot_hits_total").increment(1);
            return Ok(self.enrich(hot_hits).await);
        }

        // 2) Warm tier (blocking SQLite work off the scheduler). A storage
        // fault is a miss, never fatal.
        let warm_hits = {
            let warm = self.warm.clone();
            let sym = symbol.clone();
            match tokio::task::spawn_blocking(move || warm.read_by_symbol(&sym, limit)).await {
                Ok(Ok(rows)) => rows,
                Ok(Err(e)) => {
                    warn!(%symbol, error = ?e, "warm read failed, treating as miss");
                    Vec::new()
                }
                Err(e) => {
                    warn!(%symbol, error = ?e, "warm read task failed, treating as miss");
                    Vec::new()
                }
            }
        };
        if !warm_hits.is_empty() {
            debug!(%symbol, count = warm_hits.len(), "warm store hit");
            counter!("lookup_warm_hits_total").increment(1);
            // Best-effort promotion into the hot tier.
            self.hot.upsert_if_absent(&symbol, &warm_hits);
            return Ok(self.enrich(warm_hits).await);
        }

        // 3) Origin.
        let fetched = self
            .origin
            .fetch(&symbol, limit)
            .await
            .map_err(LookupError::Origin)?;
        if fetched.is_empty() {
            debug!(%symbol, "origin returned nothing (true miss)");
            counter!("lookup_misses_total").increment(1);
            return Ok(Vec::new());
        }
        counter!("lookup_origin_hits_total").increment(1);

        self.hot.upsert_if_absent(&symbol, &fetched);
        {
            let warm = self.warm.clone();
            let sym = symbol.clone();
            let articles = fetched.clone();
            let res =
                tokio::task::spawn_blocking(move || warm.upsert_if_absent(&sym, &articles)).await;
            match res {
                Ok(Ok(n)) => debug!(%symbol, inserted = n, "warm write-through"),
                Ok(Err(e)) => warn!(%symbol, error = ?e, "warm write-through failed"),
                Err(e) => warn!(%symbol, error = ?e, "warm write-through task failed"),
            }
        }

        Ok(self.enrich(fetched).await)
    }

    /// Filter pass then enrich pass. Stale and undatable articles are
    /// dropped before any translation runs; fresh translations are queued
    /// for asynchronous write-back into both tiers.
    async fn enrich(&self, articles: Vec<Article>) -> Vec<EnrichedArticle> {
        let now = Utc::now();
        let total = articles.len();
        let fresh: Vec<Article> = articles
            .into_iter()
            .filter(|a| a.is_within_days(now, RECENCY_WINDOW_DAYS))
            .collect();
        if fresh.len() < total {
            debug!(dropped = total - fresh.len(), "filtered stale/undated articles");
        }

        let mut out = Vec::with_capacity(fresh.len());
        let mut patches = Vec::new();

        for a in &fresh {
            let scored = self.scorer.analyze(&a.title, &a.summary);

            let have_title = usable_translation(&a.title, a.title_cn.as_deref());
            let have_summary = usable_translation(&a.summary, a.summary_cn.as_deref());

            let (title_cn, summary_cn) = match (have_title, have_summary) {
                // Both fields already translated: no gateway call at all.
                (Some(t), Some(s)) => (t, s),
                _ => {
                    let (t, s) = self
                        .translator
                        .translate_news(
                            &a.title,
                            &a.summary,
                            a.title_cn.as_deref(),
                            a.summary_cn.as_deref(),
                        )
                        .await;
                    // Only an actual translation (non-empty, differing from
                    // source) is worth patching back.
                    let translated_title = usable_translation(&a.title, Some(t.as_str())).is_some()
                        && a.title_cn.as_deref() != Some(t.as_str());
                    let translated_summary = usable_translation(&a.summary, Some(s.as_str()))
                        .is_some()
                        && a.summary_cn.as_deref() != Some(s.as_str());
                    if translated_title || translated_summary {
                        patches.push(TranslationPatch {
                            fingerprint: a.fingerprint.clone(),
                            title_cn: t.clone(),
                            summary_cn: s.clone(),
                        });
                    }
                    (t, s)
                }
            };

            out.push(EnrichedArticle::assemble(
                a,
                title_cn,
                summary_cn,
                scored.score,
                scored.keywords,
            ));
        }

        if !patches.is_empty() {
            debug!(count = patches.len(), "queueing translation write-back");
            let hot = self.hot.clone();
            let warm = self.warm.clone();
            tokio::spawn(async move {
                apply_write_backs(hot, warm, patches).await;
            });
        }

        out
    }
}

/// Write-back stage: patch fresh translations into both tiers. Failures are
/// logged and swallowed — the enrichment already succeeded in memory and
/// was returned to the caller.
pub async fn apply_write_backs(
    hot: Arc<HotCache>,
    warm: Arc<WarmStore>,
    patches: Vec<TranslationPatch>,
) {
    for p in patches {
        hot.patch_translation(&p.fingerprint, &p.title_cn, &p.summary_cn);

        let warm = warm.clone();
        let patch = p.clone();
        let res = tokio::task::spawn_blocking(move || {
            warm.patch_translation(&patch.fingerprint, &patch.title_cn, &patch.summary_cn)
        })
        .await;
        match res {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                counter!("write_back_failures_total").increment(1);
                warn!(fingerprint = %p.fingerprint, error = ?e, "warm write-back failed");
            }
            Err(e) => {
                counter!("write_back_failures_total").increment(1);
                warn!(fingerprint = %p.fingerprint, error = ?e, "write-back task failed");
            }
        }
    }
}
