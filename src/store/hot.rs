// src/store/hot.rs
//! Hot tier: fingerprint-keyed in-memory cache with a 1-hour read window.
//!
//! Retention runs off the request path. An entry past the 1-hour window is
//! evicted unless its symbol still has an entry inside the window (the
//! symbol is "active"), in which case eviction defers to the 24-hour
//! boundary. Active tickers stay warm, cold ones are dropped early.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::model::Article;

/// Read window in seconds: entries older than this are invisible to
/// `read_recent`.
pub const HOT_WINDOW_SECS: i64 = 3600;
/// Hard retention bound in seconds for entries of active symbols.
const HOT_RETENTION_MAX_SECS: i64 = 24 * 3600;

/// The fixed read window as a `Duration`.
pub fn hot_window() -> Duration {
    Duration::seconds(HOT_WINDOW_SECS)
}

struct HotEntry {
    article: Article,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct HotCache {
    inner: RwLock<HashMap<String, HotEntry>>,
}

impl HotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert articles whose fingerprint is not yet present. Existing
    /// entries are never overwritten (only `patch_translation` may touch
    /// them). Returns the number inserted.
    pub fn upsert_if_absent(&self, symbol: &str, articles: &[Article]) -> usize {
        self.upsert_if_absent_at(Utc::now(), symbol, articles)
    }

    pub(crate) fn upsert_if_absent_at(
        &self,
        now: DateTime<Utc>,
        symbol: &str,
        articles: &[Article],
    ) -> usize {
        let symbol = symbol.to_ascii_uppercase();
        let mut g = self.inner.write();
        let mut inserted = 0;
        for a in articles {
            if g.contains_key(&a.fingerprint) {
                continue;
            }
            let mut article = a.clone();
            article.symbol = symbol.clone();
            g.insert(
                a.fingerprint.clone(),
                HotEntry {
                    article,
                    inserted_at: now,
                },
            );
            inserted += 1;
        }
        inserted
    }

    /// Entries for `symbol` inserted within `max_age`, newest insertion
    /// first, at most `limit`.
    pub fn read_recent(&self, symbol: &str, limit: usize, max_age: Duration) -> Vec<Article> {
        self.read_recent_at(Utc::now(), symbol, limit, max_age)
    }

    pub(crate) fn read_recent_at(
        &self,
        now: DateTime<Utc>,
        symbol: &str,
        limit: usize,
        max_age: Duration,
    ) -> Vec<Article> {
        let symbol = symbol.to_ascii_uppercase();
        let g = self.inner.read();
        let mut hits: Vec<(&DateTime<Utc>, &Article)> = g
            .values()
            .filter(|e| {
                e.article.symbol == symbol && now.signed_duration_since(e.inserted_at) <= max_age
            })
            .map(|e| (&e.inserted_at, &e.article))
            .collect();
        hits.sort_by(|a, b| b.0.cmp(a.0));
        hits.into_iter()
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// Monotonic translation patch by fingerprint. Returns true if the entry
    /// exists and anything changed.
    pub fn patch_translation(&self, fingerprint: &str, title_cn: &str, summary_cn: &str) -> bool {
        let mut g = self.inner.write();
        match g.get_mut(fingerprint) {
            Some(e) => e.article.apply_translation_patch(title_cn, summary_cn),
            None => false,
        }
    }

    /// Retention sweep. Returns the number of evicted entries.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut g = self.inner.write();

        let active: HashSet<String> = g
            .values()
            .filter(|e| now.signed_duration_since(e.inserted_at) <= hot_window())
            .map(|e| e.article.symbol.clone())
            .collect();

        let before = g.len();
        g.retain(|_, e| {
            let age = now.signed_duration_since(e.inserted_at);
            if age <= hot_window() {
                return true;
            }
            age <= Duration::seconds(HOT_RETENTION_MAX_SECS) && active.contains(&e.article.symbol)
        });
        before - g.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Per-symbol entry counts inside the read window (for /stats).
    pub fn window_counts(&self) -> HashMap<String, usize> {
        let now = Utc::now();
        let g = self.inner.read();
        let mut out: HashMap<String, usize> = HashMap::new();
        for e in g.values() {
            if now.signed_duration_since(e.inserted_at) <= hot_window() {
                *out.entry(e.article.symbol.clone()).or_insert(0) += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn article(fp: &str, symbol: &str) -> Article {
        Article {
            fingerprint: fp.to_string(),
            symbol: symbol.to_string(),
            title: format!("title {fp}"),
            summary: format!("summary {fp}"),
            published_at: Some(Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()),
            published_raw: "2026-08-01T12:00:00Z".into(),
            source_name: "Newswire".into(),
            url: format!("https://example.com/{fp}"),
            title_cn: None,
            summary_cn: None,
            raw: json!({}),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let c = HotCache::new();
        let a = article("f1", "TSLA");
        assert_eq!(c.upsert_if_absent_at(t0(), "TSLA", &[a.clone()]), 1);
        assert_eq!(c.upsert_if_absent_at(t0(), "TSLA", &[a]), 0);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn read_respects_window_and_limit() {
        let c = HotCache::new();
        c.upsert_if_absent_at(t0(), "TSLA", &[article("f1", "TSLA")]);
        c.upsert_if_absent_at(t0() + Duration::minutes(30), "TSLA", &[article("f2", "TSLA")]);
        // f1 is 70 minutes old at read time, f2 is 40 minutes old
        let now = t0() + Duration::minutes(70);
        let hits = c.read_recent_at(now, "tsla", 10, hot_window());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fingerprint, "f2");

        // limit applies after the window filter
        c.upsert_if_absent_at(now, "TSLA", &[article("f3", "TSLA")]);
        let hits = c.read_recent_at(now, "TSLA", 1, hot_window());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fingerprint, "f3");
    }

    #[test]
    fn reads_are_partitioned_by_symbol() {
        let c = HotCache::new();
        c.upsert_if_absent_at(t0(), "TSLA", &[article("f1", "TSLA")]);
        c.upsert_if_absent_at(t0(), "AAPL", &[article("f2", "AAPL")]);
        let hits = c.read_recent_at(t0(), "TSLA", 10, hot_window());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "TSLA");
    }

    #[test]
    fn patch_translation_is_monotonic() {
        let c = HotCache::new();
        let a = article("f1", "TSLA");
        let title = a.title.clone();
        c.upsert_if_absent_at(t0(), "TSLA", &[a]);

        assert!(c.patch_translation("f1", "標題", "摘要"));
        // Empty and source-echo writes must not regress the translation.
        assert!(!c.patch_translation("f1", "", ""));
        assert!(!c.patch_translation("f1", &title, ""));
        let got = &c.read_recent_at(t0(), "TSLA", 10, hot_window())[0];
        assert_eq!(got.title_cn.as_deref(), Some("標題"));
        assert_eq!(got.summary_cn.as_deref(), Some("摘要"));

        // Unknown fingerprint is a no-op.
        assert!(!c.patch_translation("missing", "x", "y"));
    }

    #[test]
    fn sweep_keeps_active_symbols_until_24h() {
        let c = HotCache::new();
        // TSLA: old entry + one inside the window → old entry deferred.
        c.upsert_if_absent_at(t0(), "TSLA", &[article("f1", "TSLA")]);
        // AAPL: only an old entry → evicted past the window.
        c.upsert_if_absent_at(t0(), "AAPL", &[article("f2", "AAPL")]);

        let later = t0() + Duration::hours(3);
        c.upsert_if_absent_at(later, "TSLA", &[article("f3", "TSLA")]);

        assert_eq!(c.sweep(later), 1); // only AAPL's entry goes
        assert_eq!(c.len(), 2);

        // Past the 24-hour boundary everything stale goes regardless.
        let day_later = t0() + Duration::hours(25);
        assert_eq!(c.sweep(day_later), 2);
        assert!(c.is_empty());
    }
}
