// src/model.rs
//! Article model: provider-payload normalization, fingerprinting, and the
//! enriched output record served to clients.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A news article as carried through the cache tiers.
///
/// `raw` is the full provider record, kept opaque and unchanged so it can be
/// replayed or re-normalized later. Everything else is derived from it once,
/// at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    /// Dedup key: hex SHA-256 of title + url + raw publish string.
    pub fingerprint: String,
    /// Uppercased ticker this article was fetched for (partition key).
    pub symbol: String,
    pub title: String,
    pub summary: String,
    /// Normalized publish time. `None` means the provider string did not
    /// parse; such articles never enter a recency-windowed view.
    pub published_at: Option<DateTime<Utc>>,
    /// Provider publish string as received.
    pub published_raw: String,
    pub source_name: String,
    pub url: String,
    pub title_cn: Option<String>,
    pub summary_cn: Option<String>,
    /// Full provider record, untouched.
    pub raw: Value,
}

impl Article {
    /// Build an article from one entry of the provider's `articles` array.
    ///
    /// Field fallbacks mirror the provider's two payload generations:
    /// `description` before `content`, `publishedAt` before `published`.
    /// Existing translations in the payload (round-tripped through a cache
    /// tier) are preserved so they are never re-translated.
    pub fn from_provider(raw: &Value, symbol: &str) -> Self {
        let title = str_field(raw, "title");
        let summary_src = {
            let d = str_field(raw, "description");
            if d.is_empty() {
                str_field(raw, "content")
            } else {
                d
            }
        };
        let published_raw = {
            let p = str_field(raw, "publishedAt");
            if p.is_empty() {
                str_field(raw, "published")
            } else {
                p
            }
        };
        let url = str_field(raw, "url");
        let source_name = match raw.get("source") {
            Some(Value::Object(m)) => m
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => "Unknown".to_string(),
        };

        Self {
            fingerprint: fingerprint(&title, &url, &published_raw),
            symbol: symbol.to_ascii_uppercase(),
            summary: normalize_text(&summary_src),
            published_at: parse_published(&published_raw),
            published_raw,
            source_name,
            url,
            title_cn: opt_str_field(raw, "title_cn"),
            summary_cn: opt_str_field(raw, "summary_cn"),
            raw: raw.clone(),
            title,
        }
    }

    /// True if the article has a parseable publish time within the last
    /// `days` days as of `now`. Unparsable timestamps are always out.
    pub fn is_within_days(&self, now: DateTime<Utc>, days: i64) -> bool {
        match self.published_at {
            Some(ts) => now.signed_duration_since(ts) <= chrono::Duration::days(days),
            None => false,
        }
    }

    /// Unix seconds of the publish time, 0 when absent.
    pub fn timestamp(&self) -> i64 {
        self.published_at.map(|t| t.timestamp()).unwrap_or(0)
    }

    /// Apply a translation patch under the monotonic rule: a field is only
    /// written when the incoming value is non-empty and differs from its
    /// source text, so an established translation can be replaced but never
    /// cleared or regressed to the original. The raw payload is kept in sync
    /// so round-tripped records carry their translations.
    ///
    /// Returns true if anything changed.
    pub fn apply_translation_patch(&mut self, title_cn: &str, summary_cn: &str) -> bool {
        let mut changed = false;
        if !title_cn.trim().is_empty()
            && title_cn != self.title
            && self.title_cn.as_deref() != Some(title_cn)
        {
            self.title_cn = Some(title_cn.to_string());
            if let Some(m) = self.raw.as_object_mut() {
                m.insert("title_cn".into(), Value::String(title_cn.to_string()));
            }
            changed = true;
        }
        if !summary_cn.trim().is_empty()
            && summary_cn != self.summary
            && self.summary_cn.as_deref() != Some(summary_cn)
        {
            self.summary_cn = Some(summary_cn.to_string());
            if let Some(m) = self.raw.as_object_mut() {
                m.insert("summary_cn".into(), Value::String(summary_cn.to_string()));
            }
            changed = true;
        }
        changed
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Deterministic dedup key over the fields that identify an article across
/// tiers: title, canonical URL, and the publish string as received.
pub fn fingerprint(title: &str, url: &str, published_raw: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(published_raw.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Parse a provider publish string into UTC. Returns `None` on anything that
/// doesn't parse — the caller must treat that as "no timestamp", never "now".
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // ISO with a numeric offset that rfc3339 rejects (+0000 instead of +00:00)
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // Naive variants, assumed UTC
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// Normalize provider text: decode HTML entities, strip tags, collapse
/// whitespace. Capped at 1500 chars.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// The record served to clients: original fields plus score, matched
/// keywords, and translations. Shape matches the provider-era public API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedArticle {
    pub title: String,
    pub title_cn: String,
    pub summary: String,
    pub summary_cn: String,
    pub timestamp: i64,
    pub original_time: String,
    pub source: String,
    pub link: String,
    pub tickers: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: i32,
    pub keywords: Vec<String>,
}

impl EnrichedArticle {
    pub fn assemble(
        article: &Article,
        title_cn: String,
        summary_cn: String,
        score: i32,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            title: article.title.clone(),
            title_cn,
            summary: article.summary.clone(),
            summary_cn,
            timestamp: article.timestamp(),
            original_time: article.published_raw.clone(),
            source: article.source_name.clone(),
            link: article.url.clone(),
            tickers: vec![article.symbol.clone()],
            kind: "news".to_string(),
            score,
            keywords,
        }
    }
}
