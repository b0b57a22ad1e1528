// src/store/warm.rs
//! Warm tier: SQLite-backed durable store. Holds the article archive (global
//! fingerprint dedup index), the auth-token rows, and the system-status
//! key/value table used for the login-failure cooldown marker.
//!
//! Every caller treats a read error as a miss and a write error as
//! log-and-continue; this tier is a best-effort accelerator plus the
//! system's only durable state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::model::Article;

/// Default purge horizon for archived articles.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WarmStats {
    pub total_articles: i64,
    pub active_tokens: i64,
}

pub struct WarmStore {
    conn: Mutex<Connection>,
}

impl WarmStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open warm store at {}", path.display()))?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "warm store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory warm store")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("warm store pragmas")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS news_articles (
                fingerprint   TEXT PRIMARY KEY,
                symbol        TEXT NOT NULL,
                title         TEXT NOT NULL,
                url           TEXT NOT NULL,
                summary       TEXT NOT NULL,
                published_raw TEXT NOT NULL,
                published_at  INTEGER,
                source_name   TEXT NOT NULL,
                title_cn      TEXT,
                summary_cn    TEXT,
                raw_json      TEXT NOT NULL,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_news_symbol_published
                ON news_articles(symbol, published_at DESC);

            CREATE TABLE IF NOT EXISTS auth_tokens (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                access_token TEXT NOT NULL,
                expires_at   INTEGER NOT NULL,
                created_at   INTEGER NOT NULL,
                is_active    INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_tokens_active
                ON auth_tokens(is_active, expires_at);

            CREATE TABLE IF NOT EXISTS system_status (
                status_key   TEXT PRIMARY KEY,
                status_value TEXT NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .context("warm store schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert articles whose fingerprint is not yet stored; duplicates are
    /// silently skipped. A bad single article is logged and skipped, never
    /// fails the batch. Returns the number inserted.
    pub fn upsert_if_absent(&self, symbol: &str, articles: &[Article]) -> Result<usize> {
        let symbol = symbol.to_ascii_uppercase();
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        let mut inserted = 0;
        for a in articles {
            let raw_json = serde_json::to_string(&a.raw).unwrap_or_else(|_| "{}".to_string());
            let res = conn.execute(
                "INSERT OR IGNORE INTO news_articles
                 (fingerprint, symbol, title, url, summary, published_raw,
                  published_at, source_name, title_cn, summary_cn, raw_json,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                params![
                    a.fingerprint,
                    symbol,
                    a.title,
                    a.url,
                    a.summary,
                    a.published_raw,
                    a.published_at.map(|t| t.timestamp()),
                    a.source_name,
                    a.title_cn,
                    a.summary_cn,
                    raw_json,
                    now,
                ],
            );
            match res {
                Ok(n) => inserted += n,
                Err(e) => warn!(error = %e, fingerprint = %a.fingerprint, "warm insert failed"),
            }
        }
        Ok(inserted)
    }

    /// Articles for `symbol` ordered by publish time descending, articles
    /// without a parseable publish time last.
    pub fn read_by_symbol(&self, symbol: &str, limit: usize) -> Result<Vec<Article>> {
        let symbol = symbol.to_ascii_uppercase();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT fingerprint, symbol, title, url, summary, published_raw,
                    published_at, source_name, title_cn, summary_cn, raw_json
             FROM news_articles
             WHERE symbol = ?1
             ORDER BY published_at IS NULL, published_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![symbol, limit as i64], row_to_article)?;

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok(a) => out.push(a),
                Err(e) => warn!(error = %e, "warm row decode failed"),
            }
        }
        Ok(out)
    }

    /// Monotonic translation patch, authoritative across restarts. Returns
    /// true if the row exists and anything changed.
    pub fn patch_translation(
        &self,
        fingerprint: &str,
        title_cn: &str,
        summary_cn: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let row: Option<(String, String, Option<String>, Option<String>, String)> = conn
            .query_row(
                "SELECT title, summary, title_cn, summary_cn, raw_json
                 FROM news_articles WHERE fingerprint = ?1",
                params![fingerprint],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, summary, cur_title_cn, cur_summary_cn, raw_json)) = row else {
            return Ok(false);
        };

        // Reuse the in-memory monotonic rule on a scratch article so the
        // stored raw payload stays in sync with the columns.
        let mut scratch = Article {
            fingerprint: fingerprint.to_string(),
            symbol: String::new(),
            title,
            summary,
            published_at: None,
            published_raw: String::new(),
            source_name: String::new(),
            url: String::new(),
            title_cn: cur_title_cn,
            summary_cn: cur_summary_cn,
            raw: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
        };
        if !scratch.apply_translation_patch(title_cn, summary_cn) {
            return Ok(false);
        }

        conn.execute(
            "UPDATE news_articles
             SET title_cn = ?2, summary_cn = ?3, raw_json = ?4, updated_at = ?5
             WHERE fingerprint = ?1",
            params![
                fingerprint,
                scratch.title_cn,
                scratch.summary_cn,
                serde_json::to_string(&scratch.raw).unwrap_or_else(|_| "{}".to_string()),
                Utc::now().timestamp(),
            ],
        )?;
        Ok(true)
    }

    /// Persist a fresh token, deactivating every previous row. Superseded
    /// rows are kept for audit.
    pub fn save_token(&self, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE auth_tokens SET is_active = 0", [])?;
        conn.execute(
            "INSERT INTO auth_tokens (access_token, expires_at, created_at, is_active)
             VALUES (?1, ?2, ?3, 1)",
            params![value, expires_at.timestamp(), Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Newest active, unexpired token.
    pub fn load_active_token(&self) -> Result<Option<StoredToken>> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT access_token, expires_at FROM auth_tokens
                 WHERE is_active = 1 AND expires_at > ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![Utc::now().timestamp()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(value, ts)| {
            Utc.timestamp_opt(ts, 0)
                .single()
                .map(|expires_at| StoredToken { value, expires_at })
        }))
    }

    pub fn set_status(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO system_status (status_key, status_value, updated_at)
             VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn get_status(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let v = conn
            .query_row(
                "SELECT status_value FROM system_status WHERE status_key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v)
    }

    /// Drop articles ingested more than `days` days ago. Returns the number
    /// removed.
    pub fn purge_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - days * 24 * 3600;
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM news_articles WHERE created_at < ?1",
            params![cutoff],
        )?;
        if n > 0 {
            info!(removed = n, days, "warm store purge");
        }
        Ok(n)
    }

    pub fn stats(&self) -> Result<WarmStats> {
        let conn = self.conn.lock();
        let total_articles: i64 =
            conn.query_row("SELECT COUNT(*) FROM news_articles", [], |r| r.get(0))?;
        let active_tokens: i64 = conn.query_row(
            "SELECT COUNT(*) FROM auth_tokens WHERE is_active = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(WarmStats {
            total_articles,
            active_tokens,
        })
    }
}

fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
    let published_at: Option<i64> = row.get(6)?;
    let raw_json: String = row.get(10)?;
    Ok(Article {
        fingerprint: row.get(0)?,
        symbol: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        summary: row.get(4)?,
        published_raw: row.get(5)?,
        published_at: published_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        source_name: row.get(7)?,
        title_cn: row.get(8)?,
        summary_cn: row.get(9)?,
        raw: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
    })
}
