// src/config.rs
//! Env-driven service configuration. Provider credentials are required and
//! checked at startup; everything else has a sensible default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::origin::auth::AuthConfig;
use crate::store::DEFAULT_RETENTION_DAYS;
use crate::worker::{DEFAULT_SUBMIT_TIMEOUT, DEFAULT_WORKER_COUNT};

// --- env names & defaults ---
pub const ENV_API_URL: &str = "NEWSFILTER_API_URL";
pub const ENV_AUTH_URL: &str = "NEWSFILTER_AUTH_URL";
pub const ENV_USERNAME: &str = "NEWSFILTER_USERNAME";
pub const ENV_PASSWORD: &str = "NEWSFILTER_PASSWORD";
pub const ENV_CLIENT_ID: &str = "NEWSFILTER_CLIENT_ID";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_WARM_DB_PATH: &str = "WARM_DB_PATH";
pub const ENV_WORKER_COUNT: &str = "NEWS_WORKER_COUNT";
pub const ENV_SUBMIT_TIMEOUT_SECS: &str = "NEWS_SUBMIT_TIMEOUT_SECS";
pub const ENV_RETENTION_DAYS: &str = "WARM_RETENTION_DAYS";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";

pub const DEFAULT_API_URL: &str = "https://api.newsfilter.io/actions";
pub const DEFAULT_AUTH_URL: &str = "https://login.newsfilter.io/co/authenticate";
pub const DEFAULT_WARM_DB_PATH: &str = "news_warm.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_url: String,
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    /// Absent key selects the passthrough translator.
    pub openai_api_key: Option<String>,
    pub warm_db_path: PathBuf,
    pub worker_count: usize,
    pub submit_timeout: Duration,
    pub retention_days: i64,
    pub bind_addr: String,
}

impl ServiceConfig {
    /// Load from the environment. Missing provider credentials are a
    /// startup error, not something to discover at request time.
    pub fn from_env() -> Result<Self> {
        let username = std::env::var(ENV_USERNAME)
            .context("NEWSFILTER_USERNAME is required")?;
        let password = std::env::var(ENV_PASSWORD)
            .context("NEWSFILTER_PASSWORD is required")?;
        let client_id = std::env::var(ENV_CLIENT_ID)
            .context("NEWSFILTER_CLIENT_ID is required")?;

        Ok(Self {
            api_url: env_or(ENV_API_URL, DEFAULT_API_URL),
            auth_url: env_or(ENV_AUTH_URL, DEFAULT_AUTH_URL),
            username,
            password,
            client_id,
            openai_api_key: std::env::var(ENV_OPENAI_API_KEY)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            warm_db_path: PathBuf::from(env_or(ENV_WARM_DB_PATH, DEFAULT_WARM_DB_PATH)),
            worker_count: parse_env(ENV_WORKER_COUNT)
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_WORKER_COUNT),
            submit_timeout: parse_env(ENV_SUBMIT_TIMEOUT_SECS)
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SUBMIT_TIMEOUT),
            retention_days: parse_env(ENV_RETENTION_DAYS)
                .filter(|&d| d > 0)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            bind_addr: env_or(ENV_BIND_ADDR, DEFAULT_BIND_ADDR),
        })
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            auth_url: self.auth_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
