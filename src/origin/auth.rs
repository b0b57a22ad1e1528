// src/origin/auth.rs
//! Provider authentication: token lifecycle and login cooldown.
//!
//! The token state machine is derived, not stored: {NoToken, Valid,
//! Expiring, FailedCooldown} all fall out of the persisted token row and
//! the login-failure marker in the warm store. A stored token is always
//! preferred over a fresh login; expiry is checked with a one-minute margin
//! so refresh happens before the provider starts rejecting calls.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::WarmStore;

/// System-status key carrying the login-failure timestamp (RFC 3339).
pub const STATUS_LOGIN_FAILURE: &str = "login_failure";
/// Cooldown after a failed login before the next attempt.
pub const LOGIN_COOLDOWN_SECS: i64 = 30 * 60;
/// Tokens are treated as expiring this long before their actual expiry.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

const DEFAULT_EXPIRES_IN_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    NoToken,
    Valid,
    Expiring,
    FailedCooldown,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub phase: AuthPhase,
    pub in_cooldown: bool,
    pub remaining_cooldown_secs: i64,
    pub has_valid_token: bool,
}

/// What the fetcher and pipeline see of authentication: cooldown state and
/// ready-to-send headers. Kept as a trait so tests can stub it and the
/// pipeline never touches ambient auth state.
#[async_trait::async_trait]
pub trait AuthGate: Send + Sync {
    fn is_in_cooldown(&self) -> bool;
    fn remaining_cooldown_secs(&self) -> i64;
    /// Headers for an origin call, acquiring or refreshing the token if
    /// needed. `None` when no token can be produced right now.
    async fn auth_headers(&self) -> Option<HeaderMap>;
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
}

pub struct AuthManager {
    http: reqwest::Client,
    cfg: AuthConfig,
    store: Arc<WarmStore>,
    /// At most one login in flight; losers of the race reuse the winner's
    /// token.
    login_lock: tokio::sync::Mutex<()>,
}

impl AuthManager {
    pub fn new(cfg: AuthConfig, store: Arc<WarmStore>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            cfg,
            store,
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn cooldown_started_at(&self) -> Option<DateTime<Utc>> {
        match self.store.get_status(STATUS_LOGIN_FAILURE) {
            Ok(Some(v)) if !v.is_empty() => DateTime::parse_from_rfc3339(&v)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = ?e, "cooldown marker read failed");
                None
            }
        }
    }

    /// Fresh = unexpired with the safety margin still ahead.
    fn is_fresh(expires_at: DateTime<Utc>) -> bool {
        Utc::now() < expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
    }

    /// Current lifecycle phase, derived from stored state.
    pub fn phase(&self) -> AuthPhase {
        if self.is_in_cooldown() {
            return AuthPhase::FailedCooldown;
        }
        match self.store.load_active_token() {
            Ok(Some(tok)) if Self::is_fresh(tok.expires_at) => AuthPhase::Valid,
            Ok(Some(_)) => AuthPhase::Expiring,
            _ => AuthPhase::NoToken,
        }
    }

    pub fn status(&self) -> AuthStatus {
        let phase = self.phase();
        AuthStatus {
            phase,
            in_cooldown: phase == AuthPhase::FailedCooldown,
            remaining_cooldown_secs: self.remaining_cooldown_secs(),
            has_valid_token: phase == AuthPhase::Valid,
        }
    }

    /// Resolve a usable access token, logging in when the stored one is
    /// missing or expiring. Falls back to a still-unexpired stored token if
    /// the refresh cannot run (cooldown) or fails.
    async fn valid_token(&self) -> Option<String> {
        let stored = self.store.load_active_token().ok().flatten();
        if let Some(tok) = &stored {
            if Self::is_fresh(tok.expires_at) {
                return Some(tok.value.clone());
            }
        }

        // NoToken or Expiring. Inside the cooldown no login runs; an
        // unexpired stored token is still worth using while it lasts.
        if self.is_in_cooldown() {
            return stored.map(|t| t.value);
        }

        match self.login_and_store().await {
            Some(token) => Some(token),
            None => stored.map(|t| t.value),
        }
    }

    /// Single-flight login. Re-checks the store after acquiring the lock so
    /// a lost refresh race reuses the winner's token instead of logging in
    /// again.
    async fn login_and_store(&self) -> Option<String> {
        let _guard = self.login_lock.lock().await;

        if let Ok(Some(tok)) = self.store.load_active_token() {
            if Self::is_fresh(tok.expires_at) {
                return Some(tok.value);
            }
        }
        if self.is_in_cooldown() {
            return None;
        }

        info!("attempting provider login");
        match self.login_request().await {
            Ok((token, expires_at)) => {
                if let Err(e) = self.store.save_token(&token, expires_at) {
                    warn!(error = ?e, "token persist failed");
                }
                self.clear_failure();
                info!("provider login successful");
                Some(token)
            }
            Err(e) => {
                warn!(error = ?e, "provider login failed, entering cooldown");
                self.set_failure();
                None
            }
        }
    }

    async fn login_request(&self) -> anyhow::Result<(String, DateTime<Utc>)> {
        #[derive(Serialize)]
        struct LoginReq<'a> {
            client_id: &'a str,
            username: &'a str,
            password: &'a str,
            credential_type: &'a str,
            realm: &'a str,
        }
        #[derive(Deserialize)]
        struct LoginResp {
            access_token: Option<String>,
            expires_in: Option<i64>,
        }

        let req = LoginReq {
            client_id: &self.cfg.client_id,
            username: &self.cfg.username,
            password: &self.cfg.password,
            credential_type: "http://auth0.com/oauth/grant-type/password-realm",
            realm: "Username-Password-Authentication",
        };

        let resp = self
            .http
            .post(&self.cfg.auth_url)
            .header("Accept", "*/*")
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("login rejected: {status}");
        }
        let body: LoginResp = resp.json().await?;
        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("login response carried no access_token"))?;
        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Ok((token, Utc::now() + Duration::seconds(expires_in)))
    }

    fn set_failure(&self) {
        if let Err(e) = self
            .store
            .set_status(STATUS_LOGIN_FAILURE, &Utc::now().to_rfc3339())
        {
            warn!(error = ?e, "cooldown marker write failed");
        }
    }

    fn clear_failure(&self) {
        if let Err(e) = self.store.set_status(STATUS_LOGIN_FAILURE, "") {
            warn!(error = ?e, "cooldown marker clear failed");
        }
    }

    /// Operator-triggered recovery: re-enter the login path regardless of
    /// the current phase (the cooldown marker is cleared first).
    pub async fn force_refresh(&self) -> bool {
        info!("forcing token refresh");
        self.clear_failure();
        let _guard = self.login_lock.lock().await;
        match self.login_request().await {
            Ok((token, expires_at)) => {
                if let Err(e) = self.store.save_token(&token, expires_at) {
                    warn!(error = ?e, "token persist failed");
                }
                self.clear_failure();
                true
            }
            Err(e) => {
                warn!(error = ?e, "forced refresh failed");
                self.set_failure();
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthGate for AuthManager {
    fn is_in_cooldown(&self) -> bool {
        match self.cooldown_started_at() {
            Some(t) => Utc::now() - t < Duration::seconds(LOGIN_COOLDOWN_SECS),
            None => false,
        }
    }

    fn remaining_cooldown_secs(&self) -> i64 {
        match self.cooldown_started_at() {
            Some(t) => {
                let elapsed = (Utc::now() - t).num_seconds();
                (LOGIN_COOLDOWN_SECS - elapsed).max(0)
            }
            None => 0,
        }
    }

    async fn auth_headers(&self) -> Option<HeaderMap> {
        let token = self.valid_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).ok()?,
        );
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        Some(headers)
    }
}
