// src/origin/mod.rs
pub mod auth;
pub mod fetch;

pub use auth::{AuthGate, AuthManager, AuthPhase, AuthStatus};
pub use fetch::OriginFetcher;

use anyhow::Result;

use crate::model::Article;

/// The external news provider seam.
///
/// `Ok(vec![])` means the provider answered and had nothing (or denied the
/// call softly — rate limit, stale token, missing auth). `Err` means the
/// fetch itself failed: provider unreachable or the body didn't parse.
#[async_trait::async_trait]
pub trait NewsOrigin: Send + Sync {
    async fn fetch(&self, symbol: &str, limit: usize) -> Result<Vec<Article>>;
    fn name(&self) -> &'static str;
}
