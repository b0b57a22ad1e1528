// src/store/mod.rs
pub mod hot;
pub mod warm;

pub use hot::{hot_window, HotCache, HOT_WINDOW_SECS};
pub use warm::{StoredToken, WarmStats, WarmStore, DEFAULT_RETENTION_DAYS};

use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;

/// Hot-cache retention sweep, every 10 minutes. Best-effort, off the
/// request path.
pub fn spawn_hot_sweep(hot: Arc<HotCache>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(600));
        ticker.tick().await; // first tick fires immediately, skip it
        loop {
            ticker.tick().await;
            let evicted = hot.sweep(chrono::Utc::now());
            if evicted > 0 {
                counter!("hot_cache_evicted_total").increment(evicted as u64);
                tracing::debug!(evicted, "hot cache sweep");
            }
        }
    })
}

/// Daily warm-store purge at the configured horizon. Failures are logged,
/// never propagated.
pub fn spawn_warm_purge(warm: Arc<WarmStore>, horizon_days: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(24 * 3600));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let warm = warm.clone();
            let res =
                tokio::task::spawn_blocking(move || warm.purge_older_than(horizon_days)).await;
            match res {
                Ok(Ok(removed)) => {
                    counter!("warm_store_purged_total").increment(removed as u64);
                }
                Ok(Err(e)) => tracing::warn!(error = ?e, "warm store purge failed"),
                Err(e) => tracing::warn!(error = ?e, "warm store purge task failed"),
            }
        }
    })
}
