use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("lookup_hot_hits_total", "Lookups served from the hot cache.");
        describe_counter!("lookup_warm_hits_total", "Lookups served from the warm store.");
        describe_counter!("lookup_origin_hits_total", "Lookups served from the origin.");
        describe_counter!("lookup_misses_total", "Lookups with no articles anywhere.");
        describe_counter!(
            "lookup_cooldown_rejections_total",
            "Lookups rejected by the auth cooldown."
        );
        describe_counter!("origin_fetch_total", "Outbound provider calls.");
        describe_counter!("origin_errors_total", "Provider transport/parse failures.");
        describe_counter!("origin_rate_limited_total", "Provider 429 responses.");
        describe_counter!("origin_unauthorized_total", "Provider 401 responses.");
        describe_counter!(
            "worker_timeouts_total",
            "Requests abandoned on submit timeout."
        );
        describe_counter!("worker_panics_total", "Tasks that panicked inside a worker.");
        describe_counter!(
            "write_back_failures_total",
            "Failed translation write-backs."
        );
        describe_counter!("hot_cache_evicted_total", "Entries removed by the hot sweep.");
        describe_counter!("warm_store_purged_total", "Rows removed by the warm purge.");
        describe_gauge!("worker_queue_depth", "Tasks currently queued for the pool.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register our series.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
