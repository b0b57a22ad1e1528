// src/worker.rs
//! Bounded-concurrency request queue. N long-lived workers consume one FIFO
//! queue; each processes a single task end to end, so pipeline concurrency
//! is bounded exactly by the worker count. A caller that times out abandons
//! its task in place — the in-flight lookup runs to completion and still
//! populates the caches for the next caller.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, gauge};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::model::EnrichedArticle;
use crate::pipeline::{CachePipeline, LookupError};

pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(45);

/// Queue bound: keeps `submit` non-blocking in normal operation while
/// capping memory under a stampede.
const QUEUE_CAPACITY: usize = 256;

pub const MSG_COOLDOWN: &str = "NewsFilter Fail";
pub const MSG_TIMEOUT: &str = "Request timed out, server busy";
pub const MSG_FETCH_FAILED: &str = "News fetch failed";
pub const MSG_WORKER_ERROR: &str = "Worker error";

/// Outcome of one news request. Degraded outcomes serialize as a
/// single-element list carrying a `msg` field so the HTTP layer can map
/// them to a status code without exceptions crossing the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply {
    Articles(Vec<EnrichedArticle>),
    /// Service-unavailable conditions (auth cooldown, pool saturation) → 503.
    Unavailable { msg: String },
    /// Everything else that went wrong → 500.
    Failed { msg: String },
}

impl ServiceReply {
    pub fn unavailable(msg: &str) -> Self {
        Self::Unavailable { msg: msg.into() }
    }

    pub fn failed(msg: &str) -> Self {
        Self::Failed { msg: msg.into() }
    }

    /// The wire shape: an article list, or `[{"msg": "..."}]`.
    pub fn body_json(&self) -> serde_json::Value {
        match self {
            Self::Articles(items) => serde_json::to_value(items).unwrap_or_else(|_| json!([])),
            Self::Unavailable { msg } | Self::Failed { msg } => json!([{ "msg": msg }]),
        }
    }
}

struct NewsTask {
    id: u64,
    symbol: String,
    limit: usize,
    enqueued_at: Instant,
    reply: oneshot::Sender<ServiceReply>,
}

pub struct WorkerPool {
    tx: mpsc::Sender<NewsTask>,
    running: Arc<AtomicBool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    submit_timeout: Duration,
    next_id: AtomicU64,
}

impl WorkerPool {
    /// Spawn `worker_count` worker loops over one shared FIFO queue.
    pub fn start(
        pipeline: Arc<CachePipeline>,
        worker_count: usize,
        submit_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<NewsTask>(QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let running = Arc::new(AtomicBool::new(true));

        info!(worker_count, "starting news worker pool");
        let handles = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    pipeline.clone(),
                    running.clone(),
                ))
            })
            .collect();

        Self {
            tx,
            running,
            handles: parking_lot::Mutex::new(handles),
            submit_timeout,
            next_id: AtomicU64::new(0),
        }
    }

    /// Enqueue a request and wait for its result, bounded by the submit
    /// timeout. On timeout the task is abandoned in place; its eventual
    /// completion lands in a dead oneshot and is discarded.
    pub async fn submit(&self, symbol: &str, limit: usize) -> ServiceReply {
        if !self.running.load(Ordering::Acquire) {
            return ServiceReply::unavailable(MSG_TIMEOUT);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let task = NewsTask {
            id,
            symbol: symbol.to_ascii_uppercase(),
            limit,
            enqueued_at: Instant::now(),
            reply: reply_tx,
        };

        if self.tx.send(task).await.is_err() {
            warn!("worker queue closed, rejecting request");
            return ServiceReply::failed(MSG_WORKER_ERROR);
        }
        gauge!("worker_queue_depth").increment(1.0);

        match tokio::time::timeout(self.submit_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                // Worker dropped the sender without replying; the panic
                // guard makes this unlikely, but the caller still gets a
                // structured result.
                ServiceReply::failed(MSG_WORKER_ERROR)
            }
            Err(_) => {
                counter!("worker_timeouts_total").increment(1);
                warn!(task_id = id, %symbol, "request timed out in the pool");
                ServiceReply::unavailable(MSG_TIMEOUT)
            }
        }
    }

    /// Flip the running flag and abort the worker loops without waiting for
    /// in-flight pipeline calls.
    pub fn shutdown(&self) {
        info!("stopping news worker pool");
        self.running.store(false, Ordering::Release);
        for h in self.handles.lock().drain(..) {
            h.abort();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<NewsTask>>>,
    pipeline: Arc<CachePipeline>,
    running: Arc<AtomicBool>,
) {
    debug!(worker_id, "worker ready");
    while running.load(Ordering::Acquire) {
        // Lock only to dequeue; processing runs with the queue released so
        // the other workers keep draining.
        let task = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(task) = task else {
            break; // queue closed
        };
        gauge!("worker_queue_depth").decrement(1.0);
        debug!(
            worker_id,
            task_id = task.id,
            symbol = %task.symbol,
            queued_ms = task.enqueued_at.elapsed().as_millis() as u64,
            "processing task"
        );

        let reply = match AssertUnwindSafe(pipeline.lookup(&task.symbol, task.limit))
            .catch_unwind()
            .await
        {
            Ok(Ok(items)) => ServiceReply::Articles(items),
            Ok(Err(LookupError::ServiceUnavailable { retry_secs })) => {
                debug!(worker_id, symbol = %task.symbol, retry_secs, "auth cooldown");
                ServiceReply::unavailable(MSG_COOLDOWN)
            }
            Ok(Err(LookupError::Origin(e))) => {
                warn!(worker_id, symbol = %task.symbol, error = ?e, "origin fetch failed");
                ServiceReply::failed(MSG_FETCH_FAILED)
            }
            Err(_) => {
                // A single failing task never kills a worker.
                error!(worker_id, symbol = %task.symbol, "task panicked");
                counter!("worker_panics_total").increment(1);
                ServiceReply::failed(MSG_WORKER_ERROR)
            }
        };

        // The caller may have timed out and gone away; that is fine.
        let _ = task.reply.send(reply);
    }
    debug!(worker_id, "worker stopped");
}
