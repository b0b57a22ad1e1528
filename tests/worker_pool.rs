// tests/worker_pool.rs
//! Pool semantics: bounded concurrency, submit timeout, degraded replies,
//! and shutdown behavior.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{article, rig_with, MockOrigin, StubGate};
use symbol_news_service::worker::{ServiceReply, WorkerPool, MSG_COOLDOWN, MSG_FETCH_FAILED, MSG_TIMEOUT};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded_by_the_worker_count() {
    // Every symbol is distinct, the tiers are empty, so each task reaches
    // the (slow) origin. 25 requests against 10 workers must all resolve
    // with at most 10 origin calls in flight at any instant.
    let origin = MockOrigin::with_delay(vec![], Duration::from_millis(200));
    let r = rig_with(origin.clone(), StubGate::new(false));
    let pool = Arc::new(WorkerPool::start(
        r.pipeline.clone(),
        10,
        Duration::from_secs(30),
    ));

    let mut handles = Vec::new();
    for i in 0..25 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.submit(&format!("SYM{i}"), 10).await
        }));
    }
    for h in handles {
        let reply = h.await.expect("join");
        assert_eq!(reply, ServiceReply::Articles(vec![]));
    }

    assert_eq!(origin.call_count(), 25);
    let max = origin.max_active.load(Ordering::Acquire);
    assert!(max <= 10, "observed {max} concurrent lookups, expected <= 10");
    assert!(max > 1, "expected some parallelism, observed {max}");

    pool.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_lookups_time_out_with_the_busy_reply() {
    let origin = MockOrigin::with_delay(vec![], Duration::from_secs(3));
    let r = rig_with(origin.clone(), StubGate::new(false));
    let pool = WorkerPool::start(r.pipeline.clone(), 2, Duration::from_millis(200));

    let reply = pool.submit("TSLA", 10).await;
    assert_eq!(
        reply,
        ServiceReply::Unavailable {
            msg: MSG_TIMEOUT.into()
        }
    );

    pool.shutdown();
}

#[tokio::test]
async fn cooldown_surfaces_as_the_newsfilter_fail_reply() {
    let origin = MockOrigin::new(vec![article("o1", "AAPL", 1)]);
    let r = rig_with(origin.clone(), StubGate::new(true));
    let pool = WorkerPool::start(r.pipeline.clone(), 2, Duration::from_secs(5));

    let reply = pool.submit("AAPL", 10).await;
    assert_eq!(
        reply,
        ServiceReply::Unavailable {
            msg: MSG_COOLDOWN.into()
        }
    );
    assert_eq!(origin.call_count(), 0);

    pool.shutdown();
}

#[tokio::test]
async fn origin_failure_surfaces_as_a_failed_reply() {
    let origin = MockOrigin::new(vec![article("o1", "TSLA", 1)]);
    origin.fail.store(true, Ordering::Release);
    let r = rig_with(origin, StubGate::new(false));
    let pool = WorkerPool::start(r.pipeline.clone(), 2, Duration::from_secs(5));

    let reply = pool.submit("TSLA", 10).await;
    assert_eq!(
        reply,
        ServiceReply::Failed {
            msg: MSG_FETCH_FAILED.into()
        }
    );

    pool.shutdown();
}

#[tokio::test]
async fn one_failing_task_does_not_poison_the_pool() {
    let origin = MockOrigin::new(vec![article("o1", "TSLA", 1)]);
    let r = rig_with(origin.clone(), StubGate::new(false));
    let pool = WorkerPool::start(r.pipeline.clone(), 2, Duration::from_secs(5));

    origin.fail.store(true, Ordering::Release);
    let reply = pool.submit("TSLA", 10).await;
    assert!(matches!(reply, ServiceReply::Failed { .. }));

    // The same workers keep serving once the origin recovers.
    origin.fail.store(false, Ordering::Release);
    let reply = pool.submit("TSLA", 10).await;
    match reply {
        ServiceReply::Articles(items) => assert_eq!(items.len(), 1),
        other => panic!("expected articles after recovery, got {other:?}"),
    }

    pool.shutdown();
}

#[tokio::test]
async fn submits_after_shutdown_are_rejected() {
    let origin = MockOrigin::new(vec![]);
    let r = rig_with(origin, StubGate::new(false));
    let pool = WorkerPool::start(r.pipeline.clone(), 2, Duration::from_secs(5));

    pool.shutdown();
    let reply = pool.submit("TSLA", 10).await;
    assert!(matches!(reply, ServiceReply::Unavailable { .. }));
}
