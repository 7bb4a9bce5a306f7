use super::*;
use crate::{
    error::Error,
    job::Job,
    link::Link,
    retry::{AttemptFailure, RetryPolicy},
    testing::{Script, Step},
};
use core::{num::NonZeroU32, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

struct Pool {
    handle: MasterHandle,
    master: JoinHandle<crate::Result<()>>,
    tracker: TaskTracker,
}

fn start_pool(num_workers: usize, retry: RetryPolicy, script: &Script) -> Pool {
    let tracker = TaskTracker::new();
    let (link, _failures) = Link::new(CancellationToken::new());
    let config = PoolConfig {
        num_workers,
        submission_buffer: 1,
        retry,
    };
    let (master, handle) =
        Master::start(&config, |id| Ok(script.transport(id)), &tracker, &link).unwrap();
    Pool {
        handle,
        master: tokio::spawn(master.run()),
        tracker,
    }
}

fn job(url: &str) -> Job {
    Job::new(url, 0, 4095)
}

async fn wait_for_mode(handle: &MasterHandle, mode: DispatchMode) {
    let mut rx = handle.subscribe();
    rx.wait_for(|stats| stats.mode == mode).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn round_trip_delivers_payload_to_its_submitter() {
    let script = Script::default();
    let pool = start_pool(4, RetryPolicy::default(), &script);

    let (a, b) = tokio::join!(
        pool.handle.submit(job("http://host/a")),
        pool.handle.submit(job("http://host/b")),
    );

    assert_eq!(a.unwrap(), "payload:http://host/a");
    assert_eq!(b.unwrap(), "payload:http://host/b");
}

#[tokio::test(start_paused = true)]
async fn saturated_pool_defers_dispatch_until_completion() {
    let script = Script::default();
    let gate_a = script.gate("http://host/a");
    let _gate_b = script.gate("http://host/b");
    let pool = start_pool(2, RetryPolicy::default(), &script);

    let a = pool.handle.send(job("http://host/a")).await.unwrap();
    let b = pool.handle.send(job("http://host/b")).await.unwrap();
    wait_for_mode(&pool.handle, DispatchMode::Saturated).await;

    let c = pool.handle.send(job("http://host/c")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // C sits in the submission queue while both workers are busy.
    assert_eq!(script.attempts("http://host/c"), 0);
    let stats = pool.handle.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.busy, 2);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.stalls, 1);

    gate_a.notify_one();
    assert_eq!(a.recv().await.unwrap(), "payload:http://host/a");
    assert_eq!(c.recv().await.unwrap(), "payload:http://host/c");

    // C went to the worker that freed up, not the one still serving B.
    let worker_a = script.workers_for("http://host/a");
    assert_eq!(script.workers_for("http://host/c"), worker_a);
    assert_ne!(script.workers_for("http://host/b"), worker_a);

    drop(b);
}

#[tokio::test(start_paused = true)]
async fn n_plus_one_jobs_dispatch_exactly_n_immediately() {
    const N: usize = 3;
    let script = Script::default();
    let gates: Vec<_> = (0..=N)
        .map(|i| script.gate(&format!("http://host/{i}")))
        .collect();
    let pool = start_pool(N, RetryPolicy::default(), &script);

    let mut replies = Vec::new();
    for i in 0..N {
        replies.push(pool.handle.send(job(&format!("http://host/{i}"))).await.unwrap());
    }
    wait_for_mode(&pool.handle, DispatchMode::Saturated).await;
    replies.push(pool.handle.send(job(&format!("http://host/{N}"))).await.unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(pool.handle.stats().dispatched, N as u64);
    assert_eq!(script.attempts(&format!("http://host/{N}")), 0);

    gates[1].notify_one();
    let mut rx = pool.handle.subscribe();
    rx.wait_for(|s| s.dispatched == N as u64 + 1).await.unwrap();
    assert_eq!(pool.handle.stats().completed, 1);

    for gate in &gates {
        gate.notify_one();
    }
    for reply in replies {
        assert!(reply.recv().await.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn full_queue_blocks_submitters() {
    let script = Script::default();
    let _gate = script.gate("http://host/slow");
    let pool = start_pool(1, RetryPolicy::default(), &script);

    let _busy = pool.handle.send(job("http://host/slow")).await.unwrap();
    wait_for_mode(&pool.handle, DispatchMode::Saturated).await;
    let _queued = pool.handle.send(job("http://host/next")).await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_secs(5),
        pool.handle.send(job("http://host/later")),
    )
    .await;
    assert!(blocked.is_err(), "submission should wait for queue capacity");
}

#[tokio::test(start_paused = true)]
async fn pool_size_invariant_holds_under_load() {
    const N: usize = 4;
    let script = Script::default();
    for i in 0..32 {
        script.push(&format!("http://host/{i}"), [Step::Fail, Step::Status(500)]);
    }
    let pool = start_pool(N, RetryPolicy::default(), &script);

    let mut rx = pool.handle.subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen = 0;
        while rx.changed().await.is_ok() {
            let stats = *rx.borrow_and_update();
            assert_eq!(stats.idle + stats.busy, N);
            assert_eq!(stats.mode == DispatchMode::Saturated, stats.idle == 0);
            assert!(stats.busy <= N);
            seen += 1;
        }
        seen
    });

    let submits = (0..32).map(|i| pool.handle.submit(job(&format!("http://host/{i}"))));
    for result in futures::future::join_all(submits).await {
        assert!(result.is_ok());
    }

    let stats = pool.handle.stats();
    assert_eq!(stats.dispatched, 32);
    assert_eq!(stats.completed, 32);
    assert_eq!(stats.idle, N);

    pool.handle.request_shutdown();
    assert!(pool.master.await.unwrap().is_ok());
    drop(pool.handle);
    assert!(watcher.await.unwrap() > 0);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_retried_indefinitely_by_default() {
    let script = Script::default();
    script.push("http://host/missing", std::iter::repeat_n(Step::Status(404), 10_000));
    let pool = start_pool(1, RetryPolicy::default(), &script);

    let reply = pool.handle.send(job("http://host/missing")).await.unwrap();
    let waited = tokio::time::timeout(Duration::from_secs(30), reply.recv()).await;

    assert!(waited.is_err(), "no terminal reply under the default policy");
    assert!(script.attempts("http://host/missing") >= 100);
    assert_eq!(pool.handle.stats().completed, 0);
}

#[tokio::test(start_paused = true)]
async fn bounded_not_found_fails_and_frees_the_worker() {
    let script = Script::default();
    script.push("http://host/missing", std::iter::repeat_n(Step::Status(404), 100));
    let pool = start_pool(
        1,
        RetryPolicy::bounded(NonZeroU32::new(5).unwrap()),
        &script,
    );

    let result = pool.handle.submit(job("http://host/missing")).await;
    assert_eq!(
        result,
        Err(Error::RetriesExhausted {
            attempts: 5,
            last: AttemptFailure::Status(404),
        })
    );

    // The single worker is usable again.
    assert_eq!(
        pool.handle.submit(job("http://host/ok")).await.unwrap(),
        "payload:http://host/ok"
    );
}

#[tokio::test(start_paused = true)]
async fn fail_on_not_found_is_terminal() {
    let script = Script::default();
    script.push("http://host/missing", [Step::Status(404)]);
    let policy = RetryPolicy {
        fail_on_not_found: true,
        ..RetryPolicy::default()
    };
    let pool = start_pool(2, policy, &script);

    assert_eq!(
        pool.handle.submit(job("http://host/missing")).await,
        Err(Error::NotFound {
            url: "http://host/missing".into()
        })
    );
    assert_eq!(script.attempts("http://host/missing"), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_new_submissions_and_stops_workers() {
    let script = Script::default();
    let pool = start_pool(3, RetryPolicy::default(), &script);

    pool.handle.request_shutdown();
    assert!(pool.master.await.unwrap().is_ok());
    assert_eq!(
        pool.handle.send(job("http://host/late")).await.err(),
        Some(Error::ServiceShutdown)
    );

    pool.tracker.close();
    pool.tracker.wait().await;
}

#[tokio::test(start_paused = true)]
async fn queued_submission_is_dropped_on_shutdown() {
    let script = Script::default();
    script.push("http://host/stuck", [Step::Hang]);
    let pool = start_pool(1, RetryPolicy::default(), &script);

    let _stuck = pool.handle.send(job("http://host/stuck")).await.unwrap();
    wait_for_mode(&pool.handle, DispatchMode::Saturated).await;
    let queued = pool.handle.send(job("http://host/queued")).await.unwrap();

    pool.handle.request_shutdown();
    assert_eq!(queued.recv().await, Err(Error::ReplyDropped));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let tracker = TaskTracker::new();
    let (link, _failures) = Link::new(CancellationToken::new());
    let script = Script::default();

    let config = PoolConfig {
        num_workers: 0,
        ..PoolConfig::default()
    };
    let err = Master::start(&config, |id| Ok(script.transport(id)), &tracker, &link)
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test]
async fn transport_factory_failure_aborts_startup() {
    let tracker = TaskTracker::new();
    let (link, _failures) = Link::new(CancellationToken::new());
    let script = Script::default();

    let result = Master::start(
        &PoolConfig::default(),
        |id| {
            if id == 3 {
                Err(crate::TransportError::Request("no session".into()))
            } else {
                Ok(script.transport(id))
            }
        },
        &tracker,
        &link,
    );

    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(link.token().is_cancelled());
    tracker.close();
    tracker.wait().await;
}
