// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `ContextManager` using only the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use inflight::{ContextManager, ManagerOptions, Phase, ProgressHandle};
use tick::ClockControl;
use tokio::sync::Semaphore;

fn manager(control: &ClockControl, options: ManagerOptions) -> ContextManager<&'static str> {
    ContextManager::new(options, control.to_clock())
}

async fn finish(manager: &ContextManager<&'static str>, key: &'static str) {
    let context = manager.request(key, move |_| async move { Ok::<_, String>(format!("out/{key}.png")) });
    context.finished().await;
}

async fn settle(mut until: impl FnMut() -> bool) {
    for _ in 0..100 {
        if until() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_run_work_once() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let requests = (0..32).map(|_| {
        let manager = manager.clone();
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            manager.request("key", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await.map_err(|e| e.to_string())?;
                Ok::<_, String>("out/key.png".to_string())
            })
        })
    });
    let contexts: Vec<_> = join_all(requests).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(manager.context_count(), 1);
    assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));

    gate.add_permits(1);
    for context in &contexts {
        context.finished().await;
        assert_eq!(context.result_locator().as_deref(), Some("out/key.png"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_reported_by_work_is_visible() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());
    let gate = Arc::new(Semaphore::new(0));

    let job_gate = Arc::clone(&gate);
    let context = manager.request("key", move |progress: ProgressHandle| async move {
        progress.set_phase(Phase::Generating);
        progress.set_percent(42.0);
        let _permit = job_gate.acquire().await.map_err(|e| e.to_string())?;
        Ok::<_, String>("out/key.png".to_string())
    });

    settle(|| context.phase() == Phase::Generating).await;
    let view = manager.progress(&"key").unwrap();
    assert_eq!(view.phase, Phase::Generating);
    assert!((view.percent - 42.0).abs() < f64::EPSILON);
    assert!(!view.done);
    assert_eq!(manager.active().len(), 1);

    gate.add_permits(1);
    context.finished().await;

    let view = context.snapshot();
    assert_eq!(view.phase, Phase::Done);
    assert!((view.percent - 100.0).abs() < f64::EPSILON);
    assert!(manager.active().is_empty());
}

#[tokio::test]
async fn failed_context_is_retained_and_attached_to() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move |_: ProgressHandle| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>("generator unavailable")
        }
    };

    let first = manager.request("key", counted(&calls));
    first.finished().await;
    assert_eq!(first.phase(), Phase::Failed);
    assert_eq!(first.error().as_deref(), Some("generator unavailable"));

    let second = manager.request("key", counted(&calls));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(manager.invalidate(&"key"));
    let third = manager.request("key", counted(&calls));
    third.finished().await;
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn running_context_cannot_be_invalidated() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());

    let _context = manager.request("key", |_| std::future::pending::<Result<String, String>>());

    assert!(!manager.invalidate(&"key"));
    assert!(!manager.invalidate(&"missing"));
    assert_eq!(manager.context_count(), 1);
}

#[tokio::test]
async fn panicking_work_fails_the_context() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());

    let context = manager.request("key", |_| async {
        if true {
            panic!("renderer crashed");
        }
        Ok::<String, String>(String::new())
    });
    context.finished().await;

    assert_eq!(context.phase(), Phase::Failed);
    assert_eq!(context.error().as_deref(), Some("generation panicked: renderer crashed"));
}

#[tokio::test]
async fn finished_contexts_expire_after_ttl() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(0, Duration::from_secs(60)));

    finish(&manager, "a").await;

    control.advance(Duration::from_secs(60));
    assert_eq!(manager.sweep(), 0);

    control.advance(Duration::from_millis(1));
    assert_eq!(manager.sweep(), 1);
    assert!(manager.get(&"a").is_none());
}

#[tokio::test]
async fn ttl_is_measured_from_completion() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(0, Duration::from_secs(60)));
    let gate = Arc::new(Semaphore::new(0));

    let job_gate = Arc::clone(&gate);
    let context = manager.request("slow", move |_| async move {
        let _permit = job_gate.acquire().await.map_err(|e| e.to_string())?;
        Ok::<_, String>("out/slow.png".to_string())
    });

    control.advance(Duration::from_secs(300));
    assert_eq!(manager.sweep(), 0, "running jobs are never evicted");

    gate.add_permits(1);
    context.finished().await;
    control.advance(Duration::from_secs(30));
    assert_eq!(manager.sweep(), 0);
    assert_eq!(manager.context_count(), 1);
}

#[tokio::test]
async fn capacity_evicts_oldest_finished_first() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(3, Duration::ZERO));

    for key in ["k0", "k1", "k2", "k3", "k4"] {
        finish(&manager, key).await;
        control.advance(Duration::from_secs(1));
    }

    assert_eq!(manager.context_count(), 3);
    assert!(manager.get(&"k0").is_none());
    assert!(manager.get(&"k1").is_none());
    for key in ["k2", "k3", "k4"] {
        assert!(manager.get(&key).is_some(), "{key} should still be tracked");
    }
}

#[tokio::test]
async fn capacity_never_evicts_running_jobs() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(2, Duration::ZERO));
    let gate = Arc::new(Semaphore::new(0));

    let contexts: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|key| {
            let gate = Arc::clone(&gate);
            manager.request(key, move |_| async move {
                let _permit = gate.acquire().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(format!("out/{key}.png"))
            })
        })
        .collect();

    assert_eq!(manager.context_count(), 3);
    assert_eq!(manager.sweep(), 0);

    gate.add_permits(3);
    for context in &contexts {
        context.finished().await;
    }

    assert_eq!(manager.sweep(), 1);
    assert_eq!(manager.context_count(), 2);
}

#[tokio::test]
async fn small_manager_with_short_ttl() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::default());
    manager.configure(ManagerOptions::new(2, Duration::from_millis(200)));

    finish(&manager, "a").await;
    assert_eq!(manager.context_count(), 1);

    control.advance(Duration::from_millis(250));
    finish(&manager, "b").await;

    assert!(manager.context_count() <= 2);
    assert!(manager.get(&"a").is_none());
    assert!(manager.get(&"b").is_some());
}

#[tokio::test]
async fn zero_limits_keep_everything() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(0, Duration::ZERO));

    for key in ["a", "b", "c", "d"] {
        finish(&manager, key).await;
        control.advance(Duration::from_secs(3600));
    }

    assert_eq!(manager.sweep(), 0);
    assert_eq!(manager.context_count(), 4);
}

#[tokio::test]
async fn sweeper_evicts_in_the_background_and_stops_with_the_manager() {
    let control = ClockControl::new();
    let manager = manager(&control, ManagerOptions::new(0, Duration::from_secs(1)));
    finish(&manager, "a").await;

    let sweeper = manager.spawn_sweeper(Duration::from_secs(5));
    tokio::task::yield_now().await;

    control.advance(Duration::from_secs(5));
    settle(|| manager.context_count() == 0).await;
    assert_eq!(manager.context_count(), 0);

    drop(manager);
    control.advance(Duration::from_secs(5));
    sweeper.await.unwrap();
}
