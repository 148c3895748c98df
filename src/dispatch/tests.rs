//! Tests for the dispatcher implementations

use super::*;
use crate::config::DisposalConfig;
use crate::error::DisposalError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

fn owned(keep_alive: Duration) -> TokioDispatcher {
    let config = DisposalConfig::new()
        .with_thread_name("gd-test")
        .with_keep_alive(keep_alive);
    TokioDispatcher::from_config(&config).unwrap()
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[cfg(test)]
mod owned_runtime_tests {
    use super::*;

    #[test]
    fn test_runs_tasks_on_named_workers() {
        let dispatcher = owned(Duration::from_secs(60));
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();

        dispatcher
            .execute(Box::new(move || {
                let current = thread::current();
                tx.send((current.id(), current.name().map(str::to_string)))
                    .unwrap();
            }))
            .unwrap();

        let (worker, name) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_ne!(worker, caller);
        assert_eq!(name.as_deref(), Some("gd-test-worker"));
        assert!(dispatcher.owns_runtime());
    }

    #[test]
    fn test_blocked_tasks_do_not_queue() {
        let dispatcher = owned(Duration::from_secs(60));
        let (release_tx, release_rx) = flume::unbounded::<()>();
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let release = release_rx.clone();
            let started = Arc::clone(&started);
            dispatcher
                .execute(Box::new(move || {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _ = release.recv_timeout(Duration::from_secs(5));
                }))
                .unwrap();
        }

        // All four run concurrently, none waits behind a blocked one
        assert!(wait_for(Duration::from_secs(2), || started.load(Ordering::SeqCst) == 4));
        assert_eq!(dispatcher.in_flight(), 4);

        drop(release_tx);
        dispatcher.shutdown(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let dispatcher = owned(Duration::from_secs(60));
        dispatcher.shutdown(Duration::from_millis(100)).unwrap();

        assert!(dispatcher.is_shutdown());
        assert!(!dispatcher.owns_runtime());
        assert_eq!(
            dispatcher.execute(Box::new(|| {})),
            Err(DisposalError::DispatcherShutdown)
        );
    }

    #[test]
    fn test_shutdown_waits_for_in_flight() {
        let dispatcher = owned(Duration::from_secs(60));
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let ran = Arc::clone(&ran);
            dispatcher
                .execute(Box::new(move || {
                    thread::sleep(Duration::from_millis(10));
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        dispatcher.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 8);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn test_shutdown_timeout() {
        let dispatcher = owned(Duration::from_secs(60));
        dispatcher
            .execute(Box::new(|| thread::sleep(Duration::from_millis(500))))
            .unwrap();

        let result = dispatcher.shutdown(Duration::from_millis(20));
        assert_eq!(
            result,
            Err(DisposalError::ShutdownTimeout {
                component: "dispatcher",
                timeout: Duration::from_millis(20),
            })
        );

        // The running task still finishes
        assert!(dispatcher.shutdown(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_worker_survives_panic() {
        let dispatcher = owned(Duration::from_secs(60));
        let (tx, rx) = mpsc::channel();

        dispatcher.execute(Box::new(|| panic!("callback failure"))).unwrap();
        assert!(wait_for(Duration::from_secs(1), || dispatcher.in_flight() == 0));

        dispatcher.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_inside_async_context() {
        let dispatcher = owned(Duration::from_secs(60));
        let (tx, rx) = mpsc::channel();

        dispatcher.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        // Must not try to block on the owned runtime from async code
        assert!(dispatcher.shutdown(Duration::from_secs(1)).is_ok());
        assert!(!dispatcher.owns_runtime());
    }

    #[tokio::test]
    async fn test_drop_inside_async_context() {
        let dispatcher = owned(Duration::from_secs(60));
        drop(dispatcher);
    }
}

#[cfg(test)]
mod tokio_dispatcher_tests {
    use super::*;

    #[test]
    fn test_runs_on_blocking_pool() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let dispatcher = TokioDispatcher::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();

        dispatcher.execute(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);

        dispatcher.shutdown(Duration::from_secs(1)).unwrap();
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(
            dispatcher.execute(Box::new(|| {})),
            Err(DisposalError::DispatcherShutdown)
        );
    }

    #[test]
    fn test_panicking_task_is_contained() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dispatcher = TokioDispatcher::new(runtime.handle().clone());

        dispatcher.execute(Box::new(|| panic!("boom"))).unwrap();
        assert!(dispatcher.shutdown(Duration::from_secs(1)).is_ok());
    }
}

#[test]
fn test_panic_message() {
    let payload: Box<dyn std::any::Any + Send> = Box::new("static");
    assert_eq!(panic_message(payload.as_ref()), "static");

    let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(payload.as_ref()), "owned");

    let payload: Box<dyn std::any::Any + Send> = Box::new(3u8);
    assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
}
