mod common;

use common::{count, counter, disposal, increment, wait_for, DELIVERY_BOUND, THREE_CYCLES};
use garbage_disposal::{
    Dispatcher, DisposalConfig, DisposalError, ObjectId, Result, Task, TokioDispatcher,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread;
use std::time::Duration;

/// Dispatcher that counts submissions before delegating
struct CountingDispatcher {
    inner: TokioDispatcher,
    submitted: AtomicUsize,
}

impl CountingDispatcher {
    fn new() -> Arc<Self> {
        let config = DisposalConfig::new().with_thread_name("gd-counting");
        Arc::new(Self {
            inner: TokioDispatcher::from_config(&config).unwrap(),
            submitted: AtomicUsize::new(0),
        })
    }
}

impl Dispatcher for CountingDispatcher {
    fn execute(&self, task: Task) -> Result<()> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(task)
    }

    fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.inner.shutdown(timeout)
    }
}

#[test]
fn test_callback_runs_once_after_reclamation() {
    let disposal = disposal();
    let runs = counter();

    let target = Arc::new(String::from("A"));
    disposal.decorate(&target, increment(&runs)).unwrap();

    drop(target);
    disposal.collect();

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&runs), 1);
    assert!(disposal.registry().is_empty());
}

#[test]
fn test_reclamation_detected_without_collect() {
    let disposal = disposal();
    let runs = counter();

    let target = Arc::new(42u32);
    disposal.decorate(&target, increment(&runs)).unwrap();
    drop(target);

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
}

#[test]
fn test_callback_waits_for_last_strong_reference() {
    let disposal = disposal();
    let runs = counter();

    let target = Arc::new(vec![0u8; 32]);
    let second = Arc::clone(&target);
    disposal.decorate(&target, increment(&runs)).unwrap();

    drop(target);
    disposal.collect();
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&runs), 0);

    drop(second);
    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
}

#[test]
fn test_undecorate_prevents_callback() {
    let disposal = disposal();
    let runs = counter();

    let target = Arc::new("B");
    disposal.decorate(&target, increment(&runs)).unwrap();
    disposal.undecorate(&target).unwrap();
    assert!(!disposal.is_decorated(&target));

    drop(target);
    disposal.collect();
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&runs), 0);
}

#[test]
fn test_redecorate_only_latest_runs() {
    let disposal = disposal();
    let first = counter();
    let second = counter();

    let target = Arc::new(7i32);
    disposal.decorate(&target, increment(&first)).unwrap();
    disposal.decorate(&target, increment(&second)).unwrap();

    drop(target);
    assert!(wait_for(DELIVERY_BOUND, || count(&second) == 1));
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&first), 0);
    assert_eq!(count(&second), 1);
}

#[test]
fn test_decorate_dangling_weak_fails() {
    let disposal = disposal();
    let dangling: Weak<u64> = Weak::new();

    let result = disposal.decorate(&dangling, || {});
    assert!(matches!(result, Err(DisposalError::Precondition(_))));
    assert!(matches!(disposal.undecorate(&dangling), Err(DisposalError::Precondition(_))));
}

#[test]
fn test_undecorate_unknown_target_is_ok() {
    let disposal = disposal();
    let target = Arc::new(());
    assert!(disposal.undecorate(&target).is_ok());
}

#[test]
fn test_concurrent_decorations_all_delivered() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let disposal = Arc::new(disposal());
    let runs = counter();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let disposal = Arc::clone(&disposal);
            let runs = Arc::clone(&runs);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let target = Arc::new(t * PER_THREAD + i);
                    disposal.decorate(&target, increment(&runs)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let total = THREADS * PER_THREAD;
    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == total));
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&runs), total);
    assert!(disposal.registry().is_empty());
}

#[test]
fn test_panicking_callback_does_not_stop_delivery() {
    let disposal = disposal();
    let runs = counter();

    let failing = Arc::new(1u8);
    disposal
        .decorate(&failing, || panic!("callback failure"))
        .unwrap();
    drop(failing);
    thread::sleep(THREE_CYCLES);

    let healthy = Arc::new(2u8);
    disposal.decorate(&healthy, increment(&runs)).unwrap();
    drop(healthy);

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
}

#[test]
fn test_decorate_with_hash_passes_identity() {
    let disposal = disposal();
    let (tx, rx) = mpsc::channel();

    let target = Arc::new(String::from("hashed"));
    let expected = ObjectId::of(&target);
    disposal
        .decorate_with_hash(&target, move |object| tx.send(object).unwrap())
        .unwrap();
    drop(target);

    assert_eq!(rx.recv_timeout(DELIVERY_BOUND).unwrap(), expected);
}

#[test]
fn test_custom_dispatcher_is_used() {
    let disposal = disposal();
    let dispatcher = CountingDispatcher::new();
    let runs = counter();

    let target = Arc::new([1u32; 4]);
    disposal
        .decorate_with(&target, increment(&runs), dispatcher.clone())
        .unwrap();
    drop(target);

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
    assert_eq!(dispatcher.submitted.load(Ordering::SeqCst), 1);
    dispatcher.shutdown(Duration::from_secs(1)).unwrap();
}

#[test]
fn test_shut_down_dispatcher_drops_callback() {
    let disposal = disposal();
    let dispatcher = CountingDispatcher::new();
    let dropped = counter();
    let runs = counter();

    let target = Arc::new(0u8);
    disposal
        .decorate_with(&target, increment(&dropped), dispatcher.clone())
        .unwrap();
    dispatcher.shutdown(Duration::from_secs(1)).unwrap();
    drop(target);
    disposal.collect();

    // Later notifications on the default dispatcher still flow
    let other = Arc::new(1u8);
    disposal.decorate(&other, increment(&runs)).unwrap();
    drop(other);

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
    assert_eq!(dispatcher.submitted.load(Ordering::SeqCst), 1);
    assert_eq!(count(&dropped), 0);
}

#[test]
fn test_shutdown_stops_delivery_and_rejects_decorate() {
    let disposal = disposal();
    let runs = counter();

    let target = Arc::new(5u64);
    disposal.decorate(&target, increment(&runs)).unwrap();

    disposal.shutdown();
    assert!(disposal.is_shut_down());
    assert!(disposal.default_dispatcher().unwrap().is_shutdown());

    drop(target);
    disposal.collect();
    thread::sleep(THREE_CYCLES);
    assert_eq!(count(&runs), 0);

    let late = Arc::new(6u64);
    assert!(matches!(
        disposal.decorate(&late, || {}),
        Err(DisposalError::Precondition(_))
    ));

    // Idempotent
    disposal.shutdown();
}

#[test]
fn test_slow_callback_does_not_delay_others() {
    let disposal = disposal();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let runs = counter();

    let slow = Arc::new("slow");
    disposal
        .decorate(&slow, move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        })
        .unwrap();
    drop(slow);
    disposal.collect();

    let fast = Arc::new("fast");
    disposal.decorate(&fast, increment(&runs)).unwrap();
    drop(fast);

    assert!(wait_for(DELIVERY_BOUND, || count(&runs) == 1));
    release_tx.send(()).unwrap();
}
