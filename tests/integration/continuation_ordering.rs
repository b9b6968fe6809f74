//! Continuation delivery order and exactly-once guarantees

use super::test_utils::{gated, wait_until, DeliveryLog, Outcome, DELIVERY_TIMEOUT};
use eventual::{Future, Inline, SerialQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_continuations_registered_before_completion_run_in_order() {
    let (release, operation) = gated(Outcome::success(7u32));
    let future = Future::with_context(Inline, operation);

    let log = DeliveryLog::new();
    for i in 0..100 {
        let sink = log.clone();
        future.on_complete(move |result| {
            assert_eq!(result.success_value(), Some(&7));
            sink.push(i);
        });
    }
    assert_eq!(log.len(), 0);

    release.send(()).unwrap();
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 100));
    assert_eq!(log.snapshot(), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_early_registrations_precede_late_ones() {
    let (release, operation) = gated(Outcome::success(()));
    let future = Future::with_context(Inline, operation);
    let log = DeliveryLog::new();

    for i in 0..10 {
        let sink = log.clone();
        future.on_complete(move |_| {
            thread::sleep(Duration::from_millis(1));
            sink.push(i);
        });
    }

    release.send(()).unwrap();
    future.get_result();

    // The drain started by completion may still be running; these queue behind it
    for i in 10..20 {
        let sink = log.clone();
        future.on_complete(move |_| sink.push(i));
    }

    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 20));
    assert_eq!(log.snapshot(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_registration_racing_completion_delivers_exactly_once() {
    let threads = 8;
    let per_thread = 50;
    let (release, operation) = gated(Outcome::success(1u64));
    let future = Future::with_context(Inline, operation);

    let counts: Arc<Vec<AtomicUsize>> =
        Arc::new((0..threads * per_thread).map(|_| AtomicUsize::new(0)).collect());
    let log = DeliveryLog::new();
    let barrier = Arc::new(Barrier::new(threads + 1));

    let registrars: Vec<_> = (0..threads)
        .map(|t| {
            let future = future.clone();
            let counts = Arc::clone(&counts);
            let log = log.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..per_thread {
                    let counts = Arc::clone(&counts);
                    let log = log.clone();
                    future.on_complete(move |_| {
                        counts[t * per_thread + seq].fetch_add(1, Ordering::SeqCst);
                        log.push((t, seq));
                    });
                }
            })
        })
        .collect();

    barrier.wait();
    release.send(()).unwrap();
    for registrar in registrars {
        registrar.join().unwrap();
    }

    let total = threads * per_thread;
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == total));
    thread::sleep(Duration::from_millis(20));

    for (index, count) in counts.iter().enumerate() {
        assert_eq!(
            count.load(Ordering::SeqCst),
            1,
            "continuation {} delivered wrong number of times",
            index
        );
    }

    let delivered = log.snapshot();
    assert_eq!(delivered.len(), total);
    for t in 0..threads {
        let sequence: Vec<usize> = delivered
            .iter()
            .filter(|(thread_id, _)| *thread_id == t)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(sequence, (0..per_thread).collect::<Vec<_>>());
    }
}

#[test]
fn test_continuation_registering_on_same_future_runs_after_it() {
    let queue = SerialQueue::new("ordering-reentrant").unwrap();
    let (release, operation) = gated(Outcome::success(3u8));
    let future = Future::with_context(queue, operation);
    let log = DeliveryLog::new();

    let nested_future = future.clone();
    let outer_log = log.clone();
    future.on_complete(move |_| {
        outer_log.push("first");
        let nested_log = outer_log.clone();
        nested_future.on_complete(move |_| nested_log.push("nested"));
    });
    let second_log = log.clone();
    future.on_complete(move |_| second_log.push("second"));

    release.send(()).unwrap();
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 3));
    assert_eq!(log.snapshot(), vec!["first", "second", "nested"]);
}

#[test]
fn test_panicking_continuation_does_not_stop_delivery() {
    let queue = SerialQueue::new("ordering-panic").unwrap();
    let (release, operation) = gated(Outcome::success(11u32));
    let future = Future::with_context(queue, operation);
    let log = DeliveryLog::new();

    let before = log.clone();
    future.on_complete(move |_| before.push(1));
    future.on_complete(|_| panic!("continuation blew up"));
    let after = log.clone();
    future.on_complete(move |_| after.push(2));

    release.send(()).unwrap();
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 2));
    assert_eq!(log.snapshot(), vec![1, 2]);

    // The future keeps delivering to later registrants
    let late = log.clone();
    future.on_complete(move |_| late.push(3));
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 3));
}

#[test]
fn test_independent_futures_deliver_independently() {
    let (release_a, operation_a) = gated(Outcome::success("a"));
    let (release_b, operation_b) = gated(Outcome::success("b"));
    let future_a = Future::with_context(Inline, operation_a);
    let future_b = Future::with_context(Inline, operation_b);
    let log = DeliveryLog::new();

    let sink = log.clone();
    future_a.on_complete(move |result| sink.push(*result.success_value().unwrap()));
    let sink = log.clone();
    future_b.on_complete(move |result| sink.push(*result.success_value().unwrap()));

    release_b.send(()).unwrap();
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 1));
    assert_eq!(log.snapshot(), vec!["b"]);

    release_a.send(()).unwrap();
    assert!(wait_until(DELIVERY_TIMEOUT, || log.len() == 2));
    assert_eq!(log.snapshot(), vec!["b", "a"]);
}
