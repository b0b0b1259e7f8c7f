//! Integration tests for Ripple

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use ripple::{computed, flush, observable, subscriber, Runtime};

#[test]
fn observable_integration() {
    Runtime::scope(|| {
        let count = observable(0);

        // Test read
        assert_eq!(count.get(), 0);

        // Test write
        count.set(42);
        assert_eq!(count.get(), 42);

        // Test update
        count.update(|n| *n += 10);
        assert_eq!(count.get(), 52);
    });
}

#[test]
fn computed_integration() {
    Runtime::scope(|| {
        let a = observable(5);
        let b = observable(10);

        let sum = computed({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        assert_eq!(sum.get(), 15);

        a.set(20);
        assert_eq!(sum.get(), 30);

        b.set(5);
        assert_eq!(sum.get(), 25);
    });
}

#[test]
fn complex_reactive_chain() {
    Runtime::scope(|| {
        let input = observable(1);

        let doubled = computed({
            let input = input.clone();
            move || input.get() * 2
        });

        let quadrupled = computed({
            let doubled = doubled.clone();
            move || doubled.get() * 2
        });

        assert_eq!(quadrupled.get(), 4);

        input.set(5);
        assert_eq!(quadrupled.get(), 20);
    });
}

#[test]
fn batched_propagation_notifies_once() {
    Runtime::scope(|| {
        let a = observable(0);
        let b = observable(0);

        let sum = computed({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let on_change = {
            let calls = Arc::clone(&calls);
            subscriber(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        sum.subscribe(&on_change);

        a.set(4);
        b.set(2);
        flush();

        assert_eq!(sum.get(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Re-running the same writes changes nothing and notifies no one.
        a.set(4);
        b.set(2);
        flush();

        assert_eq!(sum.get(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}
