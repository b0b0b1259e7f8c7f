//! Observable behavior: staged writes, subscriptions, batching.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use ripple::{flush, observable, subscriber, Runtime};

fn counting_subscriber() -> (ripple::Subscriber, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = Arc::clone(&calls);
        subscriber(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };
    (counted, calls)
}

#[test]
fn returns_the_initial_value_until_updated() {
    Runtime::scope(|| {
        let v = observable("foo");
        assert_eq!(v.get(), "foo");

        v.set("bar");
        assert_eq!(v.get(), "bar");
    });
}

#[test]
fn notifies_subscribers_on_flush() {
    Runtime::scope(|| {
        let v = observable("foo");

        let (on_change, calls) = counting_subscriber();
        v.subscribe(&on_change);

        v.set("bar");

        // Staged, not yet delivered.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        flush();

        assert_eq!(v.get(), "bar");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn unsubscribed_subscribers_are_not_notified() {
    Runtime::scope(|| {
        let v = observable("foo");

        let (on_change, calls) = counting_subscriber();
        v.subscribe(&on_change);
        v.unsubscribe(&on_change);

        v.set("bar");
        flush();

        assert_eq!(v.get(), "bar");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    });
}

#[test]
fn a_shared_subscriber_is_notified_once_per_flush() {
    Runtime::scope(|| {
        let v1 = observable("v1");
        let v2 = observable("v2");

        let (on_change, calls) = counting_subscriber();
        v1.subscribe(&on_change);
        v2.subscribe(&on_change);

        v1.set("updated");
        v2.set("updated");
        flush();

        assert_eq!(v1.get(), "updated");
        assert_eq!(v2.get(), "updated");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn writes_after_a_flush_form_a_second_batch() {
    Runtime::scope(|| {
        let v1 = observable("v1");
        let v2 = observable("v2");

        let (on_change, calls) = counting_subscriber();
        v1.subscribe(&on_change);
        v2.subscribe(&on_change);

        v1.set("updated");
        flush();

        assert_eq!(v1.get(), "updated");
        assert_eq!(v2.get(), "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        v2.set("updated");
        flush();

        assert_eq!(v2.get(), "updated");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn equal_writes_replace_the_value_without_propagating() {
    Runtime::scope(|| {
        let v = observable(0);

        let (on_change, calls) = counting_subscriber();
        v.subscribe(&on_change);

        v.set(7);
        flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Equal under the default PartialEq equality: stored but silent.
        v.set(7);
        flush();
        assert_eq!(v.get(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn reads_inside_a_write_see_the_new_value() {
    Runtime::scope(|| {
        let v = observable(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = {
            let v = v.clone();
            let seen = Arc::clone(&seen);
            subscriber(move || {
                seen.lock().unwrap().push(v.get());
            })
        };
        v.subscribe(&record);

        v.set(2);
        flush();
        v.set(3);
        flush();

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    });
}
