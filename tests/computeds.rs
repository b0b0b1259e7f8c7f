//! Computed behavior: activation, caching, dependency rewiring.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use ripple::{computed, flush, observable, subscriber, Runtime};

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

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn the_value_is_readable_without_subscribing() {
    Runtime::scope(|| {
        let name = observable("Jane Doe".to_string());

        let greeting = computed({
            let name = name.clone();
            move || format!("Hello, {}", name.get())
        });

        assert_eq!(greeting.get(), "Hello, Jane Doe");
    });
}

#[test]
fn subscribed_computeds_follow_their_dependencies() {
    Runtime::scope(|| {
        let name = observable("Jane Doe".to_string());

        let greeting = computed({
            let name = name.clone();
            move || format!("Hello, {}", name.get())
        });

        let (on_change, calls) = counting_subscriber();
        greeting.subscribe(&on_change);

        name.set("John Doe".to_string());
        flush();

        assert_eq!(greeting.get(), "Hello, John Doe");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn nested_chains_recompute_a_minimal_number_of_times() {
    Runtime::scope(|| {
        let a = observable(0);
        let b = observable(0);

        let sum_runs = counter();
        let sum = computed({
            let a = a.clone();
            let b = b.clone();
            let sum_runs = Arc::clone(&sum_runs);
            move || {
                sum_runs.fetch_add(1, Ordering::SeqCst);
                a.get() + b.get()
            }
        });

        let product_runs = counter();
        let product = computed({
            let a = a.clone();
            let b = b.clone();
            let product_runs = Arc::clone(&product_runs);
            move || {
                product_runs.fetch_add(1, Ordering::SeqCst);
                a.get() * b.get()
            }
        });

        let output_runs = counter();
        let output = computed({
            let a = a.clone();
            let b = b.clone();
            let sum = sum.clone();
            let product = product.clone();
            let output_runs = Arc::clone(&output_runs);
            move || {
                output_runs.fetch_add(1, Ordering::SeqCst);
                format!(
                    "a: {}, b: {}, sum: {}, product: {}",
                    a.get(),
                    b.get(),
                    sum.get(),
                    product.get()
                )
            }
        });

        let (sum_sub, sum_calls) = counting_subscriber();
        sum.subscribe(&sum_sub);

        let (output_sub, output_calls) = counting_subscriber();
        output.subscribe(&output_sub);

        // Subscribing to sum computes it once; subscribing to output
        // computes output and the not-yet-active product, while sum is
        // served from its cache.
        assert_eq!(sum_runs.load(Ordering::SeqCst), 1);
        assert_eq!(product_runs.load(Ordering::SeqCst), 1);
        assert_eq!(output_runs.load(Ordering::SeqCst), 1);

        a.set(4);
        b.set(2);
        flush();

        assert_eq!(output.get(), "a: 4, b: 2, sum: 6, product: 8");
        assert_eq!(sum_calls.load(Ordering::SeqCst), 1);
        assert_eq!(output_calls.load(Ordering::SeqCst), 1);

        // One recompute each for the batched update.
        assert_eq!(sum_runs.load(Ordering::SeqCst), 2);
        assert_eq!(product_runs.load(Ordering::SeqCst), 2);
        assert_eq!(output_runs.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn unsubscribing_deactivates_and_recomputes_on_demand() {
    Runtime::scope(|| {
        let a = observable(0);
        let b = observable(0);

        let output_runs = counter();
        let output = computed({
            let a = a.clone();
            let b = b.clone();
            let output_runs = Arc::clone(&output_runs);
            move || {
                output_runs.fetch_add(1, Ordering::SeqCst);
                a.get() + b.get()
            }
        });

        let (output_sub, _calls) = counting_subscriber();
        output.subscribe(&output_sub);
        assert_eq!(output_runs.load(Ordering::SeqCst), 1);

        output.unsubscribe(&output_sub);

        a.set(4);
        b.set(2);
        flush();

        // Inactive: every direct read recomputes fresh.
        assert_eq!(output.get(), 6);
        assert_eq!(output.get(), 6);
        assert_eq!(output_runs.load(Ordering::SeqCst), 3);
    });
}

#[test]
fn conditional_dependencies_are_rewired() {
    Runtime::scope(|| {
        let choice = observable("a");
        let a = observable("value a");
        let b = observable("value b");
        let c = observable("value c");

        let conditional = computed({
            let choice = choice.clone();
            let a = a.clone();
            let b = b.clone();
            let c = c.clone();
            move || match choice.get() {
                "a" => a.get(),
                "b" => b.get(),
                _ => c.get(),
            }
        });

        let (on_change, calls) = counting_subscriber();
        conditional.subscribe(&on_change);

        assert_eq!(conditional.get(), "value a");

        choice.set("b");
        flush();

        assert_eq!(conditional.get(), "value b");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // No longer read: writing `a` must not notify.
        a.set("updated a");
        flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Newly read: writing `b` must notify.
        b.set("updated b");
        flush();
        assert_eq!(conditional.get(), "updated b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn unchanged_recomputations_do_not_notify() {
    Runtime::scope(|| {
        let n = observable(1);

        let parity = computed({
            let n = n.clone();
            move || n.get() % 2
        });

        let (on_change, calls) = counting_subscriber();
        parity.subscribe(&on_change);

        // 1 -> 3 changes n but not the derived parity.
        n.set(3);
        flush();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        n.set(4);
        flush();
        assert_eq!(parity.get(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}
