//! Counter application demonstrating observables, computeds and batching

use ripple::{computed, flush, observable, subscriber};

fn main() {
    println!("=== Reactive Counter ===\n");

    let count = observable(0);
    let step = observable(1);

    let parity = computed({
        let count = count.clone();
        move || {
            if count.get() % 2 == 0 {
                "even"
            } else {
                "odd"
            }
        }
    });

    let report = {
        let count = count.clone();
        let parity = parity.clone();
        subscriber(move || {
            println!("count = {} ({})", count.get(), parity.get());
        })
    };
    count.subscribe(&report);
    parity.subscribe(&subscriber(|| println!("  parity flipped")));

    println!("Incrementing three times in one batch:");
    for _ in 0..3 {
        let next = count.get() + step.get();
        count.set(next);
    }
    // The three staged writes collapse into a single notification.
    flush();

    println!("\nSwitching to steps of two:");
    step.set(2);
    let next = count.get() + step.get();
    count.set(next);
    flush();

    println!("\nWriting the current value again (suppressed):");
    let same = count.get();
    count.set(same);
    flush();

    println!("\nFinal count: {}", count.get());
}
