//! Basic usage examples for pushweld
//!
//! Run with: cargo run --example basic

use pushweld::prelude::*;
use pushweld::util::on_next_fn;

/// Example 1: Eager consumption
fn eager_example() -> Result<()> {
    println!("=== Eager Consumption ===");

    range(1, 6).subscribe_all(Box::new(PrintSink::with_prefix("Number")));

    let squares = range(1, 6).map(|x| x * x).to_vec()?;
    println!("Squares: {:?}", squares);
    Ok(())
}

/// Example 2: Consuming under explicit demand
fn demand_example() {
    println!("\n=== Demand-Driven Consumption ===");

    let sink = CollectSink::new();
    let subscription = range(0, 10).subscribe(Box::new(sink.clone()));

    subscription.request(3);
    println!("After request(3): {:?}", sink.items());

    subscription.request(0);
    println!("request(0) reported: {}", sink.errors()[0]);

    subscription.request(4);
    println!("After request(4): {:?}", sink.items());

    subscription.cancel();
    subscription.request(10);
    println!(
        "After cancel: {:?} (completed: {})",
        sink.items(),
        sink.completions() > 0
    );
}

/// Example 3: Filtering with closures
fn closure_example() {
    println!("\n=== Closure Subscribers ===");

    range(0, 20)
        .filter(|x| x % 7 == 0)
        .subscribe_all(on_next_fn(|x| println!("Multiple of 7: {}", x)));
}

/// Example 4: A generator that fails part way through
fn failure_example() {
    println!("\n=== Failure ===");

    let operator = generate(|| {
        let mut next = 0;
        move || {
            next += 1;
            if next > 3 {
                Err(Error::custom("generator ran dry"))
            } else {
                Ok(Some(next))
            }
        }
    });

    match operator.to_vec() {
        Ok(items) => println!("Unexpected success: {:?}", items),
        Err(e) => println!("Failed as expected: {}", e),
    }
}

fn main() -> Result<()> {
    eager_example()?;
    demand_example();
    closure_example();
    failure_example();
    Ok(())
}
