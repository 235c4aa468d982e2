//! Flattening children driven from background threads and an async runtime
//!
//! Run with: cargo run --example flatten

use std::thread;
use std::time::Duration;

use pushweld::prelude::*;

/// Example 1: Synchronous children
fn sync_children() -> Result<()> {
    println!("=== Synchronous Children ===");

    let items = range(1, 4).flat_map(|i| range(0, i)).to_vec()?;
    println!("Merged: {:?}", items);
    Ok(())
}

/// Example 2: Children fed by background threads
fn threaded_children() {
    println!("\n=== Threaded Children ===");

    let sink = CollectSink::new();
    range(0, 3)
        .flat_map(|child| {
            let (handle, operator) = push_queue();
            thread::spawn(move || {
                for i in 0..3 {
                    thread::sleep(Duration::from_millis(5 * (child as u64 + 1)));
                    handle.push(format!("child {} item {}", child, i));
                }
                handle.complete();
            });
            operator
        })
        .subscribe_all(Box::new(sink.clone()));

    sink.wait(Duration::from_secs(5));
    for item in sink.items() {
        println!("{}", item);
    }
}

/// Example 3: Children produced by async tasks, limited to two at a time
fn async_children() -> Result<()> {
    println!("\n=== Async Children ===");

    let runtime = tokio::runtime::Runtime::new().map_err(Error::producer)?;
    let handle = runtime.handle().clone();

    let items = range(0, 4)
        .flat_map(move |i| {
            bridge(ProducerPublisher::new(handle.clone(), move || {
                StreamProducer::new(Box::pin(futures::stream::iter(vec![i * 10, i * 10 + 1])))
            }))
        })
        .max_concurrency(2)
        .to_vec()?;

    println!("Collected {} items: {:?}", items.len(), items);
    Ok(())
}

fn main() -> Result<()> {
    sync_children()?;
    threaded_children();
    async_children()?;
    Ok(())
}
