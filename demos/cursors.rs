//! Composing lazy cursors
//!
//! Run with: cargo run --example cursors

use std::time::Duration;

use pushweld::prelude::*;

fn main() -> Result<()> {
    println!("=== Empty Substitution ===");
    let empty = from_cursor(VecCursor::<&str>::new(vec![]).on_empty("nothing here"));
    println!("{:?}", empty.to_vec()?);

    println!("\n=== Reversal ===");
    let native = RangeCursor::new(0, 5).reversed();
    println!("native:       {:?}", native.into_iterator().collect::<Vec<_>>());
    let materialized = IterCursor::new("abc".chars()).reversed();
    println!("materialized: {:?}", materialized.into_iterator().collect::<String>());

    println!("\n=== Forking ===");
    let mut cursor = VecCursor::new(vec![1, 2, 3, 4]);
    cursor.try_advance(&mut |v| println!("consumed {}", v));
    let fork = cursor.copy();
    println!("original: {:?}", cursor.into_iterator().collect::<Vec<_>>());
    println!("fork:     {:?}", fork.into_iterator().collect::<Vec<_>>());

    println!("\n=== Time Limit ===");
    let ticking = IterCursor::new((0u64..).map(|v| {
        std::thread::sleep(Duration::from_millis(1));
        v
    }));
    let limited = from_cursor(ticking.limit_while_time(Duration::from_millis(20)));
    println!("emitted {} items in 20ms", limited.to_vec()?.len());

    Ok(())
}
