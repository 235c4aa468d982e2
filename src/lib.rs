//! # Push-based streaming with demand-driven backpressure
//!
//! This crate lets a producer be consumed either eagerly or under explicit
//! numeric demand, composes lazy pull cursors underneath it, and merges many
//! independently driven child producers with an asynchronous flatten.
//!
//! ## Core Concepts
//!
//! - **Operator**: a stateless, subscribable description of a value source
//! - **Subscription**: the live binding to one consumer; carries `request(n)`
//!   and `cancel()` back to the producer
//! - **Subscriber**: receives `on_next`, `on_error` and `on_complete`, never
//!   concurrently for one subscription
//! - **Cursor**: a pull-based traversal with optional copy and reverse
//!   capabilities
//! - **FlatMap**: merges one child operator per outer item in arrival order
//!
//! ## Example
//!
//! ```rust
//! use pushweld::prelude::*;
//!
//! let sink = CollectSink::new();
//! let subscription = range(0, 10).subscribe(Box::new(sink.clone()));
//! subscription.request(3);
//! assert_eq!(sink.items(), vec![0, 1, 2]);
//!
//! let merged = of(vec![1, 2, 3])
//!     .flat_map(|i| range(0, i))
//!     .to_vec()
//!     .unwrap();
//! assert_eq!(merged.len(), 6);
//! ```

pub mod core;
pub mod cursors;
pub mod processors;
pub mod sinks;
pub mod sources;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::core::{
        BoxOperator, BoxSubscriber, Error, IntoError, Operator, OperatorExt, Result, Subscriber,
        Subscription, UNBOUNDED,
    };
    pub use crate::cursors::{
        Copyable, Cursor, CursorExt, IterCursor, RangeCursor, Reversible, VecCursor,
    };
    pub use crate::processors::{FlatMap, FlattenConfig};
    pub use crate::sinks::{CollectSink, CountSink, PrintSink};
    pub use crate::sources::{
        bridge, empty, fail, from_cursor, from_iter, generate, of, push_queue, range,
        ExternalSubscriber, ExternalSubscription, Producer, ProducerPublisher, Publisher,
        PushHandle, StreamProducer,
    };
    pub use crate::util::subscriber_from_fn;
}

// Re-export main error type
pub use crate::core::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
