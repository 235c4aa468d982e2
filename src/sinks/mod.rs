//! Subscriber implementations that consume a flow.
//!
//! The sinks here are cheap handles over shared state: clone one, hand the
//! clone to [`Operator::subscribe`](crate::core::Operator::subscribe) and keep
//! the original to inspect what arrived.

use parking_lot::{Condvar, Mutex};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{Error, Subscriber};

/// A subscriber that prints items to stdout.
pub struct PrintSink<T> {
    /// The prefix to print before each item
    prefix: Option<String>,
    _phantom: PhantomData<fn(T)>,
}

impl<T> PrintSink<T> {
    /// Create a new print sink
    pub fn new() -> Self {
        Self {
            prefix: None,
            _phantom: PhantomData,
        }
    }

    /// Create a new print sink with a prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for PrintSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Display + 'static> Subscriber<T> for PrintSink<T> {
    fn on_next(&mut self, item: T) {
        match &self.prefix {
            Some(prefix) => println!("{}: {}", prefix, item),
            None => println!("{}", item),
        }
    }

    fn on_error(&mut self, error: Error) {
        match &self.prefix {
            Some(prefix) => eprintln!("{}: error: {}", prefix, error),
            None => eprintln!("error: {}", error),
        }
    }

    fn on_complete(&mut self) {
        if let Some(prefix) = &self.prefix {
            println!("{}: done", prefix);
        }
    }
}

struct Collected<T> {
    items: Vec<T>,
    completions: usize,
    errors: Vec<Error>,
}

impl<T> Collected<T> {
    fn is_terminated(&self) -> bool {
        self.completions > 0 || self.errors.iter().any(|e| !e.is_protocol_violation())
    }
}

struct CollectInner<T> {
    state: Mutex<Collected<T>>,
    terminated: Condvar,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A subscriber that records every signal it receives.
///
/// It also records the highest number of callbacks that were ever running at
/// the same time, which lets tests check that delivery is serialized.
pub struct CollectSink<T> {
    inner: Arc<CollectInner<T>>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectSink<T> {
    /// Create a new collect sink
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CollectInner {
                state: Mutex::new(Collected {
                    items: Vec::new(),
                    completions: 0,
                    errors: Vec::new(),
                }),
                terminated: Condvar::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Record an item directly
    pub fn push(&self, item: T) {
        self.inner.state.lock().items.push(item);
    }

    /// Record a completion directly
    pub fn mark_complete(&self) {
        self.inner.state.lock().completions += 1;
        self.inner.terminated.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completion signals received
    pub fn completions(&self) -> usize {
        self.inner.state.lock().completions
    }

    /// Every error received, protocol violations included
    pub fn errors(&self) -> Vec<Error> {
        self.inner.state.lock().errors.clone()
    }

    /// A completion or a terminal error has arrived
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().is_terminated()
    }

    /// Block until the flow terminates or `timeout` elapses. Returns whether
    /// it terminated.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_terminated() {
            if self
                .inner
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.is_terminated();
            }
        }
        true
    }

    /// Highest number of callbacks observed running at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Clone> CollectSink<T> {
    /// Snapshot of the items received so far
    pub fn items(&self) -> Vec<T> {
        self.inner.state.lock().items.clone()
    }
}

impl<T: Send + 'static> Subscriber<T> for CollectSink<T> {
    fn on_next(&mut self, item: T) {
        self.enter();
        self.push(item);
        self.exit();
    }

    fn on_error(&mut self, error: Error) {
        self.enter();
        let terminal = !error.is_protocol_violation();
        self.inner.state.lock().errors.push(error);
        if terminal {
            self.inner.terminated.notify_all();
        }
        self.exit();
    }

    fn on_complete(&mut self) {
        self.enter();
        self.mark_complete();
        self.exit();
    }
}

/// A subscriber that only counts items.
pub struct CountSink {
    count: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
}

impl CountSink {
    /// Create a new count sink
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the current count
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Default for CountSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CountSink {
    fn clone(&self) -> Self {
        Self {
            count: self.count.clone(),
            completed: self.completed.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> for CountSink {
    fn on_next(&mut self, _item: T) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&mut self, error: Error) {
        tracing::debug!(%error, "count sink observed error");
    }

    fn on_complete(&mut self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}
