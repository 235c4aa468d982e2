//! Utility functions and helper types.

use crate::core::error::Error;
use crate::core::traits::{BoxSubscriber, Subscriber};

/// Helper function to create a subscriber from three closures
pub fn subscriber_from_fn<T, N, E, C>(on_next: N, on_error: E, on_complete: C) -> BoxSubscriber<T>
where
    T: 'static,
    N: FnMut(T) + Send + 'static,
    E: FnMut(Error) + Send + 'static,
    C: FnMut() + Send + 'static,
{
    Box::new(FnSubscriber::new(on_next, on_error, on_complete))
}

/// Helper function to create a subscriber that only observes items
pub fn on_next_fn<T, N>(on_next: N) -> BoxSubscriber<T>
where
    T: 'static,
    N: FnMut(T) + Send + 'static,
{
    subscriber_from_fn(on_next, |error| tracing::debug!(%error, "unobserved error"), || {})
}

/// A subscriber created from closures
pub struct FnSubscriber<N, E, C> {
    on_next: N,
    on_error: E,
    on_complete: C,
}

impl<N, E, C> FnSubscriber<N, E, C> {
    pub fn new(on_next: N, on_error: E, on_complete: C) -> Self {
        Self {
            on_next,
            on_error,
            on_complete,
        }
    }
}

impl<T, N, E, C> Subscriber<T> for FnSubscriber<N, E, C>
where
    T: 'static,
    N: FnMut(T) + Send + 'static,
    E: FnMut(Error) + Send + 'static,
    C: FnMut() + Send + 'static,
{
    fn on_next(&mut self, item: T) {
        (self.on_next)(item)
    }

    fn on_error(&mut self, error: Error) {
        (self.on_error)(error)
    }

    fn on_complete(&mut self) {
        (self.on_complete)()
    }
}
