//! Core traits for the push engine.
//!
//! This module defines the fundamental abstractions: an [`Operator`] describes
//! a value source, a [`Subscriber`] receives its signals, and the
//! [`Subscription`] returned by [`Operator::subscribe`] carries explicit demand
//! from the consumer back to the producer.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::core::error::{Error, Result};
use crate::core::subscription::{Subscription, UNBOUNDED};
use crate::processors::{FlatMap, Filter, Map};
use crate::util::FnSubscriber;

/// A consumer of pushed signals.
///
/// For one subscription the callbacks are never invoked concurrently. After
/// `on_complete` or a terminal `on_error` no further calls are made. An
/// [`Error::InvalidDemand`] delivered through `on_error` is the one
/// non-terminal error: it reports a bad `request` and leaves the flow intact.
///
/// # Examples
///
/// ```rust
/// use pushweld::prelude::*;
///
/// struct Printer;
///
/// impl Subscriber<i64> for Printer {
///     fn on_next(&mut self, item: i64) {
///         println!("got {}", item);
///     }
///
///     fn on_error(&mut self, error: Error) {
///         eprintln!("failed: {}", error);
///     }
///
///     fn on_complete(&mut self) {
///         println!("done");
///     }
/// }
///
/// let subscription = range(0, 3).subscribe(Box::new(Printer));
/// subscription.request(3);
/// ```
pub trait Subscriber<T>: Send + 'static {
    /// Receive the next item
    fn on_next(&mut self, item: T);

    /// Receive an error
    fn on_error(&mut self, error: Error);

    /// The source is exhausted
    fn on_complete(&mut self);
}

/// Owned, type-erased subscriber
pub type BoxSubscriber<T> = Box<dyn Subscriber<T>>;

impl<T: 'static> Subscriber<T> for BoxSubscriber<T> {
    fn on_next(&mut self, item: T) {
        (**self).on_next(item)
    }

    fn on_error(&mut self, error: Error) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

/// A subscribable description of a value source.
///
/// Operators are stateless: every call to [`Operator::subscribe`] starts an
/// independent activation with its own [`Subscription`].
pub trait Operator: Send + Sync + 'static {
    /// The type of items this operator emits
    type Item: Send + 'static;

    /// Subscribe in demand mode. Nothing is emitted until the returned
    /// subscription receives `request(n)`.
    fn subscribe(&self, subscriber: BoxSubscriber<Self::Item>) -> Subscription;

    /// Subscribe in eager mode: emit everything, ignoring backpressure.
    fn subscribe_all(&self, subscriber: BoxSubscriber<Self::Item>) {
        self.subscribe(subscriber).request(UNBOUNDED);
    }
}

/// Owned, type-erased operator
pub type BoxOperator<T> = Box<dyn Operator<Item = T>>;

impl<T: Send + 'static> Operator for BoxOperator<T> {
    type Item = T;

    fn subscribe(&self, subscriber: BoxSubscriber<T>) -> Subscription {
        (**self).subscribe(subscriber)
    }

    fn subscribe_all(&self, subscriber: BoxSubscriber<T>) {
        (**self).subscribe_all(subscriber)
    }
}

impl<O: Operator + ?Sized> Operator for Arc<O> {
    type Item = O::Item;

    fn subscribe(&self, subscriber: BoxSubscriber<Self::Item>) -> Subscription {
        (**self).subscribe(subscriber)
    }

    fn subscribe_all(&self, subscriber: BoxSubscriber<Self::Item>) {
        (**self).subscribe_all(subscriber)
    }
}

/// Extension trait for composing and consuming operators.
pub trait OperatorExt: Operator + Sized {
    /// Subscribe in demand mode with closures
    fn subscribe_with<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Subscription
    where
        N: FnMut(Self::Item) + Send + 'static,
        E: FnMut(Error) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe(Box::new(FnSubscriber::new(on_next, on_error, on_complete)))
    }

    /// Subscribe in eager mode with closures
    fn subscribe_all_with<N, E, C>(&self, on_next: N, on_error: E, on_complete: C)
    where
        N: FnMut(Self::Item) + Send + 'static,
        E: FnMut(Error) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe_all(Box::new(FnSubscriber::new(on_next, on_error, on_complete)))
    }

    /// Map items through a function
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Item) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        Map::new(self, f)
    }

    /// Filter items with a predicate
    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        F: Fn(&Self::Item) -> bool + Send + Sync + 'static,
    {
        Filter::new(self, predicate)
    }

    /// Merge the operators produced by `f` for every item, in arrival order
    fn flat_map<F, P>(self, f: F) -> FlatMap<Self, P::Item>
    where
        F: Fn(Self::Item) -> P + Send + Sync + 'static,
        P: Operator,
    {
        FlatMap::new(self, move |item| Ok(f(item)))
    }

    /// Like [`OperatorExt::flat_map`], but the mapping function may fail.
    /// A failure is terminal for the whole flatten.
    fn try_flat_map<F, P>(self, f: F) -> FlatMap<Self, P::Item>
    where
        F: Fn(Self::Item) -> Result<P> + Send + Sync + 'static,
        P: Operator,
    {
        FlatMap::new(self, f)
    }

    /// Erase the operator type
    fn boxed(self) -> BoxOperator<Self::Item> {
        Box::new(self)
    }

    /// Eagerly collect every item, resolving when the source terminates.
    fn collect_async(&self) -> oneshot::Receiver<Result<Vec<Self::Item>>> {
        let (tx, rx) = oneshot::channel();
        self.subscribe_all(Box::new(CollectOnce {
            items: Vec::new(),
            tx: Some(tx),
        }));
        rx
    }

    /// Eagerly collect every item, blocking the calling thread.
    ///
    /// Must not be called from within an async runtime.
    fn to_vec(&self) -> Result<Vec<Self::Item>> {
        self.collect_async().blocking_recv()?
    }
}

impl<O: Operator> OperatorExt for O {}

struct CollectOnce<T> {
    items: Vec<T>,
    tx: Option<oneshot::Sender<Result<Vec<T>>>>,
}

impl<T: Send + 'static> Subscriber<T> for CollectOnce<T> {
    fn on_next(&mut self, item: T) {
        self.items.push(item);
    }

    fn on_error(&mut self, error: Error) {
        if error.is_protocol_violation() {
            return;
        }
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }

    fn on_complete(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(std::mem::take(&mut self.items)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::CollectSink;
    use crate::sources::{fail, of, range};
    use tokio_test::{assert_err, assert_ok, block_on};

    #[test]
    fn test_collect_async_resolves_on_completion() {
        let items = assert_ok!(block_on(range(0, 4).collect_async()).unwrap());
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_collect_async_resolves_on_error() {
        let receiver = fail::<u8>(Error::custom("broken")).collect_async();
        assert_err!(block_on(receiver).unwrap());
    }

    #[test]
    fn test_default_subscribe_all_requests_unbounded() {
        let sink = CollectSink::new();
        of(vec!['x', 'y']).map(|c| c.to_ascii_uppercase()).subscribe_all(Box::new(sink.clone()));
        assert_eq!(sink.items(), vec!['X', 'Y']);
        assert_eq!(sink.completions(), 1);
    }

    #[test]
    fn test_boxed_and_shared_operators() {
        let boxed: BoxOperator<i64> = range(1, 3).boxed();
        assert_eq!(boxed.to_vec().unwrap(), vec![1, 2]);

        let shared = Arc::new(range(5, 7));
        let clone = shared.clone();
        assert_eq!(clone.to_vec().unwrap(), vec![5, 6]);
        assert_eq!(shared.to_vec().unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_subscribe_all_with_closures() {
        let sink = CollectSink::new();
        let done = sink.clone();
        let seen = sink.clone();
        range(0, 3).subscribe_all_with(move |v| seen.push(v), |_| {}, move || done.mark_complete());
        assert_eq!(sink.items(), vec![0, 1, 2]);
        assert_eq!(sink.completions(), 1);
    }
}
