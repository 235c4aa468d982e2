//! Operators derived from other operators.
//!
//! [`Map`] and [`Filter`] wrap a single upstream and pass its subscription
//! through. [`FlatMap`] merges one child operator per upstream item.

mod flat_map;

pub use flat_map::{FlatMap, FlattenConfig};

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use crate::core::{BoxSubscriber, Error, Operator, Subscriber, Subscription};

/// An operator that maps items through a function.
///
/// Demand passes through unchanged: one upstream item per downstream item.
pub struct Map<O, F> {
    upstream: O,
    f: Arc<F>,
}

impl<O, F> Map<O, F> {
    /// Create a new map operator
    pub fn new(upstream: O, f: F) -> Self {
        Self {
            upstream,
            f: Arc::new(f),
        }
    }
}

impl<O, F, U> Operator for Map<O, F>
where
    O: Operator,
    F: Fn(O::Item) -> U + Send + Sync + 'static,
    U: Send + 'static,
{
    type Item = U;

    fn subscribe(&self, subscriber: BoxSubscriber<U>) -> Subscription {
        self.upstream.subscribe(Box::new(MapSubscriber {
            f: self.f.clone(),
            downstream: subscriber,
            _input: PhantomData,
        }))
    }

    fn subscribe_all(&self, subscriber: BoxSubscriber<U>) {
        self.upstream.subscribe_all(Box::new(MapSubscriber {
            f: self.f.clone(),
            downstream: subscriber,
            _input: PhantomData,
        }))
    }
}

struct MapSubscriber<F, T, U> {
    f: Arc<F>,
    downstream: BoxSubscriber<U>,
    _input: PhantomData<fn(T)>,
}

impl<F, T, U> Subscriber<T> for MapSubscriber<F, T, U>
where
    F: Fn(T) -> U + Send + Sync + 'static,
    T: 'static,
    U: 'static,
{
    fn on_next(&mut self, item: T) {
        self.downstream.on_next((self.f)(item));
    }

    fn on_error(&mut self, error: Error) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

/// An operator that drops items failing a predicate.
///
/// In demand mode every dropped item is replaced by requesting one more from
/// upstream, so the consumer still receives what it asked for.
pub struct Filter<O, P> {
    upstream: O,
    predicate: Arc<P>,
}

impl<O, P> Filter<O, P> {
    /// Create a new filter operator
    pub fn new(upstream: O, predicate: P) -> Self {
        Self {
            upstream,
            predicate: Arc::new(predicate),
        }
    }
}

impl<O, P> Operator for Filter<O, P>
where
    O: Operator,
    P: Fn(&O::Item) -> bool + Send + Sync + 'static,
{
    type Item = O::Item;

    fn subscribe(&self, subscriber: BoxSubscriber<O::Item>) -> Subscription {
        let slot = Arc::new(OnceLock::new());
        let subscription = self.upstream.subscribe(Box::new(FilterSubscriber {
            predicate: self.predicate.clone(),
            downstream: subscriber,
            upstream: Some(slot.clone()),
        }));
        let _ = slot.set(subscription.clone());
        subscription
    }

    fn subscribe_all(&self, subscriber: BoxSubscriber<O::Item>) {
        self.upstream.subscribe_all(Box::new(FilterSubscriber {
            predicate: self.predicate.clone(),
            downstream: subscriber,
            upstream: None,
        }))
    }
}

struct FilterSubscriber<P, T> {
    predicate: Arc<P>,
    downstream: BoxSubscriber<T>,
    /// Absent in eager mode, where there is no demand to compensate
    upstream: Option<Arc<OnceLock<Subscription>>>,
}

impl<P, T> Subscriber<T> for FilterSubscriber<P, T>
where
    P: Fn(&T) -> bool + Send + Sync + 'static,
    T: Send + 'static,
{
    fn on_next(&mut self, item: T) {
        if (self.predicate)(&item) {
            self.downstream.on_next(item);
            return;
        }
        if let Some(subscription) = self.upstream.as_ref().and_then(|slot| slot.get()) {
            subscription.request(1);
        }
    }

    fn on_error(&mut self, error: Error) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}
