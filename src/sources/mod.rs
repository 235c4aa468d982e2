//! Operator implementations that originate values.
//!
//! Synchronous sources ([`RangeOperator`], [`CursorOperator`],
//! [`GeneratorOperator`]) produce on whichever thread calls `request`.
//! Asynchronous sources are adapted through the [`bridge`] operator over the
//! [`Publisher`] contract: a [`PushQueue`] fed by a background thread, or a
//! [`ProducerPublisher`] driving an async [`Producer`] on a tokio runtime.

mod external;
mod producer;
mod pull;
mod push;

pub use external::{bridge, ExternalSubscriber, ExternalSubscription, Publisher, PublisherOperator};
pub use producer::{Producer, ProducerPublisher, StreamProducer};
pub use push::{push_queue, PushHandle, PushQueue};

use crate::core::{BoxSubscriber, Error, Operator, Result, Subscription};
use crate::cursors::{Copyable, Cursor, IterCursor, RangeCursor, VecCursor};
use pull::{CursorPull, GeneratorPull, PullSubscription};

/// An operator that emits the integers `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOperator {
    start: i64,
    end: i64,
}

impl RangeOperator {
    /// Create a new range operator over the half-open range `start..end`
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of items one activation emits
    pub fn len(&self) -> u64 {
        if self.end > self.start {
            self.end.abs_diff(self.start)
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Operator for RangeOperator {
    type Item = i64;

    fn subscribe(&self, subscriber: BoxSubscriber<i64>) -> Subscription {
        PullSubscription::start(
            CursorPull(RangeCursor::new(self.start, self.end)),
            subscriber,
        )
    }

    fn subscribe_all(&self, mut subscriber: BoxSubscriber<i64>) {
        for value in self.start..self.end {
            subscriber.on_next(value);
        }
        subscriber.on_complete();
    }
}

/// Create an operator emitting `start..end`
pub fn range(start: i64, end: i64) -> RangeOperator {
    RangeOperator::new(start, end)
}

/// An operator that replays a cursor.
///
/// Every subscription traverses its own copy, so the operator itself never
/// changes position.
#[derive(Debug)]
pub struct CursorOperator<C> {
    cursor: C,
}

impl<C> CursorOperator<C>
where
    C: Copyable + Send + Sync + 'static,
    C::Item: Send + 'static,
{
    pub fn new(cursor: C) -> Self {
        Self { cursor }
    }
}

impl<C> Operator for CursorOperator<C>
where
    C: Copyable + Send + Sync + 'static,
    C::Item: Send + 'static,
{
    type Item = C::Item;

    fn subscribe(&self, subscriber: BoxSubscriber<C::Item>) -> Subscription {
        PullSubscription::start(CursorPull(self.cursor.copy()), subscriber)
    }

    fn subscribe_all(&self, mut subscriber: BoxSubscriber<C::Item>) {
        let mut cursor = self.cursor.copy();
        cursor.for_each_remaining(&mut |item| subscriber.on_next(item));
        subscriber.on_complete();
    }
}

/// Create an operator that replays `cursor` for every subscriber
pub fn from_cursor<C>(cursor: C) -> CursorOperator<C>
where
    C: Copyable + Send + Sync + 'static,
    C::Item: Send + 'static,
{
    CursorOperator::new(cursor)
}

/// Create an operator from a cloneable iterator
pub fn from_iter<I>(items: I) -> CursorOperator<IterCursor<I::IntoIter>>
where
    I: IntoIterator,
    I::IntoIter: Clone + Send + Sync + 'static,
    I::Item: Send + 'static,
{
    CursorOperator::new(IterCursor::new(items))
}

/// Create an operator emitting the given items
pub fn of<T>(items: Vec<T>) -> CursorOperator<VecCursor<T>>
where
    T: Clone + Send + Sync + 'static,
{
    CursorOperator::new(VecCursor::new(items))
}

/// Create an operator that completes without emitting
pub fn empty<T>() -> CursorOperator<VecCursor<T>>
where
    T: Clone + Send + Sync + 'static,
{
    of(Vec::new())
}

/// An operator backed by a fallible generator function.
///
/// Each subscription builds a fresh generator from the factory. The generator
/// returns `Ok(Some(item))` to emit, `Ok(None)` when exhausted, and `Err` to
/// fail the subscription.
pub struct GeneratorOperator<F> {
    factory: F,
}

impl<F, G, T> Operator for GeneratorOperator<F>
where
    F: Fn() -> G + Send + Sync + 'static,
    G: FnMut() -> Result<Option<T>> + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    fn subscribe(&self, subscriber: BoxSubscriber<T>) -> Subscription {
        PullSubscription::start(GeneratorPull((self.factory)()), subscriber)
    }
}

/// Create an operator from a generator factory
pub fn generate<F, G, T>(factory: F) -> GeneratorOperator<F>
where
    F: Fn() -> G + Send + Sync + 'static,
    G: FnMut() -> Result<Option<T>> + Send + 'static,
    T: Send + 'static,
{
    GeneratorOperator { factory }
}

/// Create an operator that fails with `error` on first demand
pub fn fail<T>(error: Error) -> impl Operator<Item = T>
where
    T: Send + 'static,
{
    generate(move || {
        let error = error.clone();
        move || Err(error.clone())
    })
}
