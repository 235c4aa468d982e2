//! The demand-driven production loop shared by synchronous sources.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::emitter::Emitter;
use crate::core::{BoxSubscriber, Demand, Error, Result, Subscription, SubscriptionHandle};
use crate::cursors::Cursor;

/// A synchronous source of items that may fail.
pub(crate) trait Pull: Send + 'static {
    type Item: Send + 'static;

    /// Produce the next item, `None` once exhausted
    fn pull(&mut self) -> Result<Option<Self::Item>>;

    /// True when the source knows it has nothing left without pulling
    fn is_exhausted(&self) -> bool {
        false
    }
}

pub(crate) struct CursorPull<C>(pub(crate) C);

impl<C> Pull for CursorPull<C>
where
    C: Cursor + Send + 'static,
    C::Item: Send + 'static,
{
    type Item = C::Item;

    fn pull(&mut self) -> Result<Option<C::Item>> {
        let mut slot = None;
        self.0.try_advance(&mut |item| slot = Some(item));
        Ok(slot)
    }

    fn is_exhausted(&self) -> bool {
        self.0.is_known_exhausted()
    }
}

pub(crate) struct GeneratorPull<G>(pub(crate) G);

impl<G, T> Pull for GeneratorPull<G>
where
    G: FnMut() -> Result<Option<T>> + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    fn pull(&mut self) -> Result<Option<T>> {
        (self.0)()
    }
}

/// Subscription that pulls from a synchronous source on whichever thread
/// signals demand.
pub(crate) struct PullSubscription<P: Pull> {
    demand: Demand,
    /// Only locked by the owner of the pass guard
    source: Mutex<P>,
    finished: AtomicBool,
    emitter: Emitter<P::Item>,
}

impl<P: Pull> PullSubscription<P> {
    pub(crate) fn start(source: P, subscriber: BoxSubscriber<P::Item>) -> Subscription {
        Subscription::new(Self {
            demand: Demand::new(),
            source: Mutex::new(source),
            finished: AtomicBool::new(false),
            emitter: Emitter::new(subscriber),
        })
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn drain(&self) {
        self.demand.run_exclusive(
            || self.pass(),
            || self.demand.is_active() && !self.is_finished(),
        );
    }

    /// Emit while demand lasts. Cancellation is checked between items.
    fn pass(&self) {
        let mut source = self.source.lock();
        loop {
            if !self.demand.is_open() || self.is_finished() {
                return;
            }
            if source.is_exhausted() {
                self.finish(None);
                return;
            }
            // Unbounded demand is never decremented here
            if !self.demand.try_take_one() {
                return;
            }
            match source.pull() {
                Ok(Some(item)) => self.emitter.next(item),
                Ok(None) => {
                    self.finish(None);
                    return;
                }
                Err(error) => {
                    self.finish(Some(error));
                    return;
                }
            }
        }
    }

    fn finish(&self, error: Option<Error>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        match error {
            Some(error) => {
                self.emitter.error(error);
            }
            None => {
                self.emitter.complete();
            }
        }
    }
}

impl<P: Pull> SubscriptionHandle for PullSubscription<P> {
    fn request(&self, n: i64) {
        if n <= 0 {
            self.emitter.violation(Error::invalid_demand(n));
            return;
        }
        if !self.demand.is_open() || self.is_finished() {
            return;
        }
        self.demand.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if self.demand.cancel() {
            tracing::debug!("pull subscription cancelled");
            self.emitter.cancel();
        }
    }

    fn is_open(&self) -> bool {
        self.demand.is_open()
    }

    fn requested(&self) -> i64 {
        self.demand.requested()
    }
}
