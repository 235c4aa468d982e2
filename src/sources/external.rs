//! Adapter exposing a foreign push producer through the [`Operator`] contract.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::emitter::Emitter;
use crate::core::{
    BoxSubscriber, Demand, Error, Operator, Subscription, SubscriptionHandle, UNBOUNDED,
};

/// A foreign producer with its own subscribe contract.
pub trait Publisher: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Attach a subscriber. The publisher must call
    /// [`ExternalSubscriber::on_subscribe`] before any other callback.
    fn subscribe(&self, subscriber: Box<dyn ExternalSubscriber<Self::Item>>);
}

/// Callbacks a [`Publisher`] drives.
pub trait ExternalSubscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn ExternalSubscription>);

    fn on_next(&mut self, item: T);

    fn on_error(&mut self, error: Error);

    fn on_complete(&mut self);
}

/// Demand handle a [`Publisher`] hands to its subscriber.
pub trait ExternalSubscription: Send + Sync {
    fn request(&self, n: i64);

    fn cancel(&self);
}

/// Operator over a foreign [`Publisher`].
///
/// In demand mode the publisher is subscribed on the first `request` and is
/// asked for exactly one item at a time, re-requesting after each forwarded
/// value. In eager mode the publisher's full demand is requested up front.
pub struct PublisherOperator<P> {
    publisher: Arc<P>,
}

impl<P: Publisher> PublisherOperator<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher: Arc::new(publisher),
        }
    }
}

/// Bridge a foreign publisher into the engine
pub fn bridge<P: Publisher>(publisher: P) -> PublisherOperator<P> {
    PublisherOperator::new(publisher)
}

impl<P: Publisher> Operator for PublisherOperator<P> {
    type Item = P::Item;

    fn subscribe(&self, subscriber: BoxSubscriber<P::Item>) -> Subscription {
        Subscription::new(BridgeSubscription {
            publisher: self.publisher.clone(),
            state: Arc::new(BridgeState {
                demand: Demand::new(),
                emitter: Emitter::new(subscriber),
                upstream: Mutex::new(None),
                in_flight: AtomicBool::new(false),
            }),
            started: AtomicBool::new(false),
        })
    }

    fn subscribe_all(&self, subscriber: BoxSubscriber<P::Item>) {
        self.publisher.subscribe(Box::new(EagerBridge {
            emitter: Emitter::new(subscriber),
        }));
    }
}

struct BridgeState<T> {
    demand: Demand,
    emitter: Emitter<T>,
    /// Held only while the bridge is open; cleared on any terminal transition
    upstream: Mutex<Option<Arc<dyn ExternalSubscription>>>,
    /// One upstream item has been requested and not yet received
    in_flight: AtomicBool,
}

impl<T: Send + 'static> BridgeState<T> {
    fn upstream(&self) -> Option<Arc<dyn ExternalSubscription>> {
        self.upstream.lock().clone()
    }

    fn pump(&self) {
        self.demand
            .run_exclusive(|| self.pass(), || self.wants_upstream());
    }

    fn wants_upstream(&self) -> bool {
        self.demand.is_active()
            && self.emitter.is_live()
            && !self.in_flight.load(Ordering::SeqCst)
            && self.upstream.lock().is_some()
    }

    fn pass(&self) {
        if !self.emitter.is_live() || self.in_flight.load(Ordering::SeqCst) {
            return;
        }
        let Some(upstream) = self.upstream() else {
            return;
        };
        if !self.demand.try_take_one() {
            return;
        }
        self.in_flight.store(true, Ordering::SeqCst);
        upstream.request(1);
    }

    fn release_upstream(&self) -> Option<Arc<dyn ExternalSubscription>> {
        self.upstream.lock().take()
    }

    fn cancel(&self) {
        if !self.demand.cancel() {
            return;
        }
        tracing::debug!("bridge cancelled");
        self.emitter.cancel();
        if let Some(upstream) = self.release_upstream() {
            upstream.cancel();
        }
    }
}

struct BridgeSubscription<P: Publisher> {
    publisher: Arc<P>,
    state: Arc<BridgeState<P::Item>>,
    started: AtomicBool,
}

impl<P: Publisher> SubscriptionHandle for BridgeSubscription<P> {
    fn request(&self, n: i64) {
        if n <= 0 {
            self.state.emitter.violation(Error::invalid_demand(n));
            return;
        }
        if !self.state.demand.is_open() || !self.state.emitter.is_live() {
            return;
        }
        self.state.demand.add(n);
        if !self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("bridge subscribing upstream");
            self.publisher.subscribe(Box::new(BridgeSubscriber {
                state: self.state.clone(),
            }));
        }
        self.state.pump();
    }

    fn cancel(&self) {
        self.state.cancel();
    }

    fn is_open(&self) -> bool {
        self.state.demand.is_open()
    }

    fn requested(&self) -> i64 {
        self.state.demand.requested()
    }
}

struct BridgeSubscriber<T> {
    state: Arc<BridgeState<T>>,
}

impl<T: Send + 'static> ExternalSubscriber<T> for BridgeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn ExternalSubscription>) {
        if !self.state.demand.is_open() || !self.state.emitter.is_live() {
            subscription.cancel();
            return;
        }
        *self.state.upstream.lock() = Some(subscription);
        // A cancel racing the store above may have missed the handle
        if !self.state.demand.is_open() {
            if let Some(upstream) = self.state.release_upstream() {
                upstream.cancel();
            }
            return;
        }
        self.state.pump();
    }

    fn on_next(&mut self, item: T) {
        if !self.state.demand.is_open() {
            return;
        }
        self.state.in_flight.store(false, Ordering::SeqCst);
        self.state.emitter.next(item);
        self.state.pump();
    }

    fn on_error(&mut self, error: Error) {
        self.state.release_upstream();
        self.state.emitter.error(error);
    }

    fn on_complete(&mut self) {
        self.state.release_upstream();
        self.state.emitter.complete();
    }
}

struct EagerBridge<T> {
    emitter: Emitter<T>,
}

impl<T: Send + 'static> ExternalSubscriber<T> for EagerBridge<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn ExternalSubscription>) {
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, item: T) {
        self.emitter.next(item);
    }

    fn on_error(&mut self, error: Error) {
        self.emitter.error(error);
    }

    fn on_complete(&mut self) {
        self.emitter.complete();
    }
}
