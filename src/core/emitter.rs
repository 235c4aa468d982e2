//! Serialized delivery of signals to one consumer.
//!
//! Producers on any thread hand signals to an [`Emitter`]; whichever thread
//! finds the emitter idle drains the queue and calls the consumer. Calls made
//! from inside a consumer callback (re-entrant `request`, a child emitting
//! while its parent is delivering) only enqueue, so the consumer never sees
//! two overlapping callbacks and no lock is held while it runs except the
//! consumer slot, which only the draining thread touches.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::error::Error;
use crate::core::traits::BoxSubscriber;

enum Signal<T> {
    Next(T),
    Error(Error),
    Complete,
    /// Non-terminal error report (invalid demand)
    Violation(Error),
}

pub(crate) struct Emitter<T> {
    queue: Mutex<VecDeque<Signal<T>>>,
    wip: AtomicUsize,
    subscriber: Mutex<Option<BoxSubscriber<T>>>,
    done: AtomicBool,
    cancelled: AtomicBool,
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(subscriber: BoxSubscriber<T>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            wip: AtomicUsize::new(0),
            subscriber: Mutex::new(Some(subscriber)),
            done: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// A terminal signal has been accepted
    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Neither terminated nor cancelled
    pub(crate) fn is_live(&self) -> bool {
        !self.is_done() && !self.is_cancelled()
    }

    pub(crate) fn next(&self, item: T) {
        if !self.is_live() {
            return;
        }
        self.queue.lock().push_back(Signal::Next(item));
        self.drain();
    }

    /// Accept the terminal error. Returns false if a terminal signal was
    /// already accepted or the consumer cancelled.
    pub(crate) fn error(&self, error: Error) -> bool {
        if self.is_cancelled() || self.done.swap(true, Ordering::SeqCst) {
            tracing::trace!(%error, "dropping error after terminal signal");
            return false;
        }
        self.queue.lock().push_back(Signal::Error(error));
        self.drain();
        true
    }

    /// Accept the completion signal. Same rules as [`Emitter::error`].
    pub(crate) fn complete(&self) -> bool {
        if self.is_cancelled() || self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.queue.lock().push_back(Signal::Complete);
        self.drain();
        true
    }

    /// Report a protocol violation without terminating the subscription.
    pub(crate) fn violation(&self, error: Error) {
        if !self.is_live() {
            return;
        }
        tracing::warn!(%error, "protocol violation reported to consumer");
        self.queue.lock().push_back(Signal::Violation(error));
        self.drain();
    }

    /// Stop all further delivery and release the consumer.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        #[cfg(feature = "metrics")]
        metrics::counter!("pushweld_cancellations_total").increment(1);
        self.drain();
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::SeqCst) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            loop {
                if self.is_cancelled() {
                    self.queue.lock().clear();
                    self.subscriber.lock().take();
                    break;
                }
                let signal = self.queue.lock().pop_front();
                match signal {
                    Some(signal) => self.deliver(signal),
                    None => break,
                }
            }
            let remaining = self.wip.fetch_sub(missed, Ordering::SeqCst) - missed;
            if remaining == 0 {
                return;
            }
            missed = remaining;
        }
    }

    fn deliver(&self, signal: Signal<T>) {
        let mut slot = self.subscriber.lock();
        let Some(subscriber) = slot.as_mut() else {
            return;
        };
        match signal {
            Signal::Next(item) => {
                #[cfg(feature = "metrics")]
                metrics::counter!("pushweld_items_delivered_total").increment(1);
                subscriber.on_next(item);
            }
            Signal::Violation(error) => subscriber.on_error(error),
            Signal::Error(error) => {
                #[cfg(feature = "metrics")]
                metrics::counter!("pushweld_errors_total").increment(1);
                subscriber.on_error(error);
                slot.take();
            }
            Signal::Complete => {
                tracing::trace!("delivering completion");
                subscriber.on_complete();
                slot.take();
            }
        }
    }
}
