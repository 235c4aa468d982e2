//! A single-consumer queue that other threads push into.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::external::{bridge, ExternalSubscriber, ExternalSubscription, Publisher, PublisherOperator};
use crate::core::{Demand, Error};

/// Producer side of a [`PushQueue`]. Cheap to clone and safe to move to a
/// background thread.
pub struct PushHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PushHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// A [`Publisher`] fed through a [`PushHandle`].
///
/// Items pushed before the consumer subscribes, or beyond its demand, are
/// buffered. A terminal signal is delivered once the buffer has drained. Only
/// one consumer may ever subscribe; later subscribers receive
/// [`Error::AlreadySubscribed`].
pub struct PushQueue<T> {
    shared: Arc<Shared<T>>,
}

/// Create a connected handle and operator pair
pub fn push_queue<T: Send + 'static>() -> (PushHandle<T>, PublisherOperator<PushQueue<T>>) {
    let shared = Arc::new(Shared {
        buffer: Mutex::new(VecDeque::new()),
        terminal: Mutex::new(None),
        closed: AtomicBool::new(false),
        subscriber: Mutex::new(None),
        attached: AtomicBool::new(false),
        subscribed: AtomicBool::new(false),
        demand: Demand::new(),
    });
    let handle = PushHandle {
        shared: shared.clone(),
    };
    (handle, bridge(PushQueue { shared }))
}

struct Shared<T> {
    buffer: Mutex<VecDeque<T>>,
    /// `Some(None)` is completion, `Some(Some(e))` is failure
    terminal: Mutex<Option<Option<Error>>>,
    /// No more pushes are accepted
    closed: AtomicBool,
    /// Only touched by the owner of the drain guard
    subscriber: Mutex<Option<Box<dyn ExternalSubscriber<T>>>>,
    attached: AtomicBool,
    subscribed: AtomicBool,
    demand: Demand,
}

impl<T: Send + 'static> Shared<T> {
    fn drain(&self) {
        self.demand
            .run_exclusive(|| self.pass(), || self.has_work());
    }

    fn has_work(&self) -> bool {
        if !self.attached.load(Ordering::SeqCst) {
            return false;
        }
        if !self.demand.is_open() {
            return true;
        }
        let buffer = self.buffer.lock();
        if buffer.is_empty() {
            self.terminal.lock().is_some()
        } else {
            self.demand.requested() > 0
        }
    }

    fn pass(&self) {
        let mut slot = self.subscriber.lock();
        loop {
            if slot.is_none() {
                return;
            }
            if !self.demand.is_open() {
                self.detach(&mut slot);
                self.buffer.lock().clear();
                return;
            }
            let item = {
                let mut buffer = self.buffer.lock();
                if !buffer.is_empty() && self.demand.try_take_one() {
                    buffer.pop_front()
                } else {
                    None
                }
            };
            if let Some(item) = item {
                if let Some(subscriber) = slot.as_mut() {
                    subscriber.on_next(item);
                }
                continue;
            }
            if !self.buffer.lock().is_empty() {
                return;
            }
            let Some(terminal) = self.terminal.lock().take() else {
                return;
            };
            if let Some(mut subscriber) = self.detach(&mut slot) {
                match terminal {
                    Some(error) => subscriber.on_error(error),
                    None => subscriber.on_complete(),
                }
            }
            return;
        }
    }

    fn detach(
        &self,
        slot: &mut Option<Box<dyn ExternalSubscriber<T>>>,
    ) -> Option<Box<dyn ExternalSubscriber<T>>> {
        self.attached.store(false, Ordering::SeqCst);
        slot.take()
    }

    fn terminate(&self, terminal: Option<Error>) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.terminal.lock() = Some(terminal);
        self.drain();
        true
    }
}

impl<T: Send + 'static> PushHandle<T> {
    /// Queue an item. Returns false once the queue has been terminated or its
    /// consumer cancelled.
    pub fn push(&self, item: T) -> bool {
        if self.shared.closed.load(Ordering::SeqCst) || !self.shared.demand.is_open() {
            return false;
        }
        self.shared.buffer.lock().push_back(item);
        self.shared.drain();
        true
    }

    /// Signal completion after the buffered items
    pub fn complete(&self) -> bool {
        self.shared.terminate(None)
    }

    /// Signal failure after the buffered items
    pub fn error(&self, error: Error) -> bool {
        self.shared.terminate(Some(error))
    }

    /// True once the consumer has cancelled
    pub fn is_cancelled(&self) -> bool {
        !self.shared.demand.is_open()
    }
}

impl<T: Send + 'static> Publisher for PushQueue<T> {
    type Item = T;

    fn subscribe(&self, mut subscriber: Box<dyn ExternalSubscriber<T>>) {
        if self.shared.subscribed.swap(true, Ordering::SeqCst) {
            tracing::warn!("push queue rejected a second subscriber");
            subscriber.on_error(Error::AlreadySubscribed);
            return;
        }
        subscriber.on_subscribe(Arc::new(QueueSubscription {
            shared: self.shared.clone(),
        }));
        *self.shared.subscriber.lock() = Some(subscriber);
        self.shared.attached.store(true, Ordering::SeqCst);
        self.shared.drain();
    }
}

struct QueueSubscription<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ExternalSubscription for QueueSubscription<T> {
    fn request(&self, n: i64) {
        if n <= 0 {
            tracing::warn!(requested = n, "push queue ignored non-positive demand");
            return;
        }
        self.shared.demand.add(n);
        self.shared.drain();
    }

    fn cancel(&self) {
        if self.shared.demand.cancel() {
            tracing::debug!("push queue cancelled by consumer");
            self.shared.drain();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Operator, OperatorExt};
    use crate::sinks::CollectSink;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_items_pushed_before_subscribe_are_buffered() {
        let (handle, operator) = push_queue();
        handle.push(1);
        handle.push(2);
        handle.complete();
        assert_eq!(operator.to_vec().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_demand_is_respected() {
        let (handle, operator) = push_queue();
        for i in 0..5 {
            handle.push(i);
        }
        let sink = CollectSink::new();
        let subscription = operator.subscribe(Box::new(sink.clone()));
        subscription.request(2);
        assert_eq!(sink.items(), vec![0, 1]);

        handle.complete();
        assert_eq!(sink.completions(), 0);
        subscription.request(10);
        assert_eq!(sink.items(), vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.completions(), 1);
    }

    #[test]
    fn test_background_thread_feeds_consumer() {
        let (handle, operator) = push_queue();
        let sink = CollectSink::new();
        let subscription = operator.subscribe(Box::new(sink.clone()));
        subscription.request(100);

        let producer = thread::spawn(move || {
            for i in 0..50 {
                handle.push(i);
            }
            handle.complete();
        });
        producer.join().unwrap();

        assert!(sink.wait(Duration::from_secs(5)));
        assert_eq!(sink.items(), (0..50).collect::<Vec<_>>());
        assert_eq!(sink.completions(), 1);
    }

    #[test]
    fn test_second_subscriber_is_rejected() {
        let (handle, operator) = push_queue::<i32>();
        handle.complete();
        assert!(operator.to_vec().unwrap().is_empty());
        assert!(matches!(operator.to_vec(), Err(Error::AlreadySubscribed)));
    }

    #[test]
    fn test_cancel_stops_accepting_pushes() {
        let (handle, operator) = push_queue();
        let sink = CollectSink::new();
        let subscription = operator.subscribe(Box::new(sink.clone()));
        subscription.request(1);
        handle.push("a");
        subscription.cancel();
        assert!(handle.is_cancelled());
        assert!(!handle.push("b"));
        assert_eq!(sink.items(), vec!["a"]);
        assert_eq!(sink.completions(), 0);
    }

    #[test]
    fn test_error_follows_buffered_items() {
        let (handle, operator) = push_queue();
        handle.push(7);
        handle.error(Error::custom("upstream died"));
        assert!(!handle.complete());

        let sink = CollectSink::new();
        operator.subscribe(Box::new(sink.clone())).request(5);
        assert_eq!(sink.items(), vec![7]);
        assert_eq!(sink.errors().len(), 1);
    }
}
