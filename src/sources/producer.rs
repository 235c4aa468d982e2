//! Async producers driven on a tokio runtime and exposed as a [`Publisher`].

use async_trait::async_trait;
use futures::StreamExt;
use futures_core::Stream;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::external::{ExternalSubscriber, ExternalSubscription, Publisher};
use crate::core::{add_demand, Error, Result, UNBOUNDED};

/// An asynchronous source of items.
///
/// # Examples
///
/// ```rust
/// use pushweld::prelude::*;
/// use async_trait::async_trait;
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl Producer for Countdown {
///     type Item = u32;
///
///     async fn produce(&mut self) -> Result<Option<u32>> {
///         if self.0 == 0 {
///             return Ok(None);
///         }
///         self.0 -= 1;
///         Ok(Some(self.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Producer: Send + 'static {
    /// The type of items this producer generates
    type Item: Send + 'static;

    /// Produce the next item, `Ok(None)` once exhausted
    async fn produce(&mut self) -> Result<Option<Self::Item>>;
}

/// A producer that pulls from any [`Stream`]
pub struct StreamProducer<S> {
    stream: S,
}

impl<S> StreamProducer<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> Producer for StreamProducer<S>
where
    S: Stream + Unpin + Send + 'static,
    S::Item: Send + 'static,
{
    type Item = S::Item;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.stream.next().await)
    }
}

/// Runs a fresh [`Producer`] per subscriber on an injected runtime.
///
/// The producer only runs while the subscriber has outstanding demand.
/// Cancelling the subscription stops the task at its next await point.
pub struct ProducerPublisher<F> {
    handle: Handle,
    factory: F,
}

impl<F, P> ProducerPublisher<F>
where
    F: Fn() -> P + Send + Sync + 'static,
    P: Producer,
{
    pub fn new(handle: Handle, factory: F) -> Self {
        Self { handle, factory }
    }
}

impl<F, P> Publisher for ProducerPublisher<F>
where
    F: Fn() -> P + Send + Sync + 'static,
    P: Producer,
{
    type Item = P::Item;

    fn subscribe(&self, mut subscriber: Box<dyn ExternalSubscriber<P::Item>>) {
        let (demand_tx, demand_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        subscriber.on_subscribe(Arc::new(ProducerSubscription {
            demand: demand_tx,
            token: token.clone(),
        }));
        let producer = (self.factory)();
        self.handle
            .spawn(drive(producer, subscriber, demand_rx, token));
    }
}

struct ProducerSubscription {
    demand: mpsc::UnboundedSender<i64>,
    token: CancellationToken,
}

impl ExternalSubscription for ProducerSubscription {
    fn request(&self, n: i64) {
        // The task has already finished if the receiver is gone
        let _ = self.demand.send(n);
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

async fn drive<P: Producer>(
    mut producer: P,
    mut subscriber: Box<dyn ExternalSubscriber<P::Item>>,
    mut demand: mpsc::UnboundedReceiver<i64>,
    token: CancellationToken,
) {
    tracing::debug!("producer task started");
    let mut outstanding: i64 = 0;
    loop {
        // Fold in every demand signal that is already waiting
        while let Ok(n) = demand.try_recv() {
            if n <= 0 {
                subscriber.on_error(Error::invalid_demand(n));
                return;
            }
            outstanding = add_demand(outstanding, n);
        }

        if outstanding == 0 {
            tokio::select! {
                _ = token.cancelled() => break,
                next = demand.recv() => match next {
                    Some(n) if n > 0 => outstanding = add_demand(outstanding, n),
                    Some(n) => {
                        subscriber.on_error(Error::invalid_demand(n));
                        return;
                    }
                    None => break,
                },
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = producer.produce() => match result {
                Ok(Some(item)) => {
                    if outstanding != UNBOUNDED {
                        outstanding -= 1;
                    }
                    subscriber.on_next(item);
                }
                Ok(None) => {
                    tracing::trace!("producer exhausted");
                    subscriber.on_complete();
                    return;
                }
                Err(error) => {
                    tracing::debug!(%error, "producer failed");
                    subscriber.on_error(error);
                    return;
                }
            },
        }
    }
    tracing::debug!("producer task cancelled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Operator, OperatorExt};
    use crate::sinks::CollectSink;
    use crate::sources::bridge;
    use std::time::Duration;

    struct Counter {
        next: u32,
        end: u32,
    }

    #[async_trait]
    impl Producer for Counter {
        type Item = u32;

        async fn produce(&mut self) -> Result<Option<u32>> {
            if self.next >= self.end {
                return Ok(None);
            }
            tokio::task::yield_now().await;
            self.next += 1;
            Ok(Some(self.next - 1))
        }
    }

    struct Failing;

    #[async_trait]
    impl Producer for Failing {
        type Item = u32;

        async fn produce(&mut self) -> Result<Option<u32>> {
            Err(Error::custom("boom"))
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_producer_runs_under_demand() {
        let rt = runtime();
        let operator = bridge(ProducerPublisher::new(rt.handle().clone(), || Counter {
            next: 0,
            end: 10,
        }));

        let sink = CollectSink::new();
        let subscription = operator.subscribe(Box::new(sink.clone()));
        subscription.request(3);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.items(), vec![0, 1, 2]);
        assert_eq!(sink.completions(), 0);

        subscription.request(100);
        assert!(sink.wait(Duration::from_secs(5)));
        assert_eq!(sink.items(), (0..10).collect::<Vec<_>>());
        assert_eq!(sink.completions(), 1);
    }

    #[test]
    fn test_stream_producer_eager_collect() {
        let rt = runtime();
        let operator = bridge(ProducerPublisher::new(rt.handle().clone(), || {
            StreamProducer::new(futures::stream::iter(vec!["x", "y"]))
        }));
        assert_eq!(operator.to_vec().unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_producer_error_is_terminal() {
        let rt = runtime();
        let operator = bridge(ProducerPublisher::new(rt.handle().clone(), || Failing));
        assert!(matches!(operator.to_vec(), Err(Error::Custom(m)) if m == "boom"));
    }

    #[test]
    fn test_cancel_stops_producer_task() {
        let rt = runtime();
        let operator = bridge(ProducerPublisher::new(rt.handle().clone(), || Counter {
            next: 0,
            end: u32::MAX,
        }));
        let sink = CollectSink::new();
        let subscription = operator.subscribe(Box::new(sink.clone()));
        subscription.request(5);
        std::thread::sleep(Duration::from_millis(50));
        subscription.cancel();
        let seen = sink.items().len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.items().len(), seen);
        assert!(seen <= 5);
        assert_eq!(sink.completions(), 0);
    }
}
