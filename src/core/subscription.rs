//! Demand tracking and the consumer-facing subscription handle.
//!
//! A [`Demand`] holds the only state that is mutated from several threads for
//! one producer/consumer pairing: the outstanding request count, the open
//! flag, and the guard that keeps production passes single-owner.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Demand value meaning "emit everything, ignore backpressure".
pub const UNBOUNDED: i64 = i64::MAX;

/// Add `n` to `current`, saturating at [`UNBOUNDED`].
pub fn add_demand(current: i64, n: i64) -> i64 {
    if current == UNBOUNDED || n == UNBOUNDED {
        return UNBOUNDED;
    }
    current.saturating_add(n)
}

/// Outstanding demand and open state for one subscription.
#[derive(Debug)]
pub struct Demand {
    requested: AtomicI64,
    open: AtomicBool,
    running: AtomicBool,
}

impl Demand {
    /// Create an open tracker with no outstanding demand
    pub fn new() -> Self {
        Self {
            requested: AtomicI64::new(0),
            open: AtomicBool::new(true),
            running: AtomicBool::new(false),
        }
    }

    /// Add `n` (which must be positive) to the outstanding demand.
    ///
    /// Returns the new total. Adding to a cancelled tracker is a no-op.
    pub fn add(&self, n: i64) -> i64 {
        debug_assert!(n > 0);
        let mut current = self.requested.load(Ordering::SeqCst);
        loop {
            if !self.is_open() {
                return current;
            }
            let next = add_demand(current, n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Consume one unit of demand.
    ///
    /// Returns false when there is nothing left to consume. Unbounded demand is
    /// never decremented.
    pub fn try_take_one(&self) -> bool {
        let mut current = self.requested.load(Ordering::SeqCst);
        loop {
            if current == UNBOUNDED {
                return true;
            }
            if current <= 0 {
                return false;
            }
            match self.requested.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Outstanding demand
    pub fn requested(&self) -> i64 {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Open and holding outstanding demand
    pub fn is_active(&self) -> bool {
        self.is_open() && self.requested() > 0
    }

    /// Close the tracker. Returns true only for the call that closed it.
    pub fn cancel(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        if was_open {
            self.requested.store(0, Ordering::SeqCst);
        }
        was_open
    }

    /// Run `pass` unless another thread is already running one.
    ///
    /// After each pass the guard is released and `has_more` is consulted; if
    /// work arrived while the pass was finishing, the guard is re-acquired and
    /// another pass runs. A caller that finds the guard taken returns at once:
    /// its state change is picked up by the owner's re-check.
    pub fn run_exclusive<P, M>(&self, mut pass: P, has_more: M)
    where
        P: FnMut(),
        M: Fn() -> bool,
    {
        loop {
            if self.running.swap(true, Ordering::SeqCst) {
                return;
            }
            pass();
            self.running.store(false, Ordering::SeqCst);
            if !has_more() {
                return;
            }
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::new()
    }
}

/// Control surface every subscription implementation exposes.
pub trait SubscriptionHandle: Send + Sync {
    /// Signal demand for `n` more items. `n <= 0` is reported through the
    /// consumer's error channel and leaves the subscription unchanged.
    fn request(&self, n: i64);

    /// Stop the flow of items. Idempotent.
    fn cancel(&self);

    fn is_open(&self) -> bool;

    /// Outstanding demand, [`UNBOUNDED`] for "everything"
    fn requested(&self) -> i64;
}

/// The live binding between one operator activation and one consumer.
///
/// Cloning yields another handle to the same subscription. Dropping a handle
/// does not cancel it.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<dyn SubscriptionHandle>,
}

impl Subscription {
    /// Wrap a subscription implementation
    pub fn new<S: SubscriptionHandle + 'static>(handle: S) -> Self {
        Self {
            inner: Arc::new(handle),
        }
    }

    /// A subscription with nothing behind it
    pub fn empty() -> Self {
        Self::new(EmptySubscription::default())
    }

    pub fn request(&self, n: i64) {
        self.inner.request(n)
    }

    pub fn cancel(&self) {
        self.inner.cancel()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_open() && self.inner.requested() > 0
    }

    pub fn requested(&self) -> i64 {
        self.inner.requested()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("open", &self.is_open())
            .field("requested", &self.requested())
            .finish()
    }
}

/// Subscription of an operator that has already signalled its terminal event.
#[derive(Debug, Default)]
struct EmptySubscription {
    demand: Demand,
}

impl SubscriptionHandle for EmptySubscription {
    fn request(&self, n: i64) {
        if n > 0 {
            self.demand.add(n);
        }
    }

    fn cancel(&self) {
        self.demand.cancel();
    }

    fn is_open(&self) -> bool {
        self.demand.is_open()
    }

    fn requested(&self) -> i64 {
        self.demand.requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_add_and_take() {
        let demand = Demand::new();
        assert!(!demand.is_active());
        assert_eq!(demand.add(2), 2);
        assert!(demand.is_active());
        assert!(demand.try_take_one());
        assert!(demand.try_take_one());
        assert!(!demand.try_take_one());
        assert_eq!(demand.requested(), 0);
    }

    #[test]
    fn test_add_saturates_to_unbounded() {
        let demand = Demand::new();
        demand.add(5);
        assert_eq!(demand.add(UNBOUNDED), UNBOUNDED);
        assert!(demand.try_take_one());
        assert_eq!(demand.requested(), UNBOUNDED);

        let near = Demand::new();
        near.add(i64::MAX - 1);
        assert_eq!(near.add(10), UNBOUNDED);
    }

    #[test]
    fn test_cancel_is_idempotent_and_monotonic() {
        let demand = Demand::new();
        demand.add(3);
        assert!(demand.cancel());
        assert!(!demand.cancel());
        assert!(!demand.is_open());
        assert_eq!(demand.add(4), 0);
        assert!(!demand.is_active());
    }

    #[test]
    fn test_run_exclusive_is_single_owner() {
        let demand = Arc::new(Demand::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let passes = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let demand = demand.clone();
                let running = running.clone();
                let max_seen = max_seen.clone();
                let passes = passes.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        demand.add(1);
                        demand.run_exclusive(
                            || {
                                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                                max_seen.fetch_max(now, Ordering::SeqCst);
                                while demand.try_take_one() {}
                                passes.fetch_add(1, Ordering::SeqCst);
                                running.fetch_sub(1, Ordering::SeqCst);
                            },
                            || demand.requested() > 0,
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(demand.requested(), 0);
        assert!(passes.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_reentrant_run_exclusive_defers_to_owner() {
        let demand = Demand::new();
        let mut outer_passes = 0;
        demand.add(1);
        demand.run_exclusive(
            || {
                outer_passes += 1;
                while demand.try_take_one() {}
                if outer_passes == 1 {
                    demand.add(1);
                    // Guard is held: this call must return without running.
                    demand.run_exclusive(|| panic!("second pass"), || false);
                }
            },
            || demand.requested() > 0,
        );
        assert_eq!(outer_passes, 2);
    }

    #[test]
    fn test_empty_subscription() {
        let sub = Subscription::empty();
        assert!(sub.is_open());
        sub.request(3);
        assert!(sub.is_active());
        sub.cancel();
        assert!(!sub.is_open());
        assert_eq!(sub.requested(), 0);
    }
}
