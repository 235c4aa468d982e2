//! The asynchronous flatten operator.
//!
//! Every outer item is mapped to a child operator that is subscribed in demand
//! mode. Children may be driven from any thread; their values are merged into
//! one downstream flow in arrival order. Downstream demand is shared between
//! live children and the outer source:
//!
//! - free demand goes to the live children, those holding the least first
//! - a new child receives a fair share of the demand not yet handed out
//! - the outer source is pulled for another child only while there are fewer
//!   live children than outstanding downstream demand
//! - demand released by a retiring child is redistributed the same way
//! - unbounded demand is forwarded unbounded to the outer source and to
//!   every child
//!
//! The flatten completes once the outer source is exhausted and no child is
//! live. The first error from the outer source, a child, or the mapping
//! function is delivered downstream and cancels everything else.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::emitter::Emitter;
use crate::core::{
    add_demand, BoxOperator, BoxSubscriber, Error, Operator, Result, Subscriber, Subscription,
    SubscriptionHandle, UNBOUNDED,
};

/// Configuration for a flatten
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlattenConfig {
    /// Maximum number of live children
    pub max_concurrency: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            max_concurrency: usize::MAX,
        }
    }
}

type Mapper<A, B> = dyn Fn(A) -> Result<BoxOperator<B>> + Send + Sync;

/// An operator merging the children produced for each outer item.
pub struct FlatMap<O: Operator, B> {
    outer: O,
    mapper: Arc<Mapper<O::Item, B>>,
    config: FlattenConfig,
}

impl<O, B> FlatMap<O, B>
where
    O: Operator,
    B: Send + 'static,
{
    /// Create a new flatten over `outer`
    pub fn new<F, P>(outer: O, f: F) -> Self
    where
        F: Fn(O::Item) -> Result<P> + Send + Sync + 'static,
        P: Operator<Item = B>,
    {
        let mapper = move |item: O::Item| f(item).map(|child| Box::new(child) as BoxOperator<B>);
        Self {
            outer,
            mapper: Arc::new(mapper),
            config: FlattenConfig::default(),
        }
    }

    /// Set the maximum number of children live at once
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max.max(1);
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: FlattenConfig) -> Self {
        self.config = config;
        self.config.max_concurrency = self.config.max_concurrency.max(1);
        self
    }

    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }
}

impl<O, B> Operator for FlatMap<O, B>
where
    O: Operator,
    B: Send + 'static,
{
    type Item = B;

    fn subscribe(&self, subscriber: BoxSubscriber<B>) -> Subscription {
        let shared = Arc::new(Shared {
            mapper: self.mapper.clone(),
            max_concurrency: self.config.max_concurrency,
            emitter: Emitter::new(subscriber),
            open: AtomicBool::new(true),
            book: Mutex::new(Book::default()),
        });
        let outer = self.outer.subscribe(Box::new(OuterSubscriber {
            shared: shared.clone(),
        }));
        shared.book.lock().outer = Some(outer);
        Subscription::new(FlattenSubscription { shared })
    }
}

/// Work decided under the book lock and carried out after releasing it
enum Action {
    Request(Subscription, i64),
    Cancel(Subscription),
}

fn run(actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Request(subscription, n) => subscription.request(n),
            Action::Cancel(subscription) => subscription.cancel(),
        }
    }
}

struct ChildSlot {
    /// `None` while the child is being subscribed
    subscription: Option<Subscription>,
    /// Demand handed to this child and not yet used
    outstanding: i64,
}

#[derive(Default)]
struct Book {
    /// Downstream demand not yet satisfied
    requested: i64,
    /// Sum of bounded child demand not yet used
    allocated: i64,
    children: HashMap<u64, ChildSlot>,
    next_id: u64,
    outer: Option<Subscription>,
    /// One outer item has been requested and not yet received
    outer_pending: bool,
    outer_unbounded: bool,
    outer_done: bool,
    terminated: bool,
}

impl Book {
    fn unallocated(&self) -> i64 {
        (self.requested - self.allocated).max(0)
    }

    fn can_pull_outer(&self, max_concurrency: usize) -> bool {
        self.outer.is_some()
            && !self.outer_done
            && !self.outer_pending
            && !self.outer_unbounded
            && self.children.len() < max_concurrency
    }

    /// Demand for a child that has just been subscribed
    fn initial_share(&self) -> i64 {
        if self.requested == UNBOUNDED {
            return UNBOUNDED;
        }
        let unallocated = self.unallocated();
        if unallocated == 0 {
            return 0;
        }
        // The new child is already counted
        let live = self.children.len().max(1) as i64;
        (unallocated / live).max(1)
    }

    /// Start another child while each live one could still be owed an item
    fn wants_outer(&self, max_concurrency: usize) -> bool {
        self.can_pull_outer(max_concurrency) && (self.children.len() as i64) < self.requested
    }

    /// True once, when the outer source is exhausted and no child is left
    fn try_finish(&mut self) -> bool {
        if self.terminated || !self.outer_done || !self.children.is_empty() {
            return false;
        }
        self.terminated = true;
        self.outer = None;
        true
    }

    /// Cancel everything still attached
    fn close(&mut self) -> Vec<Action> {
        self.terminated = true;
        let mut actions: Vec<Action> = self
            .children
            .drain()
            .filter_map(|(_, slot)| slot.subscription.map(Action::Cancel))
            .collect();
        if let Some(outer) = self.outer.take() {
            actions.push(Action::Cancel(outer));
        }
        actions
    }

    fn plan(&mut self, max_concurrency: usize) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.terminated {
            return actions;
        }

        if self.requested == UNBOUNDED {
            for slot in self.children.values_mut() {
                if slot.outstanding == UNBOUNDED {
                    continue;
                }
                if let Some(subscription) = &slot.subscription {
                    slot.outstanding = UNBOUNDED;
                    actions.push(Action::Request(subscription.clone(), UNBOUNDED));
                }
            }
            if self.can_pull_outer(max_concurrency) {
                if let Some(outer) = &self.outer {
                    if max_concurrency == usize::MAX {
                        self.outer_unbounded = true;
                        actions.push(Action::Request(outer.clone(), UNBOUNDED));
                    } else {
                        self.outer_pending = true;
                        actions.push(Action::Request(outer.clone(), 1));
                    }
                }
            }
            return actions;
        }

        self.distribute(&mut actions);
        if self.wants_outer(max_concurrency) {
            if let Some(outer) = &self.outer {
                self.outer_pending = true;
                actions.push(Action::Request(outer.clone(), 1));
            }
        }
        actions
    }

    /// Hand the unallocated demand to the live children, least outstanding first
    fn distribute(&mut self, actions: &mut Vec<Action>) {
        let mut spare = self.unallocated();
        if spare == 0 {
            return;
        }
        let mut ready: Vec<(&u64, &mut ChildSlot)> = self
            .children
            .iter_mut()
            .filter(|(_, slot)| slot.subscription.is_some() && slot.outstanding != UNBOUNDED)
            .collect();
        if ready.is_empty() {
            return;
        }
        ready.sort_by_key(|(id, slot)| (slot.outstanding, **id));

        let count = ready.len() as i64;
        let share = spare / count;
        let mut extra = spare % count;
        for (_, slot) in ready {
            let mut grant = share;
            if extra > 0 {
                grant += 1;
                extra -= 1;
            }
            if grant == 0 {
                break;
            }
            slot.outstanding += grant;
            self.allocated += grant;
            spare -= grant;
            if let Some(subscription) = &slot.subscription {
                actions.push(Action::Request(subscription.clone(), grant));
            }
        }
        debug_assert_eq!(spare, 0);
    }
}

struct Shared<A, B> {
    mapper: Arc<Mapper<A, B>>,
    max_concurrency: usize,
    emitter: Emitter<B>,
    open: AtomicBool,
    book: Mutex<Book>,
}

impl<A, B> Shared<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn request(&self, n: i64) {
        if n <= 0 {
            self.emitter.violation(Error::invalid_demand(n));
            return;
        }
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        let actions = {
            let mut book = self.book.lock();
            if book.terminated {
                return;
            }
            book.requested = add_demand(book.requested, n);
            book.plan(self.max_concurrency)
        };
        run(actions);
    }

    fn outer_next(self: &Arc<Self>, item: A) {
        {
            let mut book = self.book.lock();
            book.outer_pending = false;
            if book.terminated {
                return;
            }
        }

        let child = match (self.mapper)(item) {
            Ok(child) => child,
            Err(error @ Error::Processor(_)) => {
                self.fail(error);
                return;
            }
            Err(error) => {
                self.fail(Error::processor(error));
                return;
            }
        };

        let id = {
            let mut book = self.book.lock();
            if book.terminated {
                return;
            }
            let id = book.next_id;
            book.next_id += 1;
            book.children.insert(
                id,
                ChildSlot {
                    subscription: None,
                    outstanding: 0,
                },
            );
            id
        };

        let subscription = child.subscribe(Box::new(ChildSubscriber {
            shared: self.clone(),
            id,
        }));

        let actions = {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            if book.terminated {
                vec![Action::Cancel(subscription)]
            } else {
                let share = book.initial_share();
                let mut actions = Vec::new();
                // The slot is gone if the child already terminated while subscribing
                if let Some(slot) = book.children.get_mut(&id) {
                    slot.subscription = Some(subscription.clone());
                    slot.outstanding = share;
                    if share != UNBOUNDED {
                        book.allocated += share;
                    }
                    if share > 0 {
                        actions.push(Action::Request(subscription, share));
                    }
                }
                actions.extend(book.plan(self.max_concurrency));
                actions
            }
        };
        run(actions);
    }

    fn outer_complete(&self) {
        let (actions, finished) = {
            let mut book = self.book.lock();
            book.outer_pending = false;
            book.outer_done = true;
            if book.try_finish() {
                (Vec::new(), true)
            } else {
                (book.plan(self.max_concurrency), false)
            }
        };
        run(actions);
        if finished {
            self.finish();
        }
    }

    fn child_next(&self, id: u64, item: B) {
        {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            if book.terminated {
                return;
            }
            if let Some(slot) = book.children.get_mut(&id) {
                if slot.outstanding != UNBOUNDED && slot.outstanding > 0 {
                    slot.outstanding -= 1;
                    book.allocated -= 1;
                }
            }
            if book.requested != UNBOUNDED && book.requested > 0 {
                book.requested -= 1;
            }
        }
        self.emitter.next(item);
    }

    fn child_complete(&self, id: u64) {
        let (actions, finished) = {
            let mut guard = self.book.lock();
            let book = &mut *guard;
            if book.terminated {
                return;
            }
            if let Some(slot) = book.children.remove(&id) {
                if slot.outstanding != UNBOUNDED {
                    book.allocated -= slot.outstanding;
                }
            }
            if book.try_finish() {
                (Vec::new(), true)
            } else {
                (book.plan(self.max_concurrency), false)
            }
        };
        run(actions);
        if finished {
            self.finish();
        }
    }

    fn finish(&self) {
        tracing::trace!("flatten completed");
        self.emitter.complete();
    }

    /// Deliver the first error and cancel everything else
    fn fail(&self, error: Error) {
        let actions = {
            let mut book = self.book.lock();
            if book.terminated {
                tracing::trace!(%error, "flatten dropping error after termination");
                return;
            }
            book.close()
        };
        tracing::debug!(%error, cancelled = actions.len(), "flatten failed, cancelling siblings");
        self.emitter.error(error);
        run(actions);
    }

    fn cancel(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let actions = self.book.lock().close();
        tracing::debug!(cancelled = actions.len(), "flatten cancelled");
        self.emitter.cancel();
        run(actions);
    }
}

struct FlattenSubscription<A, B> {
    shared: Arc<Shared<A, B>>,
}

impl<A, B> SubscriptionHandle for FlattenSubscription<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn request(&self, n: i64) {
        self.shared.request(n);
    }

    fn cancel(&self) {
        self.shared.cancel();
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    fn requested(&self) -> i64 {
        if !self.is_open() {
            return 0;
        }
        self.shared.book.lock().requested
    }
}

struct OuterSubscriber<A, B> {
    shared: Arc<Shared<A, B>>,
}

impl<A, B> Subscriber<A> for OuterSubscriber<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn on_next(&mut self, item: A) {
        self.shared.outer_next(item);
    }

    fn on_error(&mut self, error: Error) {
        if error.is_protocol_violation() {
            tracing::warn!(%error, "outer source rejected demand");
            return;
        }
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        self.shared.outer_complete();
    }
}

struct ChildSubscriber<A, B> {
    shared: Arc<Shared<A, B>>,
    id: u64,
}

impl<A, B> Subscriber<B> for ChildSubscriber<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn on_next(&mut self, item: B) {
        self.shared.child_next(self.id, item);
    }

    fn on_error(&mut self, error: Error) {
        if error.is_protocol_violation() {
            tracing::warn!(%error, child = self.id, "child rejected demand");
            return;
        }
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        self.shared.child_complete(self.id);
    }
}
