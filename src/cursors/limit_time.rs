use std::time::{Duration, Instant};

use super::{Characteristics, Copyable, Cursor};

/// Truncates a cursor once a wall-clock budget is spent.
///
/// The clock starts on the first pull. Every pull, single or bulk, checks the
/// elapsed time before touching the source; once the budget is exceeded the
/// wrapper reports exhausted for good and never advances the source again.
#[derive(Debug)]
pub struct LimitWhileTime<C> {
    source: C,
    limit: Duration,
    started: Option<Instant>,
    closed: bool,
}

impl<C: Cursor> LimitWhileTime<C> {
    pub fn new(source: C, limit: Duration) -> Self {
        Self {
            source,
            limit,
            started: None,
            closed: false,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    fn expired(&mut self) -> bool {
        if !self.closed {
            let started = *self.started.get_or_insert_with(Instant::now);
            self.closed = started.elapsed() >= self.limit;
        }
        self.closed
    }
}

impl<C: Cursor> Cursor for LimitWhileTime<C> {
    type Item = C::Item;

    fn try_advance(&mut self, action: &mut dyn FnMut(C::Item)) -> bool {
        if self.expired() {
            return false;
        }
        if !self.source.try_advance(action) {
            self.closed = true;
            return false;
        }
        true
    }

    fn for_each_remaining(&mut self, action: &mut dyn FnMut(C::Item)) {
        while !self.expired() {
            if !self.source.try_advance(action) {
                self.closed = true;
            }
        }
    }

    fn estimate_size(&self) -> Option<usize> {
        if self.closed {
            Some(0)
        } else {
            self.source.estimate_size()
        }
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics {
            ordered: self.source.characteristics().ordered,
            sized: false,
        }
    }

    fn is_known_exhausted(&self) -> bool {
        self.closed || self.source.is_known_exhausted()
    }
}

impl<C: Copyable> Copyable for LimitWhileTime<C> {
    /// The copy gets a fresh budget that starts on its own first pull.
    fn copy(&self) -> Self {
        Self::new(self.source.copy(), self.limit)
    }
}
