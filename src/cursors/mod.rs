//! Pull-based cursors and the lazy wrappers that compose over them.
//!
//! A [`Cursor`] is the pull side of the engine: operators built with
//! [`crate::sources::from_cursor`] drive one under demand. Extra abilities are
//! expressed as independent capability traits rather than a type hierarchy:
//! [`Copyable`] is a static capability, [`Reversible`] can also be discovered
//! at runtime through [`Cursor::as_reversible`].

mod limit_time;
mod on_empty;
mod reversed;

pub use limit_time::LimitWhileTime;
pub use on_empty::OnEmpty;
pub use reversed::{reverse, Reversed};

use std::iter::Fuse;
use std::sync::Arc;
use std::time::Duration;

/// Static properties of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Characteristics {
    /// Items have a defined encounter order
    pub ordered: bool,
    /// [`Cursor::estimate_size`] is exact
    pub sized: bool,
}

impl Characteristics {
    pub const ORDERED: Self = Self {
        ordered: true,
        sized: false,
    };

    pub const ORDERED_SIZED: Self = Self {
        ordered: true,
        sized: true,
    };
}

/// A pull-based, possibly lazy traversal over a sequence.
///
/// Once `try_advance` returns false it keeps returning false.
pub trait Cursor {
    type Item;

    /// Feed the next item to `action`. Returns false, without calling
    /// `action`, when the cursor is exhausted.
    fn try_advance(&mut self, action: &mut dyn FnMut(Self::Item)) -> bool;

    /// Feed every remaining item to `action`. Equivalent to calling
    /// `try_advance` until it returns false.
    fn for_each_remaining(&mut self, action: &mut dyn FnMut(Self::Item)) {
        while self.try_advance(action) {}
    }

    /// Best-effort count of remaining items, `None` when unknown
    fn estimate_size(&self) -> Option<usize> {
        None
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED
    }

    /// Access the cursor's native direction control, if it has one
    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        None
    }

    /// True when the cursor knows, without pulling, that nothing is left
    fn is_known_exhausted(&self) -> bool {
        self.characteristics().sized && self.estimate_size() == Some(0)
    }
}

/// Capability: produce an independent cursor at the same logical position.
///
/// The copy shares no mutable state with the original; immutable backing
/// data may be shared.
pub trait Copyable: Cursor + Sized {
    fn copy(&self) -> Self;
}

/// Capability: flip traversal direction in place.
pub trait Reversible {
    fn is_reversed(&self) -> bool;

    fn set_reversed(&mut self, reversed: bool);

    fn invert(&mut self) {
        let reversed = self.is_reversed();
        self.set_reversed(!reversed);
    }
}

/// Extension trait for composing cursors
pub trait CursorExt: Cursor + Sized {
    /// Stop yielding once `limit` has elapsed since the first pull
    fn limit_while_time(self, limit: Duration) -> LimitWhileTime<Self> {
        LimitWhileTime::new(self, limit)
    }

    /// Yield `fallback` once if this cursor turns out to be empty
    fn on_empty(self, fallback: Self::Item) -> OnEmpty<Self> {
        OnEmpty::new(self, fallback)
    }

    /// Traverse the remaining items backwards
    fn reversed(self) -> Reversed<Self>
    where
        Self::Item: Clone,
    {
        reverse(self)
    }

    /// Use the cursor as an [`Iterator`]
    fn into_iterator(self) -> CursorIter<Self> {
        CursorIter { cursor: self }
    }
}

impl<C: Cursor> CursorExt for C {}

/// Iterator view over a cursor
pub struct CursorIter<C> {
    cursor: C,
}

impl<C: Cursor> Iterator for CursorIter<C> {
    type Item = C::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let mut slot = None;
        self.cursor.try_advance(&mut |item| slot = Some(item));
        slot
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match (self.cursor.characteristics().sized, self.cursor.estimate_size()) {
            (true, Some(n)) => (n, Some(n)),
            (false, Some(n)) => (0, Some(n)),
            (_, None) => (0, None),
        }
    }
}

/// Cursor over shared, immutable storage.
///
/// Copies share the storage and duplicate only the window bounds, so forking
/// is cheap. Natively bidirectional.
#[derive(Debug)]
pub struct VecCursor<T> {
    data: Arc<[T]>,
    front: usize,
    back: usize,
    reversed: bool,
}

impl<T> VecCursor<T> {
    pub fn new(items: Vec<T>) -> Self {
        let data: Arc<[T]> = Arc::from(items);
        let back = data.len();
        Self {
            data,
            front: 0,
            back,
            reversed: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.back - self.front
    }
}

impl<T: Clone> Cursor for VecCursor<T> {
    type Item = T;

    fn try_advance(&mut self, action: &mut dyn FnMut(T)) -> bool {
        if self.front >= self.back {
            return false;
        }
        let index = if self.reversed {
            self.back -= 1;
            self.back
        } else {
            self.front += 1;
            self.front - 1
        };
        action(self.data[index].clone());
        true
    }

    fn estimate_size(&self) -> Option<usize> {
        Some(self.remaining())
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED_SIZED
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        Some(self)
    }
}

impl<T: Clone> Copyable for VecCursor<T> {
    fn copy(&self) -> Self {
        Self {
            data: self.data.clone(),
            front: self.front,
            back: self.back,
            reversed: self.reversed,
        }
    }
}

impl<T> Reversible for VecCursor<T> {
    fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }
}

/// Cursor over the half-open range `start..end`. Natively bidirectional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCursor {
    front: i64,
    back: i64,
    reversed: bool,
}

impl RangeCursor {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            front: start,
            back: end.max(start),
            reversed: false,
        }
    }
}

impl Cursor for RangeCursor {
    type Item = i64;

    fn try_advance(&mut self, action: &mut dyn FnMut(i64)) -> bool {
        if self.front >= self.back {
            return false;
        }
        let value = if self.reversed {
            self.back -= 1;
            self.back
        } else {
            self.front += 1;
            self.front - 1
        };
        action(value);
        true
    }

    fn estimate_size(&self) -> Option<usize> {
        usize::try_from(self.back.abs_diff(self.front)).ok()
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED_SIZED
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        Some(self)
    }

    fn is_known_exhausted(&self) -> bool {
        self.front >= self.back
    }
}

impl Copyable for RangeCursor {
    fn copy(&self) -> Self {
        *self
    }
}

impl Reversible for RangeCursor {
    fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }
}

/// Cursor over any iterator.
///
/// Copyable when the iterator is `Clone`; reversing it falls back to
/// materialization.
#[derive(Debug, Clone)]
pub struct IterCursor<I> {
    iter: Fuse<I>,
}

impl<I: Iterator> IterCursor<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(items: T) -> Self {
        Self {
            iter: items.into_iter().fuse(),
        }
    }
}

impl<I: Iterator> Cursor for IterCursor<I> {
    type Item = I::Item;

    fn try_advance(&mut self, action: &mut dyn FnMut(I::Item)) -> bool {
        match self.iter.next() {
            Some(item) => {
                action(item);
                true
            }
            None => false,
        }
    }

    fn estimate_size(&self) -> Option<usize> {
        self.iter.size_hint().1
    }

    fn characteristics(&self) -> Characteristics {
        let (lower, upper) = self.iter.size_hint();
        Characteristics {
            ordered: true,
            sized: upper == Some(lower),
        }
    }
}

impl<I: Iterator + Clone> Copyable for IterCursor<I> {
    fn copy(&self) -> Self {
        self.clone()
    }
}
