use super::{Characteristics, Copyable, Cursor, Reversible, VecCursor};

/// A cursor traversing the remaining items of another cursor backwards.
pub enum Reversed<C: Cursor> {
    /// The cursor supports bidirectional traversal and was flipped in place
    Native(C),
    /// The cursor was drained and is replayed from a buffer, back to front
    Materialized(VecCursor<C::Item>),
}

/// Reverse a cursor.
///
/// Cursors exposing [`Cursor::as_reversible`] are inverted in place. Any other
/// cursor is drained into a buffer that is then traversed backwards.
pub fn reverse<C>(mut cursor: C) -> Reversed<C>
where
    C: Cursor,
    C::Item: Clone,
{
    let native = match cursor.as_reversible() {
        Some(control) => {
            control.invert();
            true
        }
        None => false,
    };
    if native {
        return Reversed::Native(cursor);
    }

    let mut items = Vec::with_capacity(cursor.estimate_size().unwrap_or(0));
    cursor.for_each_remaining(&mut |item| items.push(item));
    let mut materialized = VecCursor::new(items);
    materialized.set_reversed(true);
    Reversed::Materialized(materialized)
}

impl<C: Cursor> Reversed<C> {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Reversed::Materialized(_))
    }
}

impl<C> Cursor for Reversed<C>
where
    C: Cursor,
    C::Item: Clone,
{
    type Item = C::Item;

    fn try_advance(&mut self, action: &mut dyn FnMut(C::Item)) -> bool {
        match self {
            Reversed::Native(cursor) => cursor.try_advance(action),
            Reversed::Materialized(buffer) => buffer.try_advance(action),
        }
    }

    fn for_each_remaining(&mut self, action: &mut dyn FnMut(C::Item)) {
        match self {
            Reversed::Native(cursor) => cursor.for_each_remaining(action),
            Reversed::Materialized(buffer) => buffer.for_each_remaining(action),
        }
    }

    fn estimate_size(&self) -> Option<usize> {
        match self {
            Reversed::Native(cursor) => cursor.estimate_size(),
            Reversed::Materialized(buffer) => buffer.estimate_size(),
        }
    }

    fn characteristics(&self) -> Characteristics {
        match self {
            Reversed::Native(cursor) => cursor.characteristics(),
            Reversed::Materialized(buffer) => buffer.characteristics(),
        }
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        match self {
            Reversed::Native(cursor) => cursor.as_reversible(),
            Reversed::Materialized(buffer) => Some(buffer),
        }
    }

    fn is_known_exhausted(&self) -> bool {
        match self {
            Reversed::Native(cursor) => cursor.is_known_exhausted(),
            Reversed::Materialized(buffer) => buffer.is_known_exhausted(),
        }
    }
}

impl<C> Copyable for Reversed<C>
where
    C: Copyable,
    C::Item: Clone,
{
    fn copy(&self) -> Self {
        match self {
            Reversed::Native(cursor) => Reversed::Native(cursor.copy()),
            Reversed::Materialized(buffer) => Reversed::Materialized(buffer.copy()),
        }
    }
}
