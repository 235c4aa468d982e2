use super::{Characteristics, Copyable, Cursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing pulled yet
    Probing,
    /// The source produced at least one item
    Forwarding,
    Done,
}

/// Substitutes a single fallback item for an empty source.
///
/// The first pull decides: if the source yields, every source item is
/// forwarded unchanged and the fallback is never used; if it is already
/// exhausted, the fallback is yielded exactly once.
pub struct OnEmpty<C: Cursor> {
    source: C,
    fallback: Option<C::Item>,
    state: State,
}

impl<C: Cursor> OnEmpty<C> {
    pub fn new(source: C, fallback: C::Item) -> Self {
        Self {
            source,
            fallback: Some(fallback),
            state: State::Probing,
        }
    }
}

impl<C: Cursor> Cursor for OnEmpty<C> {
    type Item = C::Item;

    fn try_advance(&mut self, action: &mut dyn FnMut(C::Item)) -> bool {
        match self.state {
            State::Done => false,
            State::Forwarding => {
                let advanced = self.source.try_advance(action);
                if !advanced {
                    self.state = State::Done;
                }
                advanced
            }
            State::Probing => {
                if self.source.try_advance(action) {
                    self.state = State::Forwarding;
                    self.fallback = None;
                    return true;
                }
                self.state = State::Done;
                match self.fallback.take() {
                    Some(fallback) => {
                        action(fallback);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn estimate_size(&self) -> Option<usize> {
        match self.state {
            State::Done => Some(0),
            State::Forwarding => self.source.estimate_size(),
            State::Probing => self.source.estimate_size().map(|n| n.max(1)),
        }
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics {
            ordered: self.source.characteristics().ordered,
            sized: self.source.characteristics().sized,
        }
    }

    fn is_known_exhausted(&self) -> bool {
        match self.state {
            State::Done => true,
            State::Forwarding => self.source.is_known_exhausted(),
            State::Probing => false,
        }
    }
}

impl<C> Copyable for OnEmpty<C>
where
    C: Copyable,
    C::Item: Clone,
{
    fn copy(&self) -> Self {
        Self {
            source: self.source.copy(),
            fallback: self.fallback.clone(),
            state: self.state,
        }
    }
}
