// src/iterator.rs
// Element-at-a-time iteration over a batch cursor

use std::marker::PhantomData;
use std::mem;
use std::vec;

use crate::cursor::BatchCursor;
use crate::error::{Error, Result};

enum BatchState<T> {
    /// Nothing buffered; whether more items exist is not known yet.
    Empty,
    /// Never holds an empty batch.
    Holding(vec::IntoIter<T>),
    /// A fetch failed; handed out by the next `try_next`.
    Failed(Error),
    Exhausted,
}

/// Lazily yields the elements of a [`BatchCursor`], fetching a batch only when
/// the current one is used up.
///
/// Empty batches from the cursor are skipped, one fetch at a time, so
/// `has_next` answers exactly: draining with `has_next`/`next_item` yields
/// every element and ends with `has_next() == false`. `has_next` never fetches
/// while a batch is held, and repeated calls give the same answer.
pub struct ResultIterator<T, C> {
    cursor: C,
    state: BatchState<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: BatchCursor<T>> ResultIterator<T, C> {
    pub fn new(cursor: C) -> Self {
        ResultIterator { cursor, state: BatchState::Empty, _marker: PhantomData }
    }

    /// True if `next_item` will return an element, or the error from a failed
    /// fetch.
    pub fn has_next(&mut self) -> bool {
        self.settle();
        matches!(self.state, BatchState::Holding(_) | BatchState::Failed(_))
    }

    /// Next element, or `None` once the cursor is exhausted.
    pub fn try_next(&mut self) -> Result<Option<T>> {
        self.settle();
        match mem::replace(&mut self.state, BatchState::Exhausted) {
            BatchState::Holding(mut batch) => {
                let item = batch.next();
                if !batch.as_slice().is_empty() {
                    self.state = BatchState::Holding(batch);
                } else {
                    self.state = BatchState::Empty;
                }
                Ok(item)
            }
            BatchState::Failed(e) => Err(e),
            BatchState::Empty | BatchState::Exhausted => Ok(None),
        }
    }

    /// Next element; `CursorExhausted` if `has_next` is false.
    pub fn next_item(&mut self) -> Result<T> {
        self.try_next()?.ok_or(Error::CursorExhausted)
    }

    pub fn into_cursor(self) -> C {
        self.cursor
    }

    // Leave `Empty` by fetching until a non-empty batch, exhaustion or an error.
    fn settle(&mut self) {
        while let BatchState::Empty = self.state {
            if !self.cursor.has_next() {
                self.state = BatchState::Exhausted;
                return;
            }
            match self.cursor.next_batch() {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => self.state = BatchState::Holding(batch.into_iter()),
                Err(e) => self.state = BatchState::Failed(e),
            }
        }
    }
}

impl<T, C: BatchCursor<T>> Iterator for ResultIterator<T, C> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        self.try_next().transpose()
    }
}

// A failed fetch is yielded once, then the state is `Exhausted`.
impl<T, C: BatchCursor<T>> std::iter::FusedIterator for ResultIterator<T, C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedCursor {
        batches: VecDeque<Result<Vec<i32>>>,
        fetches: usize,
    }

    impl ScriptedCursor {
        fn new(batches: Vec<Vec<i32>>) -> Self {
            ScriptedCursor { batches: batches.into_iter().map(Ok).collect(), fetches: 0 }
        }
    }

    impl BatchCursor<i32> for ScriptedCursor {
        fn has_next(&self) -> bool {
            !self.batches.is_empty()
        }

        fn next_batch(&mut self) -> Result<Vec<i32>> {
            self.fetches += 1;
            self.batches.pop_front().unwrap_or(Err(Error::CursorExhausted))
        }
    }

    #[test]
    fn test_skips_leading_empty_batches() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![vec![], vec![], vec![7]]));
        assert!(iter.has_next());
        assert_eq!(iter.next_item().unwrap(), 7);
        assert!(!iter.has_next());
        assert_eq!(iter.into_cursor().fetches, 3);
    }

    #[test]
    fn test_no_batches() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![]));
        assert!(!iter.has_next());
        assert!(matches!(iter.next_item(), Err(Error::CursorExhausted)));
        assert_eq!(iter.into_cursor().fetches, 0);
    }

    #[test]
    fn test_only_empty_batches() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![vec![], vec![]]));
        assert!(!iter.has_next());
        assert!(matches!(iter.next_item(), Err(Error::CursorExhausted)));
        assert_eq!(iter.into_cursor().fetches, 2);
    }

    #[test]
    fn test_trailing_empty_batches_end_the_drain() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![vec![1], vec![], vec![]]));
        let mut seen = Vec::new();
        while iter.has_next() {
            seen.push(iter.next_item().unwrap());
        }
        assert_eq!(seen, vec![1]);
        assert!(!iter.has_next());
    }

    #[test]
    fn test_has_next_is_idempotent() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![vec![1], vec![2]]));
        for _ in 0..5 {
            assert!(iter.has_next());
        }
        assert_eq!(iter.cursor.fetches, 1);

        // No fetch while a batch is held
        assert_eq!(iter.next_item().unwrap(), 1);
        assert_eq!(iter.cursor.fetches, 1);
    }

    #[test]
    fn test_failed_fetch_is_reported_by_has_next() {
        let cursor = ScriptedCursor {
            batches: VecDeque::from(vec![Err(Error::ServerClosed), Ok(vec![2])]),
            fetches: 0,
        };
        let mut iter = ResultIterator::new(cursor);
        assert!(iter.has_next());
        assert!(matches!(iter.next_item(), Err(Error::ServerClosed)));
        assert!(!iter.has_next());
        assert_eq!(iter.cursor.fetches, 1);
    }

    #[test]
    fn test_fetches_only_when_batch_consumed() {
        let mut iter = ResultIterator::new(ScriptedCursor::new(vec![vec![1, 2], vec![3]]));
        assert_eq!(iter.next_item().unwrap(), 1);
        assert_eq!(iter.cursor.fetches, 1);
        assert_eq!(iter.next_item().unwrap(), 2);
        assert_eq!(iter.cursor.fetches, 1);
        assert_eq!(iter.next_item().unwrap(), 3);
        assert_eq!(iter.cursor.fetches, 2);
    }

    #[test]
    fn test_error_fuses_iterator() {
        let cursor = ScriptedCursor {
            batches: VecDeque::from(vec![Ok(vec![1]), Err(Error::ServerClosed), Ok(vec![2])]),
            fetches: 0,
        };
        let items: Vec<_> = ResultIterator::new(cursor).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(1)));
        assert!(matches!(items[1], Err(Error::ServerClosed)));
    }
}
