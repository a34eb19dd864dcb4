//! Partial sentence hypotheses and next-word candidates exchanged with the
//! best-first driver.

use crate::error::{Result, SearchError};
use crate::logmath::LogProb;
use crate::trellis::TrellisHandle;
use crate::vocab::WordId;

/// A partial sentence hypothesis. Immutable once built: expansion creates a
/// child through [`PartialHypothesis::extend`], so one parent can spawn many
/// children.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialHypothesis {
    /// Word sequence, newest (earliest in time) first.
    words: Vec<WordId>,
    /// Automaton state reached so far (DFA grammar only).
    pub state: Option<u32>,
    pub score: LogProb,
    /// Estimated frame where the next (earlier) word ends.
    pub estimated_next_t: i32,
    /// Start frame of the newest word; lookups never go at or past it.
    pub right_limit: Option<i32>,
    /// Trellis entry that licensed the newest word.
    pub trellis_entry: Option<TrellisHandle>,
}

impl PartialHypothesis {
    /// One-word hypothesis built from an initial candidate.
    pub fn seed(candidate: &NextWordCandidate, score: LogProb, estimated_next_t: i32) -> Self {
        PartialHypothesis {
            words: vec![candidate.word],
            state: candidate.next_state,
            score,
            estimated_next_t,
            right_limit: None,
            trellis_entry: candidate.trellis_entry,
        }
    }

    /// Child hypothesis with `candidate` prepended as the newest word.
    pub fn extend(
        &self,
        candidate: &NextWordCandidate,
        score: LogProb,
        estimated_next_t: i32,
        right_limit: Option<i32>,
    ) -> Self {
        let mut words = Vec::with_capacity(self.words.len() + 1);
        words.push(candidate.word);
        words.extend_from_slice(&self.words);
        PartialHypothesis {
            words,
            state: candidate.next_state.or(self.state),
            score,
            estimated_next_t,
            right_limit,
            trellis_entry: candidate.trellis_entry,
        }
    }

    /// Hypothesis over an explicit word sequence (newest first).
    pub fn from_words(words: Vec<WordId>, estimated_next_t: i32) -> Self {
        PartialHypothesis {
            words,
            state: None,
            score: 0.0,
            estimated_next_t,
            right_limit: None,
            trellis_entry: None,
        }
    }

    pub fn with_state(mut self, state: u32) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_trellis_entry(mut self, handle: TrellisHandle) -> Self {
        self.trellis_entry = Some(handle);
        self
    }

    pub fn with_right_limit(mut self, limit: i32) -> Self {
        self.right_limit = Some(limit);
        self
    }

    /// Word sequence, newest first.
    pub fn words(&self) -> &[WordId] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The leading word: the one added last.
    pub fn newest_word(&self) -> Option<WordId> {
        self.words.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextWordCandidate {
    pub word: WordId,
    /// Automaton state after the word (DFA grammar only).
    pub next_state: Option<u32>,
    /// A short pause may be inserted before this word.
    pub sp_optional: bool,
    /// Incremental language score.
    pub lscore: LogProb,
    pub trellis_entry: Option<TrellisHandle>,
}

impl NextWordCandidate {
    pub fn new(word: WordId) -> Self {
        NextWordCandidate {
            word,
            next_state: None,
            sp_optional: false,
            lscore: 0.0,
            trellis_entry: None,
        }
    }
}

/// Candidate list with a fixed capacity, cleared and reused across calls.
pub struct CandidateBuffer {
    items: Vec<NextWordCandidate>,
    capacity: usize,
}

impl CandidateBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        CandidateBuffer {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow the limit after an overflow.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.items.reserve(capacity - self.items.len());
            self.capacity = capacity;
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push(&mut self, candidate: NextWordCandidate) -> Result<()> {
        if self.items.len() >= self.capacity {
            log::warn!(
                "next word candidates exceed buffer capacity {}",
                self.capacity
            );
            return Err(SearchError::BufferOverflow {
                capacity: self.capacity,
            });
        }
        self.items.push(candidate);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[NextWordCandidate] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NextWordCandidate> {
        self.items.iter()
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<NextWordCandidate> {
        &mut self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_keeps_parent() {
        let mut first = NextWordCandidate::new(3);
        first.next_state = Some(1);
        let root = PartialHypothesis::seed(&first, -1.0, 99);

        let mut c1 = NextWordCandidate::new(5);
        c1.next_state = Some(2);
        c1.trellis_entry = Some(TrellisHandle(7));
        let child = root.extend(&c1, -4.0, 60, Some(61));
        let sibling = root.extend(&NextWordCandidate::new(6), -5.0, 50, None);

        assert_eq!(root.words(), &[3]);
        assert_eq!(child.words(), &[5, 3]);
        assert_eq!(child.newest_word(), Some(5));
        assert_eq!(child.state, Some(2));
        assert_eq!(child.trellis_entry, Some(TrellisHandle(7)));
        // no new state: the parent's carries over
        assert_eq!(sibling.state, Some(1));
        assert_eq!(sibling.words(), &[6, 3]);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut buf = CandidateBuffer::with_capacity(2);
        buf.push(NextWordCandidate::new(0)).unwrap();
        buf.push(NextWordCandidate::new(1)).unwrap();
        let err = buf.push(NextWordCandidate::new(2)).unwrap_err();
        assert!(matches!(err, SearchError::BufferOverflow { capacity: 2 }));
        assert_eq!(buf.len(), 2);

        buf.grow(4);
        assert!(buf.push(NextWordCandidate::new(2)).is_ok());
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
