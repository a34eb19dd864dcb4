use crate::hypothesis::{CandidateBuffer, PartialHypothesis};
use crate::vocab::Vocabulary;

/// Drops candidates that must never be expanded from a hypothesis.
pub struct HypothesisFilter<'a> {
    vocab: &'a Vocabulary,
}

impl<'a> HypothesisFilter<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Self {
        HypothesisFilter { vocab }
    }

    /// Filter `candidates` in place and return how many remain.
    ///
    /// A hypothesis already led by the sentence-start word is complete and
    /// gets nothing. Otherwise the sentence-end word (only ever a seed) is
    /// dropped, as is any candidate licensed by the same trellis entry as
    /// the hypothesis itself.
    pub fn limit(&self, candidates: &mut CandidateBuffer, hypo: &PartialHypothesis) -> usize {
        let head = self.vocab.head_silence();
        if head.is_some() && hypo.newest_word() == head {
            candidates.clear();
            return 0;
        }
        let tail = self.vocab.tail_silence();
        let entry = hypo.trellis_entry;
        candidates.items_mut().retain(|c| {
            if Some(c.word) == tail {
                return false;
            }
            !(entry.is_some() && c.trellis_entry == entry)
        });
        candidates.len()
    }
}
