use crate::error::Result;
use crate::hypothesis::{CandidateBuffer, NextWordCandidate, PartialHypothesis};
use crate::trellis::WordTrellis;

/// Source of admissible next words for the best-first driver. Candidate
/// lists are written into a caller-owned buffer, cleared first; every call
/// returns how many candidates it produced.
pub trait NextWordFinder {
    /// Words that may start a sentence hypothesis.
    fn first_words(&self, out: &mut CandidateBuffer) -> Result<usize>;

    /// Words that may extend `hypo`.
    fn next_words(&self, hypo: &PartialHypothesis, out: &mut CandidateBuffer) -> Result<usize>;

    /// Whether `hypo` forms a complete sentence.
    fn acceptable(&self, hypo: &PartialHypothesis) -> bool;

    /// Check that `candidate` survived in the trellis near the hypothesis's
    /// connection time and attach the entry found.
    fn look_around(&self, candidate: &mut NextWordCandidate, hypo: &PartialHypothesis) -> bool;
}

/// Window membership test shared by the finders: the first entry of the
/// candidate word in center-out order around `estimated_next_t`.
pub(crate) fn look_around_in(
    trellis: &WordTrellis,
    range: u32,
    candidate: &mut NextWordCandidate,
    hypo: &PartialHypothesis,
) -> bool {
    match trellis.find_near(candidate.word, hypo.estimated_next_t, range, hypo.right_limit) {
        Some(entry) => {
            candidate.trellis_entry = Some(entry.handle);
            true
        }
        None => false,
    }
}
