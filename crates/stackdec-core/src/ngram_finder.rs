//! Next-word candidates from the word trellis, scored by the n-gram.
//!
//! Every word that survived the first pass near the hypothesis's connection
//! time is a candidate. Frames are visited center-out, so when a word
//! survives at several frames the entry nearest the center is kept.

use crate::config::{LmConfig, SearchConfig};
use crate::error::{Result, SearchError};
use crate::hypothesis::{CandidateBuffer, NextWordCandidate, PartialHypothesis};
use crate::logmath::LogProb;
use crate::ngram::{LmWordId, NGramModel};
use crate::nextword::{look_around_in, NextWordFinder};
use crate::trellis::WordTrellis;
use crate::vocab::{Vocabulary, WordId};

/// Boundary words when decoding one segment of a longer utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Starts every hypothesis (in place of the tail silence).
    pub begin: WordId,
    /// Completes a hypothesis (in place of the head silence).
    pub end: Option<WordId>,
}

impl Segment {
    /// Continue from the previous segment: the best word surviving at the
    /// boundary frame starts every hypothesis.
    pub fn at_boundary(trellis: &WordTrellis, frame: u32, end: Option<WordId>) -> Result<Self> {
        let best = trellis.best_word_at(frame).ok_or_else(|| {
            SearchError::InvalidInput(format!("no word survives at boundary frame {}", frame))
        })?;
        log::debug!("segment continues from word {} at frame {}", best.word, frame);
        Ok(Segment {
            begin: best.word,
            end,
        })
    }
}

pub struct NGramFinder<'a> {
    lm: &'a NGramModel,
    vocab: &'a Vocabulary,
    trellis: &'a WordTrellis,
    weights: LmConfig,
    lookup_range: u32,
    segment: Option<Segment>,
}

/// Up to two non-transparent words, newest first, as n-gram ids.
struct WordContext {
    words: [LmWordId; 2],
    len: usize,
}

impl<'a> NGramFinder<'a> {
    pub fn new(
        lm: &'a NGramModel,
        vocab: &'a Vocabulary,
        trellis: &'a WordTrellis,
        config: &SearchConfig,
    ) -> Self {
        NGramFinder {
            lm,
            vocab,
            trellis,
            weights: config.lm.clone(),
            lookup_range: config.lookup_range,
            segment: None,
        }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    fn context(&self, hypo: &PartialHypothesis) -> Result<WordContext> {
        let mut ctx = WordContext {
            words: [0; 2],
            len: 0,
        };
        for &w in hypo.words() {
            self.vocab.check(w)?;
            if self.vocab.is_transparent(w) {
                continue;
            }
            ctx.words[ctx.len] = self.vocab.word(w).lm_id;
            ctx.len += 1;
            if ctx.len == 2 {
                break;
            }
        }
        Ok(ctx)
    }

    /// Weighted language score of `w` following (in search order) `hypo`.
    pub fn lm_score(&self, w: WordId, hypo: &PartialHypothesis) -> Result<LogProb> {
        let newest = hypo.newest_word().ok_or(SearchError::EmptyHypothesis)?;
        let ctx = self.context(hypo)?;
        self.score_in_context(w, &ctx, newest)
    }

    fn score_in_context(&self, w: WordId, ctx: &WordContext, newest: WordId) -> Result<LogProb> {
        self.vocab.check(w)?;
        let entry = self.vocab.word(w);
        let raw = match ctx.len {
            0 => self.lm.uni(entry.lm_id),
            1 => self.lm.bi_rl(entry.lm_id, ctx.words[0]),
            _ => self.lm.tri_rl(entry.lm_id, ctx.words[0], ctx.words[1]),
        } + entry.class_logprob;
        let mut lscore = self.weights.weight * raw + self.weights.penalty;
        if entry.transparent && self.vocab.is_transparent(newest) {
            lscore += self.weights.penalty_trans;
        }
        Ok(lscore)
    }
}

impl NextWordFinder for NGramFinder<'_> {
    fn first_words(&self, out: &mut CandidateBuffer) -> Result<usize> {
        out.clear();
        let word = match self.segment {
            Some(seg) => seg.begin,
            None => self.vocab.tail_silence().ok_or_else(|| {
                SearchError::ModelInconsistency("no tail silence word in vocabulary".into())
            })?,
        };
        let mut cand = NextWordCandidate::new(word);
        cand.lscore = self.weights.penalty;
        out.push(cand)?;
        Ok(out.len())
    }

    /// Words surviving in the trellis window around the hypothesis's
    /// connection time, one candidate per word id. The list is kept sorted
    /// by word id.
    fn next_words(&self, hypo: &PartialHypothesis, out: &mut CandidateBuffer) -> Result<usize> {
        out.clear();
        let newest = hypo.newest_word().ok_or(SearchError::EmptyHypothesis)?;
        let ctx = self.context(hypo)?;

        for t in self
            .trellis
            .window(hypo.estimated_next_t, self.lookup_range, hypo.right_limit)
        {
            let before = out.len();
            for tw in self.trellis.words_at(t) {
                let (sorted, this_frame) = out.as_slice().split_at(before);
                let seen = sorted.binary_search_by_key(&tw.word, |c| c.word).is_ok()
                    || this_frame.iter().any(|c| c.word == tw.word);
                if seen {
                    continue;
                }
                out.push(NextWordCandidate {
                    word: tw.word,
                    next_state: None,
                    sp_optional: false,
                    lscore: self.score_in_context(tw.word, &ctx, newest)?,
                    trellis_entry: Some(tw.handle),
                })?;
            }
            if out.len() > before {
                out.items_mut().sort_by_key(|c| c.word);
            }
        }
        log::debug!(
            "{} next words around frame {}",
            out.len(),
            hypo.estimated_next_t
        );
        Ok(out.len())
    }

    fn acceptable(&self, hypo: &PartialHypothesis) -> bool {
        let newest = match hypo.newest_word() {
            Some(w) => w,
            None => return false,
        };
        match self.segment.and_then(|s| s.end) {
            Some(end) => newest == end,
            None => Some(newest) == self.vocab.head_silence(),
        }
    }

    fn look_around(&self, candidate: &mut NextWordCandidate, hypo: &PartialHypothesis) -> bool {
        look_around_in(self.trellis, self.lookup_range, candidate, hypo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trellis::TrellisHandle;
    use crate::vocab::WordEntry;

    struct Fixture {
        lm: NGramModel,
        vocab: Vocabulary,
    }

    // words: <s> 0, </s> 1, YES 2, NO 3, <uh> 4 (transparent)
    fn fixture() -> Fixture {
        let mut lm = NGramModel::new();
        let s = lm.add_unigram("<s>", -1.0, -0.5);
        let e = lm.add_unigram("</s>", -1.0, -0.5);
        let yes = lm.add_unigram("YES", -2.0, -0.25);
        let no = lm.add_unigram("NO", -2.5, -0.25);
        lm.add_unigram("<uh>", -3.0, 0.0);
        lm.add_bigram(yes, e, -0.5, Some(-0.1)).unwrap();
        lm.add_bigram(no, e, -0.75, Some(-0.2)).unwrap();
        lm.add_trigram(s, yes, e, -0.05).unwrap();

        let mut vocab = Vocabulary::new();
        vocab.push(WordEntry::new("<s>", &["sil"])).unwrap();
        vocab.push(WordEntry::new("</s>", &["sil"])).unwrap();
        vocab.push(WordEntry::new("YES", &["y", "e", "s"])).unwrap();
        vocab.push(WordEntry::new("NO", &["n", "o"])).unwrap();
        vocab.push(WordEntry::new("<uh>", &["a"]).transparent(true)).unwrap();
        lm.map_vocabulary(&mut vocab).unwrap();
        vocab.set_silence_words("<s>", "</s>");
        Fixture { lm, vocab }
    }

    fn config(range: u32) -> SearchConfig {
        let mut c = SearchConfig::default();
        c.lookup_range = range;
        c.lm = LmConfig {
            weight: 2.0,
            penalty: -1.0,
            penalty_trans: -7.0,
        };
        c
    }

    #[test]
    fn test_nearest_entry_wins() {
        let f = fixture();
        // NO at 49 and 51, YES at 53
        let tr = WordTrellis::new(100, &[(3, 30, 51, -10.0), (3, 30, 49, -12.0), (2, 30, 53, -9.0)]).unwrap();
        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let hypo = PartialHypothesis::from_words(vec![1], 50);

        let mut out = CandidateBuffer::with_capacity(8);
        assert_eq!(finder.next_words(&hypo, &mut out).unwrap(), 2);
        let words: Vec<_> = out.iter().map(|c| c.word).collect();
        assert_eq!(words, vec![2, 3]);
        let no = &out.as_slice()[1];
        assert_eq!(no.trellis_entry, Some(TrellisHandle(1)));
        assert_eq!(tr.get(TrellisHandle(1)).unwrap().end, 49);
    }

    #[test]
    fn test_duplicate_within_frame_keeps_first() {
        let f = fixture();
        let tr = WordTrellis::new(10, &[(2, 0, 5, -1.0), (3, 0, 5, -1.0), (2, 1, 5, -2.0)]).unwrap();
        let cfg = config(0);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let mut out = CandidateBuffer::with_capacity(8);
        finder
            .next_words(&PartialHypothesis::from_words(vec![1], 5), &mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.as_slice()[0].trellis_entry, Some(TrellisHandle(0)));
    }

    #[test]
    fn test_repeated_word_in_frame_does_not_overflow() {
        let f = fixture();
        let tr = WordTrellis::new(10, &[(2, 0, 5, -1.0), (2, 1, 5, -2.0), (3, 0, 5, -1.0)]).unwrap();
        let cfg = config(0);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let mut out = CandidateBuffer::with_capacity(2);
        let n = finder
            .next_words(&PartialHypothesis::from_words(vec![1], 5), &mut out)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(out.as_slice()[0].trellis_entry, Some(TrellisHandle(0)));
    }

    #[test]
    fn test_segment_starts_from_best_boundary_word() {
        let f = fixture();
        // three words end at the last frame; NO scores best
        let tr = WordTrellis::new(20, &[(2, 10, 19, -30.0), (3, 12, 19, -25.0), (4, 15, 19, -40.0), (2, 5, 18, -1.0)]).unwrap();
        let seg = Segment::at_boundary(&tr, 19, None).unwrap();
        assert_eq!(seg.begin, 3);

        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg).with_segment(seg);
        let mut out = CandidateBuffer::with_capacity(1);
        finder.first_words(&mut out).unwrap();
        assert_eq!(out.as_slice()[0].word, 3);

        assert!(matches!(
            Segment::at_boundary(&tr, 7, None),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unknown_word_ids_are_rejected() {
        let f = fixture();
        let tr = WordTrellis::new(10, &[(99, 0, 5, -1.0)]).unwrap();
        let cfg = config(0);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let mut out = CandidateBuffer::with_capacity(4);

        let bad_hypo = PartialHypothesis::from_words(vec![42], 5);
        assert!(matches!(
            finder.next_words(&bad_hypo, &mut out),
            Err(SearchError::InvalidInput(_))
        ));
        // trellis entry naming no dictionary word
        let hypo = PartialHypothesis::from_words(vec![1], 5);
        assert!(matches!(
            finder.next_words(&hypo, &mut out),
            Err(SearchError::InvalidInput(_))
        ));
        assert!(finder.lm_score(42, &hypo).is_err());
    }

    #[test]
    fn test_scores_by_context_length() {
        let f = fixture();
        let tr = WordTrellis::new(1, &[]).unwrap();
        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);

        // one context word: bigram P(YES | </s>)
        let h1 = PartialHypothesis::from_words(vec![1], 0);
        assert_eq!(finder.lm_score(2, &h1).unwrap(), 2.0 * -0.5 - 1.0);

        // transparent <uh> is skipped: context stays (YES, </s>)
        let h2 = PartialHypothesis::from_words(vec![4, 2, 1], 0);
        let expect = 2.0 * f.lm.tri_rl(0, 2, 1) - 1.0;
        assert_eq!(finder.lm_score(0, &h2).unwrap(), expect);
        assert_eq!(f.lm.tri_rl(0, 2, 1), -0.05);

        // only transparent words: unigram, plus the repeat penalty
        let h3 = PartialHypothesis::from_words(vec![4], 0);
        assert_eq!(finder.lm_score(4, &h3).unwrap(), 2.0 * -3.0 - 1.0 - 7.0);
        assert_eq!(finder.lm_score(3, &h3).unwrap(), 2.0 * -2.5 - 1.0);
    }

    #[test]
    fn test_first_words_and_acceptance() {
        let f = fixture();
        let tr = WordTrellis::new(1, &[]).unwrap();
        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);

        let mut out = CandidateBuffer::with_capacity(1);
        assert_eq!(finder.first_words(&mut out).unwrap(), 1);
        assert_eq!(out.as_slice()[0].word, 1);
        assert_eq!(out.as_slice()[0].lscore, -1.0);

        assert!(finder.acceptable(&PartialHypothesis::from_words(vec![0, 2, 1], 0)));
        assert!(!finder.acceptable(&PartialHypothesis::from_words(vec![2, 1], 0)));

        let seg = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg).with_segment(Segment { begin: 3, end: Some(2) });
        seg.first_words(&mut out).unwrap();
        assert_eq!(out.as_slice()[0].word, 3);
        assert!(seg.acceptable(&PartialHypothesis::from_words(vec![2, 3], 0)));
        assert!(!seg.acceptable(&PartialHypothesis::from_words(vec![0, 3], 0)));
    }

    #[test]
    fn test_empty_hypothesis_is_an_error() {
        let f = fixture();
        let tr = WordTrellis::new(1, &[]).unwrap();
        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let mut out = CandidateBuffer::with_capacity(1);
        assert!(matches!(
            finder.next_words(&PartialHypothesis::from_words(vec![], 0), &mut out),
            Err(SearchError::EmptyHypothesis)
        ));
    }

    #[test]
    fn test_right_limit_is_respected() {
        let f = fixture();
        let tr = WordTrellis::new(100, &[(2, 0, 51, -1.0), (3, 0, 49, -1.0)]).unwrap();
        let cfg = config(3);
        let finder = NGramFinder::new(&f.lm, &f.vocab, &tr, &cfg);
        let hypo = PartialHypothesis::from_words(vec![1], 50).with_right_limit(51);
        let mut out = CandidateBuffer::with_capacity(4);
        finder.next_words(&hypo, &mut out).unwrap();
        assert_eq!(out.iter().map(|c| c.word).collect::<Vec<_>>(), vec![3]);
    }
}
