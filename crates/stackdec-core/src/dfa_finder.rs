//! Next-word candidates from a grammar automaton.

use crate::config::SearchConfig;
use crate::dfa::Dfa;
use crate::error::{Result, SearchError};
use crate::hypothesis::{CandidateBuffer, NextWordCandidate, PartialHypothesis};
use crate::logmath::LogProb;
use crate::multigram::MultiGrammar;
use crate::nextword::{look_around_in, NextWordFinder};
use crate::trellis::WordTrellis;

/// Borrowed view over a grammar and the utterance trellis; cheap to build
/// per utterance.
pub struct DfaFinder<'a> {
    dfa: &'a Dfa,
    grammars: Option<&'a MultiGrammar>,
    trellis: &'a WordTrellis,
    lookup_range: u32,
    penalty: LogProb,
}

impl<'a> DfaFinder<'a> {
    /// Finder over a single automaton, every state live.
    pub fn new(dfa: &'a Dfa, trellis: &'a WordTrellis, config: &SearchConfig) -> Self {
        DfaFinder {
            dfa,
            grammars: None,
            trellis,
            lookup_range: config.lookup_range,
            penalty: config.insertion_penalty,
        }
    }

    /// Finder over the global grammar of `grammars`; inactive grammars
    /// contribute no words.
    pub fn with_grammars(grammars: &'a MultiGrammar, trellis: &'a WordTrellis, config: &SearchConfig) -> Self {
        DfaFinder {
            grammars: Some(grammars),
            ..Self::new(grammars.dfa(), trellis, config)
        }
    }

    fn category_live(&self, category: u32) -> bool {
        self.grammars
            .map_or(true, |g| g.is_category_active(category))
    }

    fn push_category(
        &self,
        category: u32,
        next_state: u32,
        sp_optional: bool,
        out: &mut CandidateBuffer,
    ) -> Result<()> {
        for &word in self.dfa.words_of(category) {
            out.push(NextWordCandidate {
                word,
                next_state: Some(next_state),
                sp_optional,
                lscore: self.penalty,
                trellis_entry: None,
            })?;
        }
        Ok(())
    }

    fn push_initial(&self, s: u32, out: &mut CandidateBuffer) -> Result<()> {
        if !self.dfa.is_initial[s as usize] {
            return Ok(());
        }
        for arc in self.dfa.arcs_from(s) {
            self.push_category(arc.category, arc.dest, false, out)?;
        }
        Ok(())
    }
}

impl NextWordFinder for DfaFinder<'_> {
    fn first_words(&self, out: &mut CandidateBuffer) -> Result<usize> {
        out.clear();
        match self.grammars {
            Some(g) => {
                for range in g.active_state_ranges() {
                    for s in range {
                        self.push_initial(s, out)?;
                    }
                }
            }
            None => {
                for s in 0..self.dfa.num_states {
                    self.push_initial(s, out)?;
                }
            }
        }
        log::debug!("{} first words", out.len());
        Ok(out.len())
    }

    /// Every word on an arc leaving the hypothesis's state. A short-pause
    /// arc is looked through: the words one arc further are emitted instead,
    /// marked as allowing a pause before them.
    fn next_words(&self, hypo: &PartialHypothesis, out: &mut CandidateBuffer) -> Result<usize> {
        out.clear();
        let state = hypo.state.ok_or(SearchError::MissingGrammarState)?;
        if state >= self.dfa.num_states {
            return Err(SearchError::InvalidInput(format!(
                "hypothesis state {} out of range",
                state
            )));
        }
        for arc in self.dfa.arcs_from(state) {
            if !self.category_live(arc.category) {
                continue;
            }
            if self.dfa.is_sp[arc.category as usize] {
                for arc2 in self.dfa.arcs_from(arc.dest) {
                    self.push_category(arc2.category, arc2.dest, true, out)?;
                }
            } else {
                self.push_category(arc.category, arc.dest, false, out)?;
            }
        }
        log::debug!("{} next words from state {}", out.len(), state);
        Ok(out.len())
    }

    fn acceptable(&self, hypo: &PartialHypothesis) -> bool {
        hypo.state
            .and_then(|s| self.dfa.is_accept.get(s as usize).copied())
            .unwrap_or(false)
    }

    fn look_around(&self, candidate: &mut NextWordCandidate, hypo: &PartialHypothesis) -> bool {
        look_around_in(self.trellis, self.lookup_range, candidate, hypo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trellis::TrellisHandle;
    use crate::vocab::{Vocabulary, WordEntry};

    // S -HELLO-> 1 -sp-> 2 -{WORLD, THERE}-> 3 (accept)
    fn hello_world() -> (Dfa, Vocabulary) {
        let mut v = Vocabulary::new();
        v.push(WordEntry::new("HELLO", &["h", "e", "l", "o"]).category(0)).unwrap();
        v.push(WordEntry::new("<sp>", &["sp"]).category(1)).unwrap();
        v.push(WordEntry::new("WORLD", &["w", "o", "r", "l", "d"]).category(2)).unwrap();
        v.push(WordEntry::new("THERE", &["dh", "e", "r"]).category(2)).unwrap();
        let mut dfa = Dfa::new(4, 3, &[0], &[3], &[(0, 0, 1), (1, 1, 2), (2, 2, 3)]).unwrap();
        dfa.assign_words(&v, "sp").unwrap();
        (dfa, v)
    }

    fn trellis() -> WordTrellis {
        WordTrellis::new(100, &[(0, 0, 10, -100.0), (2, 11, 25, -300.0), (3, 11, 26, -310.0)]).unwrap()
    }

    #[test]
    fn test_short_pause_is_looked_through() {
        let (dfa, v) = hello_world();
        let tr = trellis();
        let config = SearchConfig::default();
        let finder = DfaFinder::new(&dfa, &tr, &config);
        let hypo = PartialHypothesis::from_words(vec![v.find("HELLO").unwrap()], 24).with_state(1);

        let mut out = CandidateBuffer::with_capacity(16);
        let n = finder.next_words(&hypo, &mut out).unwrap();
        assert_eq!(n, 2);
        let words: Vec<_> = out.iter().map(|c| c.word).collect();
        assert_eq!(words, vec![v.find("WORLD").unwrap(), v.find("THERE").unwrap()]);
        assert!(out.iter().all(|c| c.sp_optional && c.next_state == Some(3)));
        assert!(!words.contains(&v.find("<sp>").unwrap()));
    }

    #[test]
    fn test_end_to_end_window_lookup() {
        let (dfa, v) = hello_world();
        let tr = trellis();
        let mut config = SearchConfig::default();
        config.lookup_range = 3;
        let finder = DfaFinder::new(&dfa, &tr, &config);
        let hypo = PartialHypothesis::from_words(vec![0], 24).with_state(1);

        let mut out = CandidateBuffer::with_capacity(16);
        finder.next_words(&hypo, &mut out).unwrap();
        let mut cands: Vec<NextWordCandidate> = out.iter().cloned().collect();
        for c in &mut cands {
            assert!(finder.look_around(c, &hypo));
        }
        let world = &cands[0];
        let there = &cands[1];
        assert_eq!(world.word, v.find("WORLD").unwrap());
        assert_eq!(world.trellis_entry, Some(TrellisHandle(1)));
        assert_eq!(tr.get(TrellisHandle(1)).unwrap().end, 25);
        assert_eq!(there.trellis_entry, Some(TrellisHandle(2)));
        assert_eq!(tr.get(TrellisHandle(2)).unwrap().end, 26);

        // outside the window
        let far = PartialHypothesis::from_words(vec![0], 40).with_state(1);
        let mut c = cands[0].clone();
        assert!(!finder.look_around(&mut c, &far));
    }

    #[test]
    fn test_first_words_and_acceptance() {
        let (dfa, v) = hello_world();
        let tr = trellis();
        let mut config = SearchConfig::default();
        config.insertion_penalty = -1.5;
        let finder = DfaFinder::new(&dfa, &tr, &config);

        let mut out = CandidateBuffer::with_capacity(4);
        assert_eq!(finder.first_words(&mut out).unwrap(), 1);
        assert_eq!(out.as_slice()[0].word, v.find("HELLO").unwrap());
        assert_eq!(out.as_slice()[0].lscore, -1.5);
        assert!(!out.as_slice()[0].sp_optional);

        assert!(finder.acceptable(&PartialHypothesis::from_words(vec![2], 0).with_state(3)));
        assert!(!finder.acceptable(&PartialHypothesis::from_words(vec![0], 0).with_state(1)));
        assert!(!finder.acceptable(&PartialHypothesis::from_words(vec![0], 0)));
    }

    #[test]
    fn test_missing_state_and_overflow() {
        let (dfa, _) = hello_world();
        let tr = trellis();
        let config = SearchConfig::default();
        let finder = DfaFinder::new(&dfa, &tr, &config);
        let mut out = CandidateBuffer::with_capacity(1);

        let stateless = PartialHypothesis::from_words(vec![0], 24);
        assert!(matches!(
            finder.next_words(&stateless, &mut out),
            Err(SearchError::MissingGrammarState)
        ));
        let hypo = PartialHypothesis::from_words(vec![0], 24).with_state(1);
        let err = finder.next_words(&hypo, &mut out).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_inactive_grammar_is_skipped() {
        let mut mg = MultiGrammar::new("sp");
        let (d, v) = hello_world();
        let a = mg.add("hello", d, v);
        let (d, v) = hello_world();
        mg.add("hello2", d, v);
        mg.commit().unwrap();
        mg.deactivate(a);
        mg.commit().unwrap();

        let tr = trellis();
        let config = SearchConfig::default();
        let finder = DfaFinder::with_grammars(&mg, &tr, &config);
        let mut out = CandidateBuffer::with_capacity(16);
        assert_eq!(finder.first_words(&mut out).unwrap(), 1);
        // second grammar's HELLO
        assert_eq!(out.as_slice()[0].word, 4);
        assert_eq!(out.as_slice()[0].next_state, Some(5));

        // a state of the inactive grammar yields nothing
        let hypo = PartialHypothesis::from_words(vec![0], 24).with_state(1);
        assert_eq!(finder.next_words(&hypo, &mut out).unwrap(), 0);
        let hypo = PartialHypothesis::from_words(vec![4], 24).with_state(5);
        assert_eq!(finder.next_words(&hypo, &mut out).unwrap(), 2);
    }
}
