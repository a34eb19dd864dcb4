//! Back-off n-gram model queried right-to-left.
//!
//! The backward search predicts a word from the words that *follow* it, so
//! every probability here is conditioned on the right context:
//! `bi_rl(w, next) = log10 P(w | next)` and
//! `tri_rl(w, next, next2) = log10 P(w | next next2)`.

use crate::error::{Result, SearchError};
use crate::logmath::LogProb;
use crate::vocab::Vocabulary;
use rustc_hash::FxHashMap;

pub type LmWordId = u32;

#[derive(Debug, Clone, Default)]
pub struct NGramModel {
    names: Vec<String>,
    index: FxHashMap<String, LmWordId>,
    unigram: Vec<LogProb>,
    // back-off weight of a single right context word
    bo_rl: Vec<LogProb>,
    // (w, next) -> log10 P(w | next)
    bigram_rl: FxHashMap<(LmWordId, LmWordId), LogProb>,
    // (next, next2) -> back-off weight toward the bigram
    bo_rrl: FxHashMap<(LmWordId, LmWordId), LogProb>,
    // (w, next, next2) -> log10 P(w | next next2)
    trigram_rrl: FxHashMap<(LmWordId, LmWordId, LmWordId), LogProb>,
    unk_id: Option<LmWordId>,
    unk_num_log: LogProb,
}

impl NGramModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a word with its unigram probability and right-context
    /// back-off weight. Re-adding a name overwrites its values.
    pub fn add_unigram(&mut self, name: &str, prob: LogProb, bo_rl: LogProb) -> LmWordId {
        if let Some(&id) = self.index.get(name) {
            self.unigram[id as usize] = prob;
            self.bo_rl[id as usize] = bo_rl;
            return id;
        }
        let id = self.names.len() as LmWordId;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.unigram.push(prob);
        self.bo_rl.push(bo_rl);
        id
    }

    /// `log10 P(w | next)`, plus the back-off weight of the `(w, next)` pair
    /// when it acts as a trigram context.
    pub fn add_bigram(&mut self, w: LmWordId, next: LmWordId, prob: LogProb, bo_rrl: Option<LogProb>) -> Result<()> {
        self.check_id(w)?;
        self.check_id(next)?;
        self.bigram_rl.insert((w, next), prob);
        if let Some(bo) = bo_rrl {
            self.bo_rrl.insert((w, next), bo);
        }
        Ok(())
    }

    pub fn add_trigram(&mut self, w: LmWordId, next: LmWordId, next2: LmWordId, prob: LogProb) -> Result<()> {
        self.check_id(w)?;
        self.check_id(next)?;
        self.check_id(next2)?;
        self.trigram_rrl.insert((w, next, next2), prob);
        Ok(())
    }

    fn check_id(&self, id: LmWordId) -> Result<()> {
        if (id as usize) < self.unigram.len() {
            Ok(())
        } else {
            Err(SearchError::InvalidInput(format!(
                "n-gram word id {} out of range ({} words)",
                id,
                self.unigram.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<LmWordId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: LmWordId) -> &str {
        &self.names[id as usize]
    }

    pub fn unk_id(&self) -> Option<LmWordId> {
        self.unk_id
    }

    pub fn unk_num_log(&self) -> LogProb {
        self.unk_num_log
    }

    /// Declare the out-of-vocabulary entry.
    pub fn set_unknown_word(&mut self, name: &str) -> Result<LmWordId> {
        let id = self.find(name).ok_or_else(|| {
            SearchError::ModelInconsistency(format!("unknown-word entry \"{}\" not in n-gram", name))
        })?;
        self.unk_id = Some(id);
        Ok(id)
    }

    /// Point every dictionary word at its n-gram entry by name. Words the
    /// model lacks map to the unknown-word entry, and the unknown-word
    /// probability mass is split evenly among them.
    pub fn map_vocabulary(&mut self, vocab: &mut Vocabulary) -> Result<()> {
        let mut unk_num = 0usize;
        let mut mapping = Vec::with_capacity(vocab.len());
        for (_, entry) in vocab.iter() {
            match self.find(&entry.name) {
                Some(id) => mapping.push(id),
                None => {
                    let unk = self.unk_id.ok_or_else(|| {
                        SearchError::ModelInconsistency(format!(
                            "word \"{}\" not in n-gram and no unknown-word entry",
                            entry.name
                        ))
                    })?;
                    log::debug!("\"{}\" mapped to unknown word", entry.name);
                    unk_num += 1;
                    mapping.push(unk);
                }
            }
        }
        vocab.set_lm_ids(&mapping);
        self.unk_num_log = if unk_num == 0 {
            0.0
        } else {
            (unk_num as f32).log10()
        };
        log::info!(
            "mapped {} dictionary words to n-gram entries ({} unknown)",
            mapping.len(),
            unk_num
        );
        Ok(())
    }

    #[inline]
    fn unk_penalty(&self, w: LmWordId) -> LogProb {
        if Some(w) == self.unk_id {
            self.unk_num_log
        } else {
            0.0
        }
    }

    #[inline]
    pub fn uni(&self, w: LmWordId) -> LogProb {
        self.unigram[w as usize] - self.unk_penalty(w)
    }

    /// `log10 P(w | next)` with back-off to `bo_rl(next) + uni(w)`.
    pub fn bi_rl(&self, w: LmWordId, next: LmWordId) -> LogProb {
        let prob = match self.bigram_rl.get(&(w, next)) {
            Some(&p) => p,
            None => self.bo_rl[next as usize] + self.unigram[w as usize],
        };
        prob - self.unk_penalty(w)
    }

    /// `log10 P(w | next next2)`. Backs off through the `(next, next2)`
    /// context weight when that bigram exists, and straight to the bigram
    /// otherwise. The unknown-word penalty is applied once.
    pub fn tri_rl(&self, w: LmWordId, next: LmWordId, next2: LmWordId) -> LogProb {
        if self.bigram_rl.contains_key(&(next, next2)) {
            if let Some(&p) = self.trigram_rrl.get(&(w, next, next2)) {
                return p - self.unk_penalty(w);
            }
            if let Some(&bo) = self.bo_rrl.get(&(next, next2)) {
                return bo + self.bi_rl(w, next);
            }
        }
        self.bi_rl(w, next)
    }
}
