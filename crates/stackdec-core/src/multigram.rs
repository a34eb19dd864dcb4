//! Several named grammars composed into one global automaton and dictionary.
//!
//! Activation changes and deletions are only *marked* by [`MultiGrammar::activate`],
//! [`MultiGrammar::deactivate`] and [`MultiGrammar::delete`]; they take effect
//! at the next [`MultiGrammar::commit`], which the driver calls between
//! utterances.

use crate::config::SearchConfig;
use crate::dfa::Dfa;
use crate::error::Result;
use crate::vocab::{Vocabulary, WordId};
use std::ops::Range;

pub type GrammarId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Delete,
    Activate,
    Deactivate,
}

#[derive(Debug)]
struct Grammar {
    id: GrammarId,
    name: String,
    dfa: Dfa,
    vocab: Vocabulary,
    active: bool,
    pending: Pending,
    // not yet set up and merged into the global grammar
    fresh: bool,
    state_begin: u32,
    category_begin: u32,
    word_begin: WordId,
}

/// What a [`MultiGrammar::commit`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// The global automaton or dictionary was rebuilt or extended.
    pub rebuilt: bool,
    pub activation_changed: bool,
}

#[derive(Debug, Default)]
pub struct MultiGrammar {
    grammars: Vec<Grammar>,
    next_id: GrammarId,
    global_dfa: Dfa,
    global_vocab: Vocabulary,
    short_pause: String,
}

impl MultiGrammar {
    /// `short_pause` names the phone model that marks short-pause categories.
    pub fn new(short_pause: &str) -> Self {
        MultiGrammar {
            short_pause: short_pause.to_string(),
            ..Default::default()
        }
    }

    /// Manager whose short-pause model is the one named in `config`.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.short_pause)
    }

    /// Register a grammar, active by default. It joins the global grammar at
    /// the next commit.
    pub fn add(&mut self, name: &str, dfa: Dfa, vocab: Vocabulary) -> GrammarId {
        let id = self.next_id;
        self.next_id += 1;
        log::info!("grammar #{} \"{}\" read ({} words)", id, name, vocab.len());
        self.grammars.push(Grammar {
            id,
            name: name.to_string(),
            dfa,
            vocab,
            active: true,
            pending: Pending::None,
            fresh: true,
            state_begin: 0,
            category_begin: 0,
            word_begin: 0,
        });
        id
    }

    fn find_mut(&mut self, id: GrammarId) -> Option<&mut Grammar> {
        self.grammars.iter_mut().find(|g| g.id == id)
    }

    fn find(&self, id: GrammarId) -> Option<&Grammar> {
        self.grammars.iter().find(|g| g.id == id)
    }

    pub fn activate(&mut self, id: GrammarId) -> bool {
        self.mark(id, Pending::Activate, "activation")
    }

    pub fn deactivate(&mut self, id: GrammarId) -> bool {
        self.mark(id, Pending::Deactivate, "deactivation")
    }

    pub fn delete(&mut self, id: GrammarId) -> bool {
        self.mark(id, Pending::Delete, "deletion")
    }

    fn mark(&mut self, id: GrammarId, pending: Pending, what: &str) -> bool {
        match self.find_mut(id) {
            Some(g) => {
                if g.pending == pending {
                    log::debug!("grammar #{}: {} already pending", id, what);
                }
                g.pending = pending;
                true
            }
            None => {
                log::warn!("grammar #{} not found, {} ignored", id, what);
                false
            }
        }
    }

    /// Apply pending marks: set up fresh grammars, purge deleted ones (which
    /// rebuilds the global grammar from scratch), append fresh ones
    /// otherwise, then flip activation flags.
    pub fn commit(&mut self) -> Result<CommitReport> {
        let mut report = CommitReport::default();

        for g in self.grammars.iter_mut().filter(|g| g.fresh) {
            g.dfa.assign_words(&g.vocab, &self.short_pause)?;
        }

        let mut purged_built = false;
        self.grammars.retain(|g| {
            if g.pending == Pending::Delete {
                log::info!("grammar #{} \"{}\" purged", g.id, g.name);
                purged_built |= !g.fresh;
                false
            } else {
                true
            }
        });

        if purged_built {
            self.global_dfa = Dfa::default();
            self.global_vocab = Vocabulary::new();
            for i in 0..self.grammars.len() {
                self.install(i);
            }
            report.rebuilt = true;
        } else {
            for i in 0..self.grammars.len() {
                if self.grammars[i].fresh {
                    self.install(i);
                    report.rebuilt = true;
                }
            }
        }

        for g in &mut self.grammars {
            match g.pending {
                Pending::Activate => {
                    if !g.active {
                        log::info!("grammar #{} turned on", g.id);
                    }
                    g.active = true;
                    report.activation_changed = true;
                }
                Pending::Deactivate => {
                    if g.active {
                        log::info!("grammar #{} turned off", g.id);
                    }
                    g.active = false;
                    report.activation_changed = true;
                }
                Pending::None | Pending::Delete => {}
            }
            g.pending = Pending::None;
        }

        if report.rebuilt {
            log::info!(
                "global grammar: {} words, {} categories, {} states",
                self.global_vocab.len(),
                self.global_dfa.num_categories(),
                self.global_dfa.num_states
            );
        }
        Ok(report)
    }

    fn install(&mut self, i: usize) {
        let g = &mut self.grammars[i];
        g.state_begin = self.global_dfa.num_states;
        g.category_begin = self.global_dfa.num_categories();
        g.word_begin = self.global_vocab.append(&g.vocab, g.category_begin);
        self.global_dfa.append(&g.dfa, g.word_begin);
        g.fresh = false;
    }

    pub fn dfa(&self) -> &Dfa {
        &self.global_dfa
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.global_vocab
    }

    pub fn vocab_mut(&mut self) -> &mut Vocabulary {
        &mut self.global_vocab
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub fn name(&self, id: GrammarId) -> Option<&str> {
        self.find(id).map(|g| g.name.as_str())
    }

    pub fn is_active(&self, id: GrammarId) -> bool {
        self.find(id).map_or(false, |g| g.active)
    }

    /// Global states owned by a grammar. Empty until the grammar is committed.
    pub fn state_range(&self, id: GrammarId) -> Option<Range<u32>> {
        self.find(id).map(|g| {
            if g.fresh {
                0..0
            } else {
                g.state_begin..g.state_begin + g.dfa.num_states
            }
        })
    }

    /// Grammar owning a global category.
    pub fn grammar_of_category(&self, category: u32) -> Option<GrammarId> {
        self.grammars
            .iter()
            .filter(|g| !g.fresh)
            .find(|g| {
                category >= g.category_begin
                    && category < g.category_begin + g.dfa.num_categories()
            })
            .map(|g| g.id)
    }

    /// Global state ranges of the active, committed grammars.
    pub fn active_state_ranges(&self) -> impl Iterator<Item = Range<u32>> + '_ {
        self.grammars
            .iter()
            .filter(|g| g.active && !g.fresh)
            .map(|g| g.state_begin..g.state_begin + g.dfa.num_states)
    }

    pub fn is_category_active(&self, category: u32) -> bool {
        self.grammar_of_category(category)
            .map_or(false, |id| self.is_active(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::WordEntry;

    fn yes_no() -> (Dfa, Vocabulary) {
        let mut v = Vocabulary::new();
        v.push(WordEntry::new("YES", &["y", "e", "s"])).unwrap();
        v.push(WordEntry::new("NO", &["n", "o"])).unwrap();
        (Dfa::new(2, 1, &[0], &[1], &[(0, 0, 1)]).unwrap(), v)
    }

    fn digits() -> (Dfa, Vocabulary) {
        let mut v = Vocabulary::new();
        v.push(WordEntry::new("ONE", &["w", "a", "n"])).unwrap();
        v.push(WordEntry::new("<sp>", &["sp"]).category(1)).unwrap();
        let dfa = Dfa::new(3, 2, &[0], &[2], &[(0, 0, 1), (1, 1, 0), (1, 0, 2)]).unwrap();
        (dfa, v)
    }

    #[test]
    fn test_add_and_commit() {
        let mut mg = MultiGrammar::new("sp");
        let (d, v) = yes_no();
        let a = mg.add("yesno", d, v);
        let (d, v) = digits();
        let b = mg.add("digits", d, v);
        assert_eq!(mg.state_range(b), Some(0..0));

        let r = mg.commit().unwrap();
        assert!(r.rebuilt);
        assert_eq!(mg.state_range(a), Some(0..2));
        assert_eq!(mg.state_range(b), Some(2..5));
        assert_eq!(mg.vocab().len(), 4);
        assert_eq!(mg.dfa().words_of(1), &[2]);
        assert_eq!(mg.grammar_of_category(2), Some(b));
        assert_eq!(mg.grammar_of_category(0), Some(a));
        assert!(mg.dfa().is_sp[2]);
        assert_eq!(mg.vocab().word(3).category, 2);
    }

    #[test]
    fn test_marks_apply_on_commit() {
        let mut mg = MultiGrammar::new("sp");
        let (d, v) = yes_no();
        let a = mg.add("yesno", d, v);
        mg.commit().unwrap();

        assert!(mg.deactivate(a));
        assert!(mg.is_active(a));
        let r = mg.commit().unwrap();
        assert!(r.activation_changed && !r.rebuilt);
        assert!(!mg.is_active(a));
        assert_eq!(mg.active_state_ranges().count(), 0);

        mg.activate(a);
        mg.commit().unwrap();
        assert!(mg.is_active(a));
    }

    #[test]
    fn test_short_pause_from_config() {
        let config = SearchConfig::from_json_str(r#"{ "short_pause": "pau" }"#).unwrap();
        let mut mg = MultiGrammar::from_config(&config);
        let mut v = Vocabulary::new();
        v.push(WordEntry::new("ONE", &["w", "a", "n"])).unwrap();
        v.push(WordEntry::new("<pau>", &["pau"]).category(1)).unwrap();
        let dfa = Dfa::new(3, 2, &[0], &[2], &[(0, 0, 1), (1, 1, 0), (1, 0, 2)]).unwrap();
        mg.add("digits", dfa, v);
        let (d, v) = digits();
        mg.add("digits-sp", d, v);
        mg.commit().unwrap();
        assert!(mg.dfa().is_sp[1]);
        // "sp" is an ordinary phone under this configuration
        assert!(!mg.dfa().is_sp[3]);
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut mg = MultiGrammar::new("sp");
        assert!(!mg.activate(7));
        assert!(!mg.delete(7));
    }

    #[test]
    fn test_delete_rebuilds() {
        let mut mg = MultiGrammar::new("sp");
        let (d, v) = yes_no();
        let a = mg.add("yesno", d, v);
        let (d, v) = digits();
        let b = mg.add("digits", d, v);
        mg.commit().unwrap();

        mg.delete(a);
        assert_eq!(mg.len(), 2);
        let r = mg.commit().unwrap();
        assert!(r.rebuilt);
        assert_eq!(mg.len(), 1);
        assert_eq!(mg.state_range(b), Some(0..3));
        assert_eq!(mg.vocab().find("ONE"), Some(0));
        assert_eq!(mg.vocab().find("YES"), None);
        assert_eq!(mg.grammar_of_category(0), Some(b));
        assert!(mg.is_category_active(1));
    }
}
