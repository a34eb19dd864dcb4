//! Lexicon nodes and how each one emits its output probability.
//!
//! Every word is expanded into one node per emitting state of each of its
//! phones. Where a phone sits in the word decides its [`OutputStyle`]:
//!
//! ```text
//! single phone    LeftRightContextSet  both contexts come from neighbouring words
//! head phone      RightContextSet      left context from the previous word
//! tail phone      LeftContextSet       right context unknown, fixed set
//! internal phone  PlainState           triphone known at load time
//! ```
//!
//! Head and internal nodes are shared between words with a common prefix.

use crate::acoustic::{AcousticModel, StateId};
use crate::dfa::Dfa;
use crate::error::{Result, SearchError};
use crate::phone;
use crate::vocab::{Vocabulary, WordId};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub type NodeId = u32;

/// What the scorer needs to pick a context-dependent unit at score time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSpec {
    /// Logical name without the left context: `c+r` for a head phone, `c`
    /// for a single-phone word.
    pub base: String,
    /// State location inside the phone.
    pub loc: usize,
    /// Unit used when nothing better is known, fixed at load time.
    pub fallback: Arc<[StateId]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputStyle {
    PlainState(StateId),
    LeftContextSet(Arc<[StateId]>),
    RightContextSet(ContextSpec),
    LeftRightContextSet { spec: ContextSpec, category: u32 },
}

#[derive(Debug, Clone)]
pub struct LexNode {
    pub style: OutputStyle,
    /// Logical phone name the node was built for.
    pub name: String,
    pub loc: usize,
}

/// Per category, the head phones of words that may follow it in time.
#[derive(Debug, Clone, Default)]
pub struct FollowingHeads {
    heads: Vec<Vec<String>>,
}

impl FollowingHeads {
    /// Arcs run in search order, backward in time: a category expanded right
    /// after `c1` precedes it in the utterance, so `c1`'s head phones follow it.
    pub fn from_grammar(dfa: &Dfa, vocab: &Vocabulary) -> Self {
        let n = dfa.num_categories() as usize;
        let mut category_heads: Vec<Vec<&str>> = vec![Vec::new(); n];
        for (c, words) in dfa.categories.iter().enumerate() {
            for &w in words {
                let h = vocab.head_phone(w);
                if !category_heads[c].contains(&h) {
                    category_heads[c].push(h);
                }
            }
        }
        let mut heads = vec![Vec::<String>::new(); n];
        for c1 in 0..n as u32 {
            for c in dfa.pairs.followers(c1) {
                for &h in &category_heads[c1 as usize] {
                    let list = &mut heads[c as usize];
                    if !list.iter().any(|x| x == h) {
                        list.push(h.to_string());
                    }
                }
            }
        }
        for list in &mut heads {
            list.sort();
        }
        FollowingHeads { heads }
    }

    pub fn of(&self, category: u32) -> &[String] {
        self.heads
            .get(category as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// States at `loc` of every defined `lc-c+r` with `r` among `heads`.
pub(crate) fn narrowed_states(
    am: &AcousticModel,
    left_center: &str,
    heads: &[String],
    loc: usize,
) -> Vec<StateId> {
    let mut states = Vec::new();
    for r in heads {
        let name = phone::compose(None, left_center, Some(r.as_str()));
        if let Some(s) = am.hmm_state(&name, loc) {
            if !states.contains(&s) {
                states.push(s);
            }
        }
    }
    states
}

#[derive(Debug, Default)]
pub struct Lexicon {
    nodes: Vec<LexNode>,
    words: Vec<Vec<NodeId>>,
}

impl Lexicon {
    /// Expand every word of `vocab`. Pass `following` when a grammar
    /// constrains which words may follow each other; tail sets are then
    /// narrowed to the right contexts the grammar allows.
    pub fn build(
        am: &AcousticModel,
        vocab: &Vocabulary,
        following: Option<&FollowingHeads>,
    ) -> Result<Self> {
        let mut lex = Lexicon::default();
        let mut shared: FxHashMap<(Option<NodeId>, String, usize), NodeId> = FxHashMap::default();

        for (w, entry) in vocab.iter() {
            let phones = &entry.phones;
            let n = phones.len();
            let mut path = Vec::new();
            let mut parent: Option<NodeId> = None;

            for i in 0..n {
                let c = phones[i].as_str();
                let word_end = i == n - 1;
                let units = if n == 1 {
                    single_phone_units(am, c, entry.category)?
                } else if i == 0 {
                    head_units(am, c, &phones[1])?
                } else if word_end {
                    let lc = phone::compose(Some(phones[i - 1].as_str()), c, None);
                    let heads = following.map(|f| f.of(entry.category));
                    tail_units(am, &lc, c, heads, w)?
                } else {
                    internal_units(am, &phones[i - 1], c, &phones[i + 1])?
                };

                for (loc, (name, style)) in units.into_iter().enumerate() {
                    let id = if word_end {
                        lex.push_node(name, loc, style)
                    } else {
                        let key = (parent, name, loc);
                        match shared.get(&key) {
                            Some(&id) => id,
                            None => {
                                let id = lex.push_node(key.1.clone(), loc, style);
                                shared.insert(key, id);
                                id
                            }
                        }
                    };
                    path.push(id);
                    parent = Some(id);
                }
            }
            lex.words.push(path);
        }

        log::info!(
            "lexicon: {} words, {} nodes ({} shared prefixes)",
            lex.words.len(),
            lex.nodes.len(),
            shared.len()
        );
        Ok(lex)
    }

    fn push_node(&mut self, name: String, loc: usize, style: OutputStyle) -> NodeId {
        self.nodes.push(LexNode { style, name, loc });
        self.nodes.len() as NodeId - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &LexNode {
        &self.nodes[id as usize]
    }

    /// Nodes of a word in time order.
    pub fn word_nodes(&self, w: WordId) -> &[NodeId] {
        &self.words[w as usize]
    }
}

type Units = Vec<(String, OutputStyle)>;

fn missing(name: &str) -> SearchError {
    SearchError::ModelInconsistency(format!("no acoustic unit for phone \"{}\"", name))
}

/// Load-time fallback for a context-resolved phone: the defined HMM `base`,
/// else the pseudo set `base`, else the pseudo set of its center.
fn fallback_units(am: &AcousticModel, base: &str) -> Option<Vec<Arc<[StateId]>>> {
    if let Some(hmm) = am.find_hmm(base) {
        return Some(hmm.states.iter().map(|&s| Arc::from(vec![s])).collect());
    }
    am.find_set(base)
        .or_else(|| am.find_set(phone::center(base)))
        .map(|set| set.locs.clone())
}

fn head_units(am: &AcousticModel, c: &str, right: &str) -> Result<Units> {
    let base = phone::compose(None, c, Some(right));
    let fallback = fallback_units(am, &base).ok_or_else(|| missing(&base))?;
    Ok(fallback
        .into_iter()
        .enumerate()
        .map(|(loc, fb)| {
            let spec = ContextSpec {
                base: base.clone(),
                loc,
                fallback: fb,
            };
            (base.clone(), OutputStyle::RightContextSet(spec))
        })
        .collect())
}

fn single_phone_units(am: &AcousticModel, c: &str, category: u32) -> Result<Units> {
    let fallback = fallback_units(am, c).ok_or_else(|| missing(c))?;
    Ok(fallback
        .into_iter()
        .enumerate()
        .map(|(loc, fb)| {
            let spec = ContextSpec {
                base: c.to_string(),
                loc,
                fallback: fb,
            };
            (c.to_string(), OutputStyle::LeftRightContextSet { spec, category })
        })
        .collect())
}

fn tail_units(
    am: &AcousticModel,
    left_center: &str,
    c: &str,
    heads: Option<&[String]>,
    w: WordId,
) -> Result<Units> {
    let set = am
        .find_set(left_center)
        .or_else(|| am.find_set(c))
        .ok_or_else(|| missing(left_center))?;
    let mut units = Vec::with_capacity(set.locs.len());
    for (loc, plain) in set.locs.iter().enumerate() {
        let states = match heads {
            Some(heads) => {
                let narrowed = narrowed_states(am, left_center, heads, loc);
                if narrowed.is_empty() {
                    log::warn!(
                        "word #{}: no \"{}\" triphone fits the grammar, using the full set",
                        w,
                        left_center
                    );
                    plain.clone()
                } else {
                    Arc::from(narrowed)
                }
            }
            None => plain.clone(),
        };
        units.push((left_center.to_string(), OutputStyle::LeftContextSet(states)));
    }
    Ok(units)
}

fn internal_units(am: &AcousticModel, left: &str, c: &str, right: &str) -> Result<Units> {
    let name = phone::compose(Some(left), c, Some(right));
    if let Some(hmm) = am.find_hmm(&name) {
        return Ok(hmm
            .states
            .iter()
            .map(|&s| (name.clone(), OutputStyle::PlainState(s)))
            .collect());
    }
    let lc = phone::compose(Some(left), c, None);
    let rc = phone::compose(None, c, Some(right));
    let set = am
        .find_set(&lc)
        .or_else(|| am.find_set(&rc))
        .or_else(|| am.find_set(c))
        .ok_or_else(|| missing(&name))?;
    log::debug!("\"{}\" not defined, using pseudo set \"{}\"", name, set.name);
    Ok(set
        .locs
        .iter()
        .map(|s| (name.clone(), OutputStyle::LeftContextSet(s.clone())))
        .collect())
}
