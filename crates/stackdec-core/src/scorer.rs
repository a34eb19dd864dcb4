//! Output probabilities of lexicon nodes with cross-word context.
//!
//! Head phones (and single-phone words) depend on the preceding word's tail
//! phone, which is only known at score time. The unit picked for a
//! `(node, last word)` pair is cached by the scorer itself, so two drivers
//! never share resolution state; run one scorer per worker.

use crate::acoustic::{AcousticModel, FeatureFrames, StateId};
use crate::config::{IwcdConfig, IwcdMethod, SearchConfig};
use crate::error::{Result, SearchError};
use crate::gprune::GaussianPruner;
use crate::lexicon::{narrowed_states, ContextSpec, FollowingHeads, Lexicon, NodeId, OutputStyle};
use crate::logmath::{LogProb, LOG_ZERO};
use crate::phone;
use crate::vocab::{Vocabulary, WordId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Unit a context-dependent node resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedUnit {
    State(StateId),
    Set(Arc<[StateId]>),
}

type ContextKey = (NodeId, Option<WordId>);

/// Bounded map from `(node, last word)` to its resolved unit. Two
/// generations of at most `capacity / 2` entries each: when the current one
/// fills up it becomes the previous one and the old previous is dropped.
/// Entries found in the previous generation are promoted.
pub struct ContextCache {
    generation_size: usize,
    current: FxHashMap<ContextKey, ResolvedUnit>,
    previous: FxHashMap<ContextKey, ResolvedUnit>,
}

impl ContextCache {
    pub fn new(capacity: usize) -> Self {
        ContextCache {
            generation_size: (capacity / 2).max(1),
            current: FxHashMap::default(),
            previous: FxHashMap::default(),
        }
    }

    pub fn get(&mut self, key: &ContextKey) -> Option<ResolvedUnit> {
        if let Some(u) = self.current.get(key) {
            return Some(u.clone());
        }
        let u = self.previous.remove(key)?;
        self.insert(*key, u.clone());
        Some(u)
    }

    pub fn insert(&mut self, key: ContextKey, unit: ResolvedUnit) {
        if self.current.len() >= self.generation_size {
            self.previous = std::mem::take(&mut self.current);
        }
        self.current.insert(key, unit);
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.previous.clear();
    }
}

/// Scorer instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorerStats {
    /// Context resolutions actually computed.
    pub resolutions: u64,
    /// Resolutions answered from the context cache.
    pub cache_hits: u64,
    /// Resolutions that had to settle for a less specific unit.
    pub fallbacks: u64,
    /// Mixture states evaluated.
    pub state_evals: u64,
    /// State evaluations answered from the per-frame cache.
    pub state_cache_hits: u64,
}

pub struct AcousticScorer<'a> {
    model: &'a AcousticModel,
    lexicon: &'a Lexicon,
    vocab: &'a Vocabulary,
    features: &'a FeatureFrames,
    following: Option<&'a FollowingHeads>,
    iwcd: IwcdConfig,
    pruner: GaussianPruner,
    cache: ContextCache,
    // (base, left context) pairs already reported
    warned: FxHashSet<(String, String)>,
    state_cache: FxHashMap<(u32, StateId), LogProb>,
    // previous winners per state, seeds the pruner
    hints: FxHashMap<StateId, Vec<u32>>,
    nbest_buf: Vec<LogProb>,
    stats: ScorerStats,
}

impl<'a> AcousticScorer<'a> {
    pub fn new(
        model: &'a AcousticModel,
        lexicon: &'a Lexicon,
        vocab: &'a Vocabulary,
        features: &'a FeatureFrames,
        config: &SearchConfig,
    ) -> Result<Self> {
        if features.veclen() != model.veclen() {
            return Err(SearchError::ModelInconsistency(format!(
                "feature vector length {} does not match model ({})",
                features.veclen(),
                model.veclen()
            )));
        }
        Ok(AcousticScorer {
            model,
            lexicon,
            vocab,
            features,
            following: None,
            iwcd: config.iwcd.clone(),
            pruner: GaussianPruner::from_config(&config.gprune),
            cache: ContextCache::new(config.context_cache_capacity),
            warned: FxHashSet::default(),
            state_cache: FxHashMap::default(),
            hints: FxHashMap::default(),
            nbest_buf: Vec::new(),
            stats: ScorerStats::default(),
        })
    }

    /// Narrow single-phone words by the grammar's category pairs.
    pub fn with_following_heads(mut self, following: &'a FollowingHeads) -> Self {
        self.following = Some(following);
        self
    }

    pub fn stats(&self) -> ScorerStats {
        self.stats
    }

    pub fn pruner(&self) -> &GaussianPruner {
        &self.pruner
    }

    pub fn cached_contexts(&self) -> usize {
        self.cache.len()
    }

    /// Distinct (unit, left context) pairs reported as missing so far.
    pub fn warned_pairs(&self) -> usize {
        self.warned.len()
    }

    /// log10 output probability of `node` at `frame`, given the word before
    /// it in time.
    pub fn score(&mut self, node: NodeId, frame: usize, last_word: Option<WordId>) -> Result<LogProb> {
        if frame >= self.features.num_frames() {
            return Err(SearchError::InvalidInput(format!(
                "frame {} beyond utterance length {}",
                frame,
                self.features.num_frames()
            )));
        }
        if node as usize >= self.lexicon.len() {
            return Err(SearchError::InvalidInput(format!("no lexicon node #{}", node)));
        }
        if let Some(w) = last_word {
            self.vocab.check(w)?;
        }
        let lexicon = self.lexicon;
        let prob = match &lexicon.node(node).style {
            OutputStyle::PlainState(s) => self.state_prob(*s, frame),
            OutputStyle::LeftContextSet(states) => self.set_prob(states, frame),
            OutputStyle::RightContextSet(spec) => {
                let unit = self.resolved(node, spec, None, last_word);
                self.unit_prob(&unit, frame)
            }
            OutputStyle::LeftRightContextSet { spec, category } => {
                let unit = self.resolved(node, spec, Some(*category), last_word);
                self.unit_prob(&unit, frame)
            }
        };
        Ok(prob)
    }

    fn resolved(
        &mut self,
        node: NodeId,
        spec: &ContextSpec,
        category: Option<u32>,
        last_word: Option<WordId>,
    ) -> ResolvedUnit {
        let key = (node, last_word);
        if let Some(unit) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            return unit;
        }
        self.stats.resolutions += 1;
        let unit = self.resolve(spec, category, last_word);
        self.cache.insert(key, unit.clone());
        unit
    }

    /// Most specific unit for `spec` after `last_word`: the exact triphone
    /// (for single-phone words, the grammar-allowed triphones), then the
    /// defined biphone, then the pseudo set, then the load-time fallback.
    fn resolve(&mut self, spec: &ContextSpec, category: Option<u32>, last_word: Option<WordId>) -> ResolvedUnit {
        let am = self.model;
        let loc = spec.loc;

        let w = match last_word {
            Some(w) => w,
            None => {
                return match am.hmm_state(&spec.base, loc) {
                    Some(s) => ResolvedUnit::State(s),
                    None => ResolvedUnit::Set(spec.fallback.clone()),
                };
            }
        };
        let vocab = self.vocab;
        let lc = vocab.tail_phone(w);
        let left_center = phone::with_left(lc, phone::center(&spec.base));

        match category {
            None => {
                if let Some(s) = am.hmm_state(&phone::with_left(lc, &spec.base), loc) {
                    return ResolvedUnit::State(s);
                }
            }
            Some(c) => {
                if let Some(f) = self.following {
                    let states = narrowed_states(am, &left_center, f.of(c), loc);
                    if !states.is_empty() {
                        return ResolvedUnit::Set(Arc::from(states));
                    }
                }
            }
        }

        // without a grammar a single-phone word never knows its right
        // context, so the left-context unit is its normal case
        let expected = category.is_some() && self.following.is_none();
        let unit = if let Some(s) = am.hmm_state(&left_center, loc) {
            Some(ResolvedUnit::State(s))
        } else {
            am.set_states(&left_center, loc)
                .map(|set| ResolvedUnit::Set(set.clone()))
        };
        match unit {
            Some(unit) => {
                if !expected {
                    self.note_fallback(&spec.base, lc);
                }
                unit
            }
            None => {
                self.note_fallback(&spec.base, lc);
                ResolvedUnit::Set(spec.fallback.clone())
            }
        }
    }

    fn note_fallback(&mut self, base: &str, lc: &str) {
        self.stats.fallbacks += 1;
        if self.warned.insert((base.to_string(), lc.to_string())) {
            log::warn!(
                "\"{}\" not defined, using a less specific unit",
                phone::with_left(lc, base)
            );
        }
    }

    fn unit_prob(&mut self, unit: &ResolvedUnit, frame: usize) -> LogProb {
        match unit {
            ResolvedUnit::State(s) => self.state_prob(*s, frame),
            ResolvedUnit::Set(states) => self.set_prob(states, frame),
        }
    }

    fn state_prob(&mut self, state: StateId, frame: usize) -> LogProb {
        let key = (frame as u32, state);
        if let Some(&p) = self.state_cache.get(&key) {
            self.stats.state_cache_hits += 1;
            return p;
        }
        self.stats.state_evals += 1;
        let x = self.features.frame(frame);
        let hint = self.hints.get(&state).map(Vec::as_slice).unwrap_or(&[]);
        let p = self.model.state_logprob(state, x, &mut self.pruner, hint);

        let winners = self.hints.entry(state).or_default();
        winners.clear();
        winners.extend(self.pruner.last_result().iter().map(|s| s.index));
        self.state_cache.insert(key, p);
        p
    }

    /// Collapse a set of variant states into one score.
    fn set_prob(&mut self, states: &[StateId], frame: usize) -> LogProb {
        match self.iwcd.method {
            IwcdMethod::Max => states
                .iter()
                .map(|&s| self.state_prob(s, frame))
                .fold(LOG_ZERO, f32::max),
            IwcdMethod::Avg => {
                let mut sum = 0.0;
                let mut n = 0usize;
                for &s in states {
                    let p = self.state_prob(s, frame);
                    if p > LOG_ZERO {
                        sum += p;
                        n += 1;
                    }
                }
                if n == 0 {
                    LOG_ZERO
                } else {
                    sum / n as f32
                }
            }
            IwcdMethod::NBest => {
                let mut buf = std::mem::take(&mut self.nbest_buf);
                buf.clear();
                for &s in states {
                    let p = self.state_prob(s, frame);
                    if p > LOG_ZERO {
                        buf.push(p);
                    }
                }
                buf.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                let n = buf.len().min(self.iwcd.nbest);
                let prob = if n == 0 {
                    LOG_ZERO
                } else {
                    buf[..n].iter().sum::<f32>() / n as f32
                };
                self.nbest_buf = buf;
                prob
            }
        }
    }
}
