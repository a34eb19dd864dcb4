//! Acoustic model tables: Gaussian pool, mixture states, defined HMMs by
//! logical name, and the pseudo context sets derived from them.

use crate::error::{Result, SearchError};
use crate::gprune::{Gaussian, GaussianId, GaussianPruner};
use crate::logmath::{addlog, LogProb, INV_LOG_TEN, LOG_ZERO};
use crate::phone;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub type StateId = u32;
pub type HmmId = u32;

/// Feature vectors of one utterance, frame-major.
#[derive(Debug, Clone)]
pub struct FeatureFrames {
    veclen: usize,
    data: Vec<f32>,
}

impl FeatureFrames {
    pub fn new(veclen: usize, data: Vec<f32>) -> Result<Self> {
        if veclen == 0 || data.len() % veclen != 0 {
            return Err(SearchError::InvalidInput(format!(
                "{} feature values do not split into vectors of {}",
                data.len(),
                veclen
            )));
        }
        Ok(FeatureFrames { veclen, data })
    }

    pub fn veclen(&self) -> usize {
        self.veclen
    }

    pub fn num_frames(&self) -> usize {
        self.data.len() / self.veclen
    }

    #[inline]
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.data[t * self.veclen..(t + 1) * self.veclen]
    }
}

/// Emitting state: a Gaussian mixture.
#[derive(Debug, Clone)]
pub struct MixtureState {
    pub gaussians: Vec<GaussianId>,
    /// Natural-log mixture weights, parallel to `gaussians`.
    pub log_weights: Vec<f32>,
}

/// HMM defined in the model, with its emitting states in order.
#[derive(Debug, Clone)]
pub struct HmmDef {
    pub name: String,
    pub states: Vec<StateId>,
}

/// Pseudo phone: per state location, every state of the defined HMMs that
/// share a center, left-center or right-center name.
#[derive(Debug, Clone)]
pub struct ContextSet {
    pub name: String,
    pub locs: Vec<Arc<[StateId]>>,
}

#[derive(Debug, Default)]
pub struct AcousticModel {
    veclen: usize,
    gaussians: Vec<Gaussian>,
    states: Vec<MixtureState>,
    hmms: Vec<HmmDef>,
    hmm_index: FxHashMap<String, HmmId>,
    sets: FxHashMap<String, ContextSet>,
}

impl AcousticModel {
    pub fn new(veclen: usize) -> Self {
        AcousticModel {
            veclen,
            ..Default::default()
        }
    }

    pub fn veclen(&self) -> usize {
        self.veclen
    }

    pub fn add_gaussian(&mut self, g: Gaussian) -> Result<GaussianId> {
        if g.dim() != self.veclen {
            return Err(SearchError::ModelInconsistency(format!(
                "Gaussian of dimension {} in a model of vector length {}",
                g.dim(),
                self.veclen
            )));
        }
        self.gaussians.push(g);
        Ok(self.gaussians.len() as GaussianId - 1)
    }

    /// Add a mixture state from Gaussian ids and linear mixture weights.
    pub fn add_state(&mut self, gaussians: Vec<GaussianId>, weights: &[f32]) -> Result<StateId> {
        if gaussians.is_empty() || gaussians.len() != weights.len() {
            return Err(SearchError::ModelInconsistency(format!(
                "mixture with {} Gaussians and {} weights",
                gaussians.len(),
                weights.len()
            )));
        }
        if let Some(&g) = gaussians.iter().find(|&&g| g as usize >= self.gaussians.len()) {
            return Err(SearchError::ModelInconsistency(format!("no Gaussian #{}", g)));
        }
        let log_weights = weights
            .iter()
            .map(|&w| if w > 0.0 { w.ln() } else { LOG_ZERO })
            .collect();
        self.states.push(MixtureState {
            gaussians,
            log_weights,
        });
        Ok(self.states.len() as StateId - 1)
    }

    pub fn add_hmm(&mut self, name: &str, states: Vec<StateId>) -> Result<HmmId> {
        if let Some(&s) = states.iter().find(|&&s| s as usize >= self.states.len()) {
            return Err(SearchError::ModelInconsistency(format!(
                "HMM \"{}\" refers to missing state #{}",
                name, s
            )));
        }
        if self.hmm_index.contains_key(name) {
            return Err(SearchError::ModelInconsistency(format!(
                "HMM \"{}\" defined twice",
                name
            )));
        }
        let id = self.hmms.len() as HmmId;
        self.hmm_index.insert(name.to_string(), id);
        self.hmms.push(HmmDef {
            name: name.to_string(),
            states,
        });
        Ok(id)
    }

    /// Build the pseudo context sets. Every defined HMM adds its states, loc
    /// by loc, to the sets named by its center, left-center and
    /// right-center names. Call once after all HMMs are added.
    pub fn build_context_sets(&mut self) {
        let mut sets: FxHashMap<String, Vec<Vec<StateId>>> = FxHashMap::default();
        for hmm in &self.hmms {
            let name = hmm.name.as_str();
            let mut keys = vec![phone::center(name)];
            for k in [phone::left_center(name), phone::right_center(name)] {
                if !keys.contains(&k) {
                    keys.push(k);
                }
            }
            for key in keys {
                let locs = sets.entry(key.to_string()).or_default();
                if locs.len() < hmm.states.len() {
                    locs.resize(hmm.states.len(), Vec::new());
                }
                for (loc, &s) in hmm.states.iter().enumerate() {
                    if !locs[loc].contains(&s) {
                        locs[loc].push(s);
                    }
                }
            }
        }
        self.sets = sets
            .into_iter()
            .map(|(name, locs)| {
                let set = ContextSet {
                    name: name.clone(),
                    locs: locs.into_iter().map(Arc::from).collect(),
                };
                (name, set)
            })
            .collect();
        log::info!(
            "{} HMMs, {} pseudo context sets",
            self.hmms.len(),
            self.sets.len()
        );
    }

    pub fn find_hmm(&self, name: &str) -> Option<&HmmDef> {
        self.hmm_index.get(name).map(|&id| &self.hmms[id as usize])
    }

    pub fn find_set(&self, name: &str) -> Option<&ContextSet> {
        self.sets.get(name)
    }

    /// States at `loc` of the set `name`, if both exist.
    pub fn set_states(&self, name: &str, loc: usize) -> Option<&Arc<[StateId]>> {
        self.sets.get(name).and_then(|s| s.locs.get(loc))
    }

    pub fn hmm_state(&self, name: &str, loc: usize) -> Option<StateId> {
        self.find_hmm(name).and_then(|h| h.states.get(loc).copied())
    }

    pub fn hmms(&self) -> impl Iterator<Item = &HmmDef> {
        self.hmms.iter()
    }

    pub fn gaussians(&self) -> &[Gaussian] {
        &self.gaussians
    }

    pub fn state(&self, id: StateId) -> &MixtureState {
        &self.states[id as usize]
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// log10 output probability of a mixture state on `x`: pruned Gaussian
    /// scores plus log weights, summed in the log domain. `hint` seeds the
    /// pruner (see [`GaussianPruner::prune_seeded`]).
    pub fn state_logprob(
        &self,
        state: StateId,
        x: &[f32],
        pruner: &mut GaussianPruner,
        hint: &[u32],
    ) -> LogProb {
        let st = &self.states[state as usize];
        let top = pruner.prune_seeded(&self.gaussians, &st.gaussians, x, hint);
        let sum = top
            .iter()
            .fold(LOG_ZERO, |acc, s| addlog(acc, s.score + st.log_weights[s.index as usize]));
        if sum <= LOG_ZERO {
            LOG_ZERO
        } else {
            sum * INV_LOG_TEN
        }
    }
}
