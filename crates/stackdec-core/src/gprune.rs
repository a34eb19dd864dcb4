//! Gaussian evaluation with safe top-N pruning.
//!
//! For a mixture with `m` components only the `N` best log densities matter.
//! Once `N` components are known, the squared Mahalanobis distance of every
//! later component is accumulated dimension by dimension and abandoned as soon
//! as it can no longer beat the current N-th best score. Since every dimension
//! adds a non-negative term, an abandoned component would have been discarded
//! anyway, so the result is exactly the brute-force top-N.

use crate::config::{GpruneConfig, GpruneMethod};
use crate::error::{Result, SearchError};
use crate::logmath::LogProb;

pub type GaussianId = u32;

/// Diagonal-covariance Gaussian density. Variances are stored inverted.
#[derive(Debug, Clone)]
pub struct Gaussian {
    pub mean: Vec<f32>,
    pub inv_var: Vec<f32>,
    /// `D·ln(2π) + Σ ln σ²`
    pub gconst: f32,
}

impl Gaussian {
    pub fn new(mean: Vec<f32>, var: Vec<f32>) -> Result<Self> {
        if mean.len() != var.len() {
            return Err(SearchError::InvalidInput(format!(
                "mean has {} dimensions but variance has {}",
                mean.len(),
                var.len()
            )));
        }
        if let Some(v) = var.iter().find(|&&v| !(v > 0.0)) {
            return Err(SearchError::InvalidInput(format!(
                "non-positive variance {}",
                v
            )));
        }
        let ln_2pi = (2.0 * std::f32::consts::PI).ln();
        let gconst = mean.len() as f32 * ln_2pi + var.iter().map(|v| v.ln()).sum::<f32>();
        let inv_var = var.iter().map(|v| 1.0 / v).collect();
        Ok(Gaussian {
            mean,
            inv_var,
            gconst,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Natural-log density of `x`.
    #[inline]
    pub fn log_density(&self, x: &[f32]) -> LogProb {
        let mut tmp = self.gconst;
        for ((&xi, &m), &iv) in x.iter().zip(&self.mean).zip(&self.inv_var) {
            let d = xi - m;
            tmp += d * d * iv;
        }
        tmp * -0.5
    }

    /// Like [`Gaussian::log_density`], but gives up with `None` once the
    /// result is certain to fall below `threshold`.
    #[inline]
    pub fn log_density_bounded(&self, x: &[f32], threshold: LogProb) -> Option<LogProb> {
        let bound = threshold * -2.0;
        let mut tmp = self.gconst;
        for ((&xi, &m), &iv) in x.iter().zip(&self.mean).zip(&self.inv_var) {
            let d = xi - m;
            tmp += d * d * iv;
            if tmp > bound {
                return None;
            }
        }
        Some(tmp * -0.5)
    }
}

/// One kept component: its position in the component list and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub index: u32,
    pub score: LogProb,
}

/// Per-call evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Components evaluated over all dimensions.
    pub full: u64,
    /// Components abandoned before the last dimension.
    pub aborted: u64,
}

impl PruneStats {
    fn add(&mut self, other: &PruneStats) {
        self.full += other.full;
        self.aborted += other.aborted;
    }
}

/// Top-N Gaussian selector. Owns its working buffers, which are reused
/// across calls.
pub struct GaussianPruner {
    method: GpruneMethod,
    num: usize,
    top: Vec<Scored>,
    // marks components already evaluated from the hint
    calced: Vec<bool>,
    last: PruneStats,
    total: PruneStats,
}

impl GaussianPruner {
    pub fn new(method: GpruneMethod, num: usize) -> Self {
        let num = num.max(1);
        GaussianPruner {
            method,
            num,
            top: Vec::with_capacity(num + 1),
            calced: Vec::new(),
            last: PruneStats::default(),
            total: PruneStats::default(),
        }
    }

    pub fn from_config(config: &GpruneConfig) -> Self {
        Self::new(config.method, config.num)
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn method(&self) -> GpruneMethod {
        self.method
    }

    /// Output of the most recent call.
    pub fn last_result(&self) -> &[Scored] {
        &self.top
    }

    /// Counters of the most recent call.
    pub fn last_stats(&self) -> PruneStats {
        self.last
    }

    /// Counters accumulated since construction.
    pub fn total_stats(&self) -> PruneStats {
        self.total
    }

    /// Score the components `ids` (indices into `pool`) on `x` and return the
    /// best `N` sorted by descending score; the earlier component wins an
    /// exact tie. `Scored::index` is the position in `ids`.
    ///
    /// With `GpruneMethod::None` every component is evaluated and returned.
    pub fn prune(&mut self, pool: &[Gaussian], ids: &[GaussianId], x: &[f32]) -> &[Scored] {
        self.prune_seeded(pool, ids, x, &[])
    }

    /// Same result as [`GaussianPruner::prune`], but the components listed
    /// in `hint` (positions in `ids`, typically the previous frame's winners)
    /// are evaluated first so that a tight threshold forms early.
    pub fn prune_seeded(
        &mut self,
        pool: &[Gaussian],
        ids: &[GaussianId],
        x: &[f32],
        hint: &[u32],
    ) -> &[Scored] {
        self.top.clear();
        self.last = PruneStats::default();

        match self.method {
            GpruneMethod::None => self.evaluate_all(pool, ids, x),
            GpruneMethod::Safe => {
                let m = ids.len();
                if !hint.is_empty() {
                    self.calced.clear();
                    self.calced.resize(m, false);
                    for &k in hint {
                        let k = k as usize;
                        if k >= m || self.calced[k] {
                            continue;
                        }
                        self.calced[k] = true;
                        let score = pool[ids[k] as usize].log_density(x);
                        self.last.full += 1;
                        self.push(k as u32, score);
                    }
                }
                for (k, &gid) in ids.iter().enumerate() {
                    if !hint.is_empty() && self.calced[k] {
                        self.calced[k] = false;
                        continue;
                    }
                    let g = &pool[gid as usize];
                    match self.threshold() {
                        None => {
                            self.last.full += 1;
                            self.push(k as u32, g.log_density(x));
                        }
                        Some(thres) => match g.log_density_bounded(x, thres) {
                            Some(score) => {
                                self.last.full += 1;
                                self.push(k as u32, score);
                            }
                            None => self.last.aborted += 1,
                        },
                    }
                }
            }
        }

        self.total.add(&self.last);
        &self.top
    }

    fn evaluate_all(&mut self, pool: &[Gaussian], ids: &[GaussianId], x: &[f32]) {
        for (k, &gid) in ids.iter().enumerate() {
            self.top.push(Scored {
                index: k as u32,
                score: pool[gid as usize].log_density(x),
            });
        }
        self.last.full = ids.len() as u64;
        // stable: equal scores keep component order
        self.top.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Score of the N-th kept component once N are kept.
    #[inline]
    fn threshold(&self) -> Option<LogProb> {
        if self.top.len() >= self.num {
            self.top.last().map(|s| s.score)
        } else {
            None
        }
    }

    /// Insert keeping descending order. Ties are ordered by component
    /// position, so the outcome does not depend on evaluation order. A full
    /// list drops its tail.
    #[inline]
    fn push(&mut self, index: u32, score: LogProb) {
        let pos = self
            .top
            .partition_point(|s| s.score > score || (s.score == score && s.index < index));
        if pos >= self.num {
            return;
        }
        if self.top.len() >= self.num {
            self.top.pop();
        }
        self.top.insert(pos, Scored { index, score });
    }
}

/// Positions of the kept components, for seeding the next frame.
pub fn winners(top: &[Scored]) -> Vec<u32> {
    top.iter().map(|s| s.index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so the bank is reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }
    }

    fn bank(seed: u64, m: usize, dim: usize) -> (Vec<Gaussian>, Vec<f32>) {
        let mut rng = Lcg(seed);
        let pool = (0..m)
            .map(|_| {
                let mean = (0..dim).map(|_| rng.next_f32() * 4.0 - 2.0).collect();
                let var = (0..dim).map(|_| 0.2 + rng.next_f32()).collect();
                Gaussian::new(mean, var).unwrap()
            })
            .collect();
        let x = (0..dim).map(|_| rng.next_f32() * 4.0 - 2.0).collect();
        (pool, x)
    }

    fn brute_force(pool: &[Gaussian], x: &[f32], n: usize) -> Vec<Scored> {
        let mut all: Vec<Scored> = pool
            .iter()
            .enumerate()
            .map(|(k, g)| Scored {
                index: k as u32,
                score: g.log_density(x),
            })
            .collect();
        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        all.truncate(n);
        all
    }

    #[test]
    fn test_matches_brute_force() {
        for seed in 1..20u64 {
            let (pool, x) = bank(seed, 16, 25);
            let ids: Vec<u32> = (0..16).collect();
            for n in [1, 4, 16, 40] {
                let mut pruner = GaussianPruner::new(GpruneMethod::Safe, n);
                let got = pruner.prune(&pool, &ids, &x).to_vec();
                assert_eq!(got, brute_force(&pool, &x, n), "seed {} n {}", seed, n);
            }
        }
    }

    #[test]
    fn test_seeded_matches_unseeded() {
        let (pool, x) = bank(7, 32, 12);
        let ids: Vec<u32> = (0..32).collect();
        let mut pruner = GaussianPruner::new(GpruneMethod::Safe, 5);
        let plain = pruner.prune(&pool, &ids, &x).to_vec();

        // hint from a different observation, with junk entries
        let (_, x2) = bank(8, 32, 12);
        let mut hint = winners(pruner.prune(&pool, &ids, &x2));
        hint.push(99);
        hint.push(hint[0]);
        let seeded = pruner.prune_seeded(&pool, &ids, &x, &hint).to_vec();
        assert_eq!(seeded, plain);
    }

    #[test]
    fn test_ties_keep_earlier_component() {
        let g = Gaussian::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let pool = vec![g.clone(), g.clone(), g.clone()];
        let ids = [0, 1, 2];
        let mut pruner = GaussianPruner::new(GpruneMethod::Safe, 2);
        let top = pruner.prune(&pool, &ids, &[0.5, 0.5]);
        assert_eq!(top.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);

        // seeding with the last one must not change the winners
        let top = pruner.prune_seeded(&pool, &ids, &[0.5, 0.5], &[2]);
        assert_eq!(top.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_pruning_skips_work() {
        // one close component and many far away ones
        let mut pool = vec![Gaussian::new(vec![0.0; 8], vec![1.0; 8]).unwrap()];
        for i in 0..20 {
            pool.push(Gaussian::new(vec![50.0 + i as f32; 8], vec![1.0; 8]).unwrap());
        }
        let ids: Vec<u32> = (0..21).collect();
        let mut pruner = GaussianPruner::new(GpruneMethod::Safe, 1);
        let top = pruner.prune(&pool, &ids, &[0.0; 8]);
        assert_eq!(top[0].index, 0);
        let st = pruner.last_stats();
        assert_eq!(st.full, 1);
        assert_eq!(st.aborted, 20);
        assert_eq!(pruner.total_stats(), st);
    }

    #[test]
    fn test_method_none_returns_everything() {
        let (pool, x) = bank(3, 6, 4);
        let ids: Vec<u32> = (0..6).collect();
        let mut pruner = GaussianPruner::new(GpruneMethod::None, 2);
        let top = pruner.prune(&pool, &ids, &x).to_vec();
        assert_eq!(top, brute_force(&pool, &x, 6));
        assert_eq!(pruner.last_stats().aborted, 0);
    }

    #[test]
    fn test_density_value() {
        // standard normal at the mean: -0.5 * ln(2π)
        let g = Gaussian::new(vec![0.0], vec![1.0]).unwrap();
        let expect = -0.5 * (2.0 * std::f32::consts::PI).ln();
        assert!((g.log_density(&[0.0]) - expect).abs() < 1e-6);
        assert!(Gaussian::new(vec![0.0], vec![0.0]).is_err());
    }
}
