//! Search parameters.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! { "lookup_range": 7, "lm": { "weight": 10.0 } }
//! ```

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gaussian pruning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpruneMethod {
    /// Evaluate every component.
    None,
    /// Exact top-N with early abort of hopeless components.
    Safe,
}

/// How a set of context-dependent variant states is collapsed into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IwcdMethod {
    Avg,
    Max,
    NBest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Multiplier applied to raw n-gram log probabilities.
    pub weight: f32,
    /// Word insertion penalty added to every n-gram score.
    pub penalty: f32,
    /// Extra penalty when two transparent words follow each other.
    pub penalty_trans: f32,
}

impl Default for LmConfig {
    fn default() -> Self {
        LmConfig {
            weight: 8.0,
            penalty: -2.0,
            penalty_trans: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpruneConfig {
    pub method: GpruneMethod,
    /// Number of best components kept per state (N).
    pub num: usize,
}

impl Default for GpruneConfig {
    fn default() -> Self {
        GpruneConfig {
            method: GpruneMethod::Safe,
            num: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IwcdConfig {
    pub method: IwcdMethod,
    /// Number of best variants averaged by `IwcdMethod::NBest`.
    pub nbest: usize,
}

impl Default for IwcdConfig {
    fn default() -> Self {
        IwcdConfig {
            method: IwcdMethod::Avg,
            nbest: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Half-width (frames) of the trellis lookup window.
    pub lookup_range: u32,
    /// Capacity of candidate buffers handed to the finders.
    pub max_candidates: usize,
    pub lm: LmConfig,
    /// Per-word penalty attached to grammar-driven candidates.
    pub insertion_penalty: f32,
    pub gprune: GpruneConfig,
    pub iwcd: IwcdConfig,
    /// Bound on cached (node, last word) context resolutions.
    pub context_cache_capacity: usize,
    pub head_silence: String,
    pub tail_silence: String,
    /// Phone name of the short-pause model.
    pub short_pause: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            lookup_range: 5,
            max_candidates: 8192,
            lm: LmConfig::default(),
            insertion_penalty: 0.0,
            gprune: GpruneConfig::default(),
            iwcd: IwcdConfig::default(),
            context_cache_capacity: 4096,
            head_silence: "<s>".to_string(),
            tail_silence: "</s>".to_string(),
            short_pause: "sp".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: SearchConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading search config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gprune.num == 0 {
            return Err(SearchError::Config("gprune.num must be at least 1".into()));
        }
        if self.max_candidates == 0 {
            return Err(SearchError::Config("max_candidates must be at least 1".into()));
        }
        if self.iwcd.method == IwcdMethod::NBest && self.iwcd.nbest == 0 {
            return Err(SearchError::Config("iwcd.nbest must be at least 1".into()));
        }
        if self.context_cache_capacity == 0 {
            return Err(SearchError::Config(
                "context_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = SearchConfig::default();
        assert_eq!(c.lookup_range, 5);
        assert_eq!(c.gprune.method, GpruneMethod::Safe);
        assert_eq!(c.iwcd.method, IwcdMethod::Avg);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let c = SearchConfig::from_json_str(
            r#"{ "lookup_range": 3, "lm": { "weight": 10.0 }, "iwcd": { "method": "nbest" } }"#,
        )
        .unwrap();
        assert_eq!(c.lookup_range, 3);
        assert_eq!(c.lm.weight, 10.0);
        // untouched siblings keep their defaults
        assert_eq!(c.lm.penalty, -2.0);
        assert_eq!(c.iwcd.method, IwcdMethod::NBest);
        assert_eq!(c.iwcd.nbest, 3);
    }

    #[test]
    fn test_rejects_zero_gprune() {
        let err = SearchConfig::from_json_str(r#"{ "gprune": { "num": 0 } }"#).unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "tail_silence": "silE", "gprune": {{ "method": "none" }} }}"#).unwrap();
        let c = SearchConfig::from_json_file(f.path()).unwrap();
        assert_eq!(c.tail_silence, "silE");
        assert_eq!(c.gprune.method, GpruneMethod::None);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SearchConfig::from_json_str("{ lookup_range: }"),
            Err(SearchError::Json(_))
        ));
    }
}
