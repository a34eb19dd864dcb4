//! Second-pass search core of a stack decoder.
//!
//! A first pass leaves a [`WordTrellis`] of word ends that survived its beam.
//! A best-first driver (not part of this crate) then grows sentence
//! hypotheses backward in time, and for every popped hypothesis calls:
//!
//! 1. a [`NextWordFinder`] ([`NGramFinder`] or [`DfaFinder`]) for the words
//!    that may precede it,
//! 2. the [`HypothesisFilter`] to drop candidates that must not be expanded,
//! 3. the [`AcousticScorer`] to score lexicon nodes of the survivors with
//!    cross-word context, Gaussians pruned by the [`GaussianPruner`].

pub mod error;
pub mod config;
pub mod logmath;
pub mod trellis;
pub mod vocab;
pub mod hypothesis;
pub mod ngram;
pub mod dfa;
pub mod multigram;
pub mod gprune;
pub mod phone;
pub mod acoustic;
pub mod lexicon;
pub mod scorer;
pub mod nextword;
pub mod dfa_finder;
pub mod ngram_finder;
pub mod filter;
#[cfg(feature = "python")]
pub mod py;

pub use config::SearchConfig;
pub use dfa_finder::DfaFinder;
pub use error::{Result, SearchError};
pub use filter::HypothesisFilter;
pub use gprune::GaussianPruner;
pub use hypothesis::{CandidateBuffer, NextWordCandidate, PartialHypothesis};
pub use nextword::NextWordFinder;
pub use ngram_finder::NGramFinder;
pub use scorer::AcousticScorer;
pub use trellis::WordTrellis;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn stackdec_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<py::RustVocabulary>()?;
    m.add_class::<py::RustTrellis>()?;
    m.add_class::<py::RustNGramModel>()?;
    m.add_class::<py::RustHypothesis>()?;
    m.add_class::<py::RustNGramFinder>()?;
    m.add_function(wrap_pyfunction!(py::gprune, m)?)?;
    Ok(())
}
