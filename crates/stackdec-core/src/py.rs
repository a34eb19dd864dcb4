use pyo3::exceptions::{PyIOError, PyOverflowError, PyValueError};
use pyo3::prelude::*;

use crate::config::{GpruneMethod, SearchConfig};
use crate::error::SearchError;
use crate::filter::HypothesisFilter;
use crate::gprune::{Gaussian, GaussianPruner};
use crate::hypothesis::{CandidateBuffer, PartialHypothesis};
use crate::ngram::NGramModel;
use crate::ngram_finder::{NGramFinder, Segment};
use crate::nextword::NextWordFinder;
use crate::trellis::{TrellisHandle, WordTrellis};
use crate::vocab::{Vocabulary, WordEntry};

fn to_py_err(e: SearchError) -> PyErr {
    match e {
        SearchError::BufferOverflow { .. } => PyOverflowError::new_err(e.to_string()),
        SearchError::Io(_) => PyIOError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Candidate as seen from Python: `(word, lscore, trellis_entry)`.
type PyCandidate = (u32, f32, Option<u32>);

/// Python-visible dictionary.
#[pyclass]
pub struct RustVocabulary {
    pub(crate) inner: Vocabulary,
}

#[pymethods]
impl RustVocabulary {
    #[new]
    fn new() -> Self {
        RustVocabulary { inner: Vocabulary::new() }
    }

    #[pyo3(signature = (name, phones, category=0, transparent=false, class_logprob=0.0))]
    fn push(
        &mut self,
        name: &str,
        phones: Vec<String>,
        category: u32,
        transparent: bool,
        class_logprob: f32,
    ) -> PyResult<u32> {
        let phones: Vec<&str> = phones.iter().map(String::as_str).collect();
        let entry = WordEntry::new(name, &phones)
            .category(category)
            .transparent(transparent)
            .class_logprob(class_logprob);
        self.inner.push(entry).map_err(to_py_err)
    }

    fn find(&self, name: &str) -> Option<u32> {
        self.inner.find(name)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

/// Python-visible word trellis, built from parallel arrays (one entry per
/// surviving word); entry `i` gets handle `i`.
#[pyclass]
pub struct RustTrellis {
    pub(crate) inner: WordTrellis,
}

#[pymethods]
impl RustTrellis {
    #[new]
    #[pyo3(signature = (num_frames, word, begin, end, score))]
    fn new(num_frames: u32, word: Vec<u32>, begin: Vec<i32>, end: Vec<u32>, score: Vec<f32>) -> PyResult<Self> {
        let n = word.len();
        if begin.len() != n || end.len() != n || score.len() != n {
            return Err(PyValueError::new_err("trellis arrays differ in length"));
        }
        let entries: Vec<_> = (0..n).map(|i| (word[i], begin[i], end[i], score[i])).collect();
        let inner = WordTrellis::new(num_frames, &entries).map_err(to_py_err)?;
        Ok(RustTrellis { inner })
    }

    fn num_frames(&self) -> u32 {
        self.inner.num_frames()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// `(word, begin, end, score)` of an entry.
    fn entry(&self, handle: u32) -> Option<(u32, i32, u32, f32)> {
        self.inner
            .get(TrellisHandle(handle))
            .map(|w| (w.word, w.begin, w.end, w.score))
    }
}

#[pyclass]
pub struct RustNGramModel {
    pub(crate) inner: NGramModel,
}

#[pymethods]
impl RustNGramModel {
    #[new]
    fn new() -> Self {
        RustNGramModel { inner: NGramModel::new() }
    }

    fn add_unigram(&mut self, name: &str, prob: f32, bo_rl: f32) -> u32 {
        self.inner.add_unigram(name, prob, bo_rl)
    }

    #[pyo3(signature = (w, next, prob, bo_rrl=None))]
    fn add_bigram(&mut self, w: u32, next: u32, prob: f32, bo_rrl: Option<f32>) -> PyResult<()> {
        self.inner.add_bigram(w, next, prob, bo_rrl).map_err(to_py_err)
    }

    fn add_trigram(&mut self, w: u32, next: u32, next2: u32, prob: f32) -> PyResult<()> {
        self.inner.add_trigram(w, next, next2, prob).map_err(to_py_err)
    }

    fn set_unknown_word(&mut self, name: &str) -> PyResult<u32> {
        self.inner.set_unknown_word(name).map_err(to_py_err)
    }

    /// Bind every dictionary word to its n-gram entry.
    fn map_vocabulary(&mut self, mut vocab: PyRefMut<'_, RustVocabulary>) -> PyResult<()> {
        self.inner.map_vocabulary(&mut vocab.inner).map_err(to_py_err)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

/// Python-visible partial hypothesis (words newest first).
#[pyclass]
#[derive(Clone)]
pub struct RustHypothesis {
    pub(crate) inner: PartialHypothesis,
}

#[pymethods]
impl RustHypothesis {
    #[new]
    #[pyo3(signature = (words, estimated_next_t, right_limit=None, trellis_entry=None))]
    fn new(words: Vec<u32>, estimated_next_t: i32, right_limit: Option<i32>, trellis_entry: Option<u32>) -> Self {
        let mut inner = PartialHypothesis::from_words(words, estimated_next_t);
        inner.right_limit = right_limit;
        inner.trellis_entry = trellis_entry.map(TrellisHandle);
        RustHypothesis { inner }
    }

    #[getter]
    fn words(&self) -> Vec<u32> {
        self.inner.words().to_vec()
    }

    #[getter]
    fn estimated_next_t(&self) -> i32 {
        self.inner.estimated_next_t
    }
}

/// Python-visible n-gram next-word finder. Holds the models it reads and a
/// reusable candidate buffer; `limit` filters whatever the last
/// `next_words` call left in that buffer. The sentence boundary words of the
/// vocabulary are taken from the configuration. Passing `boundary_frame`
/// continues a short-pause segment from the best word surviving there.
#[pyclass]
pub struct RustNGramFinder {
    lm: Py<RustNGramModel>,
    vocab: Py<RustVocabulary>,
    trellis: Py<RustTrellis>,
    config: SearchConfig,
    segment: Option<Segment>,
    buffer: CandidateBuffer,
}

impl RustNGramFinder {
    fn candidates(&self) -> Vec<PyCandidate> {
        self.buffer
            .iter()
            .map(|c| (c.word, c.lscore, c.trellis_entry.map(|h| h.0)))
            .collect()
    }
}

#[pymethods]
impl RustNGramFinder {
    #[new]
    #[pyo3(signature = (lm, vocab, trellis, config_json=None, boundary_frame=None, segment_end=None))]
    fn new(
        py: Python<'_>,
        lm: Py<RustNGramModel>,
        vocab: Py<RustVocabulary>,
        trellis: Py<RustTrellis>,
        config_json: Option<&str>,
        boundary_frame: Option<u32>,
        segment_end: Option<u32>,
    ) -> PyResult<Self> {
        let config = match config_json {
            Some(s) => SearchConfig::from_json_str(s).map_err(to_py_err)?,
            None => SearchConfig::default(),
        };
        vocab.borrow_mut(py).inner.apply_config(&config);
        let segment = match boundary_frame {
            Some(frame) => Some(
                Segment::at_boundary(&trellis.borrow(py).inner, frame, segment_end)
                    .map_err(to_py_err)?,
            ),
            None => None,
        };
        let buffer = CandidateBuffer::with_capacity(config.max_candidates);
        Ok(RustNGramFinder {
            lm,
            vocab,
            trellis,
            config,
            segment,
            buffer,
        })
    }

    fn first_words(&mut self, py: Python<'_>) -> PyResult<Vec<PyCandidate>> {
        let lm = self.lm.borrow(py);
        let vocab = self.vocab.borrow(py);
        let trellis = self.trellis.borrow(py);
        let mut finder = NGramFinder::new(&lm.inner, &vocab.inner, &trellis.inner, &self.config);
        if let Some(seg) = self.segment {
            finder = finder.with_segment(seg);
        }
        finder.first_words(&mut self.buffer).map_err(to_py_err)?;
        Ok(self.candidates())
    }

    /// Candidates for `hypo`. The buffer is doubled and the call retried
    /// when it overflows.
    fn next_words(&mut self, py: Python<'_>, hypo: &RustHypothesis) -> PyResult<Vec<PyCandidate>> {
        let lm = self.lm.borrow(py);
        let vocab = self.vocab.borrow(py);
        let trellis = self.trellis.borrow(py);
        let finder = NGramFinder::new(&lm.inner, &vocab.inner, &trellis.inner, &self.config);
        loop {
            match finder.next_words(&hypo.inner, &mut self.buffer) {
                Ok(_) => break,
                Err(e) if e.is_recoverable() => {
                    let grown = (self.buffer.capacity() * 2).max(1);
                    self.buffer.grow(grown);
                }
                Err(e) => return Err(to_py_err(e)),
            }
        }
        Ok(self.candidates())
    }

    fn acceptable(&self, py: Python<'_>, hypo: &RustHypothesis) -> bool {
        let lm = self.lm.borrow(py);
        let vocab = self.vocab.borrow(py);
        let trellis = self.trellis.borrow(py);
        let mut finder = NGramFinder::new(&lm.inner, &vocab.inner, &trellis.inner, &self.config);
        if let Some(seg) = self.segment {
            finder = finder.with_segment(seg);
        }
        finder.acceptable(&hypo.inner)
    }

    /// Filter the candidates left by the last `next_words` call.
    fn limit(&mut self, py: Python<'_>, hypo: &RustHypothesis) -> Vec<PyCandidate> {
        let vocab = self.vocab.borrow(py);
        HypothesisFilter::new(&vocab.inner).limit(&mut self.buffer, &hypo.inner);
        self.candidates()
    }
}

/// Top-`num` Gaussians of a bank for one frame, as `(index, log_density)`
/// best first.
#[pyfunction]
#[pyo3(signature = (means, variances, x, num, safe=true))]
pub fn gprune(
    means: Vec<Vec<f32>>,
    variances: Vec<Vec<f32>>,
    x: Vec<f32>,
    num: usize,
    safe: bool,
) -> PyResult<Vec<(u32, f32)>> {
    if means.len() != variances.len() {
        return Err(PyValueError::new_err("means and variances differ in length"));
    }
    let pool = means
        .into_iter()
        .zip(variances)
        .map(|(m, v)| Gaussian::new(m, v))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    if pool.iter().any(|g| g.dim() != x.len()) {
        return Err(PyValueError::new_err("feature vector does not match Gaussian dimension"));
    }
    let ids: Vec<u32> = (0..pool.len() as u32).collect();
    let method = if safe { GpruneMethod::Safe } else { GpruneMethod::None };
    let mut pruner = GaussianPruner::new(method, num);
    let top = pruner.prune(&pool, &ids, &x);
    Ok(top.iter().map(|s| (s.index, s.score)).collect())
}
