use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::logmath::LogProb;
use rustc_hash::FxHashMap;

pub type WordId = u32;

/// One dictionary entry.
#[derive(Debug, Clone)]
pub struct WordEntry {
    pub name: String,
    /// Monophone pronunciation, e.g. `["h", "a", "i"]`.
    pub phones: Vec<String>,
    /// Grammar category (DFA terminal). Zero when no grammar is used.
    pub category: u32,
    /// Id of the word in the n-gram model.
    pub lm_id: u32,
    /// Filler word skipped when building n-gram context.
    pub transparent: bool,
    /// In-class log probability added to the n-gram score (class n-grams).
    pub class_logprob: LogProb,
}

impl WordEntry {
    pub fn new(name: &str, phones: &[&str]) -> Self {
        WordEntry {
            name: name.to_string(),
            phones: phones.iter().map(|p| p.to_string()).collect(),
            category: 0,
            lm_id: 0,
            transparent: false,
            class_logprob: 0.0,
        }
    }

    pub fn category(mut self, category: u32) -> Self {
        self.category = category;
        self
    }

    pub fn lm_id(mut self, lm_id: u32) -> Self {
        self.lm_id = lm_id;
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    pub fn class_logprob(mut self, p: LogProb) -> Self {
        self.class_logprob = p;
        self
    }
}

/// Recognition dictionary.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<WordEntry>,
    index: FxHashMap<String, WordId>,
    head_silence: Option<WordId>,
    tail_silence: Option<WordId>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a word. Words without phones cannot be scored and are rejected.
    pub fn push(&mut self, entry: WordEntry) -> Result<WordId> {
        if entry.phones.is_empty() {
            return Err(SearchError::InvalidInput(format!(
                "word \"{}\" has no phones",
                entry.name
            )));
        }
        let id = self.words.len() as WordId;
        // first spelling wins for name lookup; homographs stay reachable by id
        self.index.entry(entry.name.clone()).or_insert(id);
        self.words.push(entry);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn word(&self, id: WordId) -> &WordEntry {
        &self.words[id as usize]
    }

    /// Reject ids handed in from outside that do not name a word.
    pub fn check(&self, id: WordId) -> Result<()> {
        if (id as usize) < self.words.len() {
            Ok(())
        } else {
            Err(SearchError::InvalidInput(format!(
                "word id {} out of range ({} words)",
                id,
                self.words.len()
            )))
        }
    }

    pub fn find(&self, name: &str) -> Option<WordId> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WordId, &WordEntry)> {
        self.words.iter().enumerate().map(|(i, w)| (i as WordId, w))
    }

    /// Trailing phone of a word: the left context it imposes on whatever
    /// follows it.
    #[inline]
    pub fn tail_phone(&self, id: WordId) -> &str {
        // push() guarantees at least one phone
        self.words[id as usize].phones.last().map(String::as_str).unwrap_or("")
    }

    #[inline]
    pub fn head_phone(&self, id: WordId) -> &str {
        self.words[id as usize].phones.first().map(String::as_str).unwrap_or("")
    }

    #[inline]
    pub fn is_transparent(&self, id: WordId) -> bool {
        self.words[id as usize].transparent
    }

    pub(crate) fn set_lm_ids(&mut self, ids: &[u32]) {
        for (w, &id) in self.words.iter_mut().zip(ids) {
            w.lm_id = id;
        }
    }

    /// Locate the sentence boundary words by name. Missing names leave the
    /// marker unset (grammar-based setups often have none).
    pub fn set_silence_words(&mut self, head: &str, tail: &str) {
        self.head_silence = self.find(head);
        self.tail_silence = self.find(tail);
        if self.head_silence.is_none() {
            log::debug!("no head silence word \"{}\" in vocabulary", head);
        }
        if self.tail_silence.is_none() {
            log::debug!("no tail silence word \"{}\" in vocabulary", tail);
        }
    }

    /// Sentence boundary words named by the search configuration.
    pub fn apply_config(&mut self, config: &SearchConfig) {
        self.set_silence_words(&config.head_silence, &config.tail_silence);
    }

    /// Sentence-start marker.
    pub fn head_silence(&self) -> Option<WordId> {
        self.head_silence
    }

    /// Sentence-end marker.
    pub fn tail_silence(&self) -> Option<WordId> {
        self.tail_silence
    }

    /// Append all words of `other`, shifting their categories by
    /// `category_offset`. Returns the id of the first appended word.
    pub fn append(&mut self, other: &Vocabulary, category_offset: u32) -> WordId {
        let word_begin = self.words.len() as WordId;
        for w in &other.words {
            let mut w = w.clone();
            w.category += category_offset;
            let id = self.words.len() as WordId;
            self.index.entry(w.name.clone()).or_insert(id);
            self.words.push(w);
        }
        word_begin
    }
}
