use crate::error::{Result, SearchError};
use crate::vocab::{Vocabulary, WordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfaArc {
    pub category: u32,
    pub dest: u32,
}

/// Category-pair constraint as a dense bit matrix. `allowed(c1, c2)` means
/// a word of category `c2` may be expanded right after one of `c1`.
#[derive(Debug, Clone, Default)]
pub struct CategoryPairs {
    num_categories: usize,
    row_words: usize,
    bits: Vec<u64>,
    begin: Vec<u64>,
    end: Vec<u64>,
}

impl CategoryPairs {
    pub fn new(num_categories: usize) -> Self {
        let row_words = (num_categories + 63) / 64;
        CategoryPairs {
            num_categories,
            row_words,
            bits: vec![0; row_words * num_categories],
            begin: vec![0; row_words],
            end: vec![0; row_words],
        }
    }

    pub fn num_categories(&self) -> usize {
        self.num_categories
    }

    #[inline]
    fn mask(c: u32) -> (usize, u64) {
        ((c / 64) as usize, 1u64 << (c % 64))
    }

    #[inline]
    pub fn allowed(&self, c1: u32, c2: u32) -> bool {
        let (w, m) = Self::mask(c2);
        self.bits[c1 as usize * self.row_words + w] & m != 0
    }

    pub fn set(&mut self, c1: u32, c2: u32, value: bool) {
        let (w, m) = Self::mask(c2);
        let slot = &mut self.bits[c1 as usize * self.row_words + w];
        if value {
            *slot |= m;
        } else {
            *slot &= !m;
        }
    }

    /// Category may start an expansion.
    #[inline]
    pub fn begin(&self, c: u32) -> bool {
        let (w, m) = Self::mask(c);
        self.begin[w] & m != 0
    }

    /// Category may end an expansion.
    #[inline]
    pub fn end(&self, c: u32) -> bool {
        let (w, m) = Self::mask(c);
        self.end[w] & m != 0
    }

    pub fn set_begin(&mut self, c: u32) {
        let (w, m) = Self::mask(c);
        self.begin[w] |= m;
    }

    pub fn set_end(&mut self, c: u32) {
        let (w, m) = Self::mask(c);
        self.end[w] |= m;
    }

    /// Categories allowed after `c1`.
    pub fn followers(&self, c1: u32) -> impl Iterator<Item = u32> + '_ {
        (0..self.num_categories as u32).filter(move |&c2| self.allowed(c1, c2))
    }
}

/// Grammar automaton over word categories, arcs stored in CSR format
/// (sorted by source state). Arcs point in expansion order: from the state
/// of a hypothesis to the state after its next word.
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    pub num_states: u32,
    pub is_initial: Vec<bool>,
    pub is_accept: Vec<bool>,

    // CSR arc storage
    pub offsets: Vec<u32>, // length num_states+1
    pub arcs: Vec<DfaArc>,

    /// Words of each category.
    pub categories: Vec<Vec<WordId>>,
    /// Short-pause categories, looked through during expansion.
    pub is_sp: Vec<bool>,

    pub pairs: CategoryPairs,
}

impl Dfa {
    /// Build from `(source, category, destination)` arcs. Category word lists
    /// start empty; fill them with [`Dfa::assign_words`].
    pub fn new(
        num_states: u32,
        num_categories: u32,
        initial_states: &[u32],
        accept_states: &[u32],
        arcs: &[(u32, u32, u32)],
    ) -> Result<Self> {
        let n = num_states as usize;
        let mut is_initial = vec![false; n];
        let mut is_accept = vec![false; n];
        for &s in initial_states {
            check_state(s, num_states)?;
            is_initial[s as usize] = true;
        }
        for &s in accept_states {
            check_state(s, num_states)?;
            is_accept[s as usize] = true;
        }
        for &(src, cate, dst) in arcs {
            check_state(src, num_states)?;
            check_state(dst, num_states)?;
            if cate >= num_categories {
                return Err(SearchError::InvalidInput(format!(
                    "arc category {} out of range ({} categories)",
                    cate, num_categories
                )));
            }
        }

        let (offsets, arcs) = build_csr(n, arcs);
        let mut dfa = Dfa {
            num_states,
            is_initial,
            is_accept,
            offsets,
            arcs,
            categories: vec![Vec::new(); num_categories as usize],
            is_sp: vec![false; num_categories as usize],
            pairs: CategoryPairs::new(num_categories as usize),
        };
        dfa.extract_pairs();
        Ok(dfa)
    }

    pub fn num_categories(&self) -> u32 {
        self.categories.len() as u32
    }

    #[inline]
    pub fn arcs_from(&self, state: u32) -> &[DfaArc] {
        let lo = self.offsets[state as usize] as usize;
        let hi = self.offsets[state as usize + 1] as usize;
        &self.arcs[lo..hi]
    }

    #[inline]
    pub fn words_of(&self, category: u32) -> &[WordId] {
        &self.categories[category as usize]
    }

    /// Distribute dictionary words over their categories and mark the
    /// short-pause categories: those whose only word is pronounced as the
    /// single phone `short_pause`.
    pub fn assign_words(&mut self, vocab: &Vocabulary, short_pause: &str) -> Result<()> {
        for list in &mut self.categories {
            list.clear();
        }
        for (id, entry) in vocab.iter() {
            let c = entry.category as usize;
            if c >= self.categories.len() {
                return Err(SearchError::ModelInconsistency(format!(
                    "word \"{}\" has category {} but grammar has {}",
                    entry.name,
                    entry.category,
                    self.categories.len()
                )));
            }
            self.categories[c].push(id);
        }
        for (c, words) in self.categories.iter().enumerate() {
            self.is_sp[c] = words.len() == 1 && {
                let phones = &vocab.word(words[0]).phones;
                phones.len() == 1 && phones[0] == short_pause
            };
            if words.is_empty() {
                log::warn!("category {} has no words", c);
            }
        }
        self.extract_pairs();
        Ok(())
    }

    /// Recompute category pairs from the arcs. A category entering a state
    /// may be followed by every category leaving it; short-pause arcs are
    /// looked through one step.
    pub fn extract_pairs(&mut self) {
        let mut pairs = CategoryPairs::new(self.categories.len());
        for s in 0..self.num_states {
            for arc in self.arcs_from(s) {
                if self.is_initial[s as usize] {
                    pairs.set_begin(arc.category);
                }
                if self.is_accept[arc.dest as usize] {
                    pairs.set_end(arc.category);
                }
                for next in self.arcs_from(arc.dest) {
                    pairs.set(arc.category, next.category, true);
                    if self.is_sp[next.category as usize] {
                        for after in self.arcs_from(next.dest) {
                            pairs.set(arc.category, after.category, true);
                        }
                    }
                }
            }
        }
        self.pairs = pairs;
    }

    /// Append `other` as a disjoint sub-automaton. Its word ids are shifted by
    /// `word_offset` (the position of its words in the merged dictionary).
    /// Returns the state and category offsets assigned to it.
    pub fn append(&mut self, other: &Dfa, word_offset: WordId) -> (u32, u32) {
        let state_offset = self.num_states;
        let category_offset = self.num_categories();

        let mut triples = Vec::with_capacity(self.arcs.len() + other.arcs.len());
        for s in 0..self.num_states {
            triples.extend(self.arcs_from(s).iter().map(|a| (s, a.category, a.dest)));
        }
        for s in 0..other.num_states {
            triples.extend(other.arcs_from(s).iter().map(|a| {
                (s + state_offset, a.category + category_offset, a.dest + state_offset)
            }));
        }

        self.num_states += other.num_states;
        self.is_initial.extend_from_slice(&other.is_initial);
        self.is_accept.extend_from_slice(&other.is_accept);
        let (offsets, arcs) = build_csr(self.num_states as usize, &triples);
        self.offsets = offsets;
        self.arcs = arcs;
        self.categories.extend(
            other
                .categories
                .iter()
                .map(|ws| ws.iter().map(|&w| w + word_offset).collect()),
        );
        self.is_sp.extend_from_slice(&other.is_sp);
        self.extract_pairs();
        (state_offset, category_offset)
    }
}

fn check_state(s: u32, num_states: u32) -> Result<()> {
    if s < num_states {
        Ok(())
    } else {
        Err(SearchError::InvalidInput(format!(
            "state {} out of range ({} states)",
            s, num_states
        )))
    }
}

fn build_csr(n: usize, triples: &[(u32, u32, u32)]) -> (Vec<u32>, Vec<DfaArc>) {
    let mut indices: Vec<usize> = (0..triples.len()).collect();
    indices.sort_by_key(|&i| triples[i].0);

    let mut offsets = vec![0u32; n + 1];
    let mut arcs = Vec::with_capacity(triples.len());
    for &i in &indices {
        let (src, category, dest) = triples[i];
        offsets[src as usize + 1] += 1;
        arcs.push(DfaArc { category, dest });
    }
    for i in 1..=n {
        offsets[i] += offsets[i - 1];
    }
    (offsets, arcs)
}
