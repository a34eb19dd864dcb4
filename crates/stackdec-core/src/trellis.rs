//! Word trellis produced by the first pass, and the center-out window scan
//! that both next-word finders use to consult it.

use crate::error::{Result, SearchError};
use crate::logmath::LogProb;
use crate::vocab::WordId;

/// Identifies one trellis entry. Two candidates licensed by the same
/// evidence carry equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrellisHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrellisWord {
    pub word: WordId,
    pub handle: TrellisHandle,
    /// Frame where the word starts.
    pub begin: i32,
    /// Frame where the word ends; the entry is indexed under this frame.
    pub end: u32,
    /// Accumulated first-pass score at the word end.
    pub score: LogProb,
}

/// Per-frame index of surviving word ends, stored CSR-style (entries sorted
/// by end frame, `offsets[t]..offsets[t + 1]` for frame `t`). Handles index
/// the original insertion order.
pub struct WordTrellis {
    num_frames: u32,
    offsets: Vec<u32>,
    entries: Vec<TrellisWord>,
    // handle -> position in `entries`
    by_handle: Vec<u32>,
}

impl WordTrellis {
    /// Build from `(word, begin, end, score)` tuples. The i-th tuple gets
    /// handle `i`.
    pub fn new(num_frames: u32, words: &[(WordId, i32, u32, LogProb)]) -> Result<Self> {
        let n = num_frames as usize;
        let mut offsets = vec![0u32; n + 1];
        for (i, &(_, begin, end, _)) in words.iter().enumerate() {
            if end >= num_frames {
                return Err(SearchError::InvalidInput(format!(
                    "trellis word #{} ends at frame {} beyond utterance length {}",
                    i, end, num_frames
                )));
            }
            if begin > end as i32 {
                return Err(SearchError::InvalidInput(format!(
                    "trellis word #{} begins at {} after its end {}",
                    i, begin, end
                )));
            }
            offsets[end as usize + 1] += 1;
        }
        for t in 1..=n {
            offsets[t] += offsets[t - 1];
        }

        let mut indices: Vec<usize> = (0..words.len()).collect();
        indices.sort_by_key(|&i| words[i].2);

        let mut entries = Vec::with_capacity(words.len());
        let mut by_handle = vec![0u32; words.len()];
        for (pos, &i) in indices.iter().enumerate() {
            let (word, begin, end, score) = words[i];
            by_handle[i] = pos as u32;
            entries.push(TrellisWord {
                word,
                handle: TrellisHandle(i as u32),
                begin,
                end,
                score,
            });
        }

        Ok(WordTrellis {
            num_frames,
            offsets,
            entries,
            by_handle,
        })
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Words whose end survived at `frame`.
    #[inline]
    pub fn words_at(&self, frame: u32) -> &[TrellisWord] {
        if frame >= self.num_frames {
            return &[];
        }
        let lo = self.offsets[frame as usize] as usize;
        let hi = self.offsets[frame as usize + 1] as usize;
        &self.entries[lo..hi]
    }

    pub fn get(&self, handle: TrellisHandle) -> Option<&TrellisWord> {
        self.by_handle
            .get(handle.0 as usize)
            .map(|&pos| &self.entries[pos as usize])
    }

    /// Best-scoring word surviving at `frame`; ties go to the earlier entry.
    pub fn best_word_at(&self, frame: u32) -> Option<&TrellisWord> {
        self.words_at(frame)
            .iter()
            .fold(None, |best: Option<&TrellisWord>, w| match best {
                Some(b) if b.score >= w.score => Some(b),
                _ => Some(w),
            })
    }

    /// Frames around `center` in center-preferred order.
    pub fn window(&self, center: i32, range: u32, right_limit: Option<i32>) -> WindowFrames {
        WindowFrames::new(center, range, self.num_frames, right_limit)
    }

    /// First entry of `word` met while scanning the window.
    pub fn find_near(
        &self,
        word: WordId,
        center: i32,
        range: u32,
        right_limit: Option<i32>,
    ) -> Option<&TrellisWord> {
        self.window(center, range, right_limit)
            .find_map(|t| self.words_at(t).iter().find(|w| w.word == word))
    }
}

/// Iterator over `tm, tm-1, tm+1, tm-2, tm+2, ...` up to `range` steps each
/// side. Frames before 0, at or past the utterance end, or at or past the
/// right limit are skipped. A negative center yields nothing.
pub struct WindowFrames {
    center: i32,
    range: i32,
    upper: i32,
    step: i32,
    // false: next is the left (or center) frame of `step`; true: the right one
    right_side: bool,
}

impl WindowFrames {
    fn new(center: i32, range: u32, num_frames: u32, right_limit: Option<i32>) -> Self {
        let mut upper = num_frames as i32;
        if let Some(limit) = right_limit {
            upper = upper.min(limit);
        }
        WindowFrames {
            center,
            // a negative center disables the scan altogether
            range: if center < 0 { -1 } else { range as i32 },
            upper,
            step: 0,
            right_side: false,
        }
    }

    #[inline]
    fn admissible(&self, t: i32) -> bool {
        t >= 0 && t < self.upper
    }
}

impl Iterator for WindowFrames {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.step <= self.range {
            let t = if self.right_side {
                self.center + self.step
            } else {
                self.center - self.step
            };
            if self.right_side || self.step == 0 {
                self.step += 1;
                self.right_side = false;
            } else {
                self.right_side = true;
            }
            if self.admissible(t) {
                return Some(t as u32);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(center: i32, range: u32, n: u32, limit: Option<i32>) -> Vec<u32> {
        WindowFrames::new(center, range, n, limit).collect()
    }

    #[test]
    fn test_center_out_order() {
        assert_eq!(frames(50, 3, 100, None), vec![50, 49, 51, 48, 52, 47, 53]);
    }

    #[test]
    fn test_window_clipped_at_edges() {
        assert_eq!(frames(1, 3, 100, None), vec![1, 0, 2, 3, 4]);
        assert_eq!(frames(98, 2, 100, None), vec![98, 97, 99, 96]);
    }

    #[test]
    fn test_right_limit() {
        assert_eq!(frames(10, 3, 100, Some(12)), vec![10, 9, 11, 8, 7]);
        // center itself at the limit is skipped too
        assert_eq!(frames(12, 1, 100, Some(12)), vec![11]);
    }

    #[test]
    fn test_negative_center() {
        assert!(frames(-1, 5, 100, None).is_empty());
    }

    #[test]
    fn test_csr_lookup_and_handles() {
        let trellis = WordTrellis::new(
            5,
            &[(7, 0, 3, -10.0), (8, 1, 1, -5.0), (9, 0, 3, -4.0)],
        )
        .unwrap();
        assert_eq!(trellis.words_at(3).len(), 2);
        assert_eq!(trellis.words_at(1)[0].word, 8);
        assert!(trellis.words_at(4).is_empty());
        assert_eq!(trellis.get(TrellisHandle(2)).unwrap().word, 9);
        assert_eq!(trellis.best_word_at(3).unwrap().word, 9);
        assert!(trellis.get(TrellisHandle(3)).is_none());
    }

    #[test]
    fn test_rejects_word_past_end() {
        assert!(WordTrellis::new(3, &[(1, 0, 3, 0.0)]).is_err());
    }

    #[test]
    fn test_find_near_prefers_left_on_equal_distance() {
        let trellis = WordTrellis::new(100, &[(4, 40, 51, 0.0), (4, 40, 49, 0.0)]).unwrap();
        let hit = trellis.find_near(4, 50, 3, None).unwrap();
        assert_eq!(hit.end, 49);
        assert!(trellis.find_near(4, 50, 3, Some(50)).is_some());
        assert!(trellis.find_near(4, 60, 3, None).is_none());
    }
}
