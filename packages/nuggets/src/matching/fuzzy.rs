//! Fuzzy word-window tier.
//!
//! Slides a window the size of each fragment over the source's words and
//! scores it word by word. Catches paraphrased fragments ("shows" reported
//! as "demonstrates") that neither exact search nor diff alignment can
//! recover.

use crate::types::span::NoBoundary;

/// A word with its byte range in the text it was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Split `text` into maximal alphanumeric runs.
pub fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        match (c.is_alphanumeric(), current) {
            (true, None) => current = Some(idx),
            (false, Some(start)) => {
                out.push(Word {
                    text: &text[start..idx],
                    start,
                    end: idx,
                });
                current = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        out.push(Word {
            text: &text[start..],
            start,
            end: text.len(),
        });
    }
    out
}

/// Similarity of two words in `[0, 1]`.
///
/// 1.0 when equal, 0.8 when one contains the other, otherwise normalized
/// Levenshtein similarity. Anything below `floor` counts as 0.
pub fn word_similarity(a: &str, b: &str, floor: f32) -> f32 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.8;
    }
    let similarity = strsim::normalized_levenshtein(a, b) as f32;
    if similarity < floor {
        0.0
    } else {
        similarity
    }
}

/// Mean word similarity of `fragment` against `window`, position by position.
fn window_score(fragment: &[Word<'_>], window: &[Word<'_>], floor: f32) -> f32 {
    if fragment.is_empty() {
        return 0.0;
    }
    let total: f32 = fragment
        .iter()
        .zip(window)
        .map(|(f, w)| word_similarity(f.text, w.text, floor))
        .sum();
    total / fragment.len() as f32
}

/// Best-scoring window at or after word `from`. Leftmost wins ties.
fn best_window(
    source: &[Word<'_>],
    fragment: &[Word<'_>],
    from: usize,
    floor: f32,
) -> Option<(usize, f32)> {
    let size = fragment.len();
    if size == 0 || source.len() < size || from > source.len() - size {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for idx in from..=source.len() - size {
        let score = window_score(fragment, &source[idx..idx + size], floor);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
        if score >= 1.0 {
            break;
        }
    }
    best
}

/// A fuzzy match in the coordinates of the searched text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    pub start: usize,
    pub end: usize,
    pub start_score: f32,
    pub end_score: f32,
}

impl FuzzyMatch {
    /// Mean of both window scores.
    pub fn confidence(&self) -> f32 {
        (self.start_score + self.end_score) / 2.0
    }
}

/// Locate `start` then `end` in `source` by word-window similarity.
///
/// All three inputs should already be normalized. The end window must begin
/// after the start window's last word.
pub fn locate(
    source: &str,
    start: &str,
    end: &str,
    tolerance: f32,
    floor: f32,
) -> Result<FuzzyMatch, NoBoundary> {
    let source_words = words(source);
    let start_words = words(start);
    let end_words = words(end);

    let (start_idx, start_score) = best_window(&source_words, &start_words, 0, floor)
        .filter(|(_, score)| *score >= tolerance)
        .ok_or(NoBoundary::StartNotFound)?;

    let after = start_idx + start_words.len();
    let (end_idx, end_score) = best_window(&source_words, &end_words, after, floor)
        .filter(|(_, score)| *score >= tolerance)
        .ok_or(NoBoundary::EndNotFoundAfterStart)?;

    Ok(FuzzyMatch {
        start: source_words[start_idx].start,
        end: source_words[end_idx + end_words.len() - 1].end,
        start_score,
        end_score,
    })
}
