//! Position mapping between original and normalized text.
//!
//! Matches are found in normalized space but must be reported as offsets
//! into the original page text. [`PositionMap`] is a best-effort character
//! alignment: it walks the original text with a cursor into the normalized
//! text and is exact whenever normalization only substitutes characters
//! one-for-one. Irregular insertions and deletions (ellipsis expansion,
//! collapsed whitespace, dropped quotes) are absorbed by a bounded
//! look-ahead, which is an approximation and not a proven alignment. The
//! boundary matcher's refinement pass corrects the residue.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError};

use crate::matching::normalize::{fold_char, Variant};

/// How far ahead the cursor may skip to find the next matching character.
const LOOKAHEAD: usize = 8;

/// Bidirectional byte-offset map between an original string and its
/// normalized form.
///
/// Total: every offset in `0..=len` has an image on the other side.
/// Monotonic: both directions are non-decreasing.
#[derive(Debug, Clone)]
pub struct PositionMap {
    inner: MapInner,
}

#[derive(Debug, Clone)]
enum MapInner {
    Identity {
        len: usize,
    },
    Aligned {
        to_normalized: Vec<usize>,
        to_original: Vec<usize>,
        original_char_end: Vec<usize>,
    },
}

impl PositionMap {
    /// Build the map for a `(original, normalized)` pair.
    pub fn build(original: &str, normalized: &str) -> Self {
        if original == normalized {
            if original.is_ascii() {
                return Self {
                    inner: MapInner::Identity {
                        len: original.len(),
                    },
                };
            }
            return Self::char_aligned(original);
        }

        let norm: Vec<(usize, char)> = normalized.char_indices().collect();
        let norm_byte = |idx: usize| norm.get(idx).map_or(normalized.len(), |(b, _)| *b);

        let mut to_normalized = vec![0; original.len() + 1];
        let mut to_original = vec![0; normalized.len() + 1];
        let mut original_char_end = vec![0; original.len() + 1];

        let mut cursor = 0;
        let mut last_matched: Option<usize> = None;
        // Leading whitespace is trimmed by every transform.
        let mut previous_space = true;

        for (ob, oc) in original.char_indices() {
            let oe = ob + oc.len_utf8();
            original_char_end[ob..oe].fill(oe);

            let folded = fold_char(oc);
            let found = match folded {
                None => None,
                Some(' ') if previous_space => None,
                // Whitespace never skips ahead; a space further on belongs
                // to some later word.
                Some(' ') => (cursor < norm.len() && norm[cursor].1 == ' ').then_some(cursor),
                Some(f) => {
                    let limit = (cursor + LOOKAHEAD).min(norm.len());
                    (cursor..limit).find(|&k| norm[k].1 == f)
                }
            };
            if folded.is_some() {
                previous_space = folded == Some(' ');
            }

            to_normalized[ob..oe].fill(norm_byte(cursor));

            if let Some(k) = found {
                // Normalized chars skipped over were inserted by normalization;
                // attribute them to the char that produced the preceding output.
                for idx in cursor..k {
                    let owner = last_matched.unwrap_or(ob);
                    to_original[norm_byte(idx)..norm_byte(idx + 1)].fill(owner);
                }
                to_original[norm_byte(k)..norm_byte(k + 1)].fill(ob);
                last_matched = Some(ob);
                cursor = k + 1;
            }
        }

        to_normalized[original.len()] = normalized.len();
        original_char_end[original.len()] = original.len();
        to_original[norm_byte(cursor)..].fill(original.len());

        Self {
            inner: MapInner::Aligned {
                to_normalized,
                to_original,
                original_char_end,
            },
        }
    }

    /// Map for identical multibyte text: mid-char offsets snap to the
    /// start of their char on both sides.
    fn char_aligned(text: &str) -> Self {
        let len = text.len();
        let mut starts = vec![len; len + 1];
        let mut ends = vec![len; len + 1];
        for (b, c) in text.char_indices() {
            let e = b + c.len_utf8();
            starts[b..e].fill(b);
            ends[b..e].fill(e);
        }

        Self {
            inner: MapInner::Aligned {
                to_normalized: starts.clone(),
                to_original: starts,
                original_char_end: ends,
            },
        }
    }

    /// True when original and normalized text were identical ASCII.
    pub fn is_identity(&self) -> bool {
        matches!(self.inner, MapInner::Identity { .. })
    }

    /// Length of the original text in bytes.
    pub fn original_len(&self) -> usize {
        match &self.inner {
            MapInner::Identity { len } => *len,
            MapInner::Aligned { to_normalized, .. } => to_normalized.len() - 1,
        }
    }

    /// Length of the normalized text in bytes.
    pub fn normalized_len(&self) -> usize {
        match &self.inner {
            MapInner::Identity { len } => *len,
            MapInner::Aligned { to_original, .. } => to_original.len() - 1,
        }
    }

    /// Normalized offset for an original offset (clamped).
    pub fn to_normalized(&self, original_index: usize) -> usize {
        match &self.inner {
            MapInner::Identity { len } => original_index.min(*len),
            MapInner::Aligned { to_normalized, .. } => {
                to_normalized[original_index.min(to_normalized.len() - 1)]
            }
        }
    }

    /// Original offset for a normalized offset (clamped).
    pub fn to_original(&self, normalized_index: usize) -> usize {
        match &self.inner {
            MapInner::Identity { len } => normalized_index.min(*len),
            MapInner::Aligned { to_original, .. } => {
                to_original[normalized_index.min(to_original.len() - 1)]
            }
        }
    }

    /// Original exclusive end for a normalized exclusive end.
    ///
    /// Maps the last normalized char inside the range back to its original
    /// char and returns that char's end, so trailing text that normalization
    /// dropped is not swept into the span.
    pub fn to_original_end(&self, normalized: &str, normalized_end: usize) -> usize {
        match &self.inner {
            MapInner::Identity { len } => normalized_end.min(*len),
            MapInner::Aligned {
                to_original,
                original_char_end,
                ..
            } => {
                let end = normalized_end.min(normalized.len());
                let Some((last, _)) = normalized[..floor_boundary(normalized, end)]
                    .char_indices()
                    .next_back()
                else {
                    return to_original[0];
                };
                let owner = to_original[last];
                original_char_end[owner.min(original_char_end.len() - 1)]
            }
        }
    }

    /// Convert a normalized `[start, end)` range to original offsets.
    pub fn span_to_original(&self, normalized: &str, start: usize, end: usize) -> (usize, usize) {
        let original_start = self.to_original(start);
        let original_end = self.to_original_end(normalized, end).max(original_start);
        (original_start, original_end)
    }
}

/// Largest char boundary `<= index`.
pub(crate) fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary `>= index`.
pub(crate) fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// A source text transformed by a [`Variant`], with its position map.
#[derive(Debug)]
pub struct TransformedSource {
    pub text: String,
    pub map: PositionMap,
}

impl TransformedSource {
    /// Transform `original` with `variant` and align the result.
    pub fn new(original: &str, variant: &Variant) -> Self {
        let text = (variant.source)(original);
        let map = PositionMap::build(original, &text);
        Self { text, map }
    }

    /// Original offsets for a range in transformed space.
    pub fn original_span(&self, start: usize, end: usize) -> (usize, usize) {
        self.map.span_to_original(&self.text, start, end)
    }
}

/// Bounded memo of transformed sources, keyed by variant and source hash.
///
/// Matching many nuggets against one page reuses the same normalized text
/// and position map. Oldest entries are evicted first.
pub struct PositionMapCache {
    capacity: usize,
    entries: Mutex<IndexMap<(&'static str, [u8; 32]), Arc<TransformedSource>>>,
}

impl PositionMapCache {
    /// Create a cache holding at most `capacity` transformed sources.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Fetch or build the transformed source for `(variant, original)`.
    pub fn get_or_build(&self, original: &str, variant: &Variant) -> Arc<TransformedSource> {
        if self.capacity == 0 {
            return Arc::new(TransformedSource::new(original, variant));
        }

        let key = (variant.name, Sha256::digest(original.as_bytes()).into());
        if let Some(hit) = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(hit);
        }

        // Build outside the lock; a racing miss just builds twice.
        let built = Arc::new(TransformedSource::new(original, variant));

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key, Arc::clone(&built));
        built
    }

    /// Number of memoized sources.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PositionMapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionMapCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
