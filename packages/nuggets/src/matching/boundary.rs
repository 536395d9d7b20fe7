//! Boundary matching.
//!
//! [`BoundaryMatcher::find_boundary`] locates a reported fragment pair in the
//! original source text. Strategies are tried in order of decreasing
//! precision and the first success wins:
//!
//! 1. **Exact**: substring search on normalized text, then on each fallback
//!    variant (confidence 1.0, or 0.95 for a variant hit)
//! 2. **Diff**: alignment of `"{start} ... {end}"` against the source
//!    (confidence capped at 0.85)
//! 3. **Fuzzy**: word-window similarity (confidence = mean window score)
//!
//! A successful span is then refined against the original text so small
//! mapping errors and trimmed punctuation are corrected.

use std::time::Duration;
use tracing::debug;

use crate::matching::diff::{self, DiffSettings};
use crate::matching::fuzzy;
use crate::matching::normalize::{
    is_quote, normalize, sanitize_fragment, Variant, FALLBACK_VARIANTS, FLAT,
};
use crate::matching::position::{ceil_boundary, floor_boundary, PositionMap, PositionMapCache};
use crate::types::config::BoundaryConfig;
use crate::types::nugget::FragmentPair;
use crate::types::span::{MatchResult, MatchStrategy, NoBoundary, NormalizedSpan};

/// Confidence of an exact hit on plain normalized text.
pub const EXACT_CONFIDENCE: f32 = 1.0;

/// Confidence of an exact hit on a fallback variant.
pub const VARIANT_CONFIDENCE: f32 = 0.95;

/// Locates fragment pairs in source text.
///
/// Owns a [`PositionMapCache`], so reuse one matcher for many fragments
/// against the same page.
#[derive(Debug)]
pub struct BoundaryMatcher {
    config: BoundaryConfig,
    cache: PositionMapCache,
}

impl Default for BoundaryMatcher {
    fn default() -> Self {
        Self::new(BoundaryConfig::default())
    }
}

impl BoundaryMatcher {
    pub fn new(config: BoundaryConfig) -> Self {
        let cache = PositionMapCache::new(config.position_cache_capacity);
        Self { config, cache }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Locate `pair` in `source`.
    ///
    /// Never panics. Blank fragments or a blank source fail immediately.
    pub fn find_boundary(&self, pair: &FragmentPair, source: &str) -> MatchResult {
        if pair.start.trim().is_empty() {
            return MatchResult::failure(NoBoundary::EmptyStart);
        }
        if pair.end.trim().is_empty() {
            return MatchResult::failure(NoBoundary::EmptyEnd);
        }
        if source.trim().is_empty() {
            return MatchResult::failure(NoBoundary::EmptySource);
        }

        let result = self
            .match_exact(pair, source)
            .or_else(|| self.match_diff(pair, source))
            .map(Ok)
            .unwrap_or_else(|| self.match_fuzzy(pair, source));

        match result {
            Ok(span) => {
                let span = self.refine(span, pair, source);
                debug!(
                    strategy = %span.strategy,
                    confidence = span.confidence,
                    start = span.start_index,
                    end = span.end_index,
                    "boundary located"
                );
                MatchResult::Success(span)
            }
            Err(reason) => {
                debug!(%reason, "boundary not found");
                MatchResult::failure(reason)
            }
        }
    }

    fn match_exact(&self, pair: &FragmentPair, source: &str) -> Option<NormalizedSpan> {
        std::iter::once((&FLAT, EXACT_CONFIDENCE))
            .chain(FALLBACK_VARIANTS.iter().map(|v| (v, VARIANT_CONFIDENCE)))
            .find_map(|(variant, confidence)| {
                let span = self.exact_in_variant(variant, pair, source, confidence);
                if span.is_some() && variant.name != FLAT.name {
                    debug!(variant = variant.name, "exact match on fallback variant");
                }
                span
            })
    }

    fn exact_in_variant(
        &self,
        variant: &Variant,
        pair: &FragmentPair,
        source: &str,
        confidence: f32,
    ) -> Option<NormalizedSpan> {
        let start = (variant.fragment)(&pair.start);
        let end = (variant.fragment)(&pair.end);
        if start.is_empty() || end.is_empty() {
            return None;
        }

        let transformed = self.cache.get_or_build(source, variant);
        let (s, e) = find_exact(&transformed.text, &start, &end)?;
        let (s, e) = transformed.original_span(s, e);
        NormalizedSpan::from_original(source, s, e, MatchStrategy::Exact, confidence)
    }

    fn match_diff(&self, pair: &FragmentPair, source: &str) -> Option<NormalizedSpan> {
        let flat = self.cache.get_or_build(source, &FLAT);
        let settings = DiffSettings {
            min_coverage: self.config.diff_min_coverage,
            char_limit: self.config.diff_char_limit,
            timeout: Duration::from_millis(self.config.diff_timeout_ms),
        };

        let found = diff::locate(
            &flat.text,
            &normalize(&pair.start),
            &normalize(&pair.end),
            &settings,
        )
        .ok()?;

        let (s, e) = flat.original_span(found.start, found.end);
        NormalizedSpan::from_original(source, s, e, MatchStrategy::Diff, found.confidence)
    }

    fn match_fuzzy(&self, pair: &FragmentPair, source: &str) -> Result<NormalizedSpan, NoBoundary> {
        let flat = self.cache.get_or_build(source, &FLAT);
        let found = fuzzy::locate(
            &flat.text,
            &normalize(&pair.start),
            &normalize(&pair.end),
            self.config.fuzzy_tolerance,
            self.config.fuzzy_word_floor,
        )?;

        let (s, e) = flat.original_span(found.start, found.end);
        fuzzy_span(source, s, e, found.confidence())
    }

    /// Re-validate a span against the original text.
    ///
    /// Each side is confirmed independently inside `refinement_window` bytes;
    /// an unconfirmed side keeps its position.
    fn refine(&self, span: NormalizedSpan, pair: &FragmentPair, source: &str) -> NormalizedSpan {
        let window = self.config.refinement_window;

        let start = locate_near(source, &pair.start, span.start_index, window)
            .map(|(s, _)| s)
            .filter(|s| *s < span.end_index)
            .unwrap_or(span.start_index);

        let mut end = locate_near(source, &pair.end, span.end_index, window)
            .map(|(_, e)| e)
            .filter(|e| *e > start)
            .map(|e| {
                if ends_with_punctuation(&pair.end) {
                    extend_over_closing(source, e)
                } else {
                    e
                }
            })
            .unwrap_or(span.end_index);

        if end <= start {
            end = span.end_index;
        }

        NormalizedSpan::from_original(source, start, end, span.strategy, span.confidence)
            .unwrap_or(span)
    }
}

/// Find `start` then `end` in `text`, returning the covering range.
///
/// A fuzzy hit whose mapped range is empty or off char boundaries has
/// collapsed.
fn fuzzy_span(
    source: &str,
    start: usize,
    end: usize,
    confidence: f32,
) -> Result<NormalizedSpan, NoBoundary> {
    NormalizedSpan::from_original(source, start, end, MatchStrategy::Fuzzy, confidence)
        .ok_or(NoBoundary::SpanCollapsed)
}

/// The end is searched after the start occurrence. When no later end exists
/// but `end` lies inside `start`, the first start occurrence alone is the
/// passage.
fn find_exact(text: &str, start: &str, end: &str) -> Option<(usize, usize)> {
    let mut start_only = None;

    for (s, _) in text.match_indices(start) {
        let after = s + start.len();
        if let Some(rel) = text[after..].find(end) {
            return Some((s, after + rel + end.len()));
        }
        if start_only.is_none() && start.contains(end) {
            start_only = Some((s, after));
        }
    }
    start_only
}

/// Occurrence of `fragment` in `source` nearest to `anchor`, searched within
/// `window` bytes either side of the fragment's expected extent.
///
/// Tries the raw fragment, then its sanitized form, then a normalized
/// comparison.
fn locate_near(source: &str, fragment: &str, anchor: usize, window: usize) -> Option<(usize, usize)> {
    let raw = fragment.trim();
    if raw.is_empty() {
        return None;
    }
    let lo = floor_boundary(source, anchor.saturating_sub(window + raw.len()));
    let hi = ceil_boundary(source, anchor.saturating_add(window + raw.len()));
    let region = &source[lo..hi];

    let nearest = |hits: Vec<(usize, usize)>| {
        hits.into_iter()
            .map(|(s, e)| (s + lo, e + lo))
            .min_by_key(|(s, e)| s.abs_diff(anchor).min(e.abs_diff(anchor)))
    };

    let literal = |needle: &str| -> Vec<(usize, usize)> {
        region
            .match_indices(needle)
            .map(|(s, m)| (s, s + m.len()))
            .collect()
    };

    if let Some(hit) = nearest(literal(raw)) {
        return Some(hit);
    }

    let sanitized = sanitize_fragment(raw);
    if !sanitized.is_empty() {
        if let Some(hit) = nearest(literal(&sanitized)) {
            return Some(hit);
        }
    }

    let needle = sanitize_fragment(&normalize(raw));
    if needle.is_empty() {
        return None;
    }
    let normalized = normalize(region);
    let map = PositionMap::build(region, &normalized);
    let hits = normalized
        .match_indices(needle.as_str())
        .map(|(s, m)| map.span_to_original(&normalized, s, s + m.len()))
        .collect();
    nearest(hits)
}

fn is_closing(c: char) -> bool {
    matches!(c, '.' | '?' | '!' | '\u{2026}' | ')' | ']') || is_quote(c)
}

fn ends_with_punctuation(fragment: &str) -> bool {
    fragment.trim_end().chars().next_back().is_some_and(is_closing)
}

/// Extend `end` over closing punctuation and quotes that follow it.
fn extend_over_closing(source: &str, end: usize) -> usize {
    let tail = &source[end..];
    let extra: usize = tail
        .chars()
        .take_while(|c| is_closing(*c))
        .map(char::len_utf8)
        .sum();
    end + extra
}
