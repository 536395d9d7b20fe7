//! Diff-based alignment tier.
//!
//! Builds the target `"{start} ... {end}"` and diffs it against the
//! normalized source, first word by word and then character by character.
//! Unchanged segments of the diff anchor the fragments in the source even
//! when the reported text was truncated or lightly edited.

use similar::{DiffTag, TextDiff};
use std::ops::Range;
use std::time::Duration;

use crate::matching::position::{ceil_boundary, floor_boundary};
use crate::types::span::NoBoundary;

/// Upper bound on diff confidence; a diff alignment never rivals an exact hit.
pub const DIFF_CONFIDENCE_CAP: f32 = 0.85;

const GAP: &str = " ... ";

/// Diff granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Words,
    Chars,
}

/// Tuning for one diff alignment.
#[derive(Debug, Clone, Copy)]
pub struct DiffSettings {
    pub min_coverage: f32,
    pub char_limit: usize,
    pub timeout: Duration,
}

/// An unchanged segment: byte ranges in the target and in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    target: Range<usize>,
    source: Range<usize>,
}

impl Segment {
    /// Overlap of this segment's target range with `region`.
    fn overlap(&self, region: &Range<usize>) -> Range<usize> {
        let start = self.target.start.max(region.start);
        let end = self.target.end.min(region.end);
        start..end.max(start)
    }

    /// Source offset corresponding to a target offset inside the segment.
    fn project(&self, target_offset: usize) -> usize {
        self.source.start + (target_offset - self.target.start)
    }
}

/// A diff alignment in source coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffMatch {
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub granularity: Granularity,
}

fn byte_offsets(slices: &[&str]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(slices.len() + 1);
    let mut total = 0;
    offsets.push(0);
    for slice in slices {
        total += slice.len();
        offsets.push(total);
    }
    offsets
}

/// Unchanged segments of a diff from `target` to `source`.
fn equal_segments(
    target: &str,
    source: &str,
    granularity: Granularity,
    timeout: Duration,
) -> Vec<Segment> {
    let mut config = TextDiff::configure();
    config.timeout(timeout);
    let diff = match granularity {
        Granularity::Words => config.diff_words(target, source),
        Granularity::Chars => config.diff_chars(target, source),
    };

    let target_offsets = byte_offsets(diff.old_slices());
    let source_offsets = byte_offsets(diff.new_slices());

    diff.ops()
        .iter()
        .filter_map(|op| {
            let (tag, old, new) = op.as_tag_tuple();
            (tag == DiffTag::Equal).then(|| Segment {
                target: target_offsets[old.start]..target_offsets[old.end],
                source: source_offsets[new.start]..source_offsets[new.end],
            })
        })
        .collect()
}

/// Segment covering the most of `region`, among those passing `accept`.
/// Earliest wins ties.
fn best_cover<'a>(
    segments: &'a [Segment],
    region: &Range<usize>,
    accept: impl Fn(&Segment) -> bool,
) -> Option<(&'a Segment, Range<usize>)> {
    let mut best: Option<(&Segment, Range<usize>)> = None;
    for segment in segments.iter().filter(|s| accept(s)) {
        let overlap = segment.overlap(region);
        if overlap.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, top)| overlap.len() > top.len()) {
            best = Some((segment, overlap));
        }
    }
    best
}

fn coverage(overlap: &Range<usize>, region: &Range<usize>) -> f32 {
    if region.is_empty() {
        return 0.0;
    }
    overlap.len() as f32 / region.len() as f32
}

/// Move `index` to the end of the source word it falls inside, so a
/// misspelled last word never cuts the source word in half.
fn extend_to_word_end(source: &str, index: usize) -> usize {
    let index = ceil_boundary(source, index);
    let inside_word = source[..index]
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric);
    if !inside_word {
        return index;
    }

    index
        + source[index..]
            .chars()
            .take_while(|c| c.is_alphanumeric())
            .map(char::len_utf8)
            .sum::<usize>()
}

fn align(
    segments: &[Segment],
    source: &str,
    start: &str,
    end: &str,
    min_coverage: f32,
) -> Result<(usize, usize, f32), NoBoundary> {
    let start_region = 0..start.len();
    let end_region = start.len() + GAP.len()..start.len() + GAP.len() + end.len();

    let (segment, overlap) =
        best_cover(segments, &start_region, |_| true).ok_or(NoBoundary::StartNotFound)?;
    let start_coverage = coverage(&overlap, &start_region);
    if start_coverage < min_coverage {
        return Err(NoBoundary::StartNotFound);
    }

    // Extrapolate back over whatever part of the fragment the segment missed.
    let source_start = floor_boundary(
        source,
        segment
            .project(overlap.start)
            .saturating_sub(overlap.start - start_region.start),
    );
    let anchor = segment.project(overlap.end);

    let (source_end, end_matched, end_coverage) = match source[anchor..].find(end) {
        Some(rel) => (anchor + rel + end.len(), end.len(), 1.0),
        None => {
            let (segment, overlap) =
                best_cover(segments, &end_region, |s| s.source.start >= anchor)
                    .ok_or(NoBoundary::EndNotFoundAfterStart)?;
            let end_coverage = coverage(&overlap, &end_region);
            if end_coverage < min_coverage {
                return Err(NoBoundary::EndNotFoundAfterStart);
            }
            let projected = segment.project(overlap.end) + (end_region.end - overlap.end);
            (extend_to_word_end(source, projected), overlap.len(), end_coverage)
        }
    };

    if source_end <= source_start {
        return Err(NoBoundary::EndNotFoundAfterStart);
    }

    let expected = (start.len() + end.len()) as f32;
    let matched = (overlap.len() + end_matched) as f32;
    let ratio = (matched / expected).min(1.0);
    let mean_coverage = (start_coverage + end_coverage) / 2.0;

    Ok((
        source_start,
        source_end,
        DIFF_CONFIDENCE_CAP * ratio.min(mean_coverage),
    ))
}

/// Locate `start` and `end` in `source` by diff alignment.
///
/// All three inputs should already be normalized. Word granularity is tried
/// first; character granularity follows when the words yield nothing and the
/// source is within `char_limit`.
pub fn locate(
    source: &str,
    start: &str,
    end: &str,
    settings: &DiffSettings,
) -> Result<DiffMatch, NoBoundary> {
    if start.is_empty() || end.is_empty() || source.is_empty() {
        return Err(NoBoundary::StartNotFound);
    }

    let target = format!("{start}{GAP}{end}");
    let mut granularities = vec![Granularity::Words];
    if source.len() <= settings.char_limit {
        granularities.push(Granularity::Chars);
    }

    let mut failure = NoBoundary::StartNotFound;
    for granularity in granularities {
        let segments = equal_segments(&target, source, granularity, settings.timeout);
        match align(&segments, source, start, end, settings.min_coverage) {
            Ok((start, end, confidence)) => {
                return Ok(DiffMatch {
                    start,
                    end,
                    confidence,
                    granularity,
                })
            }
            Err(reason) => failure = reason,
        }
    }
    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DiffSettings {
        DiffSettings {
            min_coverage: 0.8,
            char_limit: 20_000,
            timeout: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_truncated_start_word_is_extrapolated() {
        let source = "some preamble. a hammer is the best tool for nails, \
                      and nothing else comes close. trailing text.";
        let m = locate(
            source,
            "a hammer is the best tool for nail",
            "nothing else comes close",
            &settings(),
        )
        .unwrap();

        assert_eq!(
            &source[m.start..m.end],
            "a hammer is the best tool for nails, and nothing else comes close"
        );
        assert!(m.confidence > 0.0 && m.confidence <= DIFF_CONFIDENCE_CAP);
    }

    #[test]
    fn test_edited_end_uses_segment() {
        let source = "the quick brown fox jumps over the lazy dog near the old river bank today";
        let m = locate(
            source,
            "the quick brown fox jumps",
            "near the old river bank tody",
            &settings(),
        )
        .unwrap();

        assert_eq!(m.start, 0);
        assert_eq!(&source[m.start..m.end], source);
        assert!(m.confidence < DIFF_CONFIDENCE_CAP);
    }

    #[test]
    fn test_extend_to_word_end() {
        let source = "river bank today. outro";
        assert_eq!(&source[..extend_to_word_end(source, 14)], "river bank today");
        assert_eq!(&source[..extend_to_word_end(source, 16)], "river bank today");
        assert_eq!(&source[..extend_to_word_end(source, 11)], "river bank ");
        assert_eq!(extend_to_word_end(source, 99), source.len());
    }

    #[test]
    fn test_paraphrase_fails_coverage() {
        let source = "the experiment clearly shows that the results were truly remarkable indeed";
        let result = locate(
            source,
            "the experiment clearly demonstrates that",
            "results were quite remarkable indeed",
            &settings(),
        );
        assert_eq!(result, Err(NoBoundary::StartNotFound));
    }

    #[test]
    fn test_end_must_follow_start() {
        let source = "closing words come first here. then the opening line of the passage appears";
        let result = locate(
            source,
            "then the opening line of the passage",
            "closing words come first",
            &settings(),
        );
        assert!(result.is_err());
    }
}
