//! Content reconstruction.
//!
//! Turns a reported fragment pair back into the full passage from the page.
//! Reconstruction is total: when the passage cannot be located the caller
//! still gets the degraded `start...end` form.

use std::sync::Arc;

use crate::matching::boundary::BoundaryMatcher;
use crate::types::nugget::{FragmentPair, RawExtraction};

/// Rebuilds full passages from fragment pairs.
#[derive(Debug, Clone)]
pub struct ContentReconstructor {
    matcher: Arc<BoundaryMatcher>,
}

impl Default for ContentReconstructor {
    fn default() -> Self {
        Self::new(Arc::new(BoundaryMatcher::default()))
    }
}

impl ContentReconstructor {
    pub fn new(matcher: Arc<BoundaryMatcher>) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &BoundaryMatcher {
        &self.matcher
    }

    /// The original passage spanning `pair`, or `start...end` if it can't be
    /// found. Blank fragments on both sides yield an empty string.
    pub fn reconstruct(&self, pair: &FragmentPair, source: &str) -> String {
        let start_blank = pair.start.trim().is_empty();
        let end_blank = pair.end.trim().is_empty();
        if start_blank && end_blank {
            return String::new();
        }
        if start_blank || end_blank {
            return pair.joined();
        }

        self.matcher
            .find_boundary(pair, source)
            .matched_text()
            .map_or_else(|| pair.joined(), str::to_string)
    }

    /// Reconstruct a nugget, tolerating a missing nugget or page.
    ///
    /// Full content wins when the nugget has no fragment pair.
    pub fn reconstruct_extraction(
        &self,
        nugget: Option<&RawExtraction>,
        source: Option<&str>,
    ) -> String {
        let Some(nugget) = nugget else {
            return String::new();
        };

        match (nugget.fragment_pair(), source) {
            (Some(pair), Some(source)) => self.reconstruct(&pair, source),
            (Some(pair), None) => pair.joined(),
            (None, _) => nugget
                .full_text()
                .map(str::to_string)
                .unwrap_or_else(|| {
                    FragmentPair::new(
                        nugget.start_content.clone().unwrap_or_default(),
                        nugget.end_content.clone().unwrap_or_default(),
                    )
                    .joined()
                }),
        }
    }

    /// Text to show for `pair`.
    ///
    /// Only prefers the reconstruction when it is longer than the naive
    /// `start...end` by at least `min_display_gain` bytes.
    pub fn display_content(&self, pair: &FragmentPair, source: &str) -> String {
        let naive = pair.joined();
        let reconstructed = self.reconstruct(pair, source);
        if reconstructed.len() >= naive.len() + self.matcher.config().min_display_gain {
            reconstructed
        } else {
            naive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::nugget::NuggetType;

    const PAGE: &str = "Tip: the Feynman technique means explaining a concept in plain \
                        words until gaps in understanding become obvious. More later.";

    #[test]
    fn test_reconstruct_found() {
        let r = ContentReconstructor::default();
        let pair = FragmentPair::new("the Feynman technique", "become obvious");
        assert_eq!(
            r.reconstruct(&pair, PAGE),
            "the Feynman technique means explaining a concept in plain words until gaps \
             in understanding become obvious"
        );
    }

    #[test]
    fn test_reconstruct_fallback() {
        let r = ContentReconstructor::default();
        let pair = FragmentPair::new("nowhere to be", "seen at all");
        assert_eq!(r.reconstruct(&pair, PAGE), "nowhere to be...seen at all");
        assert_eq!(r.reconstruct(&FragmentPair::new("", " "), PAGE), "");
        assert_eq!(r.reconstruct(&FragmentPair::new("only start", ""), PAGE), "only start...");
    }

    #[test]
    fn test_reconstruct_extraction_is_total() {
        let r = ContentReconstructor::default();
        assert_eq!(r.reconstruct_extraction(None, Some(PAGE)), "");

        let fragments =
            RawExtraction::with_fragments(NuggetType::Explanation, "the Feynman technique", "become obvious");
        assert_eq!(
            r.reconstruct_extraction(Some(&fragments), None),
            "the Feynman technique...become obvious"
        );
        assert!(r
            .reconstruct_extraction(Some(&fragments), Some(PAGE))
            .contains("plain words"));

        let full = RawExtraction::with_full_content(NuggetType::Tool, "Use ripgrep.");
        assert_eq!(r.reconstruct_extraction(Some(&full), Some(PAGE)), "Use ripgrep.");
    }

    #[test]
    fn test_display_content_requires_gain() {
        let r = ContentReconstructor::default();

        let long = FragmentPair::new("the Feynman technique", "become obvious");
        assert!(r.display_content(&long, PAGE).contains("plain words"));

        // Adjacent fragments: reconstruction is barely longer than the naive form.
        let short = FragmentPair::new("in plain", "words until");
        assert_eq!(r.display_content(&short, PAGE), "in plain...words until");
    }
}
