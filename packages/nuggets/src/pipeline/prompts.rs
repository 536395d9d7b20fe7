//! Default LLM prompts for nugget extraction.
//!
//! Providers are free to use their own prompts; these are the defaults the
//! reply parser in [`parse`](crate::pipeline::parse) understands.

use sha2::{Digest, Sha256};

use crate::types::nugget::{NuggetType, RawExtraction};

/// Standard extraction: fragment pairs only.
pub const EXTRACT_PROMPT: &str = r#"Find the most valuable insights ("golden nuggets") in the page below.

Only report nuggets of these types: {{types}}
- tool: a specific tool, technique or resource worth trying
- media: a book, paper, talk or other media worth consuming
- explanation: an explanation that produces an "aha" moment
- analogy: an analogy that makes a concept click
- model: a mental model or framework for thinking

For each nugget quote the FIRST few words and the LAST few words of the
passage exactly as they appear in the page. Do not paraphrase.

Output JSON:
{
    "golden_nuggets": [
        {"type": "tool", "startContent": "first words", "endContent": "last words"}
    ]
}"#;

/// High-recall extraction: full passages with self-reported confidence.
pub const HIGH_RECALL_PROMPT: &str = r#"List every passage in the page below that could be a valuable insight.
Err on the side of including too much; a later pass filters.

Only report nuggets of these types: {{types}}

For each nugget return the full passage text and your confidence (0.0 to 1.0)
that it is a genuine, high-value insight.

Output JSON:
{
    "golden_nuggets": [
        {"type": "explanation", "fullContent": "the passage", "confidence": 0.9}
    ]
}"#;

/// Boundary detection for nuggets that could not be located mechanically.
pub const BOUNDARY_PROMPT: &str = r#"The passages below were taken from the page that follows, but their
wording may have drifted. For each passage, find where it actually begins and
ends in the page.

Passages:
{{nuggets}}

Return, in the same order, the FIRST few words and LAST few words exactly as
they appear in the page, with your confidence that the boundaries are right.

Output JSON:
{
    "golden_nuggets": [
        {"type": "model", "startContent": "first words", "endContent": "last words", "confidence": 0.8}
    ]
}"#;

fn types_list(selected: Option<&[NuggetType]>) -> String {
    let types = match selected {
        Some(types) if !types.is_empty() => types,
        _ => &NuggetType::ALL[..],
    };
    types
        .iter()
        .map(NuggetType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format the standard extraction prompt.
pub fn format_extract_prompt(selected: Option<&[NuggetType]>) -> String {
    EXTRACT_PROMPT.replace("{{types}}", &types_list(selected))
}

/// Format the high-recall prompt.
pub fn format_high_recall_prompt(selected: Option<&[NuggetType]>) -> String {
    HIGH_RECALL_PROMPT.replace("{{types}}", &types_list(selected))
}

/// Format the boundary-detection prompt for `nuggets`.
pub fn format_boundary_prompt(nuggets: &[RawExtraction]) -> String {
    let listing = nuggets
        .iter()
        .enumerate()
        .map(|(i, n)| format!("{}. [{}] {}", i + 1, n.nugget_type, n.representative_text()))
        .collect::<Vec<_>>()
        .join("\n");

    BOUNDARY_PROMPT.replace("{{nuggets}}", &listing)
}

/// Hash of a prompt, for keying provider-side caches.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_substitution() {
        let all = format_extract_prompt(None);
        assert!(all.contains("types: tool, media, explanation, analogy, model"));
        assert!(!all.contains("{{types}}"));

        let some = format_high_recall_prompt(Some(&[NuggetType::Analogy, NuggetType::Tool]));
        assert!(some.contains("types: analogy, tool\n"));
    }

    #[test]
    fn test_boundary_prompt_lists_nuggets() {
        let prompt = format_boundary_prompt(&[
            RawExtraction::with_full_content(NuggetType::Model, "Think in second-order effects."),
            RawExtraction::with_fragments(NuggetType::Tool, "Use ripgrep", "fast"),
        ]);
        assert!(prompt.contains("1. [model] Think in second-order effects."));
        assert!(prompt.contains("2. [tool] Use ripgrep fast"));
    }

    #[test]
    fn test_prompt_hash_is_stable() {
        let a = prompt_hash(EXTRACT_PROMPT);
        assert_eq!(a, prompt_hash(EXTRACT_PROMPT));
        assert_eq!(a.len(), 64);
        assert_ne!(a, prompt_hash(HIGH_RECALL_PROMPT));
    }
}
