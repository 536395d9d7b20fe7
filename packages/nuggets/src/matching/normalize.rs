//! Text normalization.
//!
//! Web pages and LLM replies disagree about typography: curly versus
//! straight quotes, en/em dashes versus hyphens, ellipsis glyphs, NBSPs.
//! [`normalize`] folds all of these onto one ASCII form so fragments and
//! sources compare equal. The variant transforms further down are the
//! fallbacks the exact tier tries when a flat comparison misses.

use regex::Regex;
use std::sync::LazyLock;

static URL_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([./@])\s*").expect("valid url spacing pattern"));

/// Replacement for typographic characters, if any.
fn canonical_replacement(c: char) -> Option<&'static str> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{2035}'
        | '\u{2039}' | '\u{203A}' | '\u{FF07}' | '`' | '\u{00B4}' => Some("'"),
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{2036}'
        | '\u{00AB}' | '\u{00BB}' | '\u{FF02}' | '\u{301D}' | '\u{301E}' => Some("\""),
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => Some("-"),
        '\u{2026}' | '\u{22EF}' => Some("..."),
        _ => None,
    }
}

/// Characters that render as nothing.
pub(crate) fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

/// Straight or typographic quote character.
pub fn is_quote(c: char) -> bool {
    c == '\'' || c == '"' || matches!(canonical_replacement(c), Some("'") | Some("\""))
}

/// First normalized character `c` turns into, or `None` if it disappears.
///
/// Used by the position mapper to compare original and normalized text
/// character by character.
pub(crate) fn fold_char(c: char) -> Option<char> {
    if is_zero_width(c) {
        return None;
    }
    if c.is_whitespace() {
        return Some(' ');
    }
    if let Some(replacement) = canonical_replacement(c) {
        return replacement.chars().next();
    }
    c.to_lowercase().next()
}

/// Canonicalize quotes, dashes, ellipses and whitespace, and lower-case.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`. Leading and
/// trailing whitespace is dropped and inner runs collapse to one space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if is_zero_width(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        match canonical_replacement(c) {
            Some(replacement) => out.push_str(replacement),
            None => out.extend(c.to_lowercase()),
        }
    }

    out
}

/// Collapse whitespace runs to single spaces and trim.
fn squash_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim punctuation, quotes and whitespace from both ends of a fragment.
///
/// LLMs like to close a reported fragment with a period or quote that the
/// source never had.
pub fn sanitize_fragment(text: &str) -> String {
    text.trim_matches(|c: char| {
        c.is_whitespace()
            || is_quote(c)
            || matches!(
                c,
                '.' | ',' | ';' | ':' | '!' | '?' | '-' | '(' | ')' | '[' | ']' | '*' | '\u{2026}'
            )
    })
    .to_string()
}

/// Collapse runs of adjacent quote characters into one.
pub fn collapse_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_quote = false;
    for c in text.chars() {
        let quote = is_quote(c);
        if quote && previous_quote {
            continue;
        }
        previous_quote = quote;
        out.push(c);
    }
    out
}

/// Remove every quote character.
pub fn strip_quotes(text: &str) -> String {
    squash_spaces(&text.chars().filter(|c| !is_quote(*c)).collect::<String>())
}

/// Remove spaces around `.`, `/` and `@` (`example . com` -> `example.com`).
pub fn collapse_url_spacing(text: &str) -> String {
    URL_SPACING.replace_all(text, "$1").into_owned()
}

/// Replace everything but letters and digits with single spaces.
pub fn alphanumeric_only(text: &str) -> String {
    squash_spaces(
        &text
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>(),
    )
}

/// A pair of transforms tried together by the exact tier.
///
/// `source` is applied to the original page text, `fragment` to each
/// reported fragment. Both start from raw (un-normalized) input.
#[derive(Clone, Copy)]
pub struct Variant {
    pub name: &'static str,
    pub source: fn(&str) -> String,
    pub fragment: fn(&str) -> String,
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant").field("name", &self.name).finish()
    }
}

fn sanitized_fragment(text: &str) -> String {
    sanitize_fragment(&normalize(text))
}

fn collapsed_quotes(text: &str) -> String {
    collapse_quotes(&normalize(text))
}

fn no_quotes(text: &str) -> String {
    strip_quotes(&normalize(text))
}

fn url_spacing(text: &str) -> String {
    collapse_url_spacing(&normalize(text))
}

fn quotes_and_urls(text: &str) -> String {
    collapse_url_spacing(&strip_quotes(&normalize(text)))
}

fn quotes_and_urls_fragment(text: &str) -> String {
    sanitize_fragment(&quotes_and_urls(text))
}

fn alphanumeric(text: &str) -> String {
    alphanumeric_only(&normalize(text))
}

/// The flat comparison: plain normalization on both sides.
pub const FLAT: Variant = Variant {
    name: "flat",
    source: normalize,
    fragment: normalize,
};

/// Fallback comparisons, tried in order after [`FLAT`] misses.
pub const FALLBACK_VARIANTS: [Variant; 6] = [
    Variant {
        name: "sanitized",
        source: normalize,
        fragment: sanitized_fragment,
    },
    Variant {
        name: "collapsed_quotes",
        source: collapsed_quotes,
        fragment: collapsed_quotes,
    },
    Variant {
        name: "no_quotes",
        source: no_quotes,
        fragment: no_quotes,
    },
    Variant {
        name: "url_spacing",
        source: url_spacing,
        fragment: url_spacing,
    },
    Variant {
        name: "quotes_and_urls",
        source: quotes_and_urls,
        fragment: quotes_and_urls_fragment,
    },
    Variant {
        name: "alphanumeric",
        source: alphanumeric,
        fragment: alphanumeric,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_typography() {
        assert_eq!(
            normalize("\u{201C}Hello\u{201D} \u{2014} it\u{2019}s\u{2026}"),
            "\"hello\" - it's..."
        );
        assert_eq!(normalize("\u{00AB}Bonjour\u{00BB}"), "\"bonjour\"");
        assert_eq!(normalize("a\u{2013}b\u{2212}c"), "a-b-c");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize("  Many \t\n spaces\u{00A0}here  "), "many spaces here");
        assert_eq!(normalize("zero\u{200B}width"), "zerowidth");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \u{200B} "), "");
    }

    #[test]
    fn test_normalize_is_idempotent_on_samples() {
        for sample in [
            "The \u{201C}best\u{201D} tool\u{2026}",
            "  İstanbul  STRASSE  ",
            "'' double '' quotes",
            "\u{FEFF}bom first",
        ] {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn test_sanitize_fragment() {
        assert_eq!(sanitize_fragment("these observations.\""), "these observations");
        assert_eq!(sanitize_fragment("\"Quoted start"), "Quoted start");
        assert_eq!(sanitize_fragment("...!?"), "");
    }

    #[test]
    fn test_collapse_and_strip_quotes() {
        assert_eq!(collapse_quotes("say \"\"hi\"\""), "say \"hi\"");
        assert_eq!(strip_quotes("say \" hi \" now"), "say hi now");
    }

    #[test]
    fn test_url_spacing() {
        assert_eq!(collapse_url_spacing("visit example . com / docs"), "visit example.com/docs");
        assert_eq!(collapse_url_spacing("mail me @ host.io"), "mail me@host.io");
    }

    #[test]
    fn test_alphanumeric_only() {
        assert_eq!(alphanumeric_only("it's -- great, really!"), "it s great really");
    }

    #[test]
    fn test_fold_char_matches_normalize() {
        assert_eq!(fold_char('\u{2019}'), Some('\''));
        assert_eq!(fold_char('\u{2026}'), Some('.'));
        assert_eq!(fold_char('\u{00A0}'), Some(' '));
        assert_eq!(fold_char('\u{200B}'), None);
        assert_eq!(fold_char('Q'), Some('q'));
    }
}
