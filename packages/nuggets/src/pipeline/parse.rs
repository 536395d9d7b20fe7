//! Provider response parsing.
//!
//! LLM replies are untrusted JSON, often wrapped in Markdown fences and in a
//! handful of envelope shapes. [`parse_provider_response`] turns one reply
//! into a list of typed items: each either a valid [`RawExtraction`] or a
//! rejection with its reason. Only a document that is not JSON at all (or has
//! no recognizable list) is an error.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ExtractionError, Result};
use crate::types::nugget::{NuggetType, RawExtraction};

/// Envelope keys that may hold the nugget list.
const LIST_KEYS: [&str; 3] = ["nuggets", "golden_nuggets", "extractions"];

/// Why one item of a response was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("item is not a JSON object")]
    NotAnObject,

    #[error("missing 'type' field")]
    MissingType,

    #[error("unknown nugget type: {0}")]
    UnknownType(String),

    #[error("no start/end fragments or full content")]
    NotLocatable,
}

/// One item of a parsed response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedItem {
    Valid(RawExtraction),
    Rejected { index: usize, reason: RejectReason },
}

/// A parsed provider reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub items: Vec<ParsedItem>,
}

impl ParsedResponse {
    /// Valid extractions, in response order.
    pub fn extractions(&self) -> impl Iterator<Item = &RawExtraction> {
        self.items.iter().filter_map(|item| match item {
            ParsedItem::Valid(extraction) => Some(extraction),
            ParsedItem::Rejected { .. } => None,
        })
    }

    /// Consume the response, keeping only valid extractions.
    pub fn into_extractions(self) -> Vec<RawExtraction> {
        self.items
            .into_iter()
            .filter_map(|item| match item {
                ParsedItem::Valid(extraction) => Some(extraction),
                ParsedItem::Rejected { .. } => None,
            })
            .collect()
    }

    pub fn rejected_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, ParsedItem::Rejected { .. }))
            .count()
    }
}

/// Parse an LLM reply into typed items.
pub fn parse_provider_response(response: &str) -> Result<ParsedResponse> {
    let json = extract_json(response).ok_or_else(|| ExtractionError::InvalidResponse {
        reason: "no JSON document in response".to_string(),
    })?;
    let value: Value = serde_json::from_str(json)?;

    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => LIST_KEYS
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| ExtractionError::InvalidResponse {
                reason: format!("expected an array or an object with one of {LIST_KEYS:?}"),
            })?,
        _ => {
            return Err(ExtractionError::InvalidResponse {
                reason: "expected a JSON array or object".to_string(),
            })
        }
    };

    let items = list
        .iter()
        .enumerate()
        .map(|(index, item)| match parse_item(item) {
            Ok(extraction) => ParsedItem::Valid(extraction),
            Err(reason) => {
                warn!(index, %reason, "Rejected provider item");
                ParsedItem::Rejected { index, reason }
            }
        })
        .collect();

    Ok(ParsedResponse { items })
}

/// Locate the JSON document, handling Markdown code fences and prose around
/// the payload.
fn extract_json(response: &str) -> Option<&str> {
    let mut text = response.trim();

    if let Some(fence) = text.find("```") {
        let after = &text[fence + 3..];
        // Skip the info string (```json)
        let body_start = after.find('\n').map_or(0, |nl| nl + 1);
        let body = &after[body_start..];
        text = body.find("```").map_or(body, |close| &body[..close]).trim();
    }

    if text.starts_with('[') || text.starts_with('{') {
        return Some(text);
    }

    let open = text.find(['[', '{'])?;
    let close = text.rfind([']', '}'])?;
    (close > open).then(|| &text[open..=close])
}

fn string_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_item(item: &Value) -> std::result::Result<RawExtraction, RejectReason> {
    let object = item.as_object().ok_or(RejectReason::NotAnObject)?;

    let type_name = string_field(object, &["type", "nuggetType", "nugget_type"])
        .ok_or(RejectReason::MissingType)?;
    let nugget_type = type_name
        .parse::<NuggetType>()
        .map_err(|_| RejectReason::UnknownType(type_name.to_string()))?;

    let extraction = RawExtraction {
        nugget_type,
        start_content: string_field(object, &["startContent", "start_content"]).map(String::from),
        end_content: string_field(object, &["endContent", "end_content"]).map(String::from),
        full_content: string_field(object, &["fullContent", "full_content", "content"])
            .map(String::from),
        confidence: object
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c as f32)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0)),
    };

    if !extraction.is_locatable() {
        return Err(RejectReason::NotLocatable);
    }
    Ok(extraction)
}
