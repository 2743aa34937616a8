//! Foundry Responses API request body and response normalization.
//!
//! The agent endpoint speaks a Responses-style protocol, but deployments differ
//! in what they return. [`normalize`] picks the first shape the payload matches
//! and falls back to the raw JSON, so the widget always receives a single
//! display string.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use foundry_common::chat::{ChatMessage, coerce_content};
use foundry_common::client::{ForwardRequest, ForwardResponse, ResponseShape};
use foundry_common::json::{is_truthy, truthy_field};

pub mod client;
pub use client::FoundryClient;

// ============================================================================
// Request
// ============================================================================

/// Body POSTed to the agent endpoint.
///
/// ```
/// use foundry_client::responses::UpstreamRequest;
/// use foundry_common::{ChatMessage, ForwardRequest};
///
/// let request = ForwardRequest::new(vec![ChatMessage::user("Hi")]);
/// let body = serde_json::to_value(UpstreamRequest::from(&request)).unwrap();
/// assert_eq!(body["input"][0]["role"], "user");
/// assert_eq!(body["stream"], false);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest<'a> {
    /// Conversation in turn order.
    pub input: &'a [ChatMessage],
    /// Always `false`; streaming is not supported.
    pub stream: bool,
}

impl<'a> From<&'a ForwardRequest> for UpstreamRequest<'a> {
    fn from(request: &'a ForwardRequest) -> Self {
        Self {
            input: &request.messages,
            stream: false,
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Picks the response shape from the payload's structure.
///
/// A truthy `output` claims the payload even when none of its branches yield
/// text. Otherwise the first truthy of `choices[0].message.content`, `content`
/// and `text` wins.
fn select(raw: &Value) -> Option<(ResponseShape, Option<String>)> {
    if let Some(output) = truthy_field(raw, "output") {
        return Some(match output {
            Value::String(_) => (ResponseShape::OutputString, output_string(raw)),
            Value::Array(_) => (ResponseShape::OutputItems, output_items(raw)),
            _ => (ResponseShape::OutputObject, output_object(raw)),
        });
    }
    if let Some(text) = chat_completion(raw) {
        return Some((ResponseShape::ChatCompletion, Some(text)));
    }
    if let Some(text) = top_level_content(raw) {
        return Some((ResponseShape::Content, Some(text)));
    }
    top_level_text(raw).map(|text| (ResponseShape::Text, Some(text)))
}

/// Extracts display text from an upstream payload.
///
/// The first matching shape decides the text. When nothing matches, or the
/// matched shape yields blank text, the compact JSON of the whole payload is
/// returned instead. The text is never empty.
///
/// ```
/// use foundry_client::responses::normalize;
/// use foundry_common::ResponseShape;
/// use serde_json::json;
///
/// let response = normalize(json!({"choices": [{"message": {"content": "hi"}}]}));
/// assert_eq!(response.text, "hi");
/// assert_eq!(response.shape, ResponseShape::ChatCompletion);
///
/// let response = normalize(json!({"foo": "bar"}));
/// assert_eq!(response.text, r#"{"foo":"bar"}"#);
/// ```
#[must_use]
pub fn normalize(raw: Value) -> ForwardResponse {
    match select(&raw) {
        Some((shape, Some(text))) if !text.trim().is_empty() => {
            debug!("Extracted response text from {shape:?}");
            ForwardResponse { text, raw, shape }
        }
        matched => {
            if let Some((shape, _)) = matched {
                warn!("{shape:?} response carried no text, using raw data");
            } else {
                warn!("No text extracted from response, using raw data");
            }
            ForwardResponse {
                text: raw.to_string(),
                raw,
                shape: ResponseShape::Raw,
            }
        }
    }
}

fn output_string(raw: &Value) -> Option<String> {
    raw.get("output")?.as_str().map(str::to_string)
}

fn output_items(raw: &Value) -> Option<String> {
    let items = raw.get("output")?.as_array()?;
    Some(join_fragments(items.iter().map(output_item_text)))
}

fn output_item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => {
            if item.get("type").and_then(Value::as_str) == Some("message")
                && let Some(Value::Array(parts)) = item.get("content")
            {
                return Some(join_fragments(parts.iter().map(content_part_text)));
            }
            if item.get("type").and_then(Value::as_str) == Some("output_text")
                && let Some(text) = truthy_field(item, "text")
            {
                return Some(coerce_content(text));
            }
            if let Some(Value::String(content)) = item.get("content")
                && !content.is_empty()
            {
                return Some(content.clone());
            }
            truthy_field(item, "text").map(coerce_content)
        }
        _ => None,
    }
}

fn content_part_text(part: &Value) -> Option<String> {
    if !part.is_object() {
        return None;
    }
    truthy_field(part, "text").map(coerce_content)
}

fn join_fragments(fragments: impl Iterator<Item = Option<String>>) -> String {
    fragments
        .flatten()
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn output_object(raw: &Value) -> Option<String> {
    let output = raw.get("output").filter(|output| output.is_object())?;
    truthy_field(output, "content")
        .or_else(|| truthy_field(output, "text"))
        .map(coerce_content)
}

fn chat_completion(raw: &Value) -> Option<String> {
    raw.pointer("/choices/0/message/content")
        .filter(|content| is_truthy(content))
        .map(coerce_content)
}

fn top_level_content(raw: &Value) -> Option<String> {
    truthy_field(raw, "content").map(coerce_content)
}

fn top_level_text(raw: &Value) -> Option<String> {
    truthy_field(raw, "text").map(coerce_content)
}
