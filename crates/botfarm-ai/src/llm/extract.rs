//! Pulling structured payloads out of free-form model responses.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{AiError, Result};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[A-Za-z0-9_+\-]*[ \t]*\r?\n([\s\S]*?)```").expect("valid fence regex")
});

/// A JSON object embedded in prose.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedJson {
    pub text_before: String,
    pub json: Map<String, Value>,
    pub text_after: String,
}

/// Take everything between the first `{` and the last `}` as one JSON
/// object; surrounding prose is returned alongside it.
pub fn extract_json(text: &str) -> Result<ExtractedJson> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(AiError::InvalidFormat(
            "response contains no JSON object".to_string(),
        ));
    };
    if end < start {
        return Err(AiError::InvalidFormat(
            "response braces are out of order".to_string(),
        ));
    }

    let json = match serde_json::from_str::<Value>(&text[start..=end])? {
        Value::Object(map) => map,
        other => {
            return Err(AiError::InvalidFormat(format!(
                "expected a JSON object, got {other}"
            )));
        }
    };

    Ok(ExtractedJson {
        text_before: text[..start].trim().to_string(),
        json,
        text_after: text[end + 1..].trim().to_string(),
    })
}

/// Extract a program from a response: the first fenced block if there is
/// one, otherwise the whole response.
pub fn extract_script(text: &str) -> Result<String> {
    if !text.contains("```") {
        return Ok(text.trim().to_string());
    }
    FENCED_BLOCK
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim_end().to_string())
        .ok_or_else(|| AiError::InvalidFormat("script code block is not terminated".to_string()))
}
