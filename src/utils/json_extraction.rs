//! Extracting a JSON object from LLM replies.
//!
//! Even when asked for strict JSON, models occasionally wrap the object in a
//! markdown fence or a sentence of prose. Strategies, in order:
//! 1. The whole (trimmed) reply parses as a JSON object
//! 2. A fenced code block containing an object
//! 3. The first balanced `{...}` anywhere in the reply that parses
//!
//! # Example
//!
//! ```
//! use styling_jobs::utils::json_extraction::extract_json_object;
//!
//! let reply = "Sure! ```json\n{\"category\": \"dresses\"}\n```";
//! let json = extract_json_object(reply).unwrap();
//! assert_eq!(json, "{\"category\": \"dresses\"}");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Maximum characters of the reply echoed back in errors.
const PREVIEW_LEN: usize = 80;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JsonExtractionError {
    #[error("JSON object appears truncated ({unclosed} unclosed braces): {preview}")]
    Truncated { preview: String, unclosed: usize },

    #[error("No JSON object found in response starting with '{preview}'")]
    NotFound { preview: String },
}

fn code_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)```").ok())
        .as_ref()
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_LEN).collect()
}

fn parses_as_object(candidate: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(candidate),
        Ok(serde_json::Value::Object(_))
    )
}

/// Returns the byte index of the `}` closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Counts braces left open at the end of `s`, ignoring string contents.
fn unclosed_braces(s: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    depth
}

/// Extracts an object from the first fenced code block, if any.
pub fn extract_from_code_block(content: &str) -> Option<String> {
    let caps = code_block_regex()?.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    let start = block.find('{')?;
    let end = find_matching_brace(&block[start..])?;
    let candidate = &block[start..=start + end];
    parses_as_object(candidate).then(|| candidate.to_string())
}

/// Extracts the first balanced object anywhere in `content` that parses.
pub fn extract_first_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let substr = &content[start..];
            let end = find_matching_brace(substr)?;
            let candidate = &substr[..=end];
            parses_as_object(candidate).then(|| candidate.to_string())
        })
}

/// Extracts a JSON object from an LLM reply.
///
/// # Errors
///
/// `Truncated` when an object starts but never closes (usually a token limit),
/// `NotFound` otherwise.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    if parses_as_object(trimmed) {
        return Ok(trimmed.to_string());
    }

    if let Some(json) = extract_from_code_block(trimmed) {
        return Ok(json);
    }

    if let Some(json) = extract_first_object(trimmed) {
        return Ok(json);
    }

    if let Some(start) = trimmed.find('{') {
        let unclosed = unclosed_braces(&trimmed[start..]);
        if unclosed > 0 {
            return Err(JsonExtractionError::Truncated {
                preview: preview(&trimmed[start..]),
                unclosed,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        preview: preview(trimmed),
    })
}
