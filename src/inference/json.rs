//! JSON extraction from model responses
//!
//! Classifier prompts ask for pure JSON, but models still wrap replies in
//! markdown fences or conversational text. Extraction is staged: direct
//! parse, then fence stripping, then brace matching over the raw text.

use serde::de::DeserializeOwned;

/// Extract and deserialize a JSON object from a model response.
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let trimmed = response.trim();

    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Ok(parsed);
    }

    let unfenced = strip_fences(trimmed);
    if let Ok(parsed) = serde_json::from_str::<T>(unfenced) {
        return Ok(parsed);
    }

    for candidate in [unfenced, trimmed] {
        if let Some(object) = outermost_object(candidate) {
            if let Ok(parsed) = serde_json::from_str::<T>(object) {
                return Ok(parsed);
            }
        }
    }

    Err(format!(
        "no valid JSON in response, preview: {}...",
        trimmed.chars().take(200).collect::<String>()
    ))
}

/// Strip a surrounding ```json / ``` fence if present.
fn strip_fences(text: &str) -> &str {
    let mut inner = text;
    for prefix in ["```json", "```"] {
        if let Some(stripped) = inner.strip_prefix(prefix) {
            inner = stripped;
            break;
        }
    }
    inner = inner.trim();
    inner.strip_suffix("```").map(str::trim).unwrap_or(inner)
}

/// Locate the outermost balanced `{ ... }` span via brace counting.
fn outermost_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;

    for (i, ch) in text.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}
