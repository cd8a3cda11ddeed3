use regex::Regex;
use std::sync::LazyLock;

const JSON_FENCE: &str = "```json";

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid JSON fence pattern"));

/// Extracts the JSON content of a "```json" fenced block in a model response.
///
/// Returns the trimmed inner text of the first complete block. If the opening
/// fence has no closing fence, returns everything after the fence, trimmed.
/// Otherwise the input is returned unchanged.
pub fn clean_json_identifier(response: &str) -> String {
    if let Some(inner) = JSON_BLOCK.captures(response).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }

    if let Some(start) = response.find(JSON_FENCE) {
        return response[start + JSON_FENCE.len()..].trim().to_string();
    }

    response.to_string()
}
