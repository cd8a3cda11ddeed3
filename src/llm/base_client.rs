use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSONPath of the generated text inside a unified completion result.
pub const DEFAULT_RESPONSE_PATH: &str = "$.result.content.content";

/// Errors that can occur while requesting a completion.
#[derive(Error, Debug)]
pub enum LLMError {
    /// Error related to network requests (e.g., connection refused, timeout).
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Error reported by the API (e.g., invalid request, rate limit).
    #[error("API error: {0}")]
    ApiError(String),
    /// The response body was not valid JSON.
    #[error("Failed to parse response: {0}")]
    ParsingError(#[from] serde_json::Error),
    /// The response was JSON but the text was not where it was expected.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Required API key was not provided.
    #[error("No API key provided")]
    NoApiKey,
    /// The request could not be attempted with the given configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Any other type of error.
    #[error("Other error: {0}")]
    Other(String),
}

/// Represents the role of a message in a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model; the unified endpoint's name for a system message.
    Developer,
    /// Message from the end-user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

/// A single role-tagged message sent to the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LLMMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Trait defining the interface for a text-completion backend.
///
/// This allows the invoker to be used with the HTTP client in production and
/// with scripted backends in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends one completion request.
    ///
    /// # Arguments
    /// * `model`: Backend model identifier, `provider::model_name`.
    /// * `params`: Request payload: `messages` plus the filtered extra parameters.
    ///
    /// # Returns
    /// The raw JSON result, from which the text is extracted with `response_path`.
    async fn completion(&self, model: &str, params: &Map<String, Value>)
        -> Result<Value, LLMError>;

    /// JSONPath locating the generated text in a completion result.
    fn response_path(&self) -> &str {
        DEFAULT_RESPONSE_PATH
    }
}

/// Extracts the generated text found at `path` in `result`.
pub fn extract_text(result: &Value, path: &str) -> Result<String, LLMError> {
    let selected = jsonpath_lib::select(result, path)
        .map_err(|e| LLMError::Other(format!("Invalid response path '{}': {:?}", path, e)))?;

    match selected.first() {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(LLMError::MalformedResponse(format!(
            "expected a string at '{}', found {}",
            path, other
        ))),
        None => Err(LLMError::MalformedResponse(format!(
            "no value found at '{}'",
            path
        ))),
    }
}
