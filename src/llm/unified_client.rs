use super::base_client::{CompletionBackend, LLMError, DEFAULT_RESPONSE_PATH};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};

pub const DEFAULT_UNIFIED_API_BASE: &str = "http://127.0.0.1:8080/v1";
pub const BASE_URL_ENV_VAR: &str = "UNIFIED_LLM_BASE_URL";
const COMPLETION_ENDPOINT: &str = "/unified_completion";

/// HTTP client for a unified completion gateway that routes
/// `provider::model` identifiers to the matching provider.
#[derive(Debug)]
pub struct UnifiedClient {
    http_client: HttpClient,
    base_url: String,
    response_path: String,
}

impl UnifiedClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `api_key`: Bearer token for the gateway. Must not be empty.
    /// * `base_url`: Optional base URL; falls back to `UNIFIED_LLM_BASE_URL`,
    ///   then to `DEFAULT_UNIFIED_API_BASE`.
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, LLMError> {
        if api_key.is_empty() {
            error!("Unified LLM API key not provided.");
            return Err(LLMError::NoApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LLMError::Other(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = HttpClient::builder().default_headers(headers).build()?;

        let base_url = base_url
            .or_else(|| std::env::var(BASE_URL_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_UNIFIED_API_BASE.to_string());

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            response_path: DEFAULT_RESPONSE_PATH.to_string(),
        })
    }

    /// Overrides the JSONPath used to extract the generated text, for gateways
    /// whose result shape differs from `$.result.content.content`.
    pub fn with_response_path(mut self, path: impl Into<String>) -> Self {
        self.response_path = path.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionBackend for UnifiedClient {
    #[instrument(skip(self, params))]
    async fn completion(
        &self,
        model: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, LLMError> {
        // `model` always addresses the configured backend, even if a param shadows it.
        let mut payload = params.clone();
        payload.insert("model".to_string(), Value::String(model.to_string()));

        let url = format!("{}{}", self.base_url, COMPLETION_ENDPOINT);
        debug!(url = %url, "Sending unified completion request");

        let response = self.http_client.post(&url).json(&payload).send().await?;

        let status = response.status();
        debug!(status = ?status, "Received unified completion response status");

        let body = response.text().await?;
        if !status.is_success() {
            error!(error_body = %body, "Unified completion API error");
            return Err(LLMError::ApiError(format!(
                "API request failed with status {}: {}",
                status, body
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn response_path(&self) -> &str {
        &self.response_path
    }
}
