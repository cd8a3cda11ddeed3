//! # Configuration Module
//!
//! Defines `LLMConfig`, the parameters needed to address a model through the
//! unified completion endpoint, together with the helpers used to load it
//! from a JSON file and to resolve the API key from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Env var holding a key for the unified endpoint, checked before provider keys.
pub const UNIFIED_API_KEY_ENV_VAR: &str = "UNIFIED_LLM_API_KEY";

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}
fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
pub fn default_extra_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("max_tokens".to_string(), json!(8192));
    params.insert("temperature".to_string(), json!(1));
    params
}

/// Configuration parameters for a language model.
///
/// `extra_params` holds provider-specific settings (max tokens, temperature,
/// sampling options...). A `null` value marks a parameter as unset; such keys
/// are dropped by [`LLMConfig::get_api_params`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LLMConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Number of attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_extra_params")]
    pub extra_params: Map<String, Value>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            max_retries: default_max_retries(),
            extra_params: default_extra_params(),
        }
    }
}

impl LLMConfig {
    /// Creates a config for `provider`/`model_name` with the default retry
    /// budget and parameters.
    pub fn new(provider: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replaces the whole parameter map.
    pub fn with_extra_params(mut self, extra_params: Map<String, Value>) -> Self {
        self.extra_params = extra_params;
        self
    }

    /// Identifier used to address the backend, e.g. `anthropic::claude-sonnet-4-20250514`.
    pub fn model(&self) -> String {
        format!("{}::{}", self.provider, self.model_name)
    }

    /// Merges `params` into `extra_params`, overwriting existing keys.
    ///
    /// Provider, model name and retry budget are left untouched.
    pub fn update<I, K>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in params {
            self.extra_params.insert(key.into(), value);
        }
    }

    /// Returns the API parameters with every unset (`null`) value removed.
    pub fn get_api_params(&self) -> Map<String, Value> {
        self.extra_params
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Loads a config from a JSON file.
    ///
    /// Fields missing from the file take their defaults. A missing file is not
    /// an error: a warning is logged and the default config is returned.
    ///
    /// # Arguments
    /// * `config_file_path`: Path to the JSON configuration file.
    pub fn load(config_file_path: &Path) -> Result<Self> {
        if !config_file_path.exists() {
            warn!(
                "Config file not found at: {}. Using default values.",
                config_file_path.display()
            );
            return Ok(Self::default());
        }
        let config_str = fs::read_to_string(config_file_path).with_context(|| {
            format!("Failed to read config file at: {}", config_file_path.display())
        })?;
        serde_json::from_str(&config_str).with_context(|| {
            format!("Failed to parse config file: {}", config_file_path.display())
        })
    }
}

/// Creates an `LLMConfig` for `provider`/`model_name` and merges `params`
/// into its default parameters.
pub fn create_llm_config<I, K>(provider: &str, model_name: &str, params: I) -> LLMConfig
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut config = LLMConfig::new(provider, model_name);
    config.update(params);
    config
}

/// Name of the environment variable holding the API key for `provider`.
pub fn api_key_env_var(provider: &str) -> String {
    match provider {
        "anthropic" => "ANTHROPIC_API_KEY".to_string(),
        "openai" => "OPENAI_API_KEY".to_string(),
        "google" => "GOOGLE_API_KEY".to_string(),
        "openrouter" => "OPENROUTER_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.to_uppercase()),
    }
}

/// Resolves the API key to use.
///
/// Priority: explicit value, then `UNIFIED_LLM_API_KEY`, then the provider's
/// own environment variable. Empty values are skipped.
pub fn resolve_api_key(provider: &str, explicit: Option<String>) -> Option<String> {
    explicit
        .filter(|key| !key.is_empty())
        .or_else(|| std::env::var(UNIFIED_API_KEY_ENV_VAR).ok())
        .filter(|key| !key.is_empty())
        .or_else(|| std::env::var(api_key_env_var(provider)).ok())
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = LLMConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.model_name, "claude-sonnet-4-20250514");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.extra_params["max_tokens"], json!(8192));
        assert_eq!(config.extra_params["temperature"], json!(1));
        assert_eq!(config.model(), "anthropic::claude-sonnet-4-20250514");
    }

    #[test]
    fn test_update_overwrites_only_given_keys() {
        let mut config = LLMConfig::default();
        config.update([("temperature", json!(0.5))]);

        assert_eq!(config.extra_params["temperature"], json!(0.5));
        assert_eq!(config.extra_params["max_tokens"], json!(8192));
        assert_eq!(config.extra_params.len(), 2);
        assert_eq!(config.provider, DEFAULT_PROVIDER);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_get_api_params_drops_unset_values() {
        let mut config = LLMConfig::default();
        config.update([("top_p", Value::Null), ("top_k", json!(40))]);

        let params = config.get_api_params();
        assert!(!params.contains_key("top_p"));
        assert_eq!(params["top_k"], json!(40));
        assert_eq!(params["max_tokens"], json!(8192));
        assert_eq!(params["temperature"], json!(1));
        assert!(params.values().all(|v| !v.is_null()));
        // The config itself still records the unset key.
        assert!(config.extra_params.contains_key("top_p"));
    }

    #[test]
    fn test_create_llm_config_merges_params() {
        let config = create_llm_config("openai", "gpt-4o", [("temperature", json!(0.2))]);
        assert_eq!(config.model(), "openai::gpt-4o");
        assert_eq!(config.extra_params["temperature"], json!(0.2));
        assert_eq!(config.extra_params["max_tokens"], json!(8192));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = LLMConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, LLMConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("llm_config.json");
        fs::write(
            &path,
            r#"{ "provider": "openai", "model_name": "gpt-4o", "max_retries": 2 }"#,
        )
        .unwrap();

        let config = LLMConfig::load(&path).unwrap();
        assert_eq!(config.model(), "openai::gpt-4o");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.extra_params, default_extra_params());
    }

    #[test]
    fn test_load_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = LLMConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_api_key_env_var_names() {
        assert_eq!(api_key_env_var("anthropic"), "ANTHROPIC_API_KEY");
        assert_eq!(api_key_env_var("openai"), "OPENAI_API_KEY");
        assert_eq!(api_key_env_var("doubao"), "DOUBAO_API_KEY");
    }

    #[test]
    fn test_resolve_api_key_prefers_explicit() {
        let key = resolve_api_key("myutils_test_provider", Some("sk-cli".to_string()));
        assert_eq!(key, Some("sk-cli".to_string()));
    }

    #[test]
    fn test_resolve_api_key_from_provider_env() {
        std::env::set_var("MYUTILS_ENV_PROVIDER_API_KEY", "sk-env");
        let key = resolve_api_key("myutils_env_provider", Some(String::new()));
        std::env::remove_var("MYUTILS_ENV_PROVIDER_API_KEY");
        // UNIFIED_LLM_API_KEY wins when it is set in the environment running the tests.
        match std::env::var(UNIFIED_API_KEY_ENV_VAR) {
            Ok(unified) if !unified.is_empty() => assert_eq!(key, Some(unified)),
            _ => assert_eq!(key, Some("sk-env".to_string())),
        }
    }
}
