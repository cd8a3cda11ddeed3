//! # Completion Invoker
//!
//! Sends one user prompt (plus an optional system prompt) to a completion
//! backend and retries failed attempts with exponential backoff.
//!
//! Each attempt either yields the extracted text or an `LLMError`. Backend
//! errors and extraction errors are treated alike: both are retried, and when
//! the retry budget is spent the error of the last attempt is returned as is.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::base_client::{extract_text, CompletionBackend, LLMError, LLMMessage, MessageRole};
use super::unified_client::UnifiedClient;
use crate::config::LLMConfig;
use crate::utils::logger::LogSink;

/// Delay before the second attempt; doubled for each further attempt.
pub const BASE_BACKOFF_SECS: u64 = 5;

/// Backoff to wait after the failed attempt with 0-based index `attempt`.
///
/// `5 * 2^attempt` seconds, without jitter or cap.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(BASE_BACKOFF_SECS.saturating_mul(factor))
}

/// Builds the message list: the developer message (when `system_prompt` is
/// non-empty) followed by the user message.
pub fn build_messages(user_prompt: &str, system_prompt: &str) -> Vec<LLMMessage> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(LLMMessage::new(MessageRole::Developer, system_prompt));
    }
    messages.push(LLMMessage::new(MessageRole::User, user_prompt));
    messages
}

/// Merges the messages and the config's API parameters into one payload.
///
/// Parameters are applied after `messages`, so a parameter of the same name wins.
pub fn build_request_params(
    messages: &[LLMMessage],
    config: &LLMConfig,
) -> Result<Map<String, Value>, LLMError> {
    let mut params = Map::new();
    params.insert("messages".to_string(), serde_json::to_value(messages)?);
    params.extend(config.get_api_params());
    Ok(params)
}

fn log_warning(logger: Option<&dyn LogSink>, message: &str) {
    match logger {
        Some(sink) => sink.warning(message),
        None => println!("{}", message),
    }
}

fn log_info(logger: Option<&dyn LogSink>, message: &str) {
    match logger {
        Some(sink) => sink.info(message),
        None => println!("{}", message),
    }
}

async fn attempt_once<B>(
    backend: &B,
    model: &str,
    params: &Map<String, Value>,
) -> Result<String, LLMError>
where
    B: CompletionBackend + ?Sized,
{
    let result = backend.completion(model, params).await?;
    extract_text(&result, backend.response_path())
}

/// Generates a response from `backend` for `user_prompt`.
///
/// Makes up to `config.max_retries` attempts. After a failed attempt that is
/// not the last one, waits [`backoff_delay`] before trying again. Failures are
/// reported to `logger` (warning per attempt, info before each wait) or to
/// stdout when no logger is given.
///
/// # Arguments
/// * `backend`: The completion backend to call.
/// * `user_prompt`: The user prompt to generate a response for.
/// * `config`: Model identifier, retry budget and API parameters.
/// * `system_prompt`: Optional instructions; empty means none.
/// * `logger`: Optional sink for retry messages.
///
/// # Returns
/// The generated text, or the error of the last attempt once all attempts
/// failed. `LLMError::InvalidConfig` if `config.max_retries` is zero.
#[instrument(skip_all, fields(model = %config.model(), max_retries = config.max_retries))]
pub async fn get_llm_response_with<B>(
    backend: &B,
    user_prompt: &str,
    config: &LLMConfig,
    system_prompt: &str,
    logger: Option<&dyn LogSink>,
) -> Result<String, LLMError>
where
    B: CompletionBackend + ?Sized,
{
    if config.max_retries == 0 {
        return Err(LLMError::InvalidConfig(
            "max_retries must be at least 1".to_string(),
        ));
    }

    let messages = build_messages(user_prompt, system_prompt);
    let params = build_request_params(&messages, config)?;
    let model = config.model();

    let mut last_error: Option<LLMError> = None;

    for attempt in 0..config.max_retries {
        match attempt_once(backend, &model, &params).await {
            Ok(text) => {
                debug!(attempt = attempt + 1, "Completion succeeded");
                return Ok(text);
            }
            Err(e) => {
                log_warning(
                    logger,
                    &format!("Attempt {} failed with error {}.", attempt + 1, e),
                );
                last_error = Some(e);
            }
        }

        if attempt < config.max_retries - 1 {
            let wait_time = backoff_delay(attempt);
            log_info(
                logger,
                &format!("Retrying after {} seconds...", wait_time.as_secs()),
            );
            tokio::time::sleep(wait_time).await;
        }
    }

    // The loop only leaves early on success, so an error was recorded.
    Err(last_error.unwrap_or_else(|| {
        LLMError::Other("no completion attempt was made".to_string())
    }))
}

/// Generates a response through a [`UnifiedClient`] authenticated with `api_key`.
///
/// See [`get_llm_response_with`] for the retry contract.
pub async fn get_llm_response(
    user_prompt: &str,
    api_key: &str,
    config: &LLMConfig,
    system_prompt: &str,
    logger: Option<&dyn LogSink>,
) -> Result<String, LLMError> {
    let client = UnifiedClient::new(api_key, None)?;
    get_llm_response_with(&client, user_prompt, config, system_prompt, logger).await
}

/// Blocking form of [`get_llm_response`] for synchronous scripts.
///
/// Runs the call on a private current-thread runtime: the calling thread is
/// blocked for the whole call, backoff waits included. Inside an async
/// runtime this returns `LLMError::Other` without sending anything; use
/// [`get_llm_response`] there.
pub fn get_llm_response_blocking(
    user_prompt: &str,
    api_key: &str,
    config: &LLMConfig,
    system_prompt: &str,
    logger: Option<&dyn LogSink>,
) -> Result<String, LLMError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(LLMError::Other(
            "get_llm_response_blocking called from within an async runtime".to_string(),
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| LLMError::Other(format!("Failed to build runtime: {}", e)))?;
    runtime.block_on(get_llm_response(
        user_prompt,
        api_key,
        config,
        system_prompt,
        logger,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Backend replaying a fixed script of results and recording each call.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<Value, LLMError>>>,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<Value, LLMError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn completion(
            &self,
            model: &str,
            params: &Map<String, Value>,
        ) -> Result<Value, LLMError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), params.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LLMError::Other("script exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        warnings: Mutex<Vec<String>>,
        infos: Mutex<Vec<String>>,
    }

    impl LogSink for RecordingSink {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn warning(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }

    fn ok_result(text: &str) -> Result<Value, LLMError> {
        Ok(json!({"result": {"content": {"content": text}}}))
    }

    fn api_failure(n: u32) -> Result<Value, LLMError> {
        Err(LLMError::ApiError(format!("failure {}", n)))
    }

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_secs(5));
        assert_eq!(backoff_delay(1), Duration::from_secs(10));
        assert_eq!(backoff_delay(2), Duration::from_secs(20));
        assert_eq!(backoff_delay(4), Duration::from_secs(80));
        assert_eq!(backoff_delay(200), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_build_messages_order() {
        let messages = build_messages("question", "instructions");
        assert_eq!(
            messages,
            vec![
                LLMMessage::new(MessageRole::Developer, "instructions"),
                LLMMessage::new(MessageRole::User, "question"),
            ]
        );

        let messages = build_messages("question", "");
        assert_eq!(messages, vec![LLMMessage::new(MessageRole::User, "question")]);
    }

    #[test]
    fn test_build_request_params_merges_filtered_config() {
        let mut config = LLMConfig::default();
        config.update([("top_p", Value::Null), ("temperature", json!(0.5))]);

        let params = build_request_params(&build_messages("hi", ""), &config).unwrap();
        assert_eq!(params["messages"], json!([{"role": "user", "content": "hi"}]));
        assert_eq!(params["temperature"], json!(0.5));
        assert_eq!(params["max_tokens"], json!(8192));
        assert!(!params.contains_key("top_p"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let backend = ScriptedBackend::new(vec![ok_result("done")]);
        let sink = RecordingSink::default();
        let config = LLMConfig::default();

        let start = Instant::now();
        let text = get_llm_response_with(&backend, "hi", &config, "sys", Some(&sink))
            .await
            .unwrap();

        assert_eq!(text, "done");
        assert_eq!(backend.call_count(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(sink.warnings.lock().unwrap().is_empty());

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, "anthropic::claude-sonnet-4-20250514");
        assert_eq!(
            calls[0].1["messages"],
            json!([
                {"role": "developer", "content": "sys"},
                {"role": "user", "content": "hi"}
            ])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_backoffs() {
        let backend = ScriptedBackend::new(vec![
            api_failure(1),
            api_failure(2),
            ok_result("third time lucky"),
            ok_result("never requested"),
        ]);
        let sink = RecordingSink::default();
        let config = LLMConfig::default().with_max_retries(3);

        let start = Instant::now();
        let text = get_llm_response_with(&backend, "hi", &config, "", Some(&sink))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(text, "third time lucky");
        assert_eq!(backend.call_count(), 3);
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
        assert_eq!(
            *sink.infos.lock().unwrap(),
            vec![
                "Retrying after 5 seconds...".to_string(),
                "Retrying after 10 seconds...".to_string(),
            ]
        );
        assert_eq!(
            *sink.warnings.lock().unwrap(),
            vec![
                "Attempt 1 failed with error API error: failure 1.".to_string(),
                "Attempt 2 failed with error API error: failure 2.".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let backend = ScriptedBackend::new(vec![api_failure(1), api_failure(2)]);
        let sink = RecordingSink::default();
        let config = LLMConfig::default().with_max_retries(2);

        let start = Instant::now();
        let err = get_llm_response_with(&backend, "hi", &config, "", Some(&sink))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        match err {
            LLMError::ApiError(msg) => assert_eq!(msg, "failure 2"),
            other => panic!("Expected the last ApiError, got {:?}", other),
        }
        assert_eq!(backend.call_count(), 2);
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(sink.infos.lock().unwrap().len(), 1);
        assert_eq!(sink.warnings.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_retried() {
        let backend = ScriptedBackend::new(vec![
            Ok(json!({"result": {"unexpected": true}})),
            ok_result("recovered"),
        ]);
        let sink = RecordingSink::default();
        let config = LLMConfig::default().with_max_retries(2);

        let text = get_llm_response_with(&backend, "hi", &config, "", Some(&sink))
            .await
            .unwrap();

        assert_eq!(text, "recovered");
        assert_eq!(backend.call_count(), 2);
        assert!(sink.warnings.lock().unwrap()[0].contains("Malformed response"));
    }

    #[tokio::test]
    async fn test_zero_retries_is_rejected() {
        let backend = ScriptedBackend::new(vec![ok_result("unused")]);
        let config = LLMConfig::default().with_max_retries(0);

        let err = get_llm_response_with(&backend, "hi", &config, "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::InvalidConfig(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unified_client_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unified_completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"content": {"content": "```json\n{\"a\": 1}\n```"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = UnifiedClient::new("key", Some(server.uri())).unwrap();
        let config = LLMConfig::default().with_max_retries(1);
        let text = get_llm_response_with(&client, "give json", &config, "", None)
            .await
            .unwrap();

        assert_eq!(crate::utils::text::clean_json_identifier(&text), "{\"a\": 1}");
    }

    #[test]
    fn test_blocking_rejects_zero_retries() {
        let config = LLMConfig::default().with_max_retries(0);
        let err = get_llm_response_blocking("hi", "key", &config, "", None).unwrap_err();
        assert!(matches!(err, LLMError::InvalidConfig(_)));
    }

    #[test]
    fn test_blocking_requires_api_key() {
        let config = LLMConfig::default();
        let err = get_llm_response_blocking("hi", "", &config, "", None).unwrap_err();
        assert!(matches!(err, LLMError::NoApiKey));
    }

    #[tokio::test]
    async fn test_blocking_inside_runtime_returns_error() {
        let config = LLMConfig::default();
        match get_llm_response_blocking("hi", "key", &config, "", None) {
            Err(LLMError::Other(msg)) => assert!(msg.contains("within an async runtime")),
            other => panic!("Expected Other error, got {:?}", other),
        }
    }
}
