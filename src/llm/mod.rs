//! # LLM Module
//!
//! Provides the abstractions for talking to a text-completion backend: a
//! common `CompletionBackend` trait, the HTTP `UnifiedClient` implementing it,
//! and the retrying `get_llm_response` invoker built on top.

pub mod base_client;
pub mod invoker;
pub mod unified_client;

pub use base_client::{extract_text, CompletionBackend, LLMError, LLMMessage, MessageRole};
pub use invoker::{
    backoff_delay, build_messages, build_request_params, get_llm_response,
    get_llm_response_blocking, get_llm_response_with,
};
pub use unified_client::UnifiedClient;
