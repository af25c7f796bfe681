//! Text generation abstraction.
//!
//! This module defines the interface for streaming completions from a
//! language model and provides a client for OpenAI-compatible chat APIs
//! (used for both DeepSeek and OpenAI).
//!
//! Fragments arrive incrementally, but consumers treat the stream as a
//! liveness detail: the synthesizer always collects the whole response before
//! interpreting it.

pub mod openai_compat;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors that can occur while generating text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Could not reach the service
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The service answered with an error status
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response stream broke or carried an unreadable chunk
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Missing credentials or bad endpoint
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, GenerationResult<String>>;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// User message sent to the model
    pub prompt: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request incremental delivery; when false the whole completion arrives
    /// as one fragment
    pub stream: bool,
}

impl GenerationRequest {
    /// Create a streaming request.
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            stream: true,
        }
    }
}

/// Trait for language model backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a completion and return its fragments.
    ///
    /// # Errors
    /// Returns `GenerationError` if the request cannot be started; failures
    /// after that arrive as `Err` items in the stream.
    async fn stream(&self, request: &GenerationRequest) -> GenerationResult<FragmentStream>;

    /// Get the model identifier sent to the service.
    fn model_name(&self) -> &str;
}

/// Which hosted model to use for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ModelChoice {
    /// DeepSeek chat model
    #[default]
    DeepSeek,

    /// OpenAI GPT-4
    OpenAi,
}

impl ModelChoice {
    /// Model identifier sent to the service.
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelChoice::DeepSeek => "deepseek-chat",
            ModelChoice::OpenAi => "gpt-4",
        }
    }

    pub fn all() -> [ModelChoice; 2] {
        [ModelChoice::DeepSeek, ModelChoice::OpenAi]
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelChoice::DeepSeek => write!(f, "deepseek"),
            ModelChoice::OpenAi => write!(f, "gpt4"),
        }
    }
}

impl FromStr for ModelChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepseek" | "deepseek-chat" => Ok(ModelChoice::DeepSeek),
            "gpt4" | "gpt-4" | "openai" => Ok(ModelChoice::OpenAi),
            other => Err(format!(
                "Unknown model '{}'. Expected 'deepseek' or 'gpt4'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_choice_parsing() {
        assert_eq!("deepseek".parse::<ModelChoice>().unwrap(), ModelChoice::DeepSeek);
        assert_eq!("GPT-4".parse::<ModelChoice>().unwrap(), ModelChoice::OpenAi);
        assert_eq!(" openai ".parse::<ModelChoice>().unwrap(), ModelChoice::OpenAi);
        assert!("llama".parse::<ModelChoice>().is_err());
    }

    #[test]
    fn test_model_ids_round_trip_display() {
        for choice in ModelChoice::all() {
            assert_eq!(choice.to_string().parse::<ModelChoice>().unwrap(), choice);
        }
        assert_eq!(ModelChoice::DeepSeek.model_id(), "deepseek-chat");
        assert_eq!(ModelChoice::OpenAi.model_id(), "gpt-4");
        assert_eq!(ModelChoice::default(), ModelChoice::DeepSeek);
    }

    #[test]
    fn test_request_defaults_to_streaming() {
        let request = GenerationRequest::new("hello", 0.7);
        assert!(request.stream);
        assert_eq!(request.prompt, "hello");
    }
}
