//! Environment-driven settings.
//!
//! Values come from the process environment, after loading a `.env` file if
//! one is present. Blank variables count as unset. Command-line flags in the
//! `review` binary override what is read here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::generation::openai_compat::{DEEPSEEK_BASE_URL, OPENAI_BASE_URL};
use crate::generation::ModelChoice;
use crate::provider::arxiv::DEFAULT_API_URL;
use crate::retrieval::{RetrievalConfig, DEFAULT_DUPLICATE_THRESHOLD};

pub const DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const DEEPSEEK_BASE_URL_VAR: &str = "DEEPSEEK_BASE_URL";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const ARXIV_API_URL: &str = "ARXIV_API_URL";
pub const EMBEDDING_CACHE_DIR: &str = "EMBEDDING_CACHE_DIR";
pub const REVIEW_EMBEDDINGS: &str = "REVIEW_EMBEDDINGS";
pub const REVIEW_DUPLICATE_THRESHOLD: &str = "REVIEW_DUPLICATE_THRESHOLD";

/// Errors raised while reading settings.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A variable is set but its value is unusable
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which embedding backend deduplication uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    /// Local ONNX model via fastembed
    #[default]
    FastEmbed,
    /// OpenAI embeddings API
    OpenAi,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" | "local" => Ok(EmbeddingBackend::FastEmbed),
            "openai" => Ok(EmbeddingBackend::OpenAi),
            other => Err(format!("expected 'fastembed' or 'openai', got '{}'", other)),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::FastEmbed => write!(f, "fastembed"),
            EmbeddingBackend::OpenAi => write!(f, "openai"),
        }
    }
}

/// Process settings for the review pipeline.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub arxiv_api_url: String,
    /// FastEmbed model cache; fastembed's default when unset
    pub embedding_cache_dir: Option<PathBuf>,
    pub embedding_backend: EmbeddingBackend,
    /// Squared L2 distance treated as a duplicate during retrieval
    pub duplicate_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deepseek_api_key: None,
            deepseek_base_url: DEEPSEEK_BASE_URL.to_string(),
            openai_api_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            arxiv_api_url: DEFAULT_API_URL.to_string(),
            embedding_cache_dir: None,
            embedding_backend: EmbeddingBackend::default(),
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

// Keys stay out of logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<set>");
        f.debug_struct("Settings")
            .field("deepseek_api_key", &redact(&self.deepseek_api_key))
            .field("deepseek_base_url", &self.deepseek_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("arxiv_api_url", &self.arxiv_api_url)
            .field("embedding_cache_dir", &self.embedding_cache_dir)
            .field("embedding_backend", &self.embedding_backend)
            .field("duplicate_threshold", &self.duplicate_threshold)
            .finish()
    }
}

impl Settings {
    /// Load `.env` (if present) and read settings from the environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable holds an invalid value
    pub fn from_env() -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable holds an invalid value
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let duplicate_threshold = match get(REVIEW_DUPLICATE_THRESHOLD) {
            Some(raw) => parse_threshold(&raw)?,
            None => defaults.duplicate_threshold,
        };

        let embedding_backend = match get(REVIEW_EMBEDDINGS) {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: REVIEW_EMBEDDINGS.to_string(),
                message,
            })?,
            None => defaults.embedding_backend,
        };

        Ok(Self {
            deepseek_api_key: get(DEEPSEEK_API_KEY),
            deepseek_base_url: get(DEEPSEEK_BASE_URL_VAR).unwrap_or(defaults.deepseek_base_url),
            openai_api_key: get(OPENAI_API_KEY),
            openai_base_url: get(OPENAI_BASE_URL_VAR).unwrap_or(defaults.openai_base_url),
            arxiv_api_url: get(ARXIV_API_URL).unwrap_or(defaults.arxiv_api_url),
            embedding_cache_dir: get(EMBEDDING_CACHE_DIR).map(PathBuf::from),
            embedding_backend,
            duplicate_threshold,
        })
    }

    /// API key for the given model, if configured.
    pub fn api_key_for(&self, model: ModelChoice) -> Option<&str> {
        match model {
            ModelChoice::DeepSeek => self.deepseek_api_key.as_deref(),
            ModelChoice::OpenAi => self.openai_api_key.as_deref(),
        }
    }

    pub fn base_url_for(&self, model: ModelChoice) -> &str {
        match model {
            ModelChoice::DeepSeek => &self.deepseek_base_url,
            ModelChoice::OpenAi => &self.openai_base_url,
        }
    }

    /// Name of the variable holding the key for `model`.
    pub fn api_key_var(model: ModelChoice) -> &'static str {
        match model {
            ModelChoice::DeepSeek => DEEPSEEK_API_KEY,
            ModelChoice::OpenAi => OPENAI_API_KEY,
        }
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            duplicate_threshold: self.duplicate_threshold,
        }
    }
}

fn parse_threshold(raw: &str) -> ConfigResult<f32> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: REVIEW_DUPLICATE_THRESHOLD.to_string(),
        message,
    };

    let value: f32 = raw
        .parse()
        .map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("must be a non-negative number".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ConfigResult<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.deepseek_base_url, "https://api.deepseek.com");
        assert_eq!(s.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(s.arxiv_api_url, "http://export.arxiv.org/api/query");
        assert_eq!(s.embedding_backend, EmbeddingBackend::FastEmbed);
        assert!((s.duplicate_threshold - 0.1).abs() < 1e-6);
        assert!(s.api_key_for(ModelChoice::DeepSeek).is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let s = settings(&[
            (DEEPSEEK_API_KEY, "ds-key"),
            (OPENAI_API_KEY, " oa-key "),
            (OPENAI_BASE_URL_VAR, "http://proxy/v1"),
            (EMBEDDING_CACHE_DIR, "/tmp/models"),
            (REVIEW_EMBEDDINGS, "OpenAI"),
            (REVIEW_DUPLICATE_THRESHOLD, "0.25"),
        ])
        .unwrap();

        assert_eq!(s.api_key_for(ModelChoice::DeepSeek), Some("ds-key"));
        assert_eq!(s.api_key_for(ModelChoice::OpenAi), Some("oa-key"));
        assert_eq!(s.base_url_for(ModelChoice::OpenAi), "http://proxy/v1");
        assert_eq!(s.embedding_cache_dir, Some(PathBuf::from("/tmp/models")));
        assert_eq!(s.embedding_backend, EmbeddingBackend::OpenAi);
        assert!((s.retrieval_config().duplicate_threshold - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let s = settings(&[(DEEPSEEK_API_KEY, "   "), (ARXIV_API_URL, "")]).unwrap();
        assert!(s.deepseek_api_key.is_none());
        assert_eq!(s.arxiv_api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_invalid_threshold() {
        for bad in ["abc", "-0.5", "NaN", "inf"] {
            let err = settings(&[(REVIEW_DUPLICATE_THRESHOLD, bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == REVIEW_DUPLICATE_THRESHOLD));
        }
        assert!(settings(&[(REVIEW_DUPLICATE_THRESHOLD, "0")]).is_ok());
    }

    #[test]
    fn test_invalid_backend() {
        assert!(settings(&[(REVIEW_EMBEDDINGS, "word2vec")]).is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let s = settings(&[(OPENAI_API_KEY, "sk-secret")]).unwrap();
        let debug = format!("{:?}", s);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<set>"));
    }
}
