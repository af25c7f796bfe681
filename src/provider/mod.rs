//! Literature source module.
//!
//! This module defines the interface for searching an external bibliographic
//! service and includes the arXiv implementation.
//!
//! The `LiteratureSource` trait abstracts the search backend so the retriever
//! can be exercised without network access.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::YearRange;

pub mod arxiv;

/// Errors that can occur when searching a literature source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to parse the response format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// API rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The service rejected the query
    #[error("API error: {0}")]
    ApiError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A search request sent to a literature source.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteratureQuery {
    /// Validated research domain, matched against all fields
    pub domain: String,

    /// Inclusive submission year range
    pub year_range: YearRange,

    /// Maximum number of entries to return
    pub max_results: usize,
}

impl LiteratureQuery {
    pub fn new(domain: impl Into<String>, year_range: YearRange, max_results: usize) -> Self {
        Self {
            domain: domain.into(),
            year_range,
            max_results,
        }
    }

    /// Render the arXiv search expression: a phrase match on all fields
    /// combined with a submission date window from January 1st of the start
    /// year to December 31st of the end year.
    pub fn search_expression(&self) -> String {
        format!(
            "all:\"{}\" AND submittedDate:[{}01010000 TO {}12312359]",
            self.domain, self.year_range.start, self.year_range.end
        )
    }
}

/// An unsanitized search hit as returned by the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEntry {
    pub title: String,
    pub authors: Vec<String>,
    pub published_year: i32,
    pub summary: String,
    /// Canonical entry URL
    pub entry_id: String,
}

/// Trait for searching external literature databases.
///
/// Implementations return entries ordered by submission date, newest first,
/// and do not retry on failure.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Run a search and return at most `query.max_results` entries.
    ///
    /// # Errors
    /// Returns `ProviderError` if the request fails or the response cannot be
    /// parsed
    async fn search(&self, query: &LiteratureQuery) -> ProviderResult<Vec<RawEntry>>;

    /// Get a human-readable name of this source for logging.
    fn name(&self) -> &str;
}
