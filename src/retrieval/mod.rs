//! Paper retrieval and deduplication.
//!
//! This module turns a (domain, years, count) request into a list of
//! sanitized [`PaperRecord`]s. It coordinates a literature source, an
//! embedding provider and a per-request similarity index.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_review::embedding::fastembed::FastEmbedProvider;
//! use paper_review::provider::arxiv::ArxivSource;
//! use paper_review::retrieval::Retriever;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = FastEmbedProvider::new(None, None)?;
//! let retriever = Retriever::new(ArxivSource::new(), embedder);
//!
//! let papers = retriever.search_papers("graph neural networks", "2020-2023", 5).await?;
//! for paper in papers {
//!     println!("{} ({})", paper.title, paper.publication_year);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{l2_normalize, EmbeddingProvider};
use crate::index::{FlatL2Index, SimilarityIndex, NO_NEIGHBOR};
use crate::models::PaperRecord;
use crate::provider::{LiteratureQuery, LiteratureSource, RawEntry};
use crate::validation::{sanitize_output, validate_query, validate_url, ValidationError};

/// URL substituted for any entry link that fails URL validation.
pub const DEFAULT_SOURCE_URL: &str = "https://arxiv.org/";

/// Temperature used when re-validating a retrieval request; retrieval does
/// not sample, so any in-range value works.
const VALIDATION_TEMPERATURE: f64 = 0.7;

/// Upper bound on candidates fetched from the source.
pub const MAX_CANDIDATES: usize = 50;

/// Squared L2 distance under which two normalized embeddings count as the
/// same paper.
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.1;

static LATEX_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$.+?\$").expect("latex math pattern is valid"));

static LATEX_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-z]+").expect("latex command pattern is valid"));

/// Errors that can occur during retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The request failed validation; nothing was fetched
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The literature source failed
    #[error("Source error: {0}")]
    Source(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The similarity index rejected the vectors
    #[error("Index error: {0}")]
    Index(String),
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Retrieval tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Squared L2 distance at or below which candidates are duplicates.
    /// Zero keeps only exact ties together.
    pub duplicate_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

/// Remove inline LaTeX math and control words, then trim.
///
/// # Example
/// ```
/// use paper_review::retrieval::clean_latex;
/// assert_eq!(clean_latex(" Bounds on $\\alpha$-divergence "), "Bounds on -divergence");
/// ```
pub fn clean_latex(text: &str) -> String {
    let text = LATEX_MATH.replace_all(text, "");
    let text = LATEX_COMMAND.replace_all(&text, "");
    text.trim().to_string()
}

/// Pick representative candidate ids from k=2 neighbour rows.
///
/// A row contributes its nearest id when it has fewer than two neighbours,
/// when the second neighbour is the sentinel, or when the nearest id has
/// not been accepted yet. Ids are returned ascending and bounded by
/// `candidate_count`.
///
/// This is one greedy pass, not transitive clustering: a chain of three or
/// more near-duplicates may keep more than one member.
pub fn select_representatives(neighbors: &[Vec<usize>], candidate_count: usize) -> Vec<usize> {
    let mut accepted = BTreeSet::new();

    for row in neighbors {
        let Some(&nearest) = row.first() else {
            continue;
        };
        if row.len() < 2 || row[1] == NO_NEIGHBOR || !accepted.contains(&nearest) {
            accepted.insert(nearest);
        }
    }

    accepted
        .into_iter()
        .filter(|&id| id < candidate_count)
        .collect()
}

fn to_record(entry: RawEntry) -> PaperRecord {
    let source_url = if validate_url(&entry.entry_id) {
        entry.entry_id
    } else {
        DEFAULT_SOURCE_URL.to_string()
    };

    PaperRecord {
        title: sanitize_output(&clean_latex(&entry.title)),
        authors: entry.authors.iter().map(|a| sanitize_output(a)).collect(),
        publication_year: entry.published_year,
        abstract_text: sanitize_output(&clean_latex(&entry.summary)),
        source_url,
        citation_count: 0,
    }
}

/// Searches a literature source and collapses near-duplicate results.
pub struct Retriever<S, E>
where
    S: LiteratureSource,
    E: EmbeddingProvider,
{
    /// Literature source for candidate search
    source: S,

    /// Embedding provider for deduplication
    embedder: E,

    config: RetrievalConfig,
}

impl<S, E> Retriever<S, E>
where
    S: LiteratureSource,
    E: EmbeddingProvider,
{
    /// Create a retriever with the default configuration and an exact L2 index.
    ///
    /// # Arguments
    /// * `source` - Literature source to search
    /// * `embedder` - Provider used to embed candidates for deduplication
    pub fn new(source: S, embedder: E) -> Self {
        Self {
            source,
            embedder,
            config: RetrievalConfig::default(),
        }
    }

    /// Replace the retrieval configuration.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Search for papers in a domain and year range.
    ///
    /// # Arguments
    /// * `domain` - Research domain (raw user input)
    /// * `years` - Year range as `YYYY-YYYY`
    /// * `count` - Maximum number of papers to return (1 to 50)
    ///
    /// # Returns
    /// At most `count` deduplicated, sanitized records in source order
    /// (newest submission first). Fewer results than requested is not an
    /// error.
    ///
    /// # Errors
    /// Returns `RetrievalError::Validation` before any network call if the
    /// input is invalid, otherwise the failing stage's error.
    pub async fn search_papers(
        &self,
        domain: &str,
        years: &str,
        count: i64,
    ) -> RetrievalResult<Vec<PaperRecord>> {
        // 1. Re-validate; nothing leaves this process before this passes
        let params = validate_query(domain, years, count, VALIDATION_TEMPERATURE)?;
        let count = params.paper_count();

        // 2. Fetch candidates with headroom for deduplication losses
        let query = LiteratureQuery::new(
            params.domain(),
            params.year_range(),
            (count * 2).min(MAX_CANDIDATES),
        );
        debug!(
            source = self.source.name(),
            years = %params.year_range(),
            max_results = query.max_results,
            "Searching literature source"
        );

        let entries = self
            .source
            .search(&query)
            .await
            .map_err(|e| RetrievalError::Source(e.to_string()))?;
        let candidate_count = entries.len();

        // 3. Collapse near-duplicates
        let entries = if entries.len() > 1 {
            self.deduplicate(entries, count).await?
        } else {
            entries
        };

        info!(
            source = self.source.name(),
            candidates = candidate_count,
            kept = entries.len(),
            "Retrieved papers"
        );

        // 4. Sanitize every field before records leave the retriever
        Ok(entries.into_iter().map(to_record).collect())
    }

    async fn deduplicate(
        &self,
        entries: Vec<RawEntry>,
        count: usize,
    ) -> RetrievalResult<Vec<RawEntry>> {
        let texts: Vec<String> = entries
            .iter()
            .map(|e| format!("{} {}", e.title, e.summary))
            .collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let mut embeddings = self
            .embedder
            .embed_batch(&text_refs)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if embeddings.len() != entries.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} embeddings, got {}",
                entries.len(),
                embeddings.len()
            )));
        }

        for embedding in embeddings.iter_mut() {
            l2_normalize(embedding);
        }

        let mut index =
            FlatL2Index::new(self.embedder.dimension()).with_tolerance(self.config.duplicate_threshold);
        index
            .add(&embeddings)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        let neighbors = index
            .search(&embeddings, 2)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let keep = select_representatives(&neighbors, entries.len());
        debug!(candidates = entries.len(), representatives = keep.len(), "Deduplicated candidates");

        let mut slots: Vec<Option<RawEntry>> = entries.into_iter().map(Some).collect();
        Ok(keep
            .into_iter()
            .filter_map(|id| slots[id].take())
            .take(count)
            .collect())
    }
}
