//! Paper Review - structured literature reviews from a research-domain query.
//!
//! This library provides the backend pipeline that turns a user-supplied
//! domain, year range and paper count into a structured review: validated
//! input, deduplicated paper records and a model-written summary.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **validation**: Injection screening, escaping, range checks and output sanitization
//! - **models**: Core data structures (QueryParameters, PaperRecord, ReviewDocument)
//! - **embedding**: Text embedding generation (local FastEmbed or OpenAI)
//! - **index**: Nearest-neighbour search over embeddings
//! - **provider**: Literature sources (arXiv)
//! - **retrieval**: Search, deduplication and record sanitization
//! - **generation**: Streaming chat-completion clients
//! - **synthesis**: Prompting and coercion of model output into a review
//! - **config**: Environment-driven settings
//!
//! # Workflow
//!
//! 1. Validate the raw request; any violation stops the run before network access
//! 2. Search arXiv for up to twice the requested count
//! 3. Embed title and abstract of each candidate and collapse near-duplicates
//! 4. Sanitize the surviving records
//! 5. Prompt the selected model and collect its streamed answer
//! 6. Parse the answer into a review, or fall back to a degraded review
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_review::{
//!     embedding::fastembed::FastEmbedProvider,
//!     generation::{openai_compat::OpenAiCompatClient, ModelChoice},
//!     provider::arxiv::ArxivSource,
//!     retrieval::Retriever,
//!     synthesis::Synthesizer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let retriever = Retriever::new(ArxivSource::new(), FastEmbedProvider::new(None, None)?);
//!     let papers = retriever.search_papers("quantum computing", "2020-2024", 5).await?;
//!
//!     let client = OpenAiCompatClient::for_model(ModelChoice::DeepSeek, api_key, None)?;
//!     let synthesizer = Synthesizer::new().with_generator(ModelChoice::DeepSeek, Arc::new(client));
//!     let review = synthesizer
//!         .generate_review(&papers, "quantum computing", 0.7, ModelChoice::DeepSeek)
//!         .await?;
//!
//!     println!("{}", review.to_markdown("quantum computing"));
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod models;
pub mod provider;
pub mod retrieval;
pub mod synthesis;
pub mod validation;

// Re-export commonly used types at the crate root
pub use config::Settings;
pub use embedding::EmbeddingProvider;
pub use generation::{ModelChoice, TextGenerator};
pub use index::SimilarityIndex;
pub use models::{PaperRecord, QueryParameters, ReviewDocument, YearRange};
pub use provider::LiteratureSource;
pub use retrieval::{RetrievalError, Retriever};
pub use synthesis::{SynthesisError, Synthesizer};
pub use validation::{validate_query, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Embedding dimension of the default local model
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
