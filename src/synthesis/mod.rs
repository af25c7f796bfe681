//! Review synthesis.
//!
//! The [`Synthesizer`] prompts a language model with the retrieved papers and
//! coerces its free-text answer into a [`ReviewDocument`]. Once the model
//! call succeeds a review is always produced: output that cannot be parsed
//! becomes a degraded document carrying the raw (sanitized) response.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::normalize_text;
use crate::generation::{GenerationRequest, ModelChoice, TextGenerator};
use crate::models::{PaperRecord, ReviewDocument};
use crate::validation::{
    sanitize_output, validate_domain, validate_paper_count, validate_temperature, ValidationError,
};

/// Characters of each abstract included in the prompt.
pub const PROMPT_ABSTRACT_CHARS: usize = 200;

/// Number of input papers carried into a degraded review.
pub const DEGRADED_KEY_PAPERS: usize = 3;

const DEGRADED_PREFIX: &str =
    "Error: The model did not return a valid JSON object. Below is the raw response from the model:\n\n---\n\n";

/// Errors that can occur during synthesis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Domain, temperature or paper count failed re-validation
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// No generator is configured for the requested model
    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    /// The generation service failed
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Callback receiving each response fragment as it arrives.
pub type FragmentObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Turns retrieved papers into a structured review.
#[derive(Default)]
pub struct Synthesizer {
    generators: BTreeMap<ModelChoice, Arc<dyn TextGenerator>>,
    observer: Option<FragmentObserver>,
}

impl Synthesizer {
    /// Create a synthesizer with no models configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the generator serving `choice`.
    pub fn with_generator(mut self, choice: ModelChoice, generator: Arc<dyn TextGenerator>) -> Self {
        self.generators.insert(choice, generator);
        self
    }

    /// Observe response fragments, e.g. to echo them while the model writes.
    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Models that have a generator registered.
    pub fn available_models(&self) -> Vec<ModelChoice> {
        self.generators.keys().copied().collect()
    }

    /// Generate a review of `papers` in `domain`.
    ///
    /// # Arguments
    /// * `papers` - Records from the retriever, in display order (1 to 50)
    /// * `domain` - Research domain (re-validated here)
    /// * `temperature` - Sampling temperature (re-validated here)
    /// * `model` - Which registered generator to use
    ///
    /// # Returns
    /// The parsed review, or a degraded review if the response is not a
    /// valid JSON review object.
    ///
    /// # Errors
    /// Returns `SynthesisError::Validation` before any model call if the
    /// domain or temperature is invalid or `papers` is empty or oversized, `ModelUnavailable` if no generator
    /// is registered for `model`, and `Generation` if the service fails.
    pub async fn generate_review(
        &self,
        papers: &[PaperRecord],
        domain: &str,
        temperature: f64,
        model: ModelChoice,
    ) -> SynthesisResult<ReviewDocument> {
        let domain = validate_domain(domain)?;
        let temperature = validate_temperature(temperature)?;
        validate_paper_count(i64::try_from(papers.len()).unwrap_or(i64::MAX))?;

        let generator = self
            .generators
            .get(&model)
            .ok_or_else(|| SynthesisError::ModelUnavailable(model.to_string()))?;

        let prompt = build_prompt(papers, &domain);
        let request = GenerationRequest::new(prompt, temperature);
        debug!(model = generator.model_name(), papers = papers.len(), "Requesting review");

        let mut fragments = generator
            .stream(&request)
            .await
            .map_err(|e| SynthesisError::Generation(e.to_string()))?;

        let mut response = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.map_err(|e| SynthesisError::Generation(e.to_string()))?;
            if let Some(observer) = &self.observer {
                observer(&fragment);
            }
            response.push_str(&fragment);
        }

        let response = sanitize_output(&response);
        info!(
            model = generator.model_name(),
            response_chars = response.chars().count(),
            "Model response received"
        );

        Ok(parse_review(&response, papers).unwrap_or_else(|| {
            warn!("Model response is not a valid review object; returning degraded review");
            degraded_review(&response, papers)
        }))
    }
}

/// JSON schema of the review object, as shown to the model.
pub fn review_schema() -> serde_json::Value {
    let text = |title: &str| json!({ "title": title, "type": "string" });

    json!({
        "$defs": {
            "Paper": {
                "properties": {
                    "title": text("Title"),
                    "authors": { "items": { "type": "string" }, "title": "Authors", "type": "array" },
                    "year": { "title": "Year", "type": "integer" },
                    "abstract": text("Abstract"),
                    "url": text("Url"),
                    "citations": { "title": "Citations", "type": "integer" }
                },
                "required": ["title", "authors", "year", "abstract", "url", "citations"],
                "title": "Paper",
                "type": "object"
            }
        },
        "properties": {
            "overview": text("Overview"),
            "key_papers": { "items": { "$ref": "#/$defs/Paper" }, "title": "Key Papers", "type": "array" },
            "trends": text("Trends"),
            "challenges": text("Challenges"),
            "future_directions": text("Future Directions")
        },
        "required": ["overview", "key_papers", "trends", "challenges", "future_directions"],
        "title": "ReviewDocument",
        "type": "object"
    })
}

/// Build the review prompt.
///
/// Every paper field and the domain pass through output sanitization again,
/// so records from any source are safe to embed.
pub fn build_prompt(papers: &[PaperRecord], domain: &str) -> String {
    let mut papers_str = String::new();
    for (i, paper) in papers.iter().enumerate() {
        let authors: Vec<String> = paper.authors.iter().map(|a| sanitize_output(a)).collect();
        let abstract_head: String = paper.abstract_text.chars().take(PROMPT_ABSTRACT_CHARS).collect();

        papers_str.push_str(&format!(
            "{}. {} ({}) - Citations: {}\n",
            i + 1,
            sanitize_output(&paper.title),
            paper.publication_year,
            paper.citation_count
        ));
        papers_str.push_str(&format!(
            "Authors: {}\nAbstract: {}...\n",
            authors.join(", "),
            sanitize_output(&abstract_head)
        ));
    }

    let schema = serde_json::to_string_pretty(&review_schema()).unwrap_or_default();

    format!(
        r#"Please generate a structured review based on the following papers in the '{domain}' field.

Your entire response MUST be a single, valid JSON object. Do not add any text, comments, or explanations before or after the JSON object.

The JSON object must conform to the following schema:
{schema}

Instructions for the content inside the JSON:
1.  The text for "overview", "trends", "challenges", and "future_directions" should be written in clear, readable Markdown.
2.  The "key_papers" analysis should be based on the papers provided below.
3.  Ensure all fields in the schema are present in your JSON output.

Available papers:
{papers_str}
Now, generate the JSON response:"#,
        domain = sanitize_output(domain),
    )
}

/// The span from the first `{` to the last `}`, if the last follows the
/// first.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a sanitized response into a review.
///
/// Text fields are sanitized again because JSON escapes can decode to
/// markup. Key papers are replaced by the matching input record (compared by
/// normalized title); entries with no match are dropped.
fn parse_review(response: &str, papers: &[PaperRecord]) -> Option<ReviewDocument> {
    let candidate = extract_json(response)?;
    let parsed: ReviewDocument = match serde_json::from_str(candidate) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Review object did not parse");
            return None;
        }
    };

    let mut key_papers: Vec<PaperRecord> = Vec::new();
    for claimed in &parsed.key_papers {
        let wanted = normalize_text(&sanitize_output(&claimed.title));
        let matched = papers
            .iter()
            .find(|p| normalize_text(&p.title) == wanted);
        match matched {
            Some(paper) if !key_papers.contains(paper) => key_papers.push(paper.clone()),
            Some(_) => {}
            None => debug!("Dropping key paper not present in the retrieved set"),
        }
    }

    Some(ReviewDocument {
        overview: sanitize_output(&parsed.overview),
        key_papers,
        trends: sanitize_output(&parsed.trends),
        challenges: sanitize_output(&parsed.challenges),
        future_directions: sanitize_output(&parsed.future_directions),
    })
}

/// The review returned when the response cannot be structured.
pub fn degraded_review(response: &str, papers: &[PaperRecord]) -> ReviewDocument {
    ReviewDocument {
        overview: format!("{}{}", DEGRADED_PREFIX, sanitize_output(response)),
        key_papers: papers.iter().take(DEGRADED_KEY_PAPERS).cloned().collect(),
        trends: String::new(),
        challenges: String::new(),
        future_directions: String::new(),
    }
}
