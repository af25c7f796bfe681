//! Core data models for the review pipeline.
//!
//! This module contains the validated query, the paper records returned by
//! retrieval, and the structured review produced by synthesis.

use serde::{Deserialize, Serialize};

/// Inclusive publication year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    /// Start year (inclusive)
    pub start: i32,

    /// End year (inclusive)
    pub end: i32,
}

impl YearRange {
    /// Create a new year range.
    ///
    /// # Arguments
    /// * `start` - Start year (inclusive)
    /// * `end` - End year (inclusive)
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A validated review request.
///
/// Values of this type only come out of
/// [`validate_query`](crate::validation::validate_query), so holding one means
/// every field already passed screening and range checks.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    domain: String,
    year_range: YearRange,
    paper_count: usize,
    temperature: f32,
}

impl QueryParameters {
    pub(crate) fn new(
        domain: String,
        year_range: YearRange,
        paper_count: usize,
        temperature: f32,
    ) -> Self {
        Self {
            domain,
            year_range,
            paper_count,
            temperature,
        }
    }

    /// Sanitized, trimmed research domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn year_range(&self) -> YearRange {
        self.year_range
    }

    /// The year range in its `YYYY-YYYY` form.
    pub fn years(&self) -> String {
        self.year_range.to_string()
    }

    pub fn paper_count(&self) -> usize {
        self.paper_count
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

/// Metadata for one retrieved paper.
///
/// Text fields are output-sanitized and `source_url` has passed URL
/// validation (or was replaced by the safe default) before a record leaves
/// the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper title
    pub title: String,

    /// Author names in publication order
    pub authors: Vec<String>,

    /// Year of first submission
    #[serde(rename = "year")]
    pub publication_year: i32,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Link to the entry page
    #[serde(rename = "url")]
    pub source_url: String,

    /// Citation count (0 when the source has no citation metric)
    #[serde(rename = "citations")]
    pub citation_count: u32,
}

/// The structured literature review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub overview: String,
    pub key_papers: Vec<PaperRecord>,
    pub trends: String,
    pub challenges: String,
    pub future_directions: String,
}

impl ReviewDocument {
    /// Render the review as a Markdown report.
    pub fn to_markdown(&self, domain: &str) -> String {
        let mut md = format!("# Academic Review for: {domain}\n\n");

        md.push_str("## Overview\n");
        md.push_str(&format!("{}\n\n", self.overview));

        md.push_str("## Key Papers Analyzed\n");
        for paper in &self.key_papers {
            md.push_str(&format!("### {} ({})\n", paper.title, paper.publication_year));
            md.push_str(&format!("- **Authors:** {}\n", paper.authors.join(", ")));
            md.push_str(&format!("- **Citations:** {}\n", paper.citation_count));
            md.push_str(&format!("- **Abstract:** {}\n", paper.abstract_text));
            md.push_str(&format!(
                "- **Link:** [{url}]({url})\n\n",
                url = paper.source_url
            ));
        }

        md.push_str("## Current Trends\n");
        md.push_str(&format!("{}\n\n", self.trends));

        md.push_str("## Major Challenges\n");
        md.push_str(&format!("{}\n\n", self.challenges));

        md.push_str("## Future Directions\n");
        md.push_str(&format!("{}\n", self.future_directions));

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paper() -> PaperRecord {
        PaperRecord {
            title: "Attention Is All You Need".to_string(),
            authors: vec!["Ashish Vaswani".to_string(), "Noam Shazeer".to_string()],
            publication_year: 2017,
            abstract_text: "The dominant sequence transduction models...".to_string(),
            source_url: "http://arxiv.org/abs/1706.03762v7".to_string(),
            citation_count: 0,
        }
    }

    #[test]
    fn test_year_range() {
        let range = YearRange::new(2020, 2023);
        assert_eq!(range.to_string(), "2020-2023");
    }

    #[test]
    fn test_paper_record_wire_names() {
        let value = serde_json::to_value(sample_paper()).unwrap();
        assert_eq!(value["year"], 2017);
        assert_eq!(value["abstract"], "The dominant sequence transduction models...");
        assert_eq!(value["url"], "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(value["citations"], 0);
        assert!(value.get("publication_year").is_none());
    }

    #[test]
    fn test_markdown_report_sections() {
        let review = ReviewDocument {
            overview: "Transformers everywhere.".to_string(),
            key_papers: vec![sample_paper()],
            trends: "Scaling.".to_string(),
            challenges: "Compute.".to_string(),
            future_directions: "Efficiency.".to_string(),
        };

        let md = review.to_markdown("Large Language Models");
        assert!(md.starts_with("# Academic Review for: Large Language Models\n"));
        assert!(md.contains("## Overview\nTransformers everywhere."));
        assert!(md.contains("### Attention Is All You Need (2017)"));
        assert!(md.contains("- **Authors:** Ashish Vaswani, Noam Shazeer"));
        assert!(md.contains(
            "- **Link:** [http://arxiv.org/abs/1706.03762v7](http://arxiv.org/abs/1706.03762v7)"
        ));
        assert!(md.contains("## Current Trends\nScaling."));
        assert!(md.contains("## Major Challenges\nCompute."));
        assert!(md.ends_with("## Future Directions\nEfficiency.\n"));
    }
}
