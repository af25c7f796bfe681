//! arXiv search client.
//!
//! Queries the public arXiv API and parses the returned Atom feed.

use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use super::{LiteratureQuery, LiteratureSource, ProviderError, ProviderResult, RawEntry};

/// Default arXiv API endpoint.
pub const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";

/// Error entries in the feed carry ids under this path.
const ERROR_ID_MARKER: &str = "/api/errors";

/// arXiv literature source.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivSource {
    /// Create a client for the public arXiv API.
    pub fn new() -> Self {
        Self::with_api_url(DEFAULT_API_URL)
    }

    /// Create a client for a different endpoint (mirror or test server).
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiteratureSource for ArxivSource {
    async fn search(&self, query: &LiteratureQuery) -> ProviderResult<Vec<RawEntry>> {
        let max_results = query.max_results.to_string();
        let params = [
            ("search_query", query.search_expression()),
            ("start", "0".to_string()),
            ("max_results", max_results),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];

        debug!(max_results = query.max_results, "Querying arXiv");

        let response = self
            .client
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimitExceeded(format!(
                "arXiv returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            // arXiv reports query errors as a feed with a single error entry.
            if let Err(err @ ProviderError::ApiError(_)) = parse_feed(&body) {
                return Err(err);
            }
            return Err(ProviderError::ApiError(format!("arXiv returned {}", status)));
        }

        let mut entries = parse_feed(&body)?;
        entries.truncate(query.max_results);
        debug!(count = entries.len(), "arXiv entries parsed");
        Ok(entries)
    }

    fn name(&self) -> &str {
        "arXiv"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Summary,
    Published,
    Id,
    AuthorName,
}

/// Collapse runs of whitespace, including the line breaks arXiv puts in
/// long titles.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn published_year(published: &str) -> ProviderResult<i32> {
    DateTime::parse_from_rfc3339(published.trim())
        .map(|dt| dt.year())
        .map_err(|e| ProviderError::ParseError(format!("invalid published date: {}", e)))
}

/// Parse an arXiv Atom feed into raw entries in document order.
///
/// # Errors
/// Returns `ProviderError::ApiError` if the feed is an error report and
/// `ProviderError::ParseError` if the XML or a date is malformed.
pub fn parse_feed(xml: &str) -> ProviderResult<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut published = String::new();
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                match local_name.as_ref() {
                    b"entry" => {
                        current = Some(RawEntry::default());
                        published.clear();
                    }
                    b"author" if current.is_some() => in_author = true,
                    name if current.is_some() => {
                        field = match (name, in_author) {
                            (b"name", true) => Some(Field::AuthorName),
                            (b"title", false) => Some(Field::Title),
                            (b"summary", false) => Some(Field::Summary),
                            (b"published", false) => Some(Field::Published),
                            (b"id", false) => Some(Field::Id),
                            _ => None,
                        };
                        buf.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if field.is_some() {
                    let text = e
                        .unescape()
                        .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                    buf.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if field.is_some() {
                    buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(ref e)) => {
                let local_name = e.local_name();
                match local_name.as_ref() {
                    b"entry" => {
                        if let Some(mut entry) = current.take() {
                            if entry.entry_id.contains(ERROR_ID_MARKER) {
                                return Err(ProviderError::ApiError(collapse_whitespace(
                                    &entry.summary,
                                )));
                            }
                            entry.published_year = published_year(&published)?;
                            entries.push(entry);
                        }
                    }
                    b"author" => in_author = false,
                    _ => {
                        if let (Some(f), Some(entry)) = (field.take(), current.as_mut()) {
                            let value = std::mem::take(&mut buf);
                            match f {
                                Field::Title => entry.title = collapse_whitespace(&value),
                                Field::Summary => entry.summary = value,
                                Field::Published => published = value,
                                Field::Id => entry.entry_id = value.trim().to_string(),
                                Field::AuthorName => {
                                    let name = collapse_whitespace(&value);
                                    if !name.is_empty() {
                                        entry.authors.push(name);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(position = reader.buffer_position(), "Malformed arXiv feed");
                return Err(ProviderError::ParseError(e.to_string()));
            }
            _ => {}
        }
    }

    Ok(entries)
}
