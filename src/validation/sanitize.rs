//! HTML escaping for inbound text and idempotent sanitization for outbound text.

use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script block pattern is valid")
});

static IFRAME_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<iframe[^>]*>.*?</iframe>").expect("iframe block pattern is valid")
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)on\w+\s*=\s*["'][^"']*["']"#).expect("event handler pattern is valid")
});

static PSEUDO_PROTOCOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:javascript|vbscript):[^"'>\s]*"#).expect("pseudo-protocol pattern is valid")
});

/// Matches a character reference at the start of the haystack.
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("entity pattern is valid")
});

/// Escape the five HTML metacharacters, including quotes.
///
/// Applied to user input after injection screening. Not idempotent: an
/// ampersand is always escaped.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape `<`, `>` and any `&` that does not already begin a character
/// reference, so a second pass leaves the text unchanged.
fn escape_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        match ch {
            '&' if ENTITY.is_match(&text[idx..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn strip_active_content(text: &str) -> String {
    let mut current = text.to_string();
    // Removal can splice two fragments into a new match; repeat until stable.
    loop {
        let next = SCRIPT_BLOCK.replace_all(&current, "");
        let next = IFRAME_BLOCK.replace_all(&next, "");
        let next = EVENT_HANDLER.replace_all(&next, "");
        let next = PSEUDO_PROTOCOL.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Make text safe to hand to a renderer.
///
/// Removes complete `<script>`/`<iframe>` blocks with their content, inline
/// event-handler attributes and `javascript:`/`vbscript:` URIs, then escapes
/// markup characters. Existing character references are preserved, which
/// makes the function idempotent.
pub fn sanitize_output(text: &str) -> String {
    escape_output(&strip_active_content(text))
}

/// Sanitize a non-text value through its string form.
pub fn sanitize_display<T: Display + ?Sized>(value: &T) -> String {
    sanitize_output(&value.to_string())
}
