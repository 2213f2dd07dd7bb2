//! Pre-compiled regex patterns for URL and page feature extraction.

use regex::Regex;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// URL patterns
// ---------------------------------------------------------------------------

/// Characters outside [a-zA-Z0-9.] count as "special" for the lexical branch.
pub static SPECIAL_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.]").unwrap());

/// Long digit runs or long alphanumeric runs, typical of generated
/// phishing hostnames and tokens.
pub static RANDOM_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4,}|[a-zA-Z0-9]{10,}").unwrap());

/// Keywords phishing URLs use to imitate legitimate flows.
pub static SUSPICIOUS_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(secure|login|account|verify|update|password)").unwrap());

// ---------------------------------------------------------------------------
// Page structure patterns
// ---------------------------------------------------------------------------

pub static FORM_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<form[^>]*>").unwrap());

pub static INPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<input[^>]*>").unwrap());

pub static ANCHOR_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<a[^>]*>").unwrap());

pub static PASSWORD_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<input[^>]*type=["']password["'][^>]*>"#).unwrap());

/// Forms hidden via inline style — a strong credential-harvesting signal.
pub static HIDDEN_FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<form[^>]*style=["'][^"']*display:\s*none"#).unwrap());

/// Inputs named after payment or identity data.
pub static SENSITIVE_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<input[^>]*name=["'](card|cvv|ssn)["'][^>]*>"#).unwrap());

/// Count non-overlapping matches of a pattern in `text`.
pub fn count_matches(text: &str, re: &Regex) -> u32 {
    re.find_iter(text).count() as u32
}
