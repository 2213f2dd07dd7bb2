//! Feature-vector contracts and the two extraction collaborators.
//!
//! Each branch produces an ordered, fixed-length vector of 6 numbers. Order
//! is significant and must match the weight layout exactly; values are raw
//! counts or 0/1 indicator flags, never normalized here — the network was
//! trained on raw inputs.
//!
//! Both extractors degrade to an all-zero vector instead of erroring:
//! non-analyzable URL schemes for the lexical branch, fetch failures and
//! timeouts for the page branch. The engine therefore always receives a
//! complete, if degraded, vector.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::patterns::{
    count_matches, ANCHOR_TAG_RE, FORM_TAG_RE, HIDDEN_FORM_RE, INPUT_TAG_RE, PASSWORD_INPUT_RE,
    RANDOM_CHARS_RE, SENSITIVE_INPUT_RE, SPECIAL_CHAR_RE, SUSPICIOUS_KEYWORD_RE,
};

/// Inputs per branch; must equal the topology's declared input width.
pub const FEATURE_WIDTH: usize = 6;

/// Bounded wait for the page fetch before degrading to a zero vector.
const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Schemes the extractor refuses to analyze: browser-internal,
/// extension-internal and local-file pages.
const UNANALYZABLE_SCHEMES: [&str; 4] = ["chrome://", "chrome-extension://", "about:", "file://"];

/// Whether a URL is eligible for analysis at all. Ineligible URLs get the
/// neutral "N/A" treatment rather than a risk verdict.
pub fn is_analyzable(url: &str) -> bool {
    !url.is_empty() && !UNANALYZABLE_SCHEMES.iter().any(|s| url.starts_with(s))
}

// ---------------------------------------------------------------------------
// URL branch
// ---------------------------------------------------------------------------

/// Lexical features of the URL string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlFeatures {
    pub length: u32,
    pub dots: u32,
    pub special_chars: u32,
    pub has_suspicious_keywords: bool,
    pub has_random_chars: bool,
    pub has_excessive_dots: bool,
}

impl UrlFeatures {
    /// Pure lexical extraction. Non-analyzable URLs yield the zero vector.
    pub fn extract(url: &str) -> Self {
        if !is_analyzable(url) {
            debug!(url, "url not analyzable, returning zero features");
            return Self::default();
        }

        let dots = url.matches('.').count() as u32;
        Self {
            length: url.len() as u32,
            dots,
            special_chars: count_matches(url, &SPECIAL_CHAR_RE),
            has_suspicious_keywords: SUSPICIOUS_KEYWORD_RE.is_match(url),
            has_random_chars: RANDOM_CHARS_RE.is_match(url),
            has_excessive_dots: dots > 3,
        }
    }

    /// Network input encoding. Order matches the weight layout.
    pub fn to_vector(&self) -> [f32; FEATURE_WIDTH] {
        [
            self.length as f32,
            self.dots as f32,
            self.special_chars as f32,
            flag(self.has_suspicious_keywords),
            flag(self.has_random_chars),
            flag(self.has_excessive_dots),
        ]
    }
}

// ---------------------------------------------------------------------------
// Page branch
// ---------------------------------------------------------------------------

/// Structural features of the fetched HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PageFeatures {
    pub form_count: u32,
    pub input_count: u32,
    pub link_count: u32,
    pub has_password_field: bool,
    pub has_hidden_forms: bool,
    pub has_sensitive_inputs: bool,
}

impl PageFeatures {
    /// Regex-based extraction over raw HTML. No DOM parse; tag-open patterns
    /// are deliberately tolerant of attribute noise.
    pub fn extract_from_html(html: &str) -> Self {
        Self {
            form_count: count_matches(html, &FORM_TAG_RE),
            input_count: count_matches(html, &INPUT_TAG_RE),
            link_count: count_matches(html, &ANCHOR_TAG_RE),
            has_password_field: PASSWORD_INPUT_RE.is_match(html),
            has_hidden_forms: HIDDEN_FORM_RE.is_match(html),
            has_sensitive_inputs: SENSITIVE_INPUT_RE.is_match(html),
        }
    }

    /// Network input encoding. Order matches the weight layout.
    pub fn to_vector(&self) -> [f32; FEATURE_WIDTH] {
        [
            self.form_count as f32,
            self.input_count as f32,
            self.link_count as f32,
            flag(self.has_password_field),
            flag(self.has_hidden_forms),
            flag(self.has_sensitive_inputs),
        ]
    }
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Fetches pages and extracts [`PageFeatures`].
///
/// The fetch is bounded by a 5-second timeout; timeout or transport failure
/// resolves to the zero vector so the pipeline never aborts on a slow or
/// unreachable page.
pub struct PageProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl PageProbe {
    pub fn new() -> Self {
        Self::with_timeout(PAGE_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Fetch the page and extract its features, degrading to zeros on any
    /// failure.
    pub async fn fetch(&self, url: &str) -> PageFeatures {
        if !is_analyzable(url) {
            debug!(url, "url not analyzable, returning zero page features");
            return PageFeatures::default();
        }

        match self.try_fetch(url).await {
            Ok(html) => PageFeatures::extract_from_html(&html),
            Err(e) => {
                warn!(url, error = %e, "page fetch degraded to zero features");
                PageFeatures::default()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> eyre::Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

impl Default for PageProbe {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Legacy heuristic (migration parity)
// ---------------------------------------------------------------------------

/// The pre-network threshold heuristic, retained for regression parity while
/// the learned path is being validated against it.
///
/// Indicator bonuses fold into the raw counts exactly as the heuristic's
/// feature encoding did: +5 for excessive dots, +5 for random character runs,
/// +3 for suspicious keywords, +2 for hidden forms, +3 for sensitive inputs.
pub fn legacy_heuristic_flag(url: &UrlFeatures, page: &PageFeatures) -> bool {
    let dots = url.dots + if url.has_excessive_dots { 5 } else { 0 };
    let special = url.special_chars
        + if url.has_random_chars { 5 } else { 0 }
        + if url.has_suspicious_keywords { 3 } else { 0 };
    let forms = page.form_count + if page.has_hidden_forms { 2 } else { 0 };
    let inputs = page.input_count + if page.has_sensitive_inputs { 3 } else { 0 };

    url.length > 50
        || dots > 3
        || special > 5
        || forms > 2
        || (inputs > 5 && page.has_password_field)
        || (forms > 0 && page.has_password_field && special > 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_url_features() {
        let f = UrlFeatures::extract("https://example.com");
        assert_eq!(f.length, 19);
        assert_eq!(f.dots, 1);
        assert_eq!(f.special_chars, 3); // ':', '/', '/'
        assert!(!f.has_suspicious_keywords);
        assert!(!f.has_random_chars);
        assert!(!f.has_excessive_dots);
    }

    #[test]
    fn test_suspicious_url_features() {
        let f = UrlFeatures::extract("http://secure.login.verify.account.example.tk/session9871");
        assert!(f.has_suspicious_keywords);
        assert!(f.has_random_chars);
        assert!(f.has_excessive_dots);
        assert!(f.dots > 3);
    }

    #[test]
    fn test_unanalyzable_schemes_yield_zero_vector() {
        for url in [
            "chrome://settings",
            "chrome-extension://abcdef/popup.html",
            "about:blank",
            "file:///etc/passwd",
            "",
        ] {
            let f = UrlFeatures::extract(url);
            assert_eq!(f, UrlFeatures::default(), "expected zeros for {url:?}");
            assert_eq!(f.to_vector(), [0.0; FEATURE_WIDTH]);
        }
    }

    #[test]
    fn test_vector_encodes_flags_as_unit_values() {
        let f = UrlFeatures {
            length: 80,
            dots: 5,
            special_chars: 12,
            has_suspicious_keywords: true,
            has_random_chars: false,
            has_excessive_dots: true,
        };
        assert_eq!(f.to_vector(), [80.0, 5.0, 12.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_page_features_from_html() {
        let html = r#"
            <html><body>
            <form action="/login" style="display: none">
              <input type="text" name="user">
              <input type="password" name="pass">
              <input name="cvv">
            </form>
            <a href="/a">one</a><a href="/b">two</a>
            </body></html>
        "#;
        let f = PageFeatures::extract_from_html(html);
        assert_eq!(f.form_count, 1);
        assert_eq!(f.input_count, 3);
        assert_eq!(f.link_count, 2);
        assert!(f.has_password_field);
        assert!(f.has_hidden_forms);
        assert!(f.has_sensitive_inputs);
        assert_eq!(f.to_vector(), [1.0, 3.0, 2.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_empty_html_is_zero_vector() {
        let f = PageFeatures::extract_from_html("");
        assert_eq!(f, PageFeatures::default());
    }

    #[tokio::test]
    async fn test_probe_degrades_on_unreachable_host() {
        let probe = PageProbe::with_timeout(Duration::from_millis(200));
        let f = probe.fetch("http://127.0.0.1:1/never-listening").await;
        assert_eq!(f, PageFeatures::default());
    }

    #[tokio::test]
    async fn test_probe_skips_unanalyzable_url() {
        let probe = PageProbe::new();
        let f = probe.fetch("chrome://settings").await;
        assert_eq!(f, PageFeatures::default());
    }

    #[test]
    fn test_heuristic_flags_long_url() {
        let url = UrlFeatures {
            length: 120,
            ..Default::default()
        };
        assert!(legacy_heuristic_flag(&url, &PageFeatures::default()));
    }

    #[test]
    fn test_heuristic_flags_password_form_with_special_chars() {
        let url = UrlFeatures {
            length: 30,
            dots: 2,
            special_chars: 4,
            ..Default::default()
        };
        let page = PageFeatures {
            form_count: 1,
            input_count: 2,
            has_password_field: true,
            ..Default::default()
        };
        assert!(legacy_heuristic_flag(&url, &page));
    }

    #[test]
    fn test_heuristic_passes_benign_page() {
        let url = UrlFeatures::extract("https://example.com");
        let page = PageFeatures {
            form_count: 1,
            input_count: 2,
            link_count: 10,
            ..Default::default()
        };
        assert!(!legacy_heuristic_flag(&url, &page));
    }
}
