// src/urls/validator.rs
// =============================================================================
// Static rules deciding whether a URL (or a facet value) is worth probing.
//
// Three checks:
// - is_valid: does the string parse as a URL with a scheme and a host?
// - should_skip: does it look like a document, a fragment, a query string,
//   or a private area of the site (/admin/, /api/)?
// - normalize: make sure the URL ends with exactly one trailing slash
//
// The skip patterns are compiled once, the first time they are used.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

// Patterns for things we never want in a sitemap
const SKIP_PATTERNS: [&str; 5] = [
    r"\.(pdf|doc|docx|xls|xlsx|zip|rar)$",
    r"#.*$",
    r"\?.*$",
    r"/admin/",
    r"/api/",
];

static SKIP_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SKIP_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("skip pattern is a valid regex"))
        .collect()
});

/// Returns true when the string parses as a URL with a non-empty scheme
/// and a non-empty host.
pub fn is_valid(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            !parsed.scheme().is_empty() && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Returns true when the string matches any of the skip patterns.
///
/// Works on whole URLs as well as on single facet values.
pub fn should_skip(value: &str) -> bool {
    SKIP_REGEXES.iter().any(|re| re.is_match(value))
}

/// Appends a trailing `/` unless the URL already has one.
pub fn normalize(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
