//! Identifier normalization
//!
//! Upstream stores bare identifiers (`1706.03762`, `10.1000/xyz`), while
//! callers tend to paste prefixed or URL forms.

use regex_lite::Regex;
use std::sync::OnceLock;

fn arxiv_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:arxiv:|https?://(?:www\.)?arxiv\.org/(?:abs|pdf)/)")
            .expect("valid arxiv prefix pattern")
    })
}

fn doi_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:doi:|https?://(?:dx\.)?doi\.org/)").expect("valid doi prefix pattern")
    })
}

/// Strip `arXiv:` or arxiv.org URL prefixes
pub fn normalize_arxiv(input: &str) -> String {
    let trimmed = input.trim();
    let bare = arxiv_prefix().replace(trimmed, "");
    bare.trim_end_matches(".pdf").to_string()
}

/// Strip `doi:` or doi.org URL prefixes
pub fn normalize_doi(input: &str) -> String {
    doi_prefix().replace(input.trim(), "").to_string()
}
