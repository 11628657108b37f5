//! URL and text canonicalization shared by every provider adapter.
//!
//! All functions here are total: unparsable input yields an empty string or
//! an empty collection, never an error.

use crate::models::TextSpan;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static BARE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("bare domain regex is valid")
});

static EMBEDDED_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\b")
        .expect("embedded domain regex is valid")
});

/// Lowercase a host and strip one leading `www.`.
pub fn canonical_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// `https://www.Example.com/a?b=1` -> `example.com`. Empty on parse failure.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(canonical_host))
        .unwrap_or_default()
}

/// Same scheme, host and path with query and fragment removed.
/// Empty on parse failure.
pub fn clean_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => String::new(),
    }
}

/// Bidirectional containment after canonicalization, so subdomains match
/// in either direction. A target given as a full URL is reduced to its host.
pub fn domain_matches(domain: &str, target: &str) -> bool {
    let domain = canonical_host(domain);
    let target = if target.contains("://") {
        extract_domain(target)
    } else {
        canonical_host(target)
    };
    if domain.is_empty() || target.is_empty() {
        return false;
    }
    domain.contains(&target) || target.contains(&domain)
}

/// Same site on label boundaries: equal, or one is a subdomain of the other.
pub fn same_site(domain: &str, target: &str) -> bool {
    let domain = canonical_host(domain);
    let target = if target.contains("://") {
        extract_domain(target)
    } else {
        canonical_host(target)
    };
    if domain.is_empty() || target.is_empty() {
        return false;
    }
    domain == target
        || domain.ends_with(&format!(".{target}"))
        || target.ends_with(&format!(".{domain}"))
}

/// True when `host` equals an entry of `list` or is a subdomain of one.
pub fn host_on_list(host: &str, list: &[&str]) -> bool {
    let host = canonical_host(host);
    list.iter()
        .any(|entry| host == *entry || host.ends_with(&format!(".{entry}")))
}

/// Non-overlapping, case-insensitive occurrences of `needle` in `haystack`.
pub fn count_case_insensitive(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .to_lowercase()
        .matches(&needle.to_lowercase())
        .count()
}

/// Substring by character (not byte) offsets, clamped to the text.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}

/// One span per occurrence of `marker`, widened by `window` characters on
/// each side and clamped to the text. Offsets are character offsets.
pub fn marker_spans(text: &str, marker: &str, window: usize) -> Vec<TextSpan> {
    if marker.is_empty() {
        return Vec::new();
    }
    let total = text.chars().count();
    let marker_len = marker.chars().count();

    text.match_indices(marker)
        .map(|(byte_idx, _)| {
            let at = text[..byte_idx].chars().count();
            let start = at.saturating_sub(window);
            let end = (at + marker_len + window).min(total);
            TextSpan {
                start,
                end,
                text: char_slice(text, start, end),
                confidence: None,
            }
        })
        .collect()
}

/// Whole-string match against a domain shape such as `news.example.co.uk`.
pub fn looks_like_domain(value: &str) -> bool {
    BARE_DOMAIN.is_match(value.trim())
}

/// First domain-shaped substring in free text, canonicalized.
pub fn find_domain_in_text(value: &str) -> Option<String> {
    EMBEDDED_DOMAIN
        .find(value)
        .map(|m| canonical_host(m.as_str()))
}
