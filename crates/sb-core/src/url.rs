//! URL helpers for the matching hot path
//!
//! Everything here works on byte slices of the original URL string and
//! never builds a parsed URL object.

use crate::hash::hash_token;

// =============================================================================
// Scheme and Host
// =============================================================================

/// Get the position after "://" (or after "data:").
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    // A scheme is letters, digits, '+', '-' or '.'
    if colon_pos == 0
        || !bytes[..colon_pos]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    if bytes[..colon_pos].eq_ignore_ascii_case(b"data") {
        return Some(colon_pos + 1);
    }

    None
}

/// Get the start and end positions of the hostname in a URL.
/// Returns `None` when the URL has no scheme or an empty host.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    let authority_end = bytes[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(bytes.len(), |i| scheme_end + i);

    // Skip userinfo
    let host_start = bytes[scheme_end..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(scheme_end, |i| scheme_end + i + 1);

    let host_end = if bytes.get(host_start) == Some(&b'[') {
        // IPv6 literal keeps its brackets
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b']')
            .map_or(authority_end, |i| host_start + i + 1)
    } else {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b':')
            .map_or(authority_end, |i| host_start + i)
    };

    if host_end <= host_start {
        return None;
    }
    Some((host_start, host_end))
}

/// Host extraction without allocations.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

// =============================================================================
// Separator Check
// =============================================================================

/// Characters matched by the `^` pattern token.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    matches!(c, b'/' | b':' | b'?' | b'=' | b'&')
}

/// `^` also matches the end of the URL.
#[inline]
pub fn is_at_separator(bytes: &[u8], pos: usize) -> bool {
    match bytes.get(pos) {
        Some(&c) => is_separator_char(c),
        None => true,
    }
}

// =============================================================================
// Case-insensitive Search
// =============================================================================

/// Find `needle` in `haystack` starting at `from`, ignoring ASCII case.
pub fn find_case_insensitive(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    if needle.len() > haystack.len() - from {
        return None;
    }

    let first = needle[0].to_ascii_lowercase();
    let last = haystack.len() - needle.len();
    (from..=last).find(|&i| {
        haystack[i].to_ascii_lowercase() == first
            && haystack[i..i + needle.len()].eq_ignore_ascii_case(needle)
    })
}

/// Whether `haystack[pos..]` starts with `needle`, ignoring ASCII case.
#[inline]
pub fn starts_with_ignore_case(haystack: &[u8], pos: usize, needle: &[u8]) -> bool {
    haystack
        .get(pos..pos + needle.len())
        .is_some_and(|window| window.eq_ignore_ascii_case(needle))
}

// =============================================================================
// URL Tokenization
// =============================================================================

/// Shortest alphanumeric run that is used as a fragment key.
pub const MIN_TOKEN_LEN: usize = 3;

/// Iterate the maximal ASCII-alphanumeric runs of `bytes` that are at least
/// [`MIN_TOKEN_LEN`] long, as `(start, end)` pairs.
pub fn alnum_runs(bytes: &[u8]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            while pos < bytes.len() && !bytes[pos].is_ascii_alphanumeric() {
                pos += 1;
            }
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_alphanumeric() {
                pos += 1;
            }
            if pos - start >= MIN_TOKEN_LEN {
                return Some((start, pos));
            }
        }
        None
    })
}

/// Hash every token of the URL. The result is sorted and deduplicated so
/// each bucket is visited once per request.
pub fn tokenize_url(url: &str) -> Vec<u32> {
    let bytes = url.as_bytes();
    let mut tokens: Vec<u32> = alnum_runs(bytes)
        .map(|(start, end)| hash_token(&bytes[start..end]))
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}
