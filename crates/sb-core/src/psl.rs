//! Registrable-domain (eTLD+1) heuristics
//!
//! Party detection only needs to know whether two hosts belong to the same
//! site, so a small table of common two-part public suffixes is enough.
//!
//! # Examples
//!
//! ```
//! use sb_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part public suffixes.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk", "com.ua", "com.tr",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a hostname, as a suffix slice
/// of the input. A trailing dot is dropped.
pub fn get_etld1(host: &str) -> &str {
    let host = host.strip_suffix('.').unwrap_or(host);

    let mut dots = host.rmatch_indices('.').map(|(i, _)| i);
    if dots.next().is_none() {
        return host;
    }
    let Some(second) = dots.next() else {
        return host;
    };

    let last_two = &host[second + 1..];
    if COMMON_TWO_PART_TLDS
        .iter()
        .any(|tld| tld.eq_ignore_ascii_case(last_two))
    {
        return match dots.next() {
            Some(third) => &host[third + 1..],
            None => host,
        };
    }

    last_two
}

/// Check if two hosts share the same eTLD+1.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    get_etld1(host1).eq_ignore_ascii_case(get_etld1(host2))
}

/// Party of a request. `None` when the source is unknown.
pub fn is_third_party(source_host: &str, req_host: &str) -> Option<bool> {
    if source_host.is_empty() || req_host.is_empty() {
        return None;
    }
    Some(!is_same_site(source_host, req_host))
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over every dot-suffix of a host, most specific first.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific:
/// `a.b.com`, `b.com`, `com`.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.strip_suffix('.').unwrap_or(host);
    HostSuffixIter {
        current: (!host.is_empty()).then_some(host),
    }
}
