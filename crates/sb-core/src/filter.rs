//! Compiled filter records
//!
//! A [`Filter`] is one network rule after parsing: a token pattern, anchor
//! flags and the `$option` constraints. Filters are immutable once built and
//! are shared by the index, the snapshot writer and the matcher.

use crate::psl::walk_host_suffixes;
use crate::types::{AnchorType, FilterFlags, PartyScope, ResourceType};
use crate::url::{
    alnum_runs, find_case_insensitive, is_separator_char, starts_with_ignore_case,
};

// =============================================================================
// Pattern Tokens
// =============================================================================

/// One element of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternToken {
    /// ASCII-lowercased literal bytes
    Literal(String),
    /// `*`: zero or more characters
    Wildcard,
    /// `^`: one separator character, or the end of the URL
    Separator,
}

// =============================================================================
// Filter
// =============================================================================

/// A compiled network filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    /// Source rule text, kept for diagnostics
    pub text: String,
    pub pattern: Vec<PatternToken>,
    pub flags: FilterFlags,
    /// Empty means every resource type
    pub resource_types: ResourceType,
    pub party: PartyScope,
    /// Lowercased `$domain=` entries
    pub domain_include: Vec<String>,
    /// Lowercased `$domain=~` entries
    pub domain_exclude: Vec<String>,
    /// Lowercased host for `||host^` and `||host/` rules
    pub host_anchor_key: Option<String>,
}

impl Filter {
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.flags.contains(FilterFlags::EXCEPTION)
    }

    #[inline]
    pub fn anchor(&self) -> AnchorType {
        AnchorType::from_flags(self.flags)
    }

    /// Longest literal alphanumeric run that is guaranteed to appear as a
    /// whole URL token in any matching URL. Leftmost wins on ties.
    ///
    /// A run qualifies only if it is at least three characters long and both
    /// of its neighbours are known to be non-alphanumeric: a punctuation byte
    /// in the same literal, a `^` token, or an anchored pattern edge. A run
    /// touching a `*` or an unanchored edge could be part of a longer URL
    /// token and is skipped.
    pub fn fragment(&self) -> Option<&str> {
        let last = self.pattern.len().checked_sub(1)?;
        let mut best: Option<&str> = None;

        for (i, token) in self.pattern.iter().enumerate() {
            let PatternToken::Literal(lit) = token else {
                continue;
            };

            let left_bounded = if i == 0 {
                self.flags
                    .intersects(FilterFlags::LEFT_ANCHOR | FilterFlags::HOST_ANCHOR)
            } else {
                self.pattern[i - 1] == PatternToken::Separator
            };
            let right_bounded = if i == last {
                self.flags.contains(FilterFlags::RIGHT_ANCHOR)
            } else {
                self.pattern[i + 1] == PatternToken::Separator
            };

            for (start, end) in alnum_runs(lit.as_bytes()) {
                if (start == 0 && !left_bounded) || (end == lit.len() && !right_bounded) {
                    continue;
                }
                if best.map_or(true, |b| end - start > b.len()) {
                    best = Some(&lit[start..end]);
                }
            }
        }

        best
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check the pattern against a URL. `host` is the byte range of the URL
    /// host, if it has one.
    pub fn matches_url(&self, url: &str, host: Option<(usize, usize)>) -> bool {
        let bytes = url.as_bytes();
        let right = self.flags.contains(FilterFlags::RIGHT_ANCHOR);

        let mut m = PatternMatch::new(&self.pattern, bytes, right);

        if self.flags.contains(FilterFlags::HOST_ANCHOR) {
            let Some((host_start, host_end)) = host else {
                return false;
            };
            if m.at(&self.pattern, host_start) {
                return true;
            }
            return (host_start..host_end)
                .filter(|&i| bytes[i] == b'.')
                .any(|i| m.at(&self.pattern, i + 1));
        }

        if self.flags.contains(FilterFlags::LEFT_ANCHOR) {
            return m.at(&self.pattern, 0);
        }

        m.anywhere(&self.pattern, 0)
    }

    /// Check `$option` constraints. `third_party` is `None` when the
    /// request party is unknown.
    pub fn matches_options(
        &self,
        resource_type: ResourceType,
        third_party: Option<bool>,
        source_domain: &str,
    ) -> bool {
        (self.resource_types.is_empty() || self.resource_types.intersects(resource_type))
            && self.party.allows(third_party)
            && self.matches_domain(source_domain)
    }

    /// `$domain=` check. The most specific listed suffix of the source host
    /// decides; a source outside both lists passes only filters without an
    /// include list.
    pub fn matches_domain(&self, source_domain: &str) -> bool {
        if self.domain_include.is_empty() && self.domain_exclude.is_empty() {
            return true;
        }

        let listed = |list: &[String], suffix: &str| {
            list.iter().any(|d| d.eq_ignore_ascii_case(suffix))
        };

        for suffix in walk_host_suffixes(source_domain) {
            if listed(&self.domain_exclude, suffix) {
                return false;
            }
            if listed(&self.domain_include, suffix) {
                return true;
            }
        }

        self.domain_include.is_empty()
    }
}

// =============================================================================
// Pattern Matching
// =============================================================================

/// One pattern check against one URL.
///
/// `anywhere(rest, from)` fails for every `from' >= from` once it fails for
/// `from`, so each pattern suffix keeps the lowest start known to fail.
/// Later searches for that suffix stop at it, which keeps patterns with many
/// wildcards linear in the URL length per suffix.
struct PatternMatch<'a> {
    url: &'a [u8],
    right_anchor: bool,
    /// Indexed by suffix length; empty when the pattern has fewer than two
    /// wildcards
    dead_from: Vec<usize>,
}

impl<'a> PatternMatch<'a> {
    fn new(pattern: &[PatternToken], url: &'a [u8], right_anchor: bool) -> Self {
        let wildcards = pattern
            .iter()
            .filter(|t| matches!(t, PatternToken::Wildcard))
            .count();
        let dead_from = if wildcards >= 2 {
            vec![usize::MAX; pattern.len() + 1]
        } else {
            Vec::new()
        };
        Self {
            url,
            right_anchor,
            dead_from,
        }
    }

    /// Match `tokens` starting exactly at `pos`.
    fn at(&mut self, tokens: &[PatternToken], pos: usize) -> bool {
        let Some((token, rest)) = tokens.split_first() else {
            return !self.right_anchor || pos == self.url.len();
        };

        match token {
            PatternToken::Literal(lit) => {
                starts_with_ignore_case(self.url, pos, lit.as_bytes())
                    && self.at(rest, pos + lit.len())
            }
            PatternToken::Separator => match self.url.get(pos) {
                None => self.at(rest, pos),
                Some(&c) if is_separator_char(c) => self.at(rest, pos + 1),
                Some(_) => false,
            },
            PatternToken::Wildcard => self.anywhere(rest, pos),
        }
    }

    /// Match `tokens` starting at any position at or after `from`.
    fn anywhere(&mut self, tokens: &[PatternToken], from: usize) -> bool {
        // A trailing wildcard swallows the rest, whatever the right anchor
        let Some(first) = tokens.first() else {
            return true;
        };

        let floor = self.dead_from.get(tokens.len()).copied().unwrap_or(usize::MAX);
        if from >= floor {
            return false;
        }
        let end = floor.min(self.url.len() + 1);

        let found = match first {
            PatternToken::Literal(lit) => {
                let url = self.url;
                let mut from = from;
                loop {
                    match find_case_insensitive(url, lit.as_bytes(), from) {
                        Some(i) if i < end => {
                            if self.at(tokens, i) {
                                break true;
                            }
                            from = i + 1;
                        }
                        _ => break false,
                    }
                }
            }
            _ => (from..end).any(|p| self.at(tokens, p)),
        };

        if !found {
            if let Some(slot) = self.dead_from.get_mut(tokens.len()) {
                *slot = from;
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::get_host_position;

    fn lit(s: &str) -> PatternToken {
        PatternToken::Literal(s.to_string())
    }

    fn filter(pattern: Vec<PatternToken>, flags: FilterFlags) -> Filter {
        Filter {
            pattern,
            flags,
            ..Filter::default()
        }
    }

    fn matches(f: &Filter, url: &str) -> bool {
        f.matches_url(url, get_host_position(url))
    }

    #[test]
    fn test_plain_substring() {
        let f = filter(vec![lit("/banner1.gif")], FilterFlags::empty());
        assert!(matches(&f, "http://www.brianbondy.com/public/banner1.gif"));
        assert!(matches(&f, "http://www.brianbondy.com/public//banner1.gif"));
        assert!(!matches(&f, "http://www.brianbondy.com/public/abanner1.gif"));
    }

    #[test]
    fn test_collapsed_wildcards() {
        let f = filter(vec![lit("a/"), PatternToken::Wildcard, lit("b")], FilterFlags::empty());
        assert!(matches(&f, "a/d/e/f/b"));
        assert!(matches(&f, "a/d/e/fb"));
        assert!(!matches(&f, "a/d/e/fd"));
    }

    #[test]
    fn test_lone_wildcard_matches_everything() {
        let f = filter(vec![PatternToken::Wildcard], FilterFlags::empty());
        assert!(matches(&f, "http://example.com/"));
        assert!(matches(&f, ""));
    }

    #[test]
    fn test_many_wildcards_stay_linear() {
        use std::time::{Duration, Instant};

        let mut pattern = Vec::new();
        for _ in 0..5 {
            pattern.push(PatternToken::Wildcard);
            pattern.push(lit("a"));
        }
        pattern.push(PatternToken::Wildcard);
        pattern.push(lit("b"));
        let f = filter(pattern, FilterFlags::empty());

        let url = format!("http://x.com/{}", "a".repeat(2000));
        let start = Instant::now();
        assert!(!matches(&f, &url));
        assert!(start.elapsed() < Duration::from_secs(5));

        assert!(matches(&f, &format!("{url}b")));
        assert!(!matches(&f, "http://x.com/aaaab"));
    }

    #[test]
    fn test_many_wildcards_with_anchors() {
        let pattern = vec![
            lit("ads"),
            PatternToken::Wildcard,
            lit("/"),
            PatternToken::Wildcard,
            lit(".js"),
        ];
        let f = filter(pattern.clone(), FilterFlags::HOST_ANCHOR | FilterFlags::RIGHT_ANCHOR);
        assert!(matches(&f, "http://cdn.ads.example.com/x/y.js"));
        assert!(!matches(&f, "http://cdn.ads.example.com/x/y.js?v=1"));
        assert!(!matches(&f, "http://cdn.example.com/ads/y.js"));

        let f = filter(pattern, FilterFlags::LEFT_ANCHOR);
        assert!(!matches(&f, "http://ads.example.com/y.js"));
        assert!(matches(&f, "ads.example.com/a.js/b.js"));
    }

    #[test]
    fn test_separator() {
        let f = filter(
            vec![PatternToken::Separator, lit("example.com"), PatternToken::Separator],
            FilterFlags::empty(),
        );
        assert!(matches(&f, "http://example.com/"));
        assert!(matches(&f, "http://example.com"));
        assert!(matches(&f, "http://example.com:8000/"));
        assert!(!matches(&f, "http://example.com.ar/"));
        assert!(!matches(&f, "http://wwwexample.com/"));
    }

    #[test]
    fn test_separator_encoded_literal() {
        let f = filter(
            vec![PatternToken::Separator, lit("%d1%82%d0%b5%d1%81%d1%82"), PatternToken::Separator],
            FilterFlags::empty(),
        );
        assert!(matches(&f, "http://xn--e1aybc.xn--p1ai/%D1%82%D0%B5%D1%81%D1%82/"));
        assert!(!matches(&f, "http://xn--e1aybc.xn--p1ai/%D1%82%D0%B5%D1%81%D1%82a"));
    }

    #[test]
    fn test_left_and_right_anchor() {
        let exact = filter(
            vec![lit("http://example.com/")],
            FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR,
        );
        assert!(matches(&exact, "http://example.com/"));
        assert!(!matches(&exact, "http://example.com/foo.gif"));
        assert!(!matches(&exact, "https://info.example.com/"));

        let right = filter(vec![lit("swf")], FilterFlags::RIGHT_ANCHOR);
        assert!(matches(&right, "http://example.com/annoyingflash.swf"));
        assert!(!matches(&right, "http://example.com/swf/index.html"));

        let left = filter(vec![lit("http://baddomain.example/")], FilterFlags::LEFT_ANCHOR);
        assert!(matches(&left, "http://baddomain.example/banner.gif"));
        assert!(!matches(&left, "http://gooddomain.example/analyze?http://baddomain.example"));
    }

    #[test]
    fn test_host_anchor() {
        let f = filter(
            vec![lit("ads.example.com"), PatternToken::Separator],
            FilterFlags::HOST_ANCHOR,
        );
        assert!(matches(&f, "http://ads.example.com/foo.gif"));
        assert!(matches(&f, "http://server1.ads.example.com/foo.gif"));
        assert!(matches(&f, "https://ads.example.com:8000/"));
        assert!(!matches(&f, "http://ads.example.com.ua/foo.gif"));
        assert!(!matches(&f, "http://example.com/redirect/http://ads.example.com/"));
        assert!(!f.matches_url("ads.example.com/", None));
    }

    #[test]
    fn test_host_anchor_with_path() {
        let f = filter(vec![lit("example.com/banner.gif")], FilterFlags::HOST_ANCHOR);
        assert!(matches(&f, "http://example.com/banner.gif"));
        assert!(matches(&f, "https://example.com/banner.gif"));
        assert!(matches(&f, "http://www.example.com/banner.gif"));
        assert!(!matches(&f, "http://badexample.com/banner.gif"));
        assert!(!matches(&f, "http://gooddomain.example/analyze?http://example.com/banner.gif"));
    }

    #[test]
    fn test_literals_ignore_case() {
        let f = filter(vec![lit("-google-analytics.")], FilterFlags::empty());
        assert!(matches(&f, "https://www.scrumpoker.online/js/angular-Google-Analytics.js"));
    }

    #[test]
    fn test_fragment_requires_bounded_run() {
        // "banner1" is bounded by '/' and '.'
        let f = filter(vec![lit("/banner1.gif")], FilterFlags::empty());
        assert_eq!(f.fragment(), Some("banner1"));

        // Unanchored edges and wildcards disqualify a run
        let f = filter(vec![lit("adv")], FilterFlags::empty());
        assert_eq!(f.fragment(), None);
        let f = filter(
            vec![PatternToken::Wildcard, lit("/b/ss/"), PatternToken::Wildcard, lit("&aqe=")],
            FilterFlags::empty(),
        );
        assert_eq!(f.fragment(), None);

        // Anchored edges and separators bound a run
        let f = filter(vec![lit("swf")], FilterFlags::RIGHT_ANCHOR);
        assert_eq!(f.fragment(), None);
        let f = filter(vec![lit(".swf")], FilterFlags::RIGHT_ANCHOR);
        assert_eq!(f.fragment(), Some("swf"));
        let f = filter(
            vec![lit("doubleclick.net"), PatternToken::Separator],
            FilterFlags::HOST_ANCHOR,
        );
        assert_eq!(f.fragment(), Some("doubleclick"));
    }

    #[test]
    fn test_fragment_leftmost_on_ties() {
        let f = filter(vec![lit("/abc/def/")], FilterFlags::empty());
        assert_eq!(f.fragment(), Some("abc"));
    }

    fn domain_filter(include: &[&str], exclude: &[&str]) -> Filter {
        Filter {
            pattern: vec![lit("adv")],
            domain_include: include.iter().map(|s| s.to_string()).collect(),
            domain_exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Filter::default()
        }
    }

    #[test]
    fn test_domain_include() {
        let f = domain_filter(&["example.com", "example.net"], &[]);
        assert!(f.matches_domain("example.net"));
        assert!(f.matches_domain("www.example.net"));
        assert!(f.matches_domain("my.subdomain.example.com"));
        assert!(!f.matches_domain("badexample.com"));
        assert!(!f.matches_domain("otherdomain.net"));
        assert!(!f.matches_domain(""));
    }

    #[test]
    fn test_domain_most_specific_wins() {
        let f = domain_filter(&["example.com"], &["foo.example.com"]);
        assert!(f.matches_domain("example.com"));
        assert!(!f.matches_domain("foo.example.com"));
        assert!(!f.matches_domain("www.foo.example.com"));

        let f = domain_filter(&["foo.example.com"], &["example.com"]);
        assert!(!f.matches_domain("example.com"));
        assert!(f.matches_domain("foo.example.com"));
        assert!(f.matches_domain("www.foo.example.com"));
    }

    #[test]
    fn test_domain_exclude_only() {
        let f = domain_filter(&[], &["example.com", "example.net"]);
        assert!(!f.matches_domain("example.net"));
        assert!(!f.matches_domain("my.subdomain.example.com"));
        assert!(f.matches_domain("badexample.com"));
        assert!(f.matches_domain("otherdomain.net"));
        assert!(f.matches_domain(""));
    }

    #[test]
    fn test_options_type_and_party() {
        let f = Filter {
            pattern: vec![lit("s1.wp.com"), PatternToken::Separator],
            flags: FilterFlags::HOST_ANCHOR,
            resource_types: ResourceType::SUBDOCUMENT,
            party: PartyScope::ThirdPartyOnly,
            ..Filter::default()
        };
        assert!(!f.matches_options(ResourceType::SCRIPT, Some(true), "windsorstar.com"));
        assert!(f.matches_options(ResourceType::SUBDOCUMENT, Some(true), "windsorstar.com"));
        assert!(!f.matches_options(ResourceType::SUBDOCUMENT, Some(false), "wp.com"));
    }
}
