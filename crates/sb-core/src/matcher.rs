//! Core Matching Engine
//!
//! This is the hot path - every request goes through here.
//! Candidates come from the host map, the fragment buckets and the fallback
//! list, in that order; each is verified against the request before it
//! counts. Exceptions are only consulted once a blocking filter matched.

use crate::filter::Filter;
use crate::hash::hash_domain;
use crate::index::{FilterIndex, FilterTable};
use crate::psl::{is_third_party, walk_host_suffixes};
use crate::types::{AnchorType, MatchDecision, MatchRequest, MatchResult, ResourceType};
use crate::url::{get_host_position, tokenize_url};

// =============================================================================
// Request Parts
// =============================================================================

/// Everything derived from a request once, before candidate lookup.
struct RequestParts<'r> {
    url: &'r str,
    host_range: Option<(usize, usize)>,
    host: &'r str,
    resource_type: ResourceType,
    source_domain: &'r str,
    third_party: Option<bool>,
    tokens: Vec<u32>,
}

impl<'r> RequestParts<'r> {
    fn new(req: &MatchRequest<'r>) -> Self {
        let host_range = get_host_position(req.url);
        let host = host_range.map_or("", |(start, end)| &req.url[start..end]);
        Self {
            url: req.url,
            host_range,
            host,
            resource_type: req.resource_type,
            source_domain: req.source_domain,
            third_party: is_third_party(req.source_domain, host),
            tokens: tokenize_url(req.url),
        }
    }
}

/// Per-side lookup counters.
#[derive(Default)]
struct SideStats {
    saves: u64,
    false_positives: u64,
}

// =============================================================================
// Matcher
// =============================================================================

/// Evaluates requests against a [`FilterIndex`].
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    index: &'a FilterIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a FilterIndex) -> Self {
        Self { index }
    }

    /// Match a request and return the decision with diagnostics.
    pub fn match_request(&self, req: &MatchRequest<'_>) -> MatchResult {
        let parts = RequestParts::new(req);
        let mut result = MatchResult::default();

        let mut block_stats = SideStats::default();
        result.filter_id = self.first_match(&self.index.blocking, &parts, &mut block_stats);
        result.stats.num_hash_set_saves = block_stats.saves;
        result.stats.num_false_positives = block_stats.false_positives;

        if result.filter_id.is_none() {
            return result;
        }

        let mut exception_stats = SideStats::default();
        result.exception_id = self.first_match(&self.index.exceptions, &parts, &mut exception_stats);
        result.stats.num_exception_hash_set_saves = exception_stats.saves;
        result.stats.num_exception_false_positives = exception_stats.false_positives;

        if result.exception_id.is_none() {
            result.decision = MatchDecision::Block;
        }
        result
    }

    /// Whether the request should be blocked.
    #[inline]
    pub fn matches(&self, req: &MatchRequest<'_>) -> bool {
        self.match_request(req).is_blocked()
    }

    /// First matching blocking filter and first matching exception filter.
    /// Unlike [`Matcher::match_request`] both sides are always evaluated.
    pub fn find_matching_filters(
        &self,
        req: &MatchRequest<'_>,
    ) -> (Option<&'a Filter>, Option<&'a Filter>) {
        let parts = RequestParts::new(req);
        let mut stats = SideStats::default();
        let blocking = self
            .first_match(&self.index.blocking, &parts, &mut stats)
            .and_then(|id| self.index.filter(id));
        let exception = self
            .first_match(&self.index.exceptions, &parts, &mut stats)
            .and_then(|id| self.index.filter(id));
        (blocking, exception)
    }

    fn first_match(
        &self,
        table: &FilterTable,
        parts: &RequestParts<'_>,
        stats: &mut SideStats,
    ) -> Option<u32> {
        // Step 1: host-anchored filters, most specific host suffix first
        for suffix in walk_host_suffixes(parts.host) {
            let ids = table.host_candidates(hash_domain(suffix).to_u64());
            if let Some(id) = self.verify_indexed(ids, parts, stats) {
                return Some(id);
            }
        }

        // Step 2: fragment buckets for every URL token
        for &token in &parts.tokens {
            for anchor in AnchorType::ALL {
                let ids = table.bucket_candidates(anchor, token);
                if let Some(id) = self.verify_indexed(ids, parts, stats) {
                    return Some(id);
                }
            }
        }

        // Step 3: fallback list
        table
            .fallback
            .iter()
            .copied()
            .find(|&id| self.verify(id, parts))
    }

    fn verify_indexed(
        &self,
        ids: &[u32],
        parts: &RequestParts<'_>,
        stats: &mut SideStats,
    ) -> Option<u32> {
        if ids.is_empty() {
            return None;
        }
        stats.saves += 1;

        for &id in ids {
            if self.verify(id, parts) {
                return Some(id);
            }
            stats.false_positives += 1;
        }
        None
    }

    #[inline]
    fn verify(&self, id: u32, parts: &RequestParts<'_>) -> bool {
        self.index.filter(id).is_some_and(|filter| {
            filter.matches_options(parts.resource_type, parts.third_party, parts.source_domain)
                && filter.matches_url(parts.url, parts.host_range)
        })
    }
}

impl FilterIndex {
    /// Shorthand for [`Matcher::matches`].
    pub fn matches(&self, req: &MatchRequest<'_>) -> bool {
        Matcher::new(self).matches(req)
    }

    /// Shorthand for [`Matcher::match_request`].
    pub fn match_request(&self, req: &MatchRequest<'_>) -> MatchResult {
        Matcher::new(self).match_request(req)
    }
}
