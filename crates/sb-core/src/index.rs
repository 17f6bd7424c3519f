//! Compiled filter index
//!
//! Filters live in one vector; blocking and exception filters each get a
//! [`FilterTable`] of posting lists (filter ids) keyed three ways:
//!
//! - host map: `||host^` rules keyed by the 64-bit hash of the host
//! - fragment buckets: `(anchor class, token hash)` of the filter fragment
//! - fallback: rules with neither, always candidates
//!
//! All maps are `BTreeMap`s so iteration order, and therefore the snapshot
//! bytes, depend only on the input.

use std::collections::BTreeMap;

use crate::filter::Filter;
use crate::hash::{hash_domain, hash_token};
use crate::types::AnchorType;

// =============================================================================
// Parsing Stats
// =============================================================================

/// Counters collected while parsing and building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsingStats {
    /// Stored network filters, blocking and exception
    pub num_filters: u32,
    pub num_exception_filters: u32,
    pub num_host_anchored_filters: u32,
    pub num_fallback_filters: u32,
    /// Element hiding lines, counted and dropped
    pub num_cosmetic_filters: u32,
    /// `$$` HTML filter lines, counted and dropped
    pub num_html_filters: u32,
    /// Rules with options a request matcher cannot enforce
    pub num_unsupported_filters: u32,
    pub num_duplicate_filters: u32,
}

// =============================================================================
// Filter Table
// =============================================================================

/// Where a filter was placed in a [`FilterTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    HostAnchored,
    Bucket,
    Fallback,
}

/// Candidate lookup structure for one side (blocking or exception).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterTable {
    /// `(anchor class, fragment hash)` -> filter ids
    pub buckets: BTreeMap<(AnchorType, u32), Vec<u32>>,
    /// Host hash -> filter ids
    pub host_anchored: BTreeMap<u64, Vec<u32>>,
    /// Filters without a usable key
    pub fallback: Vec<u32>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a filter. Ids must be inserted in increasing order.
    pub fn insert(&mut self, id: u32, filter: &Filter) -> Placement {
        if let Some(host) = &filter.host_anchor_key {
            self.host_anchored
                .entry(hash_domain(host).to_u64())
                .or_default()
                .push(id);
            return Placement::HostAnchored;
        }

        match filter.fragment() {
            Some(fragment) => {
                self.buckets
                    .entry((filter.anchor(), hash_token(fragment.as_bytes())))
                    .or_default()
                    .push(id);
                Placement::Bucket
            }
            None => {
                self.fallback.push(id);
                Placement::Fallback
            }
        }
    }

    /// Total number of filter ids held.
    pub fn len(&self) -> usize {
        self.fallback.len()
            + self.buckets.values().map(Vec::len).sum::<usize>()
            + self.host_anchored.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn host_candidates(&self, host_hash: u64) -> &[u32] {
        self.host_anchored.get(&host_hash).map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub fn bucket_candidates(&self, anchor: AnchorType, token: u32) -> &[u32] {
        self.buckets.get(&(anchor, token)).map_or(&[], Vec::as_slice)
    }
}

// =============================================================================
// Filter Index
// =============================================================================

/// The queryable, immutable result of a build or a snapshot load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterIndex {
    pub filters: Vec<Filter>,
    pub blocking: FilterTable,
    pub exceptions: FilterTable,
    pub stats: ParsingStats,
}

impl FilterIndex {
    /// An index with no filters. Matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(
        filters: Vec<Filter>,
        blocking: FilterTable,
        exceptions: FilterTable,
        stats: ParsingStats,
    ) -> Self {
        Self {
            filters,
            blocking,
            exceptions,
            stats,
        }
    }

    #[inline]
    pub fn filter(&self, id: u32) -> Option<&Filter> {
        self.filters.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[inline]
    pub fn table(&self, exception: bool) -> &FilterTable {
        if exception {
            &self.exceptions
        } else {
            &self.blocking
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::PatternToken;
    use crate::types::FilterFlags;

    fn lit(s: &str) -> PatternToken {
        PatternToken::Literal(s.to_string())
    }

    #[test]
    fn test_insert_placements() {
        let mut table = FilterTable::new();

        let host = Filter {
            pattern: vec![lit("ads.example.com"), PatternToken::Separator],
            flags: FilterFlags::HOST_ANCHOR,
            host_anchor_key: Some("ads.example.com".to_string()),
            ..Filter::default()
        };
        let bucketed = Filter {
            pattern: vec![lit("/banner1.gif")],
            ..Filter::default()
        };
        let fallback = Filter {
            pattern: vec![PatternToken::Wildcard],
            ..Filter::default()
        };

        assert_eq!(table.insert(0, &host), Placement::HostAnchored);
        assert_eq!(table.insert(1, &bucketed), Placement::Bucket);
        assert_eq!(table.insert(2, &fallback), Placement::Fallback);

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.host_candidates(hash_domain("ADS.example.com").to_u64()),
            &[0]
        );
        assert_eq!(
            table.bucket_candidates(AnchorType::None, hash_token(b"banner1")),
            &[1]
        );
        assert!(table.bucket_candidates(AnchorType::Left, hash_token(b"banner1")).is_empty());
        assert_eq!(table.fallback, vec![2]);
    }

    #[test]
    fn test_empty_index() {
        let index = FilterIndex::empty();
        assert!(index.is_empty());
        assert!(index.blocking.is_empty());
        assert!(index.filter(0).is_none());
    }
}
