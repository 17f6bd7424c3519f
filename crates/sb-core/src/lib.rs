//! ShieldBlock Core Library
//!
//! This crate provides the request matching engine for the ShieldBlock
//! content blocker: the compiled filter model, the candidate index, the
//! matcher, the SBX snapshot loader and the filter list registry.
//!
//! # Architecture
//!
//! Filter lists are compiled (by `sb-compiler`) into a [`FilterIndex`] which
//! can be persisted as an SBX snapshot and loaded back without re-parsing.
//! Each request is reduced to a handful of candidate filters through a host
//! map and fragment buckets before any pattern is verified.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hashes for hosts and tokens, CRC32 for snapshots
//! - `psl`: eTLD+1 heuristics for party detection
//! - `url`: URL helpers without allocations
//! - `types`: Shared flags, requests and results
//! - `filter`: Compiled filters and pattern verification
//! - `index`: Candidate tables
//! - `matcher`: Request matching
//! - `snapshot`: SBX format and loader
//! - `lists`: Filter list registry
//! - `engine`: Published index with atomic swap

pub mod engine;
pub mod filter;
pub mod hash;
pub mod index;
pub mod lists;
pub mod matcher;
pub mod psl;
pub mod snapshot;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use engine::{BuildTicket, Engine, EngineConfig};
pub use filter::{Filter, PatternToken};
pub use hash::{hash64, hash_domain, hash_token, Hash64};
pub use index::{FilterIndex, FilterTable, ParsingStats};
pub use lists::{ListCategory, ListDescriptor, ListError};
pub use matcher::Matcher;
pub use psl::{get_etld1, is_third_party};
pub use snapshot::{deserialize, SnapshotError};
pub use types::{
    AnchorType, FilterFlags, MatchDecision, MatchRequest, MatchResult, MatchingStats, PartyScope,
    ResourceType,
};
