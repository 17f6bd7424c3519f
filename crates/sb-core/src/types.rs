//! Core type definitions for ShieldBlock
//!
//! The flag and enum values here are persisted verbatim in snapshot filter
//! records, so their numeric values are part of the format.

use std::ops::AddAssign;

// =============================================================================
// Filter Flags
// =============================================================================

bitflags::bitflags! {
    /// Per-filter flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilterFlags: u8 {
        /// `@@` exception filter
        const EXCEPTION = 1 << 0;
        /// Pattern starts with `|`
        const LEFT_ANCHOR = 1 << 1;
        /// Pattern starts with `||`
        const HOST_ANCHOR = 1 << 2;
        /// Pattern ends with `|`
        const RIGHT_ANCHOR = 1 << 3;
    }
}

impl Default for FilterFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Anchor Types
// =============================================================================

/// Where a pattern is pinned at its start. Also the anchor class used in
/// fragment bucket keys.
///
/// `Left` combined with [`FilterFlags::RIGHT_ANCHOR`] is an exact match of
/// the whole URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum AnchorType {
    #[default]
    None = 0,
    Left = 1,
    Hostname = 2,
}

impl AnchorType {
    pub const ALL: [AnchorType; 3] = [AnchorType::None, AnchorType::Left, AnchorType::Hostname];

    pub fn from_flags(flags: FilterFlags) -> Self {
        if flags.contains(FilterFlags::HOST_ANCHOR) {
            Self::Hostname
        } else if flags.contains(FilterFlags::LEFT_ANCHOR) {
            Self::Left
        } else {
            Self::None
        }
    }
}

impl TryFrom<u8> for AnchorType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Left),
            2 => Ok(Self::Hostname),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask. An empty mask on a filter means "all types".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;
        const DOCUMENT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;
        const OBJECT_SUBREQUEST = 1 << 12;
    }
}

impl Default for ResourceType {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceType {
    /// Map a `$option` name to its type bit.
    pub fn from_option_name(name: &str) -> Option<Self> {
        match name {
            "script" => Some(Self::SCRIPT),
            "image" => Some(Self::IMAGE),
            "stylesheet" => Some(Self::STYLESHEET),
            "object" => Some(Self::OBJECT),
            "object-subrequest" => Some(Self::OBJECT_SUBREQUEST),
            "subdocument" | "sub_frame" => Some(Self::SUBDOCUMENT),
            "document" => Some(Self::DOCUMENT),
            "xmlhttprequest" | "xhr" => Some(Self::XMLHTTPREQUEST),
            "websocket" => Some(Self::WEBSOCKET),
            "font" => Some(Self::FONT),
            "media" => Some(Self::MEDIA),
            "other" => Some(Self::OTHER),
            _ => None,
        }
    }

    /// Parse a request type as reported by a web engine hook.
    /// Unknown names map to `OTHER`.
    pub fn from_request_type(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "main_frame" | "document" => Self::DOCUMENT,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "ping" | "beacon" => Self::PING,
            other => Self::from_option_name(other).unwrap_or(Self::OTHER),
        }
    }

    /// Infer the resource type from an HTTP `Accept` header.
    pub fn from_accept_header(accept: &str) -> Self {
        let accept = accept.to_ascii_lowercase();
        if accept.contains("text/css") {
            Self::STYLESHEET
        } else if accept.contains("image/") {
            Self::IMAGE
        } else if accept.contains("javascript") || accept.contains("ecmascript") {
            Self::SCRIPT
        } else if accept.contains("text/html") {
            Self::SUBDOCUMENT
        } else {
            Self::OTHER
        }
    }
}

// =============================================================================
// Party Scope
// =============================================================================

/// `$third-party` / `$~third-party` scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum PartyScope {
    #[default]
    Any = 0,
    ThirdPartyOnly = 1,
    FirstPartyOnly = 2,
}

impl PartyScope {
    /// `third_party` is `None` when the request party cannot be determined.
    #[inline]
    pub fn allows(self, third_party: Option<bool>) -> bool {
        match (self, third_party) {
            (Self::Any, _) | (_, None) => true,
            (Self::ThirdPartyOnly, Some(tp)) => tp,
            (Self::FirstPartyOnly, Some(tp)) => !tp,
        }
    }
}

impl TryFrom<u8> for PartyScope {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Any),
            1 => Ok(Self::ThirdPartyOnly),
            2 => Ok(Self::FirstPartyOnly),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Match Request
// =============================================================================

/// One outgoing sub-resource request.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Resource type of the request (a single bit)
    pub resource_type: ResourceType,
    /// Host of the page that initiated the request; may be empty
    pub source_domain: &'a str,
}

impl<'a> MatchRequest<'a> {
    pub fn new(url: &'a str, resource_type: ResourceType, source_domain: &'a str) -> Self {
        Self {
            url,
            resource_type,
            source_domain,
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchDecision {
    #[default]
    Allow,
    Block,
}

/// Diagnostic counters collected while matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchingStats {
    /// Indexed lookups (host map or fragment bucket) on the blocking side that produced candidates
    pub num_hash_set_saves: u64,
    /// Same, on the exception side
    pub num_exception_hash_set_saves: u64,
    /// Indexed blocking candidates that failed verification
    pub num_false_positives: u64,
    /// Indexed exception candidates that failed verification
    pub num_exception_false_positives: u64,
}

impl AddAssign for MatchingStats {
    fn add_assign(&mut self, rhs: Self) {
        self.num_hash_set_saves += rhs.num_hash_set_saves;
        self.num_exception_hash_set_saves += rhs.num_exception_hash_set_saves;
        self.num_false_positives += rhs.num_false_positives;
        self.num_exception_false_positives += rhs.num_exception_false_positives;
    }
}

/// Result of matching a request.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub decision: MatchDecision,
    /// Index of the first blocking filter that matched
    pub filter_id: Option<u32>,
    /// Index of the first exception filter that matched
    pub exception_id: Option<u32>,
    pub stats: MatchingStats,
}

impl MatchResult {
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}
