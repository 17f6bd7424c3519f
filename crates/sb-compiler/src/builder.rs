use std::collections::HashSet;

use log::debug;
use sb_core::filter::{Filter, PatternToken};
use sb_core::index::{FilterIndex, FilterTable, ParsingStats, Placement};
use sb_core::snapshot::{
    align_offset, header, section_entry, snapshot_crc32, SectionId, TokenOp, HEADER_SIZE,
    SBX_MAGIC, SBX_VERSION, SECTION_ENTRY_SIZE, STATS_SIZE,
};

use crate::parser::{parse_filter_list, ParsedList};

// =============================================================================
// Index Builder
// =============================================================================

/// Accumulates parsed filters and produces a [`FilterIndex`].
///
/// Filters whose normalized form is identical to one already added are
/// dropped and counted as duplicates; the first occurrence keeps its text.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    filters: Vec<Filter>,
    seen: HashSet<Vec<u8>>,
    stats: ParsingStats,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one filter. Returns `false` if it was a duplicate.
    pub fn add_filter(&mut self, filter: Filter) -> bool {
        let mut key = Vec::new();
        encode_filter_fields(&mut key, &filter, "");
        if !self.seen.insert(key) {
            self.stats.num_duplicate_filters += 1;
            return false;
        }
        self.filters.push(filter);
        true
    }

    pub fn add_list(&mut self, list: ParsedList) {
        self.stats.num_cosmetic_filters += list.num_cosmetic;
        self.stats.num_html_filters += list.num_html;
        self.stats.num_unsupported_filters += list.num_unsupported;
        for filter in list.filters {
            self.add_filter(filter);
        }
    }

    /// Parse list text and add it.
    pub fn add_text(&mut self, text: &str) {
        self.add_list(parse_filter_list(text));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn build(self) -> FilterIndex {
        let mut blocking = FilterTable::new();
        let mut exceptions = FilterTable::new();
        let mut stats = self.stats;

        for (id, filter) in self.filters.iter().enumerate() {
            let table = if filter.is_exception() {
                stats.num_exception_filters += 1;
                &mut exceptions
            } else {
                &mut blocking
            };

            match table.insert(id as u32, filter) {
                Placement::HostAnchored => stats.num_host_anchored_filters += 1,
                Placement::Fallback => stats.num_fallback_filters += 1,
                Placement::Bucket => {}
            }
        }
        stats.num_filters = self.filters.len() as u32;

        debug!(
            "Built index: {} filters ({} exceptions, {} host-anchored, {} fallback, {} duplicates)",
            stats.num_filters,
            stats.num_exception_filters,
            stats.num_host_anchored_filters,
            stats.num_fallback_filters,
            stats.num_duplicate_filters
        );

        FilterIndex::from_parts(self.filters, blocking, exceptions, stats)
    }
}

/// Build an index from already parsed filters.
pub fn build_index(filters: &[Filter]) -> FilterIndex {
    let mut builder = IndexBuilder::new();
    for filter in filters {
        builder.add_filter(filter.clone());
    }
    builder.build()
}

/// Parse and index several lists as one filter set.
pub fn compile_filter_lists(lists: &[&str]) -> FilterIndex {
    let mut builder = IndexBuilder::new();
    for text in lists {
        builder.add_text(text);
    }
    builder.build()
}

// =============================================================================
// Snapshot Writer
// =============================================================================

/// Serialize an index as an SBX snapshot.
///
/// The output is a pure function of the index, so equal indexes serialize
/// to identical bytes.
pub fn serialize_index(index: &FilterIndex) -> Vec<u8> {
    let mut sections = [
        SectionData::new(SectionId::Filters, encode_filters_section(&index.filters)),
        SectionData::new(SectionId::BlockingTable, encode_table_section(&index.blocking)),
        SectionData::new(SectionId::ExceptionTable, encode_table_section(&index.exceptions)),
        SectionData::new(SectionId::Stats, encode_stats_section(&index.stats)),
    ];

    let section_count = sections.len();
    let section_dir_offset = HEADER_SIZE;
    let section_dir_bytes = section_count * SECTION_ENTRY_SIZE;
    let mut data_offset = align_offset(section_dir_offset + section_dir_bytes, 4);

    for section in &mut sections {
        section.offset = data_offset;
        data_offset = align_offset(data_offset + section.data.len(), 4);
    }

    let total_size = data_offset;
    let mut buffer = vec![0u8; total_size];

    buffer[header::MAGIC..header::MAGIC + 4].copy_from_slice(&SBX_MAGIC);
    write_u16_le(&mut buffer, header::VERSION, SBX_VERSION);
    write_u16_le(&mut buffer, header::FLAGS, 0);
    write_u32_le(&mut buffer, header::HEADER_BYTES, HEADER_SIZE as u32);
    write_u32_le(&mut buffer, header::SECTION_COUNT, section_count as u32);
    write_u32_le(&mut buffer, header::SECTION_DIR_OFFSET, section_dir_offset as u32);
    write_u32_le(&mut buffer, header::SECTION_DIR_BYTES, section_dir_bytes as u32);
    write_u32_le(&mut buffer, header::TOTAL_BYTES, total_size as u32);

    for (index, section) in sections.iter().enumerate() {
        let entry_offset = section_dir_offset + index * SECTION_ENTRY_SIZE;
        write_u16_le(&mut buffer, entry_offset + section_entry::ID, section.id as u16);
        write_u16_le(&mut buffer, entry_offset + section_entry::FLAGS, 0);
        write_u32_le(&mut buffer, entry_offset + section_entry::OFFSET, section.offset as u32);
        write_u32_le(&mut buffer, entry_offset + section_entry::LENGTH, section.data.len() as u32);

        let end = section.offset + section.data.len();
        buffer[section.offset..end].copy_from_slice(&section.data);
    }

    let crc = snapshot_crc32(&buffer);
    write_u32_le(&mut buffer, header::SNAPSHOT_CRC32, crc);

    debug!(
        "Serialized snapshot: {} bytes, {} filters",
        total_size,
        index.filters.len()
    );

    buffer
}

struct SectionData {
    id: SectionId,
    data: Vec<u8>,
    offset: usize,
}

impl SectionData {
    fn new(id: SectionId, data: Vec<u8>) -> Self {
        Self { id, data, offset: 0 }
    }
}

fn encode_filters_section(filters: &[Filter]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_varint(&mut buf, filters.len() as u32);
    for filter in filters {
        encode_filter_fields(&mut buf, filter, &filter.text);
    }
    buf
}

/// One filter record. `text` is passed separately so the builder can key
/// duplicates on everything but the source text.
fn encode_filter_fields(buf: &mut Vec<u8>, filter: &Filter, text: &str) {
    buf.push(filter.flags.bits());
    buf.push(filter.party as u8);
    buf.extend_from_slice(&filter.resource_types.bits().to_le_bytes());
    encode_str(buf, text);

    match &filter.host_anchor_key {
        Some(host) => {
            buf.push(1);
            encode_str(buf, host);
        }
        None => buf.push(0),
    }

    encode_strings(buf, &filter.domain_include);
    encode_strings(buf, &filter.domain_exclude);

    encode_varint(buf, filter.pattern.len() as u32);
    for token in &filter.pattern {
        match token {
            PatternToken::Literal(lit) => {
                buf.push(TokenOp::Literal as u8);
                encode_str(buf, lit);
            }
            PatternToken::Wildcard => buf.push(TokenOp::Wildcard as u8),
            PatternToken::Separator => buf.push(TokenOp::Separator as u8),
        }
    }
}

fn encode_table_section(table: &FilterTable) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_posting_list(&mut buf, &table.fallback);

    // BTreeMap iteration gives the strictly increasing key order the
    // loader requires.
    encode_varint(&mut buf, table.host_anchored.len() as u32);
    for (key, ids) in &table.host_anchored {
        buf.extend_from_slice(&key.to_le_bytes());
        encode_posting_list(&mut buf, ids);
    }

    encode_varint(&mut buf, table.buckets.len() as u32);
    for ((anchor, hash), ids) in &table.buckets {
        buf.push(*anchor as u8);
        buf.extend_from_slice(&hash.to_le_bytes());
        encode_posting_list(&mut buf, ids);
    }

    buf
}

fn encode_stats_section(stats: &ParsingStats) -> Vec<u8> {
    let values = [
        stats.num_filters,
        stats.num_exception_filters,
        stats.num_host_anchored_filters,
        stats.num_fallback_filters,
        stats.num_cosmetic_filters,
        stats.num_html_filters,
        stats.num_unsupported_filters,
        stats.num_duplicate_filters,
    ];
    let mut buf = Vec::with_capacity(STATS_SIZE);
    for value in values {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    encode_varint(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_strings(buf: &mut Vec<u8>, strings: &[String]) {
    encode_varint(buf, strings.len() as u32);
    for s in strings {
        encode_str(buf, s);
    }
}

fn encode_posting_list(buf: &mut Vec<u8>, filter_ids: &[u32]) {
    encode_varint(buf, filter_ids.len() as u32);
    let mut prev = 0u32;
    for &id in filter_ids {
        encode_varint(buf, id.wrapping_sub(prev));
        prev = id;
    }
}

fn encode_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

fn write_u16_le(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use sb_core::snapshot::{deserialize, SnapshotError};
    use sb_core::types::{MatchRequest, ResourceType};

    use super::*;

    const FOURTEEN_LINES: &str = "[Adblock Plus 2.0]
! Title: comment test list
! This comment should not survive
/banner1.gif
||ads.example.com^
@@||ads.example.com/allowed/
&ad_type=
-ad-banner-
/adserver/*
|https://track.
.swf|
||cdn.example.net^$script,third-party
adv$domain=example.com|~foo.example.com
@@advice.$~script
";

    fn blocks(index: &FilterIndex, url: &str, ty: ResourceType, source: &str) -> bool {
        index.matches(&MatchRequest::new(url, ty, source))
    }

    fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_fourteen_line_list() {
        let index = compile_filter_lists(&[FOURTEEN_LINES]);
        assert_eq!(index.stats.num_filters, 11);
        assert_eq!(index.stats.num_exception_filters, 2);

        let bytes = serialize_index(&index);
        assert!(!contains_bytes(&bytes, b"comment"));
        assert!(!contains_bytes(&bytes, b"Adblock Plus"));
        assert!(contains_bytes(&bytes, b"/banner1.gif"));
    }

    #[test]
    fn test_banner_rule() {
        let index = compile_filter_lists(&["/banner1.gif"]);
        let ty = ResourceType::IMAGE;
        let source = "www.brianbondy.com";
        assert!(blocks(&index, "http://www.brianbondy.com/public/banner1.gif", ty, source));
        assert!(blocks(&index, "http://www.brianbondy.com/public//banner1.gif", ty, source));
        assert!(!blocks(&index, "http://www.brianbondy.com/public/abanner1.gif", ty, source));
    }

    #[test]
    fn test_ytimg_rule_with_redirect_option() {
        let index = compile_filter_lists(&["*/b/ss/*&aqe=$image,redirect=1x1-transparent.gif"]);
        let ty = ResourceType::IMAGE;
        assert!(blocks(
            &index,
            "https://i.ytimg.com/b/ss/hxUAntt1z2c/hqdefault.jpg?a&aqe=$image,redirect=1x1-transparent.gif&dd",
            ty,
            "www.youtube.com"
        ));
        assert!(!blocks(
            &index,
            "https://i.ytimg.com/vi/hxUAntt1z2c/hqdefault.jpg?a&aqe=$image,redirect=1x1-transparent.gif&dd",
            ty,
            "www.youtube.com"
        ));
    }

    #[test]
    fn test_first_party_exception() {
        let index = compile_filter_lists(&[
            "-google-analytics.\n@@||www.scrumpoker.online^$~third-party\n",
        ]);
        let url = "https://www.scrumpoker.online/js/angular-google-analytics.js";
        let ty = ResourceType::SCRIPT;

        let first_party = MatchRequest::new(url, ty, "www.scrumpoker.online");
        let result = index.match_request(&first_party);
        assert!(!result.is_blocked());
        assert!(result.exception_id.is_some());
        assert_eq!(result.stats.num_exception_hash_set_saves, 1);

        assert!(blocks(&index, url, ty, "www.brianbondy.com"));
    }

    #[test]
    fn test_host_anchored_ytimg() {
        let index = compile_filter_lists(&["||s.ytimg.com^"]);
        let ty = ResourceType::IMAGE;
        assert!(blocks(&index, "https://s.ytimg.com/yts/img/logo.png", ty, "youtube.com"));
        assert!(!blocks(&index, "https://i.ytimg.com/vi/x/default.jpg", ty, "youtube.com"));
    }

    #[test]
    fn test_exception_overrides_block() {
        let index = compile_filter_lists(&["/ads/*\n@@/ads/allowed\n"]);
        let ty = ResourceType::SCRIPT;
        assert!(blocks(&index, "http://example.com/ads/track.js", ty, "example.com"));
        assert!(!blocks(&index, "http://example.com/ads/allowed.js", ty, "example.com"));
    }

    #[test]
    fn test_adv_with_advice_exception() {
        let index = compile_filter_lists(&["adv\n@@advice.$~script\n"]);
        assert!(blocks(&index, "http://example.com/adv.js", ResourceType::SCRIPT, ""));
        assert!(!blocks(&index, "http://example.com/advice.html", ResourceType::IMAGE, ""));
        assert!(blocks(&index, "http://example.com/advice.html", ResourceType::SCRIPT, ""));
    }

    #[test]
    fn test_exception_listed_before_block() {
        let index = compile_filter_lists(&["@@advice.\nadv"]);
        let ty = ResourceType::OTHER;
        assert!(blocks(&index, "http://example.com/advert.html", ty, ""));
        assert!(!blocks(&index, "http://example.com/advice.html", ty, ""));
    }

    #[test]
    fn test_many_wildcards_on_long_url() {
        use std::time::{Duration, Instant};

        let index = compile_filter_lists(&["*a*a*a*a*a*b"]);
        let url = format!("http://x.com/{}", "a".repeat(2000));
        let ty = ResourceType::OTHER;

        let start = Instant::now();
        assert!(!blocks(&index, &url, ty, ""));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(blocks(&index, &format!("{url}b"), ty, ""));
    }

    #[test]
    fn test_wildcard_empty_and_separator_lists() {
        let url = "http://example.com/anything";
        let ty = ResourceType::OTHER;
        assert!(blocks(&compile_filter_lists(&["*"]), url, ty, ""));
        assert!(!blocks(&compile_filter_lists(&[""]), url, ty, ""));

        let index = compile_filter_lists(&["^"]);
        assert!(index.is_empty());
        assert!(!blocks(&index, url, ty, ""));
    }

    #[test]
    fn test_collapsed_wildcards() {
        let index = compile_filter_lists(&["a/********b"]);
        let ty = ResourceType::OTHER;
        assert!(blocks(&index, "a/d/e/f/b", ty, ""));
        assert!(blocks(&index, "a/d/e/fb", ty, ""));
        assert!(!blocks(&index, "a/d/e/fd", ty, ""));
        assert!(blocks(&index, "http://x.com/a/foo/bar/b.js", ty, ""));
        assert!(!blocks(&index, "http://x.com/b/a/", ty, ""));
    }

    #[test]
    fn test_host_anchor() {
        let index = compile_filter_lists(&["||example.com^"]);
        let ty = ResourceType::IMAGE;
        assert!(blocks(&index, "http://example.com/x.png", ty, ""));
        assert!(blocks(&index, "https://sub.example.com/", ty, ""));
        assert!(!blocks(&index, "http://badexample.com/", ty, ""));
        assert!(!blocks(&index, "http://example.com.evil.net/", ty, ""));
        assert!(!blocks(&index, "http://other.net/?u=example.com", ty, ""));
        assert_eq!(index.stats.num_host_anchored_filters, 1);
    }

    #[test]
    fn test_mzstatic_image_only() {
        let index = compile_filter_lists(&["||mzstatic.com^$image"]);
        let url = "https://is1-ssl.mzstatic.com/image/thumb/cover.jpg";
        assert!(blocks(&index, url, ResourceType::IMAGE, "apple.com"));
        assert!(!blocks(&index, url, ResourceType::SCRIPT, "apple.com"));
    }

    #[test]
    fn test_third_party_wp_com() {
        let index = compile_filter_lists(&["||s1.wp.com^$third-party"]);
        let url = "https://s1.wp.com/wp-includes/js/jquery.js";
        let ty = ResourceType::SCRIPT;
        assert!(blocks(&index, url, ty, "someblog.net"));
        assert!(!blocks(&index, url, ty, "blog.wp.com"));
    }

    #[test]
    fn test_domain_option() {
        let index = compile_filter_lists(&["adv$domain=example.com|~foo.example.com"]);
        let url = "http://ads.net/adv";
        let ty = ResourceType::SCRIPT;
        assert!(blocks(&index, url, ty, "example.com"));
        assert!(blocks(&index, url, ty, "www.example.com"));
        assert!(!blocks(&index, url, ty, "foo.example.com"));
        assert!(!blocks(&index, url, ty, "other.com"));
    }

    #[test]
    fn test_unsupported_option_not_indexed() {
        let index = compile_filter_lists(&["||example.com^$ping"]);
        assert!(index.is_empty());
        assert_eq!(index.stats.num_unsupported_filters, 1);
    }

    #[test]
    fn test_duplicates_dropped() {
        let index = compile_filter_lists(&[
            "/ads/\n/ads/\nad$domain=a.com|b.com\n",
            "ad$domain=b.com|a.com\n",
        ]);
        assert_eq!(index.stats.num_filters, 2);
        assert_eq!(index.stats.num_duplicate_filters, 2);
        assert_eq!(index.filters[1].text, "ad$domain=a.com|b.com");
    }

    #[test]
    fn test_line_endings_give_identical_snapshots() {
        let lf = serialize_index(&compile_filter_lists(&[FOURTEEN_LINES]));
        let crlf = FOURTEEN_LINES.replace('\n', "\r\n");
        let cr = FOURTEEN_LINES.replace('\n', "\r");
        assert_eq!(lf, serialize_index(&compile_filter_lists(&[&crlf])));
        assert_eq!(lf, serialize_index(&compile_filter_lists(&[&cr])));
    }

    #[test]
    fn test_snapshot_reload_is_identical() {
        let index = compile_filter_lists(&[FOURTEEN_LINES]);
        let bytes = serialize_index(&index);
        let loaded = deserialize(&bytes).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(serialize_index(&loaded), bytes);

        let url = "http://ads.example.com/allowed/x.js";
        let req = MatchRequest::new(url, ResourceType::SCRIPT, "example.com");
        assert_eq!(loaded.match_request(&req).decision, index.match_request(&req).decision);
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let bytes = serialize_index(&compile_filter_lists(&[FOURTEEN_LINES]));

        for len in [0, 10, HEADER_SIZE, bytes.len() / 2, bytes.len() - 1] {
            assert!(deserialize(&bytes[..len]).is_err(), "truncated to {len}");
        }

        let mut flipped = bytes.clone();
        let mid = bytes.len() / 2;
        flipped[mid] ^= 0x40;
        assert!(matches!(deserialize(&flipped), Err(SnapshotError::Crc32Mismatch { .. })));

        let mut extended = bytes;
        extended.push(0);
        assert!(deserialize(&extended).is_err());
    }

    #[test]
    fn test_snapshot_header() {
        let bytes = serialize_index(&FilterIndex::empty());
        assert_eq!(&bytes[..4], b"SBX1");
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]) as usize,
            bytes.len()
        );
        assert!(deserialize(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_encode_varint() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 300);
        encode_varint(&mut buf, 0);
        assert_eq!(buf, vec![0xac, 0x02, 0x00]);
    }
}
