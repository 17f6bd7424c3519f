//! SBX Snapshot Loader
//!
//! Decodes a snapshot buffer into an owned [`FilterIndex`]. Every read is
//! bounds-checked; a buffer that fails any check is rejected as a whole.

use std::collections::BTreeMap;

use log::debug;

use super::format::*;
use crate::filter::{Filter, PatternToken};
use crate::hash::{crc32_finish, crc32_update, CRC32_INIT};
use crate::index::{FilterIndex, FilterTable, ParsingStats};
use crate::types::{AnchorType, FilterFlags, PartyScope, ResourceType};

/// Error type for snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Data too short")]
    DataTooShort,
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("CRC32 mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Missing section: {0:#06x}")]
    MissingSection(u16),
    #[error("Invalid section: {0}")]
    InvalidSection(String),
}

/// Section metadata.
#[derive(Debug, Clone, Copy)]
pub struct SectionInfo {
    pub id: SectionId,
    pub offset: usize,
    pub length: usize,
}

/// CRC32 of a snapshot buffer, skipping the CRC field.
pub fn snapshot_crc32(data: &[u8]) -> u32 {
    let crc_end = header::SNAPSHOT_CRC32 + 4;
    let crc = crc32_update(CRC32_INIT, &data[..header::SNAPSHOT_CRC32.min(data.len())]);
    let crc = crc32_update(crc, data.get(crc_end..).unwrap_or(&[]));
    crc32_finish(crc)
}

/// Decode a snapshot into a [`FilterIndex`].
pub fn deserialize(data: &[u8]) -> Result<FilterIndex, SnapshotError> {
    let sections = read_sections(data)?;
    let section = |id| section_bytes(data, &sections, id);

    let filters = decode_filters(section(SectionId::Filters)?)?;
    let filter_count = filters.len() as u32;
    let blocking = decode_table(section(SectionId::BlockingTable)?, filter_count, "blocking table")?;
    let exceptions =
        decode_table(section(SectionId::ExceptionTable)?, filter_count, "exception table")?;
    let stats = decode_stats(section(SectionId::Stats)?)?;

    debug!(
        "Loaded snapshot: {} bytes, {} filters ({} exceptions)",
        data.len(),
        filters.len(),
        stats.num_exception_filters
    );

    Ok(FilterIndex::from_parts(filters, blocking, exceptions, stats))
}

fn section_bytes<'a>(
    data: &'a [u8],
    sections: &BTreeMap<SectionId, SectionInfo>,
    id: SectionId,
) -> Result<&'a [u8], SnapshotError> {
    sections
        .get(&id)
        .map(|info| &data[info.offset..info.offset + info.length])
        .ok_or(SnapshotError::MissingSection(id as u16))
}

/// Validate the header and CRC, then parse the section directory.
pub fn read_sections(data: &[u8]) -> Result<BTreeMap<SectionId, SectionInfo>, SnapshotError> {
    if data.len() < HEADER_SIZE {
        return Err(SnapshotError::DataTooShort);
    }

    // Validate magic
    if !validate_magic(data) {
        return Err(SnapshotError::InvalidMagic);
    }

    let header_u16 = |offset| read_u16_le(data, offset).ok_or(SnapshotError::DataTooShort);
    let header_u32 =
        |offset| Ok::<_, SnapshotError>(read_u32_le(data, offset).ok_or(SnapshotError::DataTooShort)? as usize);

    let version = header_u16(header::VERSION)?;
    if version != SBX_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    if header_u32(header::HEADER_BYTES)? != HEADER_SIZE {
        return Err(SnapshotError::InvalidSection("header size".to_string()));
    }

    let total_bytes = header_u32(header::TOTAL_BYTES)?;
    if total_bytes > data.len() {
        return Err(SnapshotError::DataTooShort);
    }
    if total_bytes < data.len() {
        return Err(SnapshotError::InvalidSection("trailing bytes after snapshot".to_string()));
    }

    let stored = read_u32_le(data, header::SNAPSHOT_CRC32).ok_or(SnapshotError::DataTooShort)?;
    let computed = snapshot_crc32(data);
    if stored != computed {
        return Err(SnapshotError::Crc32Mismatch { stored, computed });
    }

    let section_count = header_u32(header::SECTION_COUNT)?;
    let dir_offset = header_u32(header::SECTION_DIR_OFFSET)?;
    let dir_bytes = header_u32(header::SECTION_DIR_BYTES)?;
    if section_count.checked_mul(SECTION_ENTRY_SIZE) != Some(dir_bytes) {
        return Err(SnapshotError::InvalidSection("directory size".to_string()));
    }
    if dir_offset.checked_add(dir_bytes).map_or(true, |end| end > data.len()) {
        return Err(SnapshotError::DataTooShort);
    }

    let mut sections = BTreeMap::new();
    for i in 0..section_count {
        let entry = dir_offset + i * SECTION_ENTRY_SIZE;
        let field_u32 = |field| {
            read_u32_le(data, entry + field)
                .map(|v| v as usize)
                .ok_or(SnapshotError::DataTooShort)
        };

        let id_raw = read_u16_le(data, entry + section_entry::ID).ok_or(SnapshotError::DataTooShort)?;
        let Ok(id) = SectionId::try_from(id_raw) else {
            continue; // Skip unknown sections
        };

        let offset = field_u32(section_entry::OFFSET)?;
        let length = field_u32(section_entry::LENGTH)?;
        if offset.checked_add(length).map_or(true, |end| end > data.len()) {
            return Err(SnapshotError::InvalidSection(format!(
                "section {id_raw:#06x} out of bounds"
            )));
        }

        if sections.insert(id, SectionInfo { id, offset, length }).is_some() {
            return Err(SnapshotError::InvalidSection(format!(
                "duplicate section {id_raw:#06x}"
            )));
        }
    }

    Ok(sections)
}

// =============================================================================
// Section Reader
// =============================================================================

/// Bounds-checked cursor over one section.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], section: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            section,
        }
    }

    fn invalid(&self, what: &str) -> SnapshotError {
        SnapshotError::InvalidSection(format!("{}: {} at byte {}", self.section, what, self.pos))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.invalid("truncated"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        let lo = self.u32()? as u64;
        let hi = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }

    /// Unsigned LEB128, at most five bytes.
    fn varint(&mut self) -> Result<u32, SnapshotError> {
        let mut result: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.u8()?;
            let bits = (byte & 0x7f) as u32;
            if shift == 28 && bits > 0x0f {
                return Err(self.invalid("varint overflow"));
            }
            result |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(self.invalid("varint overflow"))
    }

    fn str(&mut self) -> Result<&'a str, SnapshotError> {
        let len = self.varint()? as usize;
        let bytes = self.bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| self.invalid("invalid UTF-8"))
    }

    fn strings(&mut self) -> Result<Vec<String>, SnapshotError> {
        let count = self.varint()?;
        (0..count).map(|_| self.str().map(str::to_string)).collect()
    }

    /// Delta-encoded posting list; every id must be below `limit`.
    fn posting_list(&mut self, limit: u32) -> Result<Vec<u32>, SnapshotError> {
        let count = self.varint()? as usize;
        let mut ids = Vec::with_capacity(count.min(self.data.len()));
        let mut prev: u32 = 0;
        for _ in 0..count {
            let delta = self.varint()?;
            let id = prev
                .checked_add(delta)
                .filter(|&id| id < limit)
                .ok_or_else(|| self.invalid("filter id out of range"))?;
            ids.push(id);
            prev = id;
        }
        Ok(ids)
    }

    fn finish(&self) -> Result<(), SnapshotError> {
        if self.pos != self.data.len() {
            return Err(self.invalid("trailing bytes"));
        }
        Ok(())
    }
}

// =============================================================================
// Section Decoders
// =============================================================================

fn decode_filters(data: &[u8]) -> Result<Vec<Filter>, SnapshotError> {
    let mut r = Reader::new(data, "filters");
    let count = r.varint()? as usize;
    let mut filters = Vec::with_capacity(count.min(data.len()));
    for _ in 0..count {
        filters.push(decode_filter(&mut r)?);
    }
    r.finish()?;
    Ok(filters)
}

fn decode_filter(r: &mut Reader<'_>) -> Result<Filter, SnapshotError> {
    let flags = FilterFlags::from_bits(r.u8()?).ok_or_else(|| r.invalid("unknown filter flags"))?;
    let party = PartyScope::try_from(r.u8()?).map_err(|_| r.invalid("unknown party scope"))?;
    let resource_types =
        ResourceType::from_bits(r.u32()?).ok_or_else(|| r.invalid("unknown resource type"))?;
    let text = r.str()?.to_string();

    let host_anchor_key = match r.u8()? {
        0 => None,
        1 => Some(r.str()?.to_string()),
        _ => return Err(r.invalid("bad host key marker")),
    };

    let domain_include = r.strings()?;
    let domain_exclude = r.strings()?;

    let token_count = r.varint()? as usize;
    let mut pattern = Vec::with_capacity(token_count.min(r.data.len()));
    for _ in 0..token_count {
        let token = match TokenOp::try_from(r.u8()?) {
            Ok(TokenOp::Literal) => PatternToken::Literal(r.str()?.to_string()),
            Ok(TokenOp::Wildcard) => PatternToken::Wildcard,
            Ok(TokenOp::Separator) => PatternToken::Separator,
            Err(()) => return Err(r.invalid("unknown pattern opcode")),
        };
        pattern.push(token);
    }

    Ok(Filter {
        text,
        pattern,
        flags,
        resource_types,
        party,
        domain_include,
        domain_exclude,
        host_anchor_key,
    })
}

fn decode_table(
    data: &[u8],
    filter_count: u32,
    section: &'static str,
) -> Result<FilterTable, SnapshotError> {
    let mut r = Reader::new(data, section);
    let mut table = FilterTable::new();

    table.fallback = r.posting_list(filter_count)?;

    let host_count = r.varint()?;
    let mut prev_key: Option<u64> = None;
    for _ in 0..host_count {
        let key = r.u64()?;
        if prev_key.is_some_and(|prev| key <= prev) {
            return Err(r.invalid("host keys out of order"));
        }
        prev_key = Some(key);
        let ids = r.posting_list(filter_count)?;
        table.host_anchored.insert(key, ids);
    }

    let bucket_count = r.varint()?;
    let mut prev_bucket: Option<(AnchorType, u32)> = None;
    for _ in 0..bucket_count {
        let anchor = AnchorType::try_from(r.u8()?).map_err(|_| r.invalid("unknown anchor"))?;
        let key = (anchor, r.u32()?);
        if prev_bucket.is_some_and(|prev| key <= prev) {
            return Err(r.invalid("bucket keys out of order"));
        }
        prev_bucket = Some(key);
        let ids = r.posting_list(filter_count)?;
        table.buckets.insert(key, ids);
    }

    r.finish()?;
    Ok(table)
}

fn decode_stats(data: &[u8]) -> Result<ParsingStats, SnapshotError> {
    if data.len() != STATS_SIZE {
        return Err(SnapshotError::InvalidSection(format!(
            "stats: expected {STATS_SIZE} bytes, found {}",
            data.len()
        )));
    }
    let mut r = Reader::new(data, "stats");
    Ok(ParsingStats {
        num_filters: r.u32()?,
        num_exception_filters: r.u32()?,
        num_host_anchored_filters: r.u32()?,
        num_fallback_filters: r.u32()?,
        num_cosmetic_filters: r.u32()?,
        num_html_filters: r.u32()?,
        num_unsupported_filters: r.u32()?,
        num_duplicate_filters: r.u32()?,
    })
}
