//! SBX Snapshot Format v1 Constants
//!
//! All values are little-endian.
//!
//! ```text
//! +--------------------+  0
//! | header (64 bytes)  |
//! +--------------------+  dir_offset
//! | section directory  |  section_count * 12 bytes
//! +--------------------+
//! | sections, 4-byte   |
//! | aligned            |
//! +--------------------+  total_bytes
//! ```
//!
//! The CRC32 covers the whole buffer except the CRC field itself.
//!
//! # Sections
//!
//! - `Filters`: varint count, then one record per filter
//! - `BlockingTable` / `ExceptionTable`: fallback posting list, host map,
//!   fragment buckets
//! - `Stats`: parsing counters, eight u32 values
//!
//! Strings are a varint byte length followed by UTF-8 bytes. Posting lists
//! are a varint count followed by delta-encoded varint filter ids.

/// Magic bytes: "SBX1"
pub const SBX_MAGIC: [u8; 4] = [0x53, 0x42, 0x58, 0x31];

/// Current format version
pub const SBX_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Section directory entry size
pub const SECTION_ENTRY_SIZE: usize = 12;

/// Size of the `Stats` section
pub const STATS_SIZE: usize = 32;

// =============================================================================
// Header Field Offsets
// =============================================================================

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "SBX1"
    pub const MAGIC: usize = 0;
    /// u16 version
    pub const VERSION: usize = 4;
    /// u16 flags (reserved, 0)
    pub const FLAGS: usize = 6;
    /// u32 headerBytes (always 64)
    pub const HEADER_BYTES: usize = 8;
    /// u32 sectionCount
    pub const SECTION_COUNT: usize = 12;
    /// u32 sectionDirOffset
    pub const SECTION_DIR_OFFSET: usize = 16;
    /// u32 sectionDirBytes
    pub const SECTION_DIR_BYTES: usize = 20;
    /// u32 totalBytes
    pub const TOTAL_BYTES: usize = 24;
    /// u32 snapshotCrc32
    pub const SNAPSHOT_CRC32: usize = 28;
}

// =============================================================================
// Section Directory Entry Offsets
// =============================================================================

pub mod section_entry {
    /// u16 section id
    pub const ID: usize = 0;
    /// u16 flags (reserved, 0)
    pub const FLAGS: usize = 2;
    /// u32 file offset
    pub const OFFSET: usize = 4;
    /// u32 byte length
    pub const LENGTH: usize = 8;
}

// =============================================================================
// Section IDs
// =============================================================================

/// Section type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum SectionId {
    /// Filter records
    Filters = 0x0001,
    /// Candidate table for blocking filters
    BlockingTable = 0x0002,
    /// Candidate table for exception filters
    ExceptionTable = 0x0003,
    /// Parsing statistics
    Stats = 0x0004,
}

impl SectionId {
    /// Sections in the order they are written.
    pub const ALL: [SectionId; 4] = [
        SectionId::Filters,
        SectionId::BlockingTable,
        SectionId::ExceptionTable,
        SectionId::Stats,
    ];
}

impl TryFrom<u16> for SectionId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(Self::Filters),
            0x0002 => Ok(Self::BlockingTable),
            0x0003 => Ok(Self::ExceptionTable),
            0x0004 => Ok(Self::Stats),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Filter Record
// =============================================================================

/// Pattern token opcodes in a filter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenOp {
    /// Followed by a string
    Literal = 0x01,
    Wildcard = 0x02,
    Separator = 0x03,
}

impl TryFrom<u8> for TokenOp {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Literal),
            0x02 => Ok(Self::Wildcard),
            0x03 => Ok(Self::Separator),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Align offset to boundary.
#[inline]
pub const fn align_offset(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Validate magic bytes.
#[inline]
pub fn validate_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == SBX_MAGIC
}

/// Read u16 little-endian. `None` past the end of `data`.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read u32 little-endian. `None` past the end of `data`.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_offset() {
        assert_eq!(align_offset(0, 4), 0);
        assert_eq!(align_offset(1, 4), 4);
        assert_eq!(align_offset(64 + 3 * SECTION_ENTRY_SIZE, 4), 100);
    }

    #[test]
    fn test_read_helpers_are_bounds_checked() {
        let data = [1u8, 0, 0, 0, 2];
        assert_eq!(read_u32_le(&data, 0), Some(1));
        assert_eq!(read_u32_le(&data, 2), None);
        assert_eq!(read_u16_le(&data, 3), Some(0x0200));
        assert_eq!(read_u16_le(&data, usize::MAX), None);
    }

    #[test]
    fn test_section_ids() {
        for id in SectionId::ALL {
            assert_eq!(SectionId::try_from(id as u16), Ok(id));
        }
        assert!(SectionId::try_from(0x00ff).is_err());
    }
}
