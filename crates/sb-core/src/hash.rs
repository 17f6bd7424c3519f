//! Hash functions for ShieldBlock
//!
//! Murmur3 32-bit is used for everything that ends up as a table key:
//! host-anchor keys get a two-seed 64-bit composite, pattern fragments and
//! URL tokens get a single 32-bit pass over their lowercased bytes.
//!
//! # Case folding
//!
//! All keys are computed over ASCII-lowercased input so that filter text
//! and request URLs can be compared without allocating a lowercase copy.

/// 64-bit hash represented as two 32-bit parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash64 {
    pub lo: u32,
    pub hi: u32,
}

impl Hash64 {
    #[inline]
    pub const fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    /// Convert to a single u64 for use as a map key.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        ((self.hi as u64) << 32) | (self.lo as u64)
    }

    #[inline]
    pub const fn from_u64(v: u64) -> Self {
        Self {
            lo: v as u32,
            hi: (v >> 32) as u32,
        }
    }
}

const SEED_LO: u32 = 0x9e3779b9;
const SEED_HI: u32 = 0x85ebca6b;
const SEED_TOKEN: u32 = 0x811c9dc5;

/// Longest input folded on the stack; longer inputs spill to the heap.
const STACK_FOLD_LEN: usize = 256;

/// Murmur3 32-bit hash.
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    let mut k: u32 = 0;
    if tail.len() >= 3 {
        k ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        k ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        k ^= tail[0] as u32;
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);
        h ^= k;
    }

    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Run `f` over an ASCII-lowercased view of `data`.
#[inline]
fn with_folded<R>(data: &[u8], f: impl FnOnce(&[u8]) -> R) -> R {
    if data.len() <= STACK_FOLD_LEN {
        let mut buf = [0u8; STACK_FOLD_LEN];
        for (dst, &b) in buf.iter_mut().zip(data) {
            *dst = b.to_ascii_lowercase();
        }
        f(&buf[..data.len()])
    } else {
        f(data.to_ascii_lowercase().as_slice())
    }
}

/// Compute a 64-bit hash as (lo, hi) using two Murmur3 passes.
#[inline]
pub fn hash64(data: &[u8]) -> Hash64 {
    Hash64 {
        lo: murmur3_32(data, SEED_LO),
        hi: murmur3_32(data, SEED_HI),
    }
}

/// Hash a host name for the host-anchored table.
/// Case-insensitive; a trailing dot is ignored.
#[inline]
pub fn hash_domain(domain: &str) -> Hash64 {
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    with_folded(trimmed.as_bytes(), hash64)
}

/// Hash a pattern fragment or URL token. Case-insensitive.
#[inline]
pub fn hash_token(token: &[u8]) -> u32 {
    with_folded(token, |folded| murmur3_32(folded, SEED_TOKEN))
}

/// Compute CRC32 for snapshot integrity checking (IEEE 802.3 polynomial).
pub fn crc32(data: &[u8]) -> u32 {
    crc32_finish(crc32_update(CRC32_INIT, data))
}

/// Initial CRC32 register value for incremental use.
pub const CRC32_INIT: u32 = 0xffffffff;

/// Feed more bytes into a running CRC32.
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    static CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 {
                    0xedb88320 ^ (c >> 1)
                } else {
                    c >> 1
                };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc
}

/// Finalize a running CRC32.
#[inline]
pub const fn crc32_finish(crc: u32) -> u32 {
    crc ^ 0xffffffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_consistent() {
        assert_eq!(murmur3_32(b"example.com", 0), murmur3_32(b"example.com", 0));
    }

    #[test]
    fn test_murmur3_different_strings() {
        assert_ne!(murmur3_32(b"example.com", 0), murmur3_32(b"example.org", 0));
    }

    #[test]
    fn test_murmur3_different_seeds() {
        assert_ne!(murmur3_32(b"example.com", 0), murmur3_32(b"example.com", 1));
    }

    #[test]
    fn test_hash_domain_case_insensitive() {
        assert_eq!(hash_domain("Example.COM"), hash_domain("example.com"));
        assert_eq!(hash_domain("example.com."), hash_domain("example.com"));
    }

    #[test]
    fn test_hash_domain_long_input() {
        let long = "a".repeat(300) + ".com";
        assert_eq!(hash_domain(&long.to_uppercase()), hash_domain(&long));
    }

    #[test]
    fn test_hash_token_case_insensitive() {
        assert_eq!(hash_token(b"Banner1"), hash_token(b"banner1"));
        assert_ne!(hash_token(b"banner1"), hash_token(b"banner2"));
    }

    #[test]
    fn test_hash64_roundtrip_u64() {
        let h = hash64(b"ads.example.com");
        assert_eq!(Hash64::from_u64(h.to_u64()), h);
    }

    #[test]
    fn test_crc32_known_value() {
        // Standard check value for "123456789".
        assert_eq!(crc32(b"123456789"), 0xcbf43926);
    }

    #[test]
    fn test_crc32_incremental_matches_oneshot() {
        let running = crc32_update(CRC32_INIT, b"12345");
        let running = crc32_update(running, b"6789");
        assert_eq!(crc32_finish(running), crc32(b"123456789"));
    }

    #[test]
    fn test_crc32_detects_changes() {
        assert_ne!(crc32(&[1u8, 2, 3]), crc32(&[1u8, 2, 4]));
    }
}
