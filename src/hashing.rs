//! Hash functions used to place keys and virtual nodes on a ring.
//!
//! Both reference algorithms produce 32-bit ordinals widened to `u64`, so a
//! ring built with either one is bit-identical across platforms.

use std::sync::Arc;

use byteorder::{
    ByteOrder,
    LittleEndian,
};
use md5::{
    Digest,
    Md5,
};
use serde::Deserialize;

/// Maps a key to an ordinal on the ring.
///
/// Implementations must be deterministic and must not panic for any input,
/// the empty slice included. Collisions are tolerated.
pub trait HashFunction: Send + Sync {
    fn hash(&self, key: &[u8]) -> u64;
}

/// MD5 digest of the key, first four bytes read little-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hash;

impl HashFunction for Md5Hash {
    fn hash(&self, key: &[u8]) -> u64 {
        let digest = Md5::digest(key);
        u64::from(LittleEndian::read_u32(&digest[..4]))
    }
}

/// FNV-1 with a trailing avalanche, computed in signed 32-bit arithmetic.
///
/// UTF-8 keys are folded one UTF-16 code unit at a time, so non-ASCII keys
/// land on the same ordinals as in UTF-16 based deployments. Keys that are not
/// valid UTF-8 are folded byte by byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1Hash;

const FNV_PRIME: i32 = 16_777_619;
const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

impl HashFunction for Fnv1Hash {
    fn hash(&self, key: &[u8]) -> u64 {
        let step = |hash: i32, unit: i32| (hash ^ unit).wrapping_mul(FNV_PRIME);
        let mut hash = match std::str::from_utf8(key) {
            Ok(text) => text
                .encode_utf16()
                .fold(FNV_OFFSET_BASIS as i32, |hash, unit| step(hash, i32::from(unit))),
            Err(_) => key
                .iter()
                .fold(FNV_OFFSET_BASIS as i32, |hash, &byte| step(hash, i32::from(byte))),
        };

        // Right shifts are arithmetic on purpose.
        hash = hash.wrapping_add(hash << 13);
        hash ^= hash >> 7;
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 17;
        hash = hash.wrapping_add(hash << 5);

        u64::from(hash as u32)
    }
}

/// Selects one of the bundled hash functions by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Fnv1,
}

impl HashAlgorithm {
    pub fn hasher(self) -> Arc<dyn HashFunction> {
        match self {
            HashAlgorithm::Md5 => Arc::new(Md5Hash),
            HashAlgorithm::Fnv1 => Arc::new(Fnv1Hash),
        }
    }
}
