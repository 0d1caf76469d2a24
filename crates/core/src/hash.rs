//! Providers for the 32-byte hash slot.
//!
//! The slot has always been written with a fixed sentinel; real digests plug in
//! through [`HashProvider`] without changing the patch sequence.

use sha2::{Digest, Sha256};

use crate::checksum::Exclusions;
use crate::codec::{encode_hash_slot, HASH_SLOT_SIZE};

/// Sentinel written when no digest algorithm is configured.
pub const DEFAULT_HASH_SENTINEL: u32 = 0x1234_5678;

pub type HashSlot = [u8; HASH_SLOT_SIZE as usize];

/// Produces the bytes stored in the hash slot.
pub trait HashProvider: Send + Sync {
    /// Returns a human-readable name for reports.
    fn name(&self) -> &'static str;

    /// Compute the slot contents for `image`, skipping the `excluded` ranges
    /// (the hash slot and, when enabled, the checksum slot).
    fn slot_bytes(&self, image: &[u8], excluded: &Exclusions) -> HashSlot;
}

/// Writes a fixed little-endian value followed by zero padding.
#[derive(Debug, Clone, Copy)]
pub struct SentinelHash {
    pub value: u32,
}

impl Default for SentinelHash {
    fn default() -> Self {
        Self { value: DEFAULT_HASH_SENTINEL }
    }
}

impl HashProvider for SentinelHash {
    fn name(&self) -> &'static str {
        "sentinel"
    }

    fn slot_bytes(&self, _image: &[u8], _excluded: &Exclusions) -> HashSlot {
        encode_hash_slot(self.value)
    }
}

/// SHA-256 of the image with the reserved slots left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl HashProvider for Sha256Hash {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn slot_bytes(&self, image: &[u8], excluded: &Exclusions) -> HashSlot {
        let mut hasher = Sha256::new();
        for segment in excluded.segments(image.len() as u64) {
            hasher.update(&image[segment]);
        }
        hasher.finalize().into()
    }
}

/// Look up a provider by its configured name.
pub fn provider_by_name(name: &str, sentinel: u32) -> Option<Box<dyn HashProvider>> {
    match name {
        "sentinel" => Some(Box::new(SentinelHash { value: sentinel })),
        "sha256" => Some(Box::new(Sha256Hash)),
        _ => None,
    }
}
