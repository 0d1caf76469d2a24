//! Fixed-width byte layouts for the metadata fields.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StampError, StampResult};
use crate::model::FieldName;

/// Default width of the revision id slot (a short commit hash).
pub const DEFAULT_REVISION_WIDTH: usize = 7;
/// Width of the compiler-written firmware version string (`char[10]`).
pub const FIRMWARE_VERSION_SIZE: u64 = 10;
pub const FILE_SIZE_SIZE: u64 = 4;
pub const CHECKSUM_SIZE: u64 = 4;
/// The hash slot is a 32-byte array; only the first 4 bytes carry a value today.
pub const HASH_SLOT_SIZE: u64 = 32;

/// How a slot's bytes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    AsciiHex,
    Ascii,
    U32Le,
    /// A little-endian u32 followed by zero padding up to the slot size.
    U32LePadded,
}

/// A fixed offset+size region of the image reserved for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSlot {
    pub name: FieldName,
    pub offset: u64,
    pub size: u64,
    pub encoding: FieldEncoding,
}

impl FieldSlot {
    pub fn firmware_version(offset: u64) -> Self {
        Self {
            name: FieldName::FirmwareVersion,
            offset,
            size: FIRMWARE_VERSION_SIZE,
            encoding: FieldEncoding::Ascii,
        }
    }

    pub fn revision_id(offset: u64, width: usize) -> Self {
        Self {
            name: FieldName::RevisionId,
            offset,
            size: width as u64,
            encoding: FieldEncoding::AsciiHex,
        }
    }

    pub fn file_size(offset: u64) -> Self {
        Self { name: FieldName::FileSize, offset, size: FILE_SIZE_SIZE, encoding: FieldEncoding::U32Le }
    }

    pub fn checksum(offset: u64) -> Self {
        Self { name: FieldName::Checksum, offset, size: CHECKSUM_SIZE, encoding: FieldEncoding::U32Le }
    }

    pub fn hash(offset: u64) -> Self {
        Self {
            name: FieldName::Hash,
            offset,
            size: HASH_SLOT_SIZE,
            encoding: FieldEncoding::U32LePadded,
        }
    }

    /// One past the last byte of the slot.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.end()
    }
}

/// Result of an encoding that never fails hard.
///
/// On bad input `bytes` is an all-zero buffer of the right width and `error`
/// says why, so downstream bounds checks and writes stay well-defined.
#[derive(Debug)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub error: Option<StampError>,
}

impl Encoded {
    fn ok(bytes: Vec<u8>) -> Self {
        Self { bytes, error: None }
    }

    fn fallback(width: usize, error: StampError) -> Self {
        warn!(%error, width, "falling back to zero-filled field");
        Self { bytes: vec![0; width], error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Validate and normalize a revision id to exactly `width` lowercase hex chars.
///
/// Shorter ids are right-padded with `'0'`, longer ones truncated.
pub fn normalize_revision_id(revision: &str, width: usize) -> StampResult<String> {
    if revision.is_empty() {
        return Err(StampError::format("revision id is empty"));
    }
    if !revision.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StampError::format(format!("revision id '{revision}' is not hexadecimal")));
    }
    let mut normalized: String = revision.to_ascii_lowercase().chars().take(width).collect();
    while normalized.len() < width {
        normalized.push('0');
    }
    Ok(normalized)
}

/// Encode a revision id as raw ASCII bytes (not packed binary).
pub fn encode_revision_id(revision: &str, width: usize) -> Encoded {
    match normalize_revision_id(revision, width) {
        Ok(text) => Encoded::ok(text.into_bytes()),
        Err(err) => Encoded::fallback(width, err),
    }
}

/// Interpret slot bytes as revision text. No validation is applied.
pub fn decode_revision_id(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode a NUL-padded ASCII field such as the firmware version.
pub fn decode_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

pub fn decode_u32(bytes: &[u8]) -> StampResult<u32> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StampError::format(format!("expected 4 bytes, got {}", bytes.len())))?;
    Ok(u32::from_le_bytes(raw))
}

/// Lay out a u32 at the start of a zeroed 32-byte hash slot.
pub fn encode_hash_slot(value: u32) -> [u8; HASH_SLOT_SIZE as usize] {
    let mut slot = [0u8; HASH_SLOT_SIZE as usize];
    slot[..4].copy_from_slice(&value.to_le_bytes());
    slot
}

/// Read back the leading u32 of a hash slot.
pub fn decode_hash_slot(bytes: &[u8]) -> StampResult<u32> {
    if bytes.len() != HASH_SLOT_SIZE as usize {
        return Err(StampError::format(format!(
            "hash slot must be {HASH_SLOT_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    decode_u32(&bytes[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_revision_is_lowercased_and_truncated() {
        let encoded = encode_revision_id("A1B2C3D4E5F6", 7);
        assert!(encoded.is_ok());
        assert_eq!(encoded.bytes, b"a1b2c3d");
    }

    #[test]
    fn short_revision_is_padded_with_ascii_zero() {
        let encoded = encode_revision_id("abc", 7);
        assert_eq!(encoded.bytes, b"abc0000");
    }

    #[test]
    fn invalid_revision_falls_back_to_zero_bytes() {
        let encoded = encode_revision_id("xyz-123", 7);
        assert!(!encoded.is_ok());
        assert_eq!(encoded.bytes, vec![0u8; 7]);
        assert!(matches!(encoded.error, Some(StampError::Format(_))));

        let empty = encode_revision_id("", 4);
        assert_eq!(empty.bytes, vec![0u8; 4]);
        assert!(!empty.is_ok());
    }

    #[test]
    fn hash_slot_layout() {
        let slot = encode_hash_slot(0x1234_5678);
        assert_eq!(&slot[..4], &[0x78, 0x56, 0x34, 0x12]);
        assert!(slot[4..].iter().all(|&b| b == 0));
        assert_eq!(decode_hash_slot(&slot).unwrap(), 0x1234_5678);
    }

    #[test]
    fn decode_ascii_stops_at_nul() {
        assert_eq!(decode_ascii(b"V0.1.2.3\0\0"), "V0.1.2.3");
        assert_eq!(decode_ascii(b"ABC"), "ABC");
    }

    #[test]
    fn decode_u32_rejects_wrong_width() {
        assert!(decode_u32(&[1, 2, 3]).is_err());
        assert_eq!(decode_u32(&[1, 0, 0, 0]).unwrap(), 1);
    }
}
