//! CRC-32 over an image with its reserved slots cut out.
//!
//! The checksum is IEEE 802.3 CRC-32 (reflected polynomial `0xEDB88320`), the
//! same value zlib's `crc32` produces. It is folded segment by segment over the
//! image in ascending offset order, each segment seeded with the previous
//! segment's result. The checksum slot itself, and the hash slot when that
//! feature is on, are never part of the input, so writing the result into its
//! slot and recomputing yields the same value.

use std::ops::Range;
use std::path::Path;

use crc32fast::Hasher;
use tracing::debug;

use crate::codec::FieldSlot;
use crate::error::{StampError, StampResult};

/// Sorted, merged set of byte ranges left out of a digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    ranges: Vec<Range<u64>>,
}

impl Exclusions {
    pub fn new(ranges: impl IntoIterator<Item = Range<u64>>) -> Self {
        let mut ranges: Vec<Range<u64>> = ranges.into_iter().filter(|r| r.start < r.end).collect();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    /// The complement of the exclusions within `[0, len)`, ascending, non-empty.
    pub fn segments(&self, len: u64) -> Vec<Range<usize>> {
        let mut segments = Vec::with_capacity(self.ranges.len() + 1);
        let mut cursor = 0u64;
        for excluded in &self.ranges {
            let start = excluded.start.min(len);
            if cursor < start {
                segments.push(cursor as usize..start as usize);
            }
            cursor = cursor.max(excluded.end.min(len));
        }
        if cursor < len {
            segments.push(cursor as usize..len as usize);
        }
        segments
    }
}

/// Where the checksum (and optionally the hash) live in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumLayout {
    pub checksum_offset: u64,
    /// `Some` only when the hash feature is enabled.
    pub hash_offset: Option<u64>,
}

impl ChecksumLayout {
    pub fn new(checksum_offset: u64, hash_offset: Option<u64>) -> Self {
        Self { checksum_offset, hash_offset }
    }

    pub fn exclusions(&self) -> Exclusions {
        let checksum = FieldSlot::checksum(self.checksum_offset).range();
        let hash = self.hash_offset.map(|offset| FieldSlot::hash(offset).range());
        Exclusions::new(std::iter::once(checksum).chain(hash))
    }
}

/// Plain CRC-32 of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_continue(0, data)
}

/// Fold `data` into a running CRC, like zlib's `crc32(data, crc)`.
pub fn crc32_continue(crc: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(crc);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the image checksum over everything outside the reserved slots.
pub fn compute(image: &[u8], layout: &ChecksumLayout) -> u32 {
    let exclusions = layout.exclusions();
    let mut crc = 0u32;
    for segment in exclusions.segments(image.len() as u64) {
        debug!(start = segment.start, end = segment.end, "folding checksum segment");
        crc = crc32_continue(crc, &image[segment]);
    }
    debug!(
        excluded = ?exclusions.ranges(),
        crc = %format!("0x{crc:08X}"),
        "checksum computed"
    );
    crc
}

/// Read the image from disk and compute its checksum.
pub fn compute_file(path: &Path, layout: &ChecksumLayout) -> StampResult<u32> {
    let image = std::fs::read(path).map_err(|err| StampError::io(path, err))?;
    Ok(compute(&image, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // zlib.crc32(b"123456789")
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn chained_segments_equal_single_pass() {
        let data = b"hello, firmware world";
        let chained = crc32_continue(crc32(&data[..7]), &data[7..]);
        assert_eq!(chained, crc32(data));
    }

    #[test]
    fn layout_near_address_space_end_saturates() {
        let layout = ChecksumLayout::new(u64::MAX - 1, Some(u64::MAX - 8));
        let ex = layout.exclusions();
        assert_eq!(ex.ranges(), &[u64::MAX - 8..u64::MAX]);
        assert_eq!(compute(b"abc", &layout), crc32(b"abc"));
    }

    #[test]
    fn exclusions_merge_overlaps() {
        let ex = Exclusions::new([10..20, 15..30, 40..44, 0..0]);
        assert_eq!(ex.ranges(), &[10..30, 40..44]);
        assert_eq!(ex.segments(50), vec![0..10, 30..40, 44..50]);
    }

    #[test]
    fn segments_clamp_to_image_length() {
        let ex = Exclusions::new([8..12]);
        assert_eq!(ex.segments(10), vec![0..8]);
        assert_eq!(ex.segments(4), vec![0..4]);
    }

    #[test]
    fn checksum_at_offset_zero_has_no_leading_segment() {
        let layout = ChecksumLayout::new(0, None);
        assert_eq!(layout.exclusions().segments(16), vec![4..16]);
    }

    #[test]
    fn hash_slot_excluded_only_when_present() {
        let with_hash = ChecksumLayout::new(0x10, Some(0x20));
        assert_eq!(with_hash.exclusions().segments(0x60), vec![0..0x10, 0x14..0x20, 0x40..0x60]);

        let without_hash = ChecksumLayout::new(0x10, None);
        assert_eq!(without_hash.exclusions().segments(0x60), vec![0..0x10, 0x14..0x60]);
    }
}
