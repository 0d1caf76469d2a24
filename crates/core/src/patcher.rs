//! Bounds-checked, in-place reads and writes of field slots.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::ResolvedOffsets;
use crate::codec::{self, FieldSlot};
use crate::error::{StampError, StampResult};

/// Current length of the image file.
pub fn image_len(path: &Path) -> StampResult<u64> {
    let meta = fs::metadata(path).map_err(|err| StampError::io(path, err))?;
    Ok(meta.len())
}

fn check_bounds(slot: &FieldSlot, available: u64) -> StampResult<()> {
    if slot.end() > available {
        return Err(StampError::Bounds {
            field: slot.name.to_string(),
            required: slot.end(),
            available,
        });
    }
    Ok(())
}

/// Overwrite exactly `slot.size` bytes at `slot.offset`, leaving the rest of
/// the file untouched.
///
/// Nothing is written when the slot does not fit.
pub fn write_field(path: &Path, slot: &FieldSlot, bytes: &[u8]) -> StampResult<()> {
    if bytes.len() as u64 != slot.size {
        return Err(StampError::format(format!(
            "{} slot is {} bytes but {} bytes were supplied",
            slot.name,
            slot.size,
            bytes.len()
        )));
    }
    check_bounds(slot, image_len(path)?)?;

    let mut file =
        OpenOptions::new().write(true).open(path).map_err(|err| StampError::io(path, err))?;
    file.seek(SeekFrom::Start(slot.offset)).map_err(|err| StampError::io(path, err))?;
    file.write_all(bytes).map_err(|err| StampError::io(path, err))?;
    file.flush().map_err(|err| StampError::io(path, err))?;

    debug!(field = slot.name.as_str(), offset = slot.offset, size = slot.size, "field written");
    Ok(())
}

/// Read the raw bytes of a slot.
pub fn read_field(path: &Path, slot: &FieldSlot) -> StampResult<Vec<u8>> {
    check_bounds(slot, image_len(path)?)?;

    let mut file = fs::File::open(path).map_err(|err| StampError::io(path, err))?;
    file.seek(SeekFrom::Start(slot.offset)).map_err(|err| StampError::io(path, err))?;
    let mut buf = vec![0u8; slot.size as usize];
    file.read_exact(&mut buf).map_err(|err| StampError::io(path, err))?;
    Ok(buf)
}

/// What happened to the pre-patch backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum BackupOutcome {
    Created(PathBuf),
    Skipped(String),
}

impl BackupOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            BackupOutcome::Created(path) => Some(path),
            BackupOutcome::Skipped(_) => None,
        }
    }
}

/// `dir/name.ext` -> `dir/name_backup.ext`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup"),
    };
    path.with_file_name(name)
}

/// Best-effort full copy of the image next to it.
///
/// Never fails: a copy error is reported as [`BackupOutcome::Skipped`] so the
/// release build is not blocked on it.
pub fn create_backup(path: &Path) -> BackupOutcome {
    let backup = backup_path_for(path);
    match fs::copy(path, &backup) {
        Ok(_) => {
            debug!(backup = %backup.display(), "backup created");
            BackupOutcome::Created(backup)
        }
        Err(err) => {
            let reason = format!("failed to copy {} to {}: {err}", path.display(), backup.display());
            warn!(%reason, "continuing without backup");
            BackupOutcome::Skipped(reason)
        }
    }
}

/// Decoded view of the metadata currently stored in an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReadout {
    pub image_len: u64,
    pub firmware_version: Option<String>,
    pub revision_id: Option<String>,
    pub file_size: Option<u32>,
    pub checksum: Option<u32>,
    pub hash_value: Option<u32>,
}

/// Read back every configured field. Slots that fall outside the image are
/// left as `None` rather than failing the whole inspection.
pub fn inspect(
    path: &Path,
    offsets: &ResolvedOffsets,
    revision_width: usize,
) -> StampResult<FieldReadout> {
    let mut readout = FieldReadout { image_len: image_len(path)?, ..FieldReadout::default() };

    let read = |slot: FieldSlot| -> StampResult<Option<Vec<u8>>> {
        match read_field(path, &slot) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StampError::Bounds { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    };

    readout.firmware_version =
        read(FieldSlot::firmware_version(offsets.firmware_version))?.map(|b| codec::decode_ascii(&b));
    if let Some(offset) = offsets.revision_id {
        readout.revision_id =
            read(FieldSlot::revision_id(offset, revision_width))?.map(|b| codec::decode_revision_id(&b));
    }
    if let Some(offset) = offsets.file_size {
        readout.file_size = read(FieldSlot::file_size(offset))?.map(|b| codec::decode_u32(&b)).transpose()?;
    }
    if let Some(offset) = offsets.checksum {
        readout.checksum = read(FieldSlot::checksum(offset))?.map(|b| codec::decode_u32(&b)).transpose()?;
    }
    if let Some(offset) = offsets.hash {
        readout.hash_value =
            read(FieldSlot::hash(offset))?.map(|b| codec::decode_hash_slot(&b)).transpose()?;
    }
    Ok(readout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_keeps_extension() {
        assert_eq!(backup_path_for(Path::new("/out/app.bin")), PathBuf::from("/out/app_backup.bin"));
        assert_eq!(backup_path_for(Path::new("firmware")), PathBuf::from("firmware_backup"));
    }
}
