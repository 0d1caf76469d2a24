//! Shared vocabulary for the metadata fields stamped into an image.

use serde::{Deserialize, Serialize};

/// One of the five metadata slots reserved inside a firmware image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    /// ASCII version string injected at compile time. Never written by the patcher.
    FirmwareVersion,
    /// ASCII hex revision id (e.g. a short commit hash).
    RevisionId,
    /// Little-endian u32 holding the image length.
    FileSize,
    /// Little-endian u32 CRC-32 of the image minus the reserved slots.
    Checksum,
    /// 32-byte slot reserved for an image digest.
    Hash,
}

impl FieldName {
    pub const ALL: [FieldName; 5] = [
        FieldName::FirmwareVersion,
        FieldName::RevisionId,
        FieldName::FileSize,
        FieldName::Checksum,
        FieldName::Hash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::FirmwareVersion => "firmware_version",
            FieldName::RevisionId => "revision_id",
            FieldName::FileSize => "file_size",
            FieldName::Checksum => "checksum",
            FieldName::Hash => "hash",
        }
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enabled() -> bool {
    true
}

/// Independent switches for the optional fields.
///
/// The firmware version and base address are always required, so they have
/// no toggle here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggleSet {
    #[serde(default = "enabled")]
    pub revision_id: bool,
    #[serde(default = "enabled")]
    pub file_size: bool,
    #[serde(default = "enabled")]
    pub checksum: bool,
    #[serde(default = "enabled")]
    pub hash: bool,
}

impl Default for FeatureToggleSet {
    fn default() -> Self {
        Self { revision_id: true, file_size: true, checksum: true, hash: true }
    }
}

impl FeatureToggleSet {
    /// Every optional field switched off.
    pub fn none() -> Self {
        Self { revision_id: false, file_size: false, checksum: false, hash: false }
    }

    pub fn is_enabled(&self, field: FieldName) -> bool {
        match field {
            FieldName::FirmwareVersion => true,
            FieldName::RevisionId => self.revision_id,
            FieldName::FileSize => self.file_size,
            FieldName::Checksum => self.checksum,
            FieldName::Hash => self.hash,
        }
    }

    /// Builder-style helper to flip a single field.
    pub fn with(mut self, field: FieldName, on: bool) -> Self {
        match field {
            FieldName::FirmwareVersion => {}
            FieldName::RevisionId => self.revision_id = on,
            FieldName::FileSize => self.file_size = on,
            FieldName::Checksum => self.checksum = on,
            FieldName::Hash => self.hash = on,
        }
        self
    }
}
