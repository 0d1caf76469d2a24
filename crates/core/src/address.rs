//! Translation of linker addresses into file offsets.
//!
//! Field locations are configured as absolute addresses (as they appear in the
//! linker map or in `#pragma location` / `__attribute__((at(..)))` clauses).
//! The image starts at `base_address`, so a field's file offset is simply
//! `absolute - base_address`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StampError, StampResult};
use crate::model::{FeatureToggleSet, FieldName};

/// Convert an absolute address into an offset relative to `base_address`.
///
/// `0` is treated as "unset" for both arguments.
pub fn resolve(absolute_address: u64, base_address: u64) -> StampResult<u64> {
    if base_address == 0 {
        return Err(StampError::config("base address is not configured"));
    }
    if absolute_address == 0 {
        return Err(StampError::config("address is not configured"));
    }
    absolute_address.checked_sub(base_address).ok_or_else(|| {
        StampError::config(format!(
            "address 0x{absolute_address:08X} lies below base address 0x{base_address:08X}"
        ))
    })
}

/// Absolute addresses of the five metadata fields. `0` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    #[serde(default, with = "hex_address")]
    pub firmware_version: u64,
    #[serde(default, with = "hex_address")]
    pub revision_id: u64,
    #[serde(default, with = "hex_address")]
    pub file_size: u64,
    #[serde(default, with = "hex_address")]
    pub checksum: u64,
    #[serde(default, with = "hex_address")]
    pub hash: u64,
}

impl AddressSet {
    pub fn get(&self, field: FieldName) -> u64 {
        match field {
            FieldName::FirmwareVersion => self.firmware_version,
            FieldName::RevisionId => self.revision_id,
            FieldName::FileSize => self.file_size,
            FieldName::Checksum => self.checksum,
            FieldName::Hash => self.hash,
        }
    }

    pub fn set(&mut self, field: FieldName, address: u64) {
        match field {
            FieldName::FirmwareVersion => self.firmware_version = address,
            FieldName::RevisionId => self.revision_id = address,
            FieldName::FileSize => self.file_size = address,
            FieldName::Checksum => self.checksum = address,
            FieldName::Hash => self.hash = address,
        }
    }
}

/// Field addresses together with the image load address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMap {
    pub base_address: u64,
    pub addresses: AddressSet,
}

impl AddressMap {
    pub fn new(base_address: u64, addresses: AddressSet) -> Self {
        Self { base_address, addresses }
    }

    /// Resolve a single field, naming it in the error.
    pub fn resolve_field(&self, field: FieldName) -> StampResult<u64> {
        resolve(self.addresses.get(field), self.base_address).map_err(|err| match err {
            StampError::Configuration(msg) => StampError::config(format!("{field}: {msg}")),
            other => other,
        })
    }

    /// Resolve the firmware version plus every enabled field.
    ///
    /// Fails on the first missing mandatory address so that no write happens
    /// with a half-configured map.
    pub fn resolve_all(&self, features: &FeatureToggleSet) -> StampResult<ResolvedOffsets> {
        if self.base_address == 0 {
            return Err(StampError::config("base address is not configured"));
        }
        let mut offsets = ResolvedOffsets {
            firmware_version: self.resolve_field(FieldName::FirmwareVersion)?,
            ..ResolvedOffsets::default()
        };
        for field in [FieldName::RevisionId, FieldName::FileSize, FieldName::Checksum, FieldName::Hash]
        {
            if !features.is_enabled(field) {
                continue;
            }
            let offset = self.resolve_field(field)?;
            debug!(
                field = field.as_str(),
                absolute = %format!("0x{:08X}", self.addresses.get(field)),
                offset = %format!("0x{offset:X}"),
                "resolved field offset"
            );
            offsets.set(field, offset);
        }
        Ok(offsets)
    }
}

/// File offsets of the fields that take part in a patch.
///
/// Disabled fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOffsets {
    pub firmware_version: u64,
    pub revision_id: Option<u64>,
    pub file_size: Option<u64>,
    pub checksum: Option<u64>,
    pub hash: Option<u64>,
}

impl ResolvedOffsets {
    pub fn get(&self, field: FieldName) -> Option<u64> {
        match field {
            FieldName::FirmwareVersion => Some(self.firmware_version),
            FieldName::RevisionId => self.revision_id,
            FieldName::FileSize => self.file_size,
            FieldName::Checksum => self.checksum,
            FieldName::Hash => self.hash,
        }
    }

    fn set(&mut self, field: FieldName, offset: u64) {
        match field {
            FieldName::FirmwareVersion => self.firmware_version = offset,
            FieldName::RevisionId => self.revision_id = Some(offset),
            FieldName::FileSize => self.file_size = Some(offset),
            FieldName::Checksum => self.checksum = Some(offset),
            FieldName::Hash => self.hash = Some(offset),
        }
    }
}

/// Serde adapter accepting either an integer or a `"0x..."` string.
///
/// Serializes as a zero-padded hex string, which is how addresses appear in
/// linker maps and is what people paste into the config.
pub mod hex_address {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{value:08X}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(value),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }

    /// Parse `0x`-prefixed hex or plain decimal.
    pub fn parse(text: &str) -> Result<u64, String> {
        let text = text.trim();
        let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
            None => text.parse::<u64>(),
        };
        parsed.map_err(|_| format!("invalid address '{text}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_address_accepts_both_forms() {
        assert_eq!(hex_address::parse("0x08004420"), Ok(0x0800_4420));
        assert_eq!(hex_address::parse("0X8000_0000"), Ok(0x8000_0000));
        assert_eq!(hex_address::parse("4096"), Ok(4096));
        assert!(hex_address::parse("0xZZ").is_err());
    }

    #[test]
    fn address_set_round_trips_through_json() {
        let set = AddressSet { firmware_version: 0x0800_4410, checksum: 0x0800_4434, ..Default::default() };
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains("\"0x08004410\""));
        let back: AddressSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
