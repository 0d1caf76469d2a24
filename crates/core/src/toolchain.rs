//! Reading field addresses and the declared firmware version out of the
//! firmware's info source file.
//!
//! The two supported toolchains pin variables to addresses differently:
//!
//! ```c
//! // IAR
//! #pragma location=0x08004410
//! __root const char __Firmware_Version[10] = "V0.1.2.3";
//!
//! // Keil MDK
//! const char __Firmware_Version[10] __attribute__((at(0x8001000))) = "V0.0.9.7";
//! ```

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::AddressSet;
use crate::error::{StampError, StampResult};
use crate::model::FieldName;
use crate::version::VersionScheme;

/// Compiler family whose placement syntax the info file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    Iar,
    Mdk,
}

impl ToolchainKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolchainKind::Iar => "iar",
            ToolchainKind::Mdk => "mdk",
        }
    }

    fn placement_regex(self, symbol: &str) -> Option<Regex> {
        let sym = regex::escape(symbol);
        let pattern = match self {
            ToolchainKind::Iar => format!(
                r"#pragma\s+location\s*=\s*0[xX]([0-9A-Fa-f]+)\s*\n\s*__root\b[^;]*?\b{sym}\b[^;]*;"
            ),
            ToolchainKind::Mdk => format!(
                r"\b{sym}\b[^;]*?__attribute__\s*\(\(\s*at\s*\(\s*0[xX]([0-9A-Fa-f]+)\s*\)\s*\)\)"
            ),
        };
        Regex::new(&pattern).ok()
    }

    /// Absolute address the variable `symbol` is pinned to.
    pub fn locate_symbol(self, source: &str, symbol: &str) -> Option<u64> {
        let caps = self.placement_regex(symbol)?.captures(source)?;
        u64::from_str_radix(&caps[1], 16).ok()
    }

    /// Scan an info file for all five field addresses. Missing symbols stay 0.
    pub fn discover_addresses(self, source: &str, keywords: &SymbolKeywords) -> AddressSet {
        let mut set = AddressSet::default();
        for field in FieldName::ALL {
            let symbol = keywords.get(field);
            match self.locate_symbol(source, symbol) {
                Some(address) => {
                    debug!(toolchain = self.as_str(), symbol, address = %format!("0x{address:08X}"), "found symbol");
                    set.set(field, address);
                }
                None => warn!(toolchain = self.as_str(), symbol, "symbol placement not found"),
            }
        }
        set
    }

    /// The string literal assigned to the version variable.
    pub fn extract_version(self, source: &str, keyword: &str) -> Option<String> {
        let caps = version_literal_regex(keyword).ok()?.captures(source)?;
        Some(caps[1].to_string())
    }

    /// Rewrite the version variable's literal, returning the new source text.
    pub fn update_version(
        self,
        source: &str,
        keyword: &str,
        new_version: &str,
        scheme: &VersionScheme,
    ) -> StampResult<String> {
        scheme.parse(new_version)?;
        let caps = version_literal_regex(keyword)?.captures(source).ok_or_else(|| {
            StampError::format(format!("no {keyword} definition found in info file"))
        })?;
        let literal = caps.get(1).ok_or_else(|| StampError::format("version literal missing"))?;

        let mut updated = String::with_capacity(source.len() + new_version.len());
        updated.push_str(&source[..literal.start()]);
        updated.push_str(new_version);
        updated.push_str(&source[literal.end()..]);
        Ok(updated)
    }
}

fn version_literal_regex(keyword: &str) -> StampResult<Regex> {
    let sym = regex::escape(keyword);
    Regex::new(&format!(r#"\b{sym}\b[^;="]*=\s*"([^"]*)""#))
        .map_err(|err| StampError::config(format!("bad version keyword '{keyword}': {err}")))
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolchainKind {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iar" => Ok(ToolchainKind::Iar),
            "mdk" | "keil" => Ok(ToolchainKind::Mdk),
            other => Err(StampError::config(format!("unknown toolchain '{other}' (expected iar or mdk)"))),
        }
    }
}

fn kw_firmware_version() -> String {
    "__Firmware_Version".into()
}
fn kw_revision_id() -> String {
    "__git_commit_id".into()
}
fn kw_file_size() -> String {
    "__file_size".into()
}
fn kw_checksum() -> String {
    "__bin_checksum".into()
}
fn kw_hash() -> String {
    "__hash_value".into()
}

/// Variable names declaring each field in the info file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolKeywords {
    #[serde(default = "kw_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "kw_revision_id")]
    pub revision_id: String,
    #[serde(default = "kw_file_size")]
    pub file_size: String,
    #[serde(default = "kw_checksum")]
    pub checksum: String,
    #[serde(default = "kw_hash")]
    pub hash: String,
}

impl Default for SymbolKeywords {
    fn default() -> Self {
        Self {
            firmware_version: kw_firmware_version(),
            revision_id: kw_revision_id(),
            file_size: kw_file_size(),
            checksum: kw_checksum(),
            hash: kw_hash(),
        }
    }
}

impl SymbolKeywords {
    pub fn get(&self, field: FieldName) -> &str {
        match field {
            FieldName::FirmwareVersion => &self.firmware_version,
            FieldName::RevisionId => &self.revision_id,
            FieldName::FileSize => &self.file_size,
            FieldName::Checksum => &self.checksum,
            FieldName::Hash => &self.hash,
        }
    }
}
