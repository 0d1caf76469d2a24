//! Project configuration and on-disk layout.
//!
//! This module defines:
//! - `StampConfig`: serializable settings (addresses, feature toggles, version
//!   rules, publish directory).
//! - `ProjectLayout`: computed paths for the project's metadata files.
//! - `ProjectContext`: layout + loaded config, resolved once per session.

pub mod layout;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::address::{hex_address, AddressMap, AddressSet, ResolvedOffsets};
use crate::codec::DEFAULT_REVISION_WIDTH;
use crate::error::{StampError, StampResult};
use crate::hash::{provider_by_name, HashProvider, DEFAULT_HASH_SENTINEL};
use crate::model::FeatureToggleSet;
use crate::toolchain::{SymbolKeywords, ToolchainKind};
use crate::version::ledger::{VersionLedger, DEFAULT_IMAGE_EXTENSION};
use crate::version::VersionScheme;

pub use layout::ProjectLayout;

fn default_revision_width() -> usize {
    DEFAULT_REVISION_WIDTH
}

fn default_publish_dir() -> String {
    "fw_publish".to_string()
}

fn default_image_extension() -> String {
    DEFAULT_IMAGE_EXTENSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_hash_provider() -> String {
    "sentinel".to_string()
}

fn default_hash_sentinel() -> u64 {
    DEFAULT_HASH_SENTINEL as u64
}

/// Which digest fills the hash slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSettings {
    /// `sentinel` or `sha256`.
    #[serde(default = "default_hash_provider")]
    pub provider: String,
    /// Value written by the `sentinel` provider.
    #[serde(default = "default_hash_sentinel", with = "hex_address")]
    pub sentinel: u64,
}

impl Default for HashSettings {
    fn default() -> Self {
        Self { provider: default_hash_provider(), sentinel: default_hash_sentinel() }
    }
}

/// Serializable configuration describing a stamping project.
///
/// This lives (for now) at `.fwstamp/stamp.json` in the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampConfig {
    /// Project name, used as the first token of published filenames.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema/config version. This is about the config format, not firmware version.
    pub config_version: String,
    /// Load address of the image.
    #[serde(default, with = "hex_address")]
    pub base_address: u64,
    #[serde(default)]
    pub addresses: AddressSet,
    #[serde(default)]
    pub features: FeatureToggleSet,
    #[serde(default = "default_revision_width")]
    pub revision_width: usize,
    #[serde(default)]
    pub version: VersionScheme,
    #[serde(default)]
    pub hash: HashSettings,
    /// Copy the image to `<name>_backup<ext>` before patching.
    #[serde(default = "default_true")]
    pub backup: bool,
    /// Publish directory (typically relative to project root).
    #[serde(default = "default_publish_dir")]
    pub publish_dir: String,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainKind>,
    /// Source file declaring the metadata variables (relative to project root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_file: Option<String>,
    #[serde(default)]
    pub keywords: SymbolKeywords,
}

impl StampConfig {
    /// Create a configuration with defaults and no addresses.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            base_address: 0,
            addresses: AddressSet::default(),
            features: FeatureToggleSet::default(),
            revision_width: DEFAULT_REVISION_WIDTH,
            version: VersionScheme::default(),
            hash: HashSettings::default(),
            backup: true,
            publish_dir: default_publish_dir(),
            image_extension: default_image_extension(),
            toolchain: None,
            info_file: None,
            keywords: SymbolKeywords::default(),
        }
    }

    pub fn address_map(&self) -> AddressMap {
        AddressMap::new(self.base_address, self.addresses)
    }

    /// Resolve field offsets for every enabled feature.
    pub fn resolved_offsets(&self) -> StampResult<ResolvedOffsets> {
        self.address_map().resolve_all(&self.features)
    }

    /// Check everything a patch needs before any byte is written.
    pub fn validate(&self) -> StampResult<ResolvedOffsets> {
        if self.revision_width == 0 {
            return Err(StampError::config("revision_width must be at least 1"));
        }
        self.version.validate()?;
        if self.features.hash {
            self.hash_provider()?;
        }
        self.resolved_offsets()
    }

    /// Instantiate the configured hash provider.
    pub fn hash_provider(&self) -> StampResult<Box<dyn HashProvider>> {
        let sentinel = u32::try_from(self.hash.sentinel).map_err(|_| {
            StampError::config(format!("hash sentinel 0x{:X} does not fit in 32 bits", self.hash.sentinel))
        })?;
        provider_by_name(&self.hash.provider, sentinel).ok_or_else(|| {
            StampError::config(format!("unknown hash provider '{}'", self.hash.provider))
        })
    }
}

/// Load a config file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
pub fn load_config(path: &Path) -> Result<StampConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    let config = if is_yaml {
        serde_yaml::from_str(&body).context("Failed to parse config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse config JSON")?
    };
    Ok(config)
}

/// Write a config file as pretty JSON.
pub fn save_config(path: &Path, config: &StampConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write config: {}", path.display()))
}

/// Load the project config JSON from disk for a given layout.
pub fn load_project_config(layout: &ProjectLayout) -> Result<StampConfig> {
    load_config(&layout.config_path)
}

/// Convenience wrapper bundling layout, config and resolved paths.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: StampConfig,
    pub publish_dir: PathBuf,
}

impl ProjectContext {
    /// Load project config for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let config = load_project_config(&layout)?;
        Ok(Self::new(layout, config))
    }

    pub fn new(layout: ProjectLayout, config: StampConfig) -> Self {
        let publish_dir = layout.resolve(&config.publish_dir);
        Self { layout, config, publish_dir }
    }

    pub fn ledger(&self) -> VersionLedger {
        VersionLedger::new(&self.publish_dir).with_extension(self.config.image_extension.clone())
    }

    /// Absolute path of the configured info file, if any.
    pub fn info_file(&self) -> Option<PathBuf> {
        self.config.info_file.as_ref().map(|f| self.layout.resolve(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> StampConfig {
        let mut config = StampConfig::new("Demo");
        config.base_address = 0x0800_0000;
        config.addresses = AddressSet {
            firmware_version: 0x0800_4410,
            revision_id: 0x0800_4420,
            file_size: 0x0800_4430,
            checksum: 0x0800_4434,
            hash: 0x0800_4440,
        };
        config
    }

    #[test]
    fn validate_resolves_offsets() {
        let offsets = configured().validate().unwrap();
        assert_eq!(offsets.firmware_version, 0x4410);
        assert_eq!(offsets.checksum, Some(0x4434));
        assert_eq!(offsets.hash, Some(0x4440));
    }

    #[test]
    fn validate_rejects_unknown_hash_provider() {
        let mut config = configured();
        config.hash.provider = "md5".into();
        assert!(matches!(config.validate(), Err(StampError::Configuration(_))));
        config.features.hash = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unrepresentable_component_max() {
        let mut config = configured();
        config.version.component_max = 10;
        assert!(config.validate().is_err());
        config.version.component_width = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let config: StampConfig = serde_json::from_str(
            r#"{"name":"Min","config_version":"0.1.0","base_address":"0x08000000"}"#,
        )
        .unwrap();
        assert_eq!(config.base_address, 0x0800_0000);
        assert_eq!(config.revision_width, 7);
        assert_eq!(config.publish_dir, "fw_publish");
        assert_eq!(config.image_extension, ".bin");
        assert!(config.backup);
        assert_eq!(config.hash.sentinel, 0x1234_5678);
    }
}
