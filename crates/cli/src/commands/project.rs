use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use fwstamp_core::address::{hex_address, AddressSet, ResolvedOffsets};
use fwstamp_core::config::{save_config, ProjectLayout, StampConfig};
use fwstamp_core::model::{FeatureToggleSet, FieldName};
use fwstamp_core::toolchain::ToolchainKind;
use serde::Serialize;

use crate::commands::{load_context, print_dir_status, print_json, resolve_input_path};
use crate::{canonicalize_or_current, infer_project_name};

#[derive(Debug, Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub toolchain: Option<ToolchainKind>,
    pub info_file: Option<String>,
    pub base_address: String,
    pub addresses: AddressSet,
    pub features: FeatureToggleSet,
    pub offsets: Option<ResolvedOffsets>,
    pub config_error: Option<String>,
    pub publish_dir: String,
    pub published: usize,
}

/// Initialize a new project at `root`.
///
/// With `--toolchain` and `--info-file`, field addresses are read from the
/// info source file.
pub fn init_project_command(
    root: &str,
    name: Option<String>,
    toolchain: Option<String>,
    base_address: Option<String>,
    info_file: Option<String>,
) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);

    if layout.config_path.exists() {
        bail!("Project already initialized: {}", layout.config_path.display());
    }

    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    let mut config = StampConfig::new(&project_name);
    if let Some(toolchain) = toolchain {
        config.toolchain = Some(toolchain.parse::<ToolchainKind>()?);
    }
    if let Some(base) = base_address {
        config.base_address = hex_address::parse(&base).map_err(|e| anyhow!(e))?;
    }

    let mut discovered = 0;
    if let Some(info) = info_file {
        let info_path = resolve_input_path(&root_path, &info);
        config.info_file = Some(layout.relative_string(&info_path));
        if let Some(kind) = config.toolchain {
            let source = fs::read_to_string(&info_path)
                .with_context(|| format!("Failed to read info file: {}", info_path.display()))?;
            config.addresses = kind.discover_addresses(&source, &config.keywords);
            discovered = FieldName::ALL.iter().filter(|f| config.addresses.get(**f) != 0).count();
        }
    }

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    fs::create_dir_all(&layout.publish_dir).with_context(|| {
        format!("Failed to create publish dir: {}", layout.publish_dir.display())
    })?;
    save_config(&layout.config_path, &config)?;

    println!("Initialized fwstamp project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.config_path.display());
    println!("  Publish dir: {}", layout.publish_dir.display());
    if let Some(kind) = config.toolchain {
        println!("  Toolchain: {}", kind);
    }
    if let Some(info) = &config.info_file {
        println!("  Info file: {} ({} of {} addresses found)", info, discovered, FieldName::ALL.len());
    }

    Ok(())
}

/// Show configuration, resolved offsets and ledger size for a project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = load_context(root)?;
    let config = &ctx.config;

    let (offsets, config_error) = match config.validate() {
        Ok(offsets) => (Some(offsets), None),
        Err(err) => (None, Some(err.to_string())),
    };
    let published = ctx.ledger().scan().map(|a| a.len()).unwrap_or(0);

    let snapshot = ProjectInfoSnapshot {
        name: config.name.clone(),
        root: ctx.layout.root.display().to_string(),
        config_file: ctx.layout.config_path.display().to_string(),
        config_version: config.config_version.clone(),
        toolchain: config.toolchain,
        info_file: config.info_file.clone(),
        base_address: format!("0x{:08X}", config.base_address),
        addresses: config.addresses,
        features: config.features,
        offsets,
        config_error,
        publish_dir: ctx.publish_dir.display().to_string(),
        published,
    };

    if json {
        return print_json(&snapshot, "project info");
    }

    println!("fwstamp Project Info");
    println!("====================");
    println!("Name: {}", snapshot.name);
    println!("Root: {}", snapshot.root);
    println!("Config file: {}", snapshot.config_file);
    println!("Config version: {}", snapshot.config_version);
    println!(
        "Toolchain: {}",
        snapshot.toolchain.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("Info file: {}", snapshot.info_file.as_deref().unwrap_or("-"));
    println!("Base address: {}", snapshot.base_address);
    println!();

    println!("Fields:");
    for field in FieldName::ALL {
        let enabled = config.features.is_enabled(field);
        let offset = snapshot
            .offsets
            .as_ref()
            .and_then(|o| o.get(field))
            .map(|o| format!("offset 0x{o:X}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  - {:<16} address=0x{:08X} {} [{}]",
            field.as_str(),
            config.addresses.get(field),
            offset,
            if enabled { "enabled" } else { "disabled" }
        );
    }
    if let Some(err) = &snapshot.config_error {
        println!("Config problem: {err}");
    }
    println!();

    println!("Directories:");
    print_dir_status("Meta dir (.fwstamp)", &ctx.layout.meta_dir);
    print_dir_status("Publish dir", &ctx.publish_dir);
    println!("Published images: {}", snapshot.published);

    Ok(())
}
