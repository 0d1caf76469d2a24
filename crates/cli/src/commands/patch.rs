use anyhow::{bail, Context, Result};
use fwstamp_core::checksum::{self, ChecksumLayout};
use fwstamp_core::codec::{self, FieldSlot};
use fwstamp_core::orchestrator::{PatchOrchestrator, PatchResult};
use fwstamp_core::patcher::{self, BackupOutcome, FieldReadout};
use serde::Serialize;

use crate::commands::{detect_git_revision, hex32, load_context, print_json, resolve_input_path};
use crate::sha256_file;

#[derive(Debug, Serialize)]
pub struct ChecksumReport {
    pub image: String,
    pub computed: String,
    pub stored: Option<String>,
    pub matches: bool,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub image: String,
    pub sha256: String,
    pub fields: FieldReadout,
}

/// Stamp revision id, size, checksum and hash slot into an image.
///
/// Returns an error (non-zero exit) when any step fails.
pub fn patch_command(
    root: &str,
    image: &str,
    revision: Option<String>,
    no_backup: bool,
    json: bool,
) -> Result<PatchResult> {
    let ctx = load_context(root)?;
    let image_path = resolve_input_path(&ctx.layout.root, image);

    let revision = match revision.or_else(|| detect_git_revision(&ctx.layout.root)) {
        Some(r) => r,
        None => bail!("No --revision given and no git revision found under {}", ctx.layout.root.display()),
    };

    let orchestrator = PatchOrchestrator::from_config(&ctx.config)
        .context("Invalid project configuration")?
        .with_backup(ctx.config.backup && !no_backup);
    let result = orchestrator.patch(&image_path, &revision);

    if json {
        print_json(&result, "patch result")?;
    } else {
        print_patch_result(&result);
    }

    if let Some(failure) = &result.failure {
        bail!("Patch failed at {} ({}): {}", failure.step, failure.kind, failure.message);
    }
    if !result.verification_passed {
        bail!("Patch verification did not pass for {}", image_path.display());
    }
    Ok(result)
}

fn print_patch_result(result: &PatchResult) {
    println!("Patched image: {}", result.image.display());
    println!("  Size: {} bytes", result.image_len);
    match &result.backup {
        BackupOutcome::Created(path) => println!("  Backup: {}", path.display()),
        BackupOutcome::Skipped(reason) => println!("  Backup: skipped ({reason})"),
    }
    let written: Vec<&str> = result.fields_written.iter().map(|f| f.as_str()).collect();
    println!(
        "  Fields written: {}",
        if written.is_empty() { "(none)".to_string() } else { written.join(", ") }
    );
    if let Some(crc) = result.checksum_value {
        println!("  Checksum: {}", hex32(crc));
    }
    if let Some(provider) = &result.hash_provider {
        println!("  Hash slot: {provider}");
    }
    for warning in &result.warnings {
        println!("  Warning: {warning}");
    }
    println!("  Verified: {}", if result.verification_passed { "yes" } else { "no" });
}

/// Compute the image checksum and compare it with the stored value.
pub fn checksum_command(root: &str, image: &str, verify: bool, json: bool) -> Result<ChecksumReport> {
    let ctx = load_context(root)?;
    let image_path = resolve_input_path(&ctx.layout.root, image);
    let offsets = ctx.config.validate().context("Invalid project configuration")?;
    let Some(checksum_offset) = offsets.checksum else {
        bail!("Checksum feature is disabled in this project");
    };

    let layout = ChecksumLayout::new(checksum_offset, offsets.hash);
    let computed = checksum::compute_file(&image_path, &layout)?;
    let stored = patcher::read_field(&image_path, &FieldSlot::checksum(checksum_offset))
        .ok()
        .and_then(|bytes| codec::decode_u32(&bytes).ok());

    let report = ChecksumReport {
        image: image_path.display().to_string(),
        computed: hex32(computed),
        stored: stored.map(hex32),
        matches: stored == Some(computed),
    };

    if json {
        print_json(&report, "checksum report")?;
    } else {
        println!("Image: {}", report.image);
        println!("  Computed: {}", report.computed);
        println!("  Stored:   {}", report.stored.as_deref().unwrap_or("-"));
        println!("  Match: {}", if report.matches { "yes" } else { "no" });
    }

    if verify && !report.matches {
        bail!("Stored checksum does not match computed {}", report.computed);
    }
    Ok(report)
}

/// Read back every configured field of an image.
pub fn inspect_command(root: &str, image: &str, json: bool) -> Result<InspectReport> {
    let ctx = load_context(root)?;
    let image_path = resolve_input_path(&ctx.layout.root, image);
    let offsets = ctx.config.validate().context("Invalid project configuration")?;

    let fields = patcher::inspect(&image_path, &offsets, ctx.config.revision_width)?;
    let report = InspectReport {
        image: image_path.display().to_string(),
        sha256: sha256_file(&image_path)?,
        fields,
    };

    if json {
        print_json(&report, "inspection")?;
    } else {
        let f = &report.fields;
        println!("Image: {}", report.image);
        println!("  Length: {} bytes", f.image_len);
        println!("  SHA-256: {}", report.sha256);
        println!("  Firmware version: {}", f.firmware_version.as_deref().unwrap_or("-"));
        println!("  Revision id: {}", f.revision_id.as_deref().unwrap_or("-"));
        println!("  File size: {}", f.file_size.map(|v| v.to_string()).unwrap_or_else(|| "-".into()));
        println!("  Checksum: {}", f.checksum.map(hex32).unwrap_or_else(|| "-".into()));
        println!("  Hash value: {}", f.hash_value.map(hex32).unwrap_or_else(|| "-".into()));
    }
    Ok(report)
}
