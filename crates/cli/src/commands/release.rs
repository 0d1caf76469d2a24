use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use fwstamp_core::codec;
use fwstamp_core::config::ProjectContext;
use fwstamp_core::orchestrator::{self, NextVersion};
use fwstamp_core::toolchain::ToolchainKind;
use fwstamp_core::version::ledger::{ArtifactName, PruneReport, PublishedArtifact};
use serde::Serialize;

use crate::commands::{
    detect_git_branch, detect_git_revision, load_context, print_json, resolve_input_path,
};

#[derive(Debug, Serialize)]
pub struct NextVersionReport {
    pub branch: Option<String>,
    pub current: String,
    pub published: Option<String>,
    pub next: String,
    pub rationale: String,
    pub written_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishReport {
    pub source: String,
    pub target: String,
    pub version: String,
    pub branch: String,
}

/// The info file's text together with the toolchain that reads it.
struct InfoSource {
    kind: ToolchainKind,
    path: PathBuf,
    text: String,
}

fn read_info_source(ctx: &ProjectContext) -> Result<InfoSource> {
    let Some(path) = ctx.info_file() else {
        bail!("No info_file configured; pass the version explicitly");
    };
    let Some(kind) = ctx.config.toolchain else {
        bail!("No toolchain configured; set \"toolchain\" to iar or mdk");
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read info file: {}", path.display()))?;
    Ok(InfoSource { kind, path, text })
}

/// Version text declared in the info file.
fn declared_version(ctx: &ProjectContext, info: &InfoSource) -> Result<String> {
    let keyword = &ctx.config.keywords.firmware_version;
    info.kind.extract_version(&info.text, keyword).with_context(|| {
        format!("No {} definition found in {}", keyword, info.path.display())
    })
}

/// Work out the next release version for a branch, optionally writing it back
/// into the info file.
pub fn next_version_command(
    root: &str,
    current: Option<String>,
    branch: Option<String>,
    write: bool,
    json: bool,
) -> Result<NextVersion> {
    let ctx = load_context(root)?;
    let scheme = ctx.config.version;
    let branch = branch.or_else(|| detect_git_branch(&ctx.layout.root));

    let info = if current.is_none() || write { Some(read_info_source(&ctx)?) } else { None };
    let current_text = match (current, &info) {
        (Some(text), _) => text,
        (None, Some(info)) => declared_version(&ctx, info)?,
        (None, None) => bail!("No current version available"),
    };

    let plan = orchestrator::plan_release(&scheme, &current_text, &ctx.ledger(), branch.as_deref())
        .with_context(|| format!("Cannot plan a release from '{}'", current_text.trim()))?;
    let next_text = scheme.format(&plan.version);

    let mut written_to = None;
    if write {
        if let Some(info) = &info {
            let keyword = &ctx.config.keywords.firmware_version;
            let updated = info.kind.update_version(&info.text, keyword, &next_text, &scheme)?;
            fs::write(&info.path, updated)
                .with_context(|| format!("Failed to write info file: {}", info.path.display()))?;
            written_to = Some(info.path.display().to_string());
        }
    }

    let report = NextVersionReport {
        branch,
        current: scheme.format(&plan.current),
        published: plan.published.map(|v| scheme.format(&v)),
        next: next_text,
        rationale: plan.rationale.to_string(),
        written_to,
    };

    if json {
        print_json(&report, "next version")?;
    } else {
        println!("Branch: {}", report.branch.as_deref().unwrap_or("(all)"));
        println!("Current: {}", report.current);
        println!("Published: {}", report.published.as_deref().unwrap_or("-"));
        println!("Next: {} ({})", report.next, report.rationale);
        if let Some(path) = &report.written_to {
            println!("Updated: {path}");
        }
    }
    Ok(plan)
}

/// Copy a patched image into the publish directory under its release name.
#[allow(clippy::too_many_arguments)]
pub fn publish_command(
    root: &str,
    image: &str,
    revision: Option<String>,
    version: Option<String>,
    branch: Option<String>,
    config_name: Option<String>,
    timestamp: bool,
    json: bool,
) -> Result<PathBuf> {
    let ctx = load_context(root)?;
    let config = &ctx.config;
    let scheme = config.version;
    let image_path = resolve_input_path(&ctx.layout.root, image);
    if !image_path.is_file() {
        bail!("Image file does not exist: {}", image_path.display());
    }

    let version_text = match version {
        Some(v) => v,
        None => declared_version(&ctx, &read_info_source(&ctx)?)?,
    };
    scheme.validate()?;
    let version = scheme.parse(&version_text)?;

    let revision = match revision.or_else(|| detect_git_revision(&ctx.layout.root)) {
        Some(r) => codec::normalize_revision_id(&r, config.revision_width)?,
        None => bail!("No --revision given and no git revision found"),
    };
    let branch = branch
        .or_else(|| detect_git_branch(&ctx.layout.root))
        .unwrap_or_else(|| "main".to_string());

    let name = ArtifactName::new(&config.name, &branch, &version, revision)
        .with_version_text(scheme.format(&version))
        .with_config(config_name)
        .with_timestamp(timestamp.then(|| Local::now().naive_local()))
        .with_extension(&config.image_extension);
    let target = ctx.ledger().publish(&image_path, &name)?;

    let report = PublishReport {
        source: image_path.display().to_string(),
        target: target.display().to_string(),
        version: scheme.format(&version),
        branch,
    };
    if json {
        print_json(&report, "publish report")?;
    } else {
        println!("Published {} -> {}", report.source, report.target);
    }
    Ok(target)
}

/// List published images, newest version first.
pub fn ledger_command(root: &str, branch: Option<String>, json: bool) -> Result<Vec<PublishedArtifact>> {
    let ctx = load_context(root)?;
    let artifacts = ctx.ledger().list(branch.as_deref())?;

    if json {
        print_json(&artifacts, "ledger")?;
    } else {
        println!("Published images ({}):", artifacts.len());
        if artifacts.is_empty() {
            println!("  (none)");
        }
        for artifact in &artifacts {
            println!(
                "  - {} [branch: {}] {}",
                artifact.version,
                artifact.branch.as_deref().unwrap_or("-"),
                artifact.filename
            );
        }
    }
    Ok(artifacts)
}

/// Delete all but the `keep` newest published images.
pub fn prune_command(root: &str, keep: usize, json: bool) -> Result<PruneReport> {
    let ctx = load_context(root)?;
    let report = ctx.ledger().prune(keep)?;

    if json {
        print_json(&report, "prune report")?;
    } else {
        println!("Kept {} image(s), deleted {}", report.kept, report.deleted.len());
        for name in &report.deleted {
            println!("  - deleted {name}");
        }
        for name in &report.failed {
            println!("  - FAILED to delete {name}");
        }
    }
    Ok(report)
}
