use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use fwstamp_core::config::ProjectContext;
use serde::Serialize;
use tracing::debug;

use crate::canonicalize_or_current;

/// Canonicalize `root` and load the project config found under it.
pub fn load_context(root: &str) -> Result<ProjectContext> {
    let root_path = canonicalize_or_current(root)?;
    ProjectContext::from_root(&root_path)
        .with_context(|| format!("No fwstamp project at {} (run `fwstamp init`)", root_path.display()))
}

/// Resolve a user-supplied path; relative paths are taken from the project root.
pub fn resolve_input_path(root: &Path, path: &str) -> PathBuf {
    let input = Path::new(path);
    if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    }
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

pub fn hex32(value: u32) -> String {
    format!("0x{value:08X}")
}

pub fn print_json<T: Serialize>(value: &T, what: &str) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {what} to JSON"))?;
    println!("{}", serialized);
    Ok(())
}

fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
    if !output.status.success() {
        debug!(?args, status = ?output.status, "git query failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Current branch name, if `root` is inside a git work tree with a named HEAD.
pub fn detect_git_branch(root: &Path) -> Option<String> {
    git(root, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
}

/// Full commit hash of HEAD, if available.
pub fn detect_git_revision(root: &Path) -> Option<String> {
    git(root, &["rev-parse", "HEAD"])
}
