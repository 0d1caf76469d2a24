//! The publish directory as an append-only, branch-partitioned version history.
//!
//! Published images are named
//! `{project}_{branch}_{version}_{revision}[_{config}][_{YYYYmmdd_HHMMSS}]{ext}`.
//! The version token is found by pattern rather than by position; the token
//! right before it names the branch. There is no other database.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ReleaseVersion, VersionScheme};
use crate::error::{StampError, StampResult};

/// Default extension of published images.
pub const DEFAULT_IMAGE_EXTENSION: &str = ".bin";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Make a branch name usable as a single filename token.
///
/// `_` separates tokens and `/` separates directories, so both become `-`.
pub fn sanitize_branch(branch: &str) -> String {
    branch.trim().replace(['/', '\\', '_'], "-")
}

/// One image found in the publish directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub filename: String,
    /// Token preceding the version token; `None` when the version comes first.
    pub branch: Option<String>,
    pub version: ReleaseVersion,
}

impl PublishedArtifact {
    /// Parse a published filename. Returns `None` when it has the wrong
    /// extension or carries no version token.
    ///
    /// When several tokens look like versions, the first one wins.
    pub fn parse(filename: &str, extension: &str) -> Option<Self> {
        let stem = filename.strip_suffix(extension)?;
        let tokens: Vec<&str> = stem.split('_').collect();
        let (index, version) = tokens
            .iter()
            .enumerate()
            .find_map(|(i, token)| ReleaseVersion::from_token(token).map(|v| (i, v)))?;
        let branch = index.checked_sub(1).map(|i| tokens[i].to_string());
        Some(Self { filename: filename.to_string(), branch, version })
    }

    /// Case-insensitive branch match. An empty or missing `branch` matches
    /// everything.
    pub fn belongs_to(&self, branch: Option<&str>) -> bool {
        let wanted = match branch.map(str::trim) {
            None | Some("") => return true,
            Some(b) => sanitize_branch(b),
        };
        self.branch.as_deref().is_some_and(|own| own.eq_ignore_ascii_case(&wanted))
    }
}

/// Builder for a publish filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub project: String,
    pub branch: String,
    pub version: String,
    pub revision: String,
    pub config: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub extension: String,
}

impl ArtifactName {
    pub fn new(
        project: impl Into<String>,
        branch: impl Into<String>,
        version: &ReleaseVersion,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
            version: version.to_string(),
            revision: revision.into(),
            config: None,
            timestamp: None,
            extension: DEFAULT_IMAGE_EXTENSION.to_string(),
        }
    }

    pub fn with_config(mut self, config: Option<String>) -> Self {
        self.config = config.filter(|c| !c.is_empty());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<NaiveDateTime>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Render with a pre-formatted version string (e.g. zero-padded).
    pub fn with_version_text(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn file_name(&self) -> String {
        let branch = match sanitize_branch(&self.branch) {
            b if b.is_empty() => "main".to_string(),
            b => b,
        };
        let mut name = format!("{}_{}_{}_{}", self.project, branch, self.version, self.revision);
        if let Some(config) = &self.config {
            name.push('_');
            name.push_str(config);
        }
        if let Some(ts) = &self.timestamp {
            name.push('_');
            name.push_str(&ts.format(TIMESTAMP_FORMAT).to_string());
        }
        name.push_str(&self.extension);
        name
    }
}

/// Summary of a prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub kept: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Read-mostly view over a publish directory.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    dir: PathBuf,
    extension: String,
}

impl VersionLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), extension: DEFAULT_IMAGE_EXTENSION.to_string() }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every parseable artifact in one directory listing snapshot.
    ///
    /// A missing directory is an empty ledger.
    pub fn scan(&self) -> StampResult<Vec<PublishedArtifact>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "publish directory missing; ledger empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StampError::io(&self.dir, err)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StampError::io(&self.dir, err))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            match PublishedArtifact::parse(&filename, &self.extension) {
                Some(artifact) => artifacts.push(artifact),
                None => debug!(%filename, "skipping file without version token"),
            }
        }
        Ok(artifacts)
    }

    fn latest_artifact(&self, branch: Option<&str>) -> StampResult<Option<PublishedArtifact>> {
        let latest = self
            .scan()?
            .into_iter()
            .filter(|a| a.belongs_to(branch))
            .max_by(|a, b| a.version.cmp(&b.version));
        match &latest {
            Some(artifact) => {
                info!(branch = ?branch, version = %artifact.version, file = %artifact.filename, "latest published version")
            }
            None => info!(branch = ?branch, "no published version"),
        }
        Ok(latest)
    }

    /// Highest version published for `branch` (all branches when `None`/empty).
    pub fn latest_for_branch(&self, branch: Option<&str>) -> StampResult<Option<ReleaseVersion>> {
        Ok(self.latest_artifact(branch)?.map(|a| a.version))
    }

    /// Like [`latest_for_branch`](Self::latest_for_branch), but the highest
    /// version must be representable under `scheme`.
    pub fn latest_in_scheme(
        &self,
        branch: Option<&str>,
        scheme: &VersionScheme,
    ) -> StampResult<Option<ReleaseVersion>> {
        match self.latest_artifact(branch)? {
            Some(artifact) if !scheme.admits(&artifact.version) => Err(StampError::format(format!(
                "published image '{}' has version {} with a component above {}",
                artifact.filename, artifact.version, scheme.component_max
            ))),
            latest => Ok(latest.map(|a| a.version)),
        }
    }

    /// Artifacts for `branch`, highest version first.
    pub fn list(&self, branch: Option<&str>) -> StampResult<Vec<PublishedArtifact>> {
        let mut artifacts: Vec<_> =
            self.scan()?.into_iter().filter(|a| a.belongs_to(branch)).collect();
        artifacts.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.filename.cmp(&b.filename)));
        Ok(artifacts)
    }

    /// Copy `image` into the ledger under `name`. Existing entries are never
    /// overwritten.
    pub fn publish(&self, image: &Path, name: &ArtifactName) -> StampResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|err| StampError::io(&self.dir, err))?;
        let target = self.dir.join(name.file_name());

        let mut source = fs::File::open(image).map_err(|err| StampError::io(image, err))?;
        let mut dest = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|err| StampError::io(&target, err))?;
        io::copy(&mut source, &mut dest).map_err(|err| StampError::io(&target, err))?;

        info!(target = %target.display(), "image published");
        Ok(target)
    }

    /// Delete all but the `keep` highest-version artifacts (across branches).
    pub fn prune(&self, keep: usize) -> StampResult<PruneReport> {
        let artifacts = self.list(None)?;
        let mut report = PruneReport { kept: artifacts.len().min(keep), ..Default::default() };
        for artifact in artifacts.into_iter().skip(keep) {
            let path = self.dir.join(&artifact.filename);
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(file = %artifact.filename, version = %artifact.version, "pruned");
                    report.deleted.push(artifact.filename);
                }
                Err(err) => {
                    warn!(file = %artifact.filename, %err, "failed to prune");
                    report.failed.push(artifact.filename);
                }
            }
        }
        Ok(report)
    }
}

/// Highest version in `dir` for `branch`, using the default image extension.
pub fn latest_for_branch(dir: &Path, branch: Option<&str>) -> StampResult<Option<ReleaseVersion>> {
    VersionLedger::new(dir).latest_for_branch(branch)
}
