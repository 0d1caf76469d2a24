//! The patch sequence and release version planning.
//!
//! A patch runs a fixed, linear sequence:
//!
//! `Start -> Backup -> WriteRevisionId? -> WriteFileSize? -> ComputeChecksum?
//!  -> WriteChecksum? -> WriteHashPlaceholder? -> VerifyByReadback`
//!
//! Optional steps run only when their feature is enabled. Any failure stops the
//! sequence; fields already written stay written and the returned
//! [`PatchResult`] says how far it got. The backup step never fails the patch.
//! The firmware version is never written here: the compiler already put it in.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span};

use crate::address::ResolvedOffsets;
use crate::checksum::{self, ChecksumLayout, Exclusions};
use crate::codec::{self, FieldSlot};
use crate::config::StampConfig;
use crate::error::{StampError, StampResult};
use crate::hash::{HashProvider, SentinelHash};
use crate::model::FieldName;
use crate::patcher::{self, BackupOutcome};
use crate::version::ledger::VersionLedger;
use crate::version::{ReleaseVersion, VersionScheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStep {
    Start,
    Backup,
    WriteRevisionId,
    WriteFileSize,
    ComputeChecksum,
    WriteChecksum,
    WriteHashPlaceholder,
    VerifyByReadback,
}

impl PatchStep {
    pub fn as_str(self) -> &'static str {
        match self {
            PatchStep::Start => "start",
            PatchStep::Backup => "backup",
            PatchStep::WriteRevisionId => "write_revision_id",
            PatchStep::WriteFileSize => "write_file_size",
            PatchStep::ComputeChecksum => "compute_checksum",
            PatchStep::WriteChecksum => "write_checksum",
            PatchStep::WriteHashPlaceholder => "write_hash_placeholder",
            PatchStep::VerifyByReadback => "verify_by_readback",
        }
    }
}

impl fmt::Display for PatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum StepOutcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

/// Receives step outcomes as a patch progresses.
///
/// Passed into each invocation, so its lifetime is that of one patch call.
pub trait PatchObserver {
    fn step_finished(&mut self, step: PatchStep, outcome: &StepOutcome);
}

/// Forwards step outcomes to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PatchObserver for TracingObserver {
    fn step_finished(&mut self, step: PatchStep, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Done(detail) => info!(step = step.as_str(), %detail, "step done"),
            StepOutcome::Skipped(reason) => info!(step = step.as_str(), %reason, "step skipped"),
            StepOutcome::Failed(reason) => error!(step = step.as_str(), %reason, "step failed"),
        }
    }
}

/// Keeps every outcome, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<(PatchStep, StepOutcome)>,
}

impl RecordingObserver {
    pub fn steps(&self) -> Vec<PatchStep> {
        self.events.iter().map(|(step, _)| *step).collect()
    }
}

impl PatchObserver for RecordingObserver {
    fn step_finished(&mut self, step: PatchStep, outcome: &StepOutcome) {
        self.events.push((step, outcome.clone()));
    }
}

/// Where and why a patch stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFailure {
    pub step: PatchStep,
    pub kind: String,
    pub message: String,
}

/// Outcome of one patch call. Produced once and handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    pub image: PathBuf,
    pub image_len: u64,
    pub fields_written: BTreeSet<FieldName>,
    pub checksum_value: Option<u32>,
    pub hash_provider: Option<String>,
    pub verification_passed: bool,
    pub backup: BackupOutcome,
    /// Recoverable problems, e.g. a revision id replaced by zeros.
    pub warnings: Vec<String>,
    pub failure: Option<PatchFailure>,
}

impl PatchResult {
    fn new(image: &Path) -> Self {
        Self {
            image: image.to_path_buf(),
            image_len: 0,
            fields_written: BTreeSet::new(),
            checksum_value: None,
            hash_provider: None,
            verification_passed: false,
            backup: BackupOutcome::Skipped("not attempted".into()),
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.verification_passed
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup.path()
    }
}

/// Bookkeeping shared by the steps of one run.
struct Run<'o> {
    result: PatchResult,
    observer: &'o mut dyn PatchObserver,
    expected: Vec<(FieldSlot, Vec<u8>)>,
}

impl Run<'_> {
    fn done(&mut self, step: PatchStep, detail: String) {
        self.observer.step_finished(step, &StepOutcome::Done(detail));
    }

    fn skipped(&mut self, step: PatchStep, reason: &str) {
        self.observer.step_finished(step, &StepOutcome::Skipped(reason.to_string()));
    }

    fn fail(mut self, step: PatchStep, err: StampError) -> PatchResult {
        let message = err.to_string();
        self.observer.step_finished(step, &StepOutcome::Failed(message.clone()));
        self.result.failure = Some(PatchFailure { step, kind: err.kind().to_string(), message });
        self.result
    }

    fn write(&mut self, path: &Path, slot: FieldSlot, bytes: Vec<u8>) -> StampResult<()> {
        patcher::write_field(path, &slot, &bytes)?;
        self.result.fields_written.insert(slot.name);
        self.expected.push((slot, bytes));
        Ok(())
    }
}

/// Drives backup, field writes, checksum and verification for one image.
pub struct PatchOrchestrator {
    offsets: ResolvedOffsets,
    revision_width: usize,
    backup: bool,
    hash: Box<dyn HashProvider>,
}

impl PatchOrchestrator {
    pub fn new(offsets: ResolvedOffsets, revision_width: usize) -> Self {
        Self { offsets, revision_width, backup: true, hash: Box::new(SentinelHash::default()) }
    }

    /// Validate the config and build an orchestrator from it.
    ///
    /// Configuration errors surface here, before any file is opened.
    pub fn from_config(config: &StampConfig) -> StampResult<Self> {
        let offsets = config.validate()?;
        let mut orchestrator = Self::new(offsets, config.revision_width).with_backup(config.backup);
        if config.features.hash {
            orchestrator = orchestrator.with_hash_provider(config.hash_provider()?);
        }
        Ok(orchestrator)
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_hash_provider(mut self, hash: Box<dyn HashProvider>) -> Self {
        self.hash = hash;
        self
    }

    pub fn offsets(&self) -> &ResolvedOffsets {
        &self.offsets
    }

    fn checksum_layout(&self) -> Option<ChecksumLayout> {
        self.offsets.checksum.map(|offset| ChecksumLayout::new(offset, self.offsets.hash))
    }

    /// Patch with the default `tracing` observer.
    pub fn patch(&self, image: &Path, revision: &str) -> PatchResult {
        self.patch_with(image, revision, &mut TracingObserver)
    }

    pub fn patch_with(
        &self,
        image: &Path,
        revision: &str,
        observer: &mut dyn PatchObserver,
    ) -> PatchResult {
        let span = info_span!("patch", image = %image.display());
        let _guard = span.enter();

        let mut run = Run { result: PatchResult::new(image), observer, expected: Vec::new() };

        // Start
        let image_len = match patcher::image_len(image) {
            Ok(len) => len,
            Err(err) => return run.fail(PatchStep::Start, err),
        };
        run.result.image_len = image_len;
        run.done(PatchStep::Start, format!("{image_len} bytes"));

        // Backup (best effort)
        if self.backup {
            let outcome = patcher::create_backup(image);
            match &outcome {
                BackupOutcome::Created(path) => {
                    run.done(PatchStep::Backup, path.display().to_string())
                }
                BackupOutcome::Skipped(reason) => {
                    run.result.warnings.push(format!("backup skipped: {reason}"));
                    run.skipped(PatchStep::Backup, reason);
                }
            }
            run.result.backup = outcome;
        } else {
            run.result.backup = BackupOutcome::Skipped("disabled".into());
            run.skipped(PatchStep::Backup, "disabled");
        }

        // Revision id
        match self.offsets.revision_id {
            Some(offset) => {
                let slot = FieldSlot::revision_id(offset, self.revision_width);
                let encoded = codec::encode_revision_id(revision, self.revision_width);
                if let Some(err) = &encoded.error {
                    run.result.warnings.push(format!("revision id replaced by zero bytes: {err}"));
                }
                let text = codec::decode_revision_id(&encoded.bytes);
                if let Err(err) = run.write(image, slot, encoded.bytes) {
                    return run.fail(PatchStep::WriteRevisionId, err);
                }
                run.done(PatchStep::WriteRevisionId, format!("{text:?} at 0x{offset:X}"));
            }
            None => run.skipped(PatchStep::WriteRevisionId, "feature disabled"),
        }

        // File size
        match self.offsets.file_size {
            Some(offset) => {
                let size = match u32::try_from(image_len) {
                    Ok(size) => size,
                    Err(_) => {
                        let err = StampError::format(format!(
                            "image length {image_len} does not fit the 32-bit size field"
                        ));
                        return run.fail(PatchStep::WriteFileSize, err);
                    }
                };
                let slot = FieldSlot::file_size(offset);
                if let Err(err) = run.write(image, slot, codec::encode_u32(size).to_vec()) {
                    return run.fail(PatchStep::WriteFileSize, err);
                }
                run.done(PatchStep::WriteFileSize, format!("{size} at 0x{offset:X}"));
            }
            None => run.skipped(PatchStep::WriteFileSize, "feature disabled"),
        }

        // Checksum
        match self.checksum_layout() {
            Some(layout) => {
                let crc = match checksum::compute_file(image, &layout) {
                    Ok(crc) => crc,
                    Err(err) => return run.fail(PatchStep::ComputeChecksum, err),
                };
                run.result.checksum_value = Some(crc);
                run.done(PatchStep::ComputeChecksum, format!("0x{crc:08X}"));

                let slot = FieldSlot::checksum(layout.checksum_offset);
                if let Err(err) = run.write(image, slot, codec::encode_u32(crc).to_vec()) {
                    return run.fail(PatchStep::WriteChecksum, err);
                }
                run.done(PatchStep::WriteChecksum, format!("0x{crc:08X} at 0x{:X}", slot.offset));
            }
            None => {
                run.skipped(PatchStep::ComputeChecksum, "feature disabled");
                run.skipped(PatchStep::WriteChecksum, "feature disabled");
            }
        }

        // Hash placeholder
        match self.offsets.hash {
            Some(offset) => {
                let data = match std::fs::read(image) {
                    Ok(data) => data,
                    Err(err) => {
                        return run.fail(PatchStep::WriteHashPlaceholder, StampError::io(image, err))
                    }
                };
                let checksum_range = self.offsets.checksum.map(|c| FieldSlot::checksum(c).range());
                let excluded = Exclusions::new(
                    std::iter::once(FieldSlot::hash(offset).range()).chain(checksum_range),
                );
                let bytes = self.hash.slot_bytes(&data, &excluded);
                run.result.hash_provider = Some(self.hash.name().to_string());

                let slot = FieldSlot::hash(offset);
                if let Err(err) = run.write(image, slot, bytes.to_vec()) {
                    return run.fail(PatchStep::WriteHashPlaceholder, err);
                }
                run.done(
                    PatchStep::WriteHashPlaceholder,
                    format!("{} at 0x{offset:X}", self.hash.name()),
                );
            }
            None => run.skipped(PatchStep::WriteHashPlaceholder, "feature disabled"),
        }

        // Verify by read-back
        if let Err(err) = self.verify(image, &run.expected) {
            return run.fail(PatchStep::VerifyByReadback, err);
        }
        run.result.verification_passed = true;
        let count = run.expected.len();
        run.done(PatchStep::VerifyByReadback, format!("{count} field(s) match"));

        run.result
    }

    fn verify(&self, image: &Path, expected: &[(FieldSlot, Vec<u8>)]) -> StampResult<()> {
        for (slot, bytes) in expected {
            let actual = patcher::read_field(image, slot)?;
            if &actual != bytes {
                return Err(StampError::format(format!(
                    "{} read back {:02x?}, expected {:02x?}",
                    slot.name, actual, bytes
                )));
            }
        }
        if let Some(layout) = self.checksum_layout() {
            let slot = FieldSlot::checksum(layout.checksum_offset);
            let stored = codec::decode_u32(&patcher::read_field(image, &slot)?)?;
            let recomputed = checksum::compute_file(image, &layout)?;
            if stored != recomputed {
                return Err(StampError::format(format!(
                    "stored checksum 0x{stored:08X} does not match recomputed 0x{recomputed:08X}"
                )));
            }
        }
        Ok(())
    }
}

/// Why a particular next version was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionRationale {
    /// Nothing published yet for the branch; the source version was bumped.
    NoPublishedVersion,
    /// The source was already bumped past the ledger by hand.
    CurrentExceedsPublished,
    /// The source matches the latest release; bumped.
    SameAsPublished,
    /// The source is stale; the latest release was bumped.
    BasedOnPublished,
}

impl fmt::Display for VersionRationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionRationale::NoPublishedVersion => "no published version",
            VersionRationale::CurrentExceedsPublished => "current exceeds published",
            VersionRationale::SameAsPublished => "same as published version",
            VersionRationale::BasedOnPublished => "based on published version",
        })
    }
}

/// A planned release version and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextVersion {
    pub version: ReleaseVersion,
    pub current: ReleaseVersion,
    pub published: Option<ReleaseVersion>,
    pub rationale: VersionRationale,
}

/// Choose the next release version from the source's declared version and the
/// highest version already published for the branch.
pub fn next_version(
    scheme: &VersionScheme,
    current: ReleaseVersion,
    ledger_max: Option<ReleaseVersion>,
) -> NextVersion {
    use std::cmp::Ordering;

    let (version, rationale) = match ledger_max {
        None => (scheme.increment(&current), VersionRationale::NoPublishedVersion),
        Some(published) => match VersionScheme::compare(&current, &published) {
            Ordering::Greater => (current, VersionRationale::CurrentExceedsPublished),
            Ordering::Equal => (scheme.increment(&current), VersionRationale::SameAsPublished),
            Ordering::Less => (scheme.increment(&published), VersionRationale::BasedOnPublished),
        },
    };
    info!(%current, published = ?ledger_max.map(|v| v.to_string()), next = %version, %rationale, "next version planned");
    NextVersion { version, current, published: ledger_max, rationale }
}

/// Parse the declared version and plan against the ledger for `branch`.
pub fn plan_release(
    scheme: &VersionScheme,
    current: &str,
    ledger: &VersionLedger,
    branch: Option<&str>,
) -> StampResult<NextVersion> {
    scheme.validate()?;
    let current = scheme.parse(current)?;
    let published = ledger.latest_in_scheme(branch, scheme)?;
    Ok(next_version(scheme, current, published))
}
