use std::fs;
use std::path::{Path, PathBuf};

use fwstamp_core::address::AddressSet;
use fwstamp_core::checksum::{self, ChecksumLayout, Exclusions};
use fwstamp_core::codec::{self, FieldSlot};
use fwstamp_core::config::StampConfig;
use fwstamp_core::hash::{HashProvider, Sha256Hash};
use fwstamp_core::model::FieldName;
use fwstamp_core::orchestrator::{
    self, PatchOrchestrator, PatchStep, RecordingObserver, StepOutcome, VersionRationale,
};
use fwstamp_core::patcher::{self, BackupOutcome};
use fwstamp_core::version::ledger::VersionLedger;
use fwstamp_core::version::{OverflowPolicy, ReleaseVersion, VersionScheme};
use fwstamp_core::StampError;

const BASE: u64 = 0x0800_0000;

/// Firmware version at 0x10, revision at 0x20, size at 0x30, checksum at
/// 0x34, hash at 0x40.
fn demo_config() -> StampConfig {
    let mut config = StampConfig::new("Demo");
    config.base_address = BASE;
    config.addresses = AddressSet {
        firmware_version: BASE + 0x10,
        revision_id: BASE + 0x20,
        file_size: BASE + 0x30,
        checksum: BASE + 0x34,
        hash: BASE + 0x40,
    };
    config
}

fn demo_image(dir: &Path, len: usize) -> PathBuf {
    let path = dir.join("app.bin");
    let mut data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    data[0x10..0x1A].copy_from_slice(b"V1.0.0.0\0\0");
    fs::write(&path, data).expect("write image");
    path
}

#[test]
fn full_patch_writes_every_field_and_verifies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x300);

    let orchestrator = PatchOrchestrator::from_config(&demo_config()).expect("valid config");
    let mut observer = RecordingObserver::default();
    let result = orchestrator.patch_with(&image, "A1B2C3D4E5F6", &mut observer);

    assert!(result.is_success(), "{result:?}");
    assert!(result.warnings.is_empty());
    assert_eq!(result.image_len, 0x300);
    assert_eq!(
        result.fields_written.iter().copied().collect::<Vec<_>>(),
        vec![FieldName::RevisionId, FieldName::FileSize, FieldName::Checksum, FieldName::Hash]
    );
    assert_eq!(result.hash_provider.as_deref(), Some("sentinel"));
    assert_eq!(result.backup_path(), Some(dir.path().join("app_backup.bin").as_path()));

    let data = fs::read(&image).unwrap();
    assert_eq!(&data[0x10..0x18], b"V1.0.0.0");
    assert_eq!(&data[0x20..0x27], b"a1b2c3d");
    assert_eq!(codec::decode_u32(&data[0x30..0x34]).unwrap(), 0x300);
    assert_eq!(codec::decode_hash_slot(&data[0x40..0x60]).unwrap(), 0x1234_5678);

    let stored = codec::decode_u32(&data[0x34..0x38]).unwrap();
    assert_eq!(Some(stored), result.checksum_value);
    assert_eq!(checksum::compute(&data, &ChecksumLayout::new(0x34, Some(0x40))), stored);

    assert_eq!(
        observer.steps(),
        vec![
            PatchStep::Start,
            PatchStep::Backup,
            PatchStep::WriteRevisionId,
            PatchStep::WriteFileSize,
            PatchStep::ComputeChecksum,
            PatchStep::WriteChecksum,
            PatchStep::WriteHashPlaceholder,
            PatchStep::VerifyByReadback,
        ]
    );
    assert!(observer.events.iter().all(|(_, outcome)| matches!(outcome, StepOutcome::Done(_))));
}

#[test]
fn patching_twice_is_stable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x200);
    let orchestrator = PatchOrchestrator::from_config(&demo_config()).unwrap().with_backup(false);

    let first = orchestrator.patch(&image, "abc1234");
    let after_first = fs::read(&image).unwrap();
    let second = orchestrator.patch(&image, "abc1234");

    assert!(first.is_success() && second.is_success());
    assert_eq!(first.checksum_value, second.checksum_value);
    assert_eq!(fs::read(&image).unwrap(), after_first);
}

#[test]
fn disabled_features_are_skipped_and_bytes_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x100);
    let before = fs::read(&image).unwrap();

    let mut config = demo_config();
    config.features.file_size = false;
    config.features.hash = false;
    config.backup = false;

    let mut observer = RecordingObserver::default();
    let result =
        PatchOrchestrator::from_config(&config).unwrap().patch_with(&image, "abc", &mut observer);
    assert!(result.is_success());
    assert!(!result.fields_written.contains(&FieldName::FileSize));
    assert!(!result.fields_written.contains(&FieldName::Hash));
    assert_eq!(result.hash_provider, None);
    assert!(matches!(result.backup, BackupOutcome::Skipped(ref r) if r == "disabled"));
    assert!(!dir.path().join("app_backup.bin").exists());

    let data = fs::read(&image).unwrap();
    assert_eq!(&data[0x20..0x27], b"abc0000");
    assert_eq!(&data[0x30..0x34], &before[0x30..0x34]);
    assert_eq!(&data[0x40..0x60], &before[0x40..0x60]);

    let skipped: Vec<PatchStep> = observer
        .events
        .iter()
        .filter(|(_, outcome)| matches!(outcome, StepOutcome::Skipped(_)))
        .map(|(step, _)| *step)
        .collect();
    assert_eq!(skipped, vec![PatchStep::Backup, PatchStep::WriteFileSize, PatchStep::WriteHashPlaceholder]);
}

#[test]
fn invalid_revision_writes_zeros_and_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x100);
    let result = PatchOrchestrator::from_config(&demo_config())
        .unwrap()
        .with_backup(false)
        .patch(&image, "not-a-hash");

    assert!(result.is_success());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("revision id"));
    let data = fs::read(&image).unwrap();
    assert_eq!(&data[0x20..0x27], &[0u8; 7]);
}

#[test]
fn bounds_failure_stops_with_partial_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Large enough for revision, size and checksum but not the hash slot.
    let image = demo_image(dir.path(), 0x50);

    let mut observer = RecordingObserver::default();
    let result = PatchOrchestrator::from_config(&demo_config())
        .unwrap()
        .with_backup(false)
        .patch_with(&image, "abc1234", &mut observer);

    assert!(!result.is_success());
    assert!(!result.verification_passed);
    let failure = result.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.step, PatchStep::WriteHashPlaceholder);
    assert_eq!(failure.kind, "bounds");
    assert!(result.fields_written.contains(&FieldName::Checksum));
    assert!(!result.fields_written.contains(&FieldName::Hash));
    assert_eq!(observer.steps().last(), Some(&PatchStep::WriteHashPlaceholder));

    // Fields already written stay written.
    let data = fs::read(&image).unwrap();
    assert_eq!(&data[0x20..0x27], b"abc1234");
}

#[test]
fn missing_image_fails_at_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result =
        PatchOrchestrator::from_config(&demo_config()).unwrap().patch(&dir.path().join("nope.bin"), "abc");
    let failure = result.failure.expect("failure");
    assert_eq!(failure.step, PatchStep::Start);
    assert_eq!(failure.kind, "io");
    assert!(result.fields_written.is_empty());
}

#[test]
fn configuration_errors_surface_before_any_write() {
    let mut config = demo_config();
    config.addresses.checksum = 0;
    assert!(matches!(PatchOrchestrator::from_config(&config), Err(StampError::Configuration(_))));

    config.base_address = 0;
    assert!(matches!(PatchOrchestrator::from_config(&config), Err(StampError::Configuration(_))));
}

#[test]
fn sha256_provider_fills_the_whole_slot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x200);
    let mut config = demo_config();
    config.hash.provider = "sha256".into();
    config.backup = false;

    let result = PatchOrchestrator::from_config(&config).unwrap().patch(&image, "abc1234");
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.hash_provider.as_deref(), Some("sha256"));

    let data = fs::read(&image).unwrap();
    let excluded = Exclusions::new([0x34..0x38, 0x40..0x60]);
    let expected = Sha256Hash.slot_bytes(&data, &excluded);
    assert_eq!(&data[0x40..0x60], &expected[..]);
    assert_eq!(
        patcher::read_field(&image, &FieldSlot::hash(0x40)).unwrap(),
        expected.to_vec()
    );
}

#[test]
fn next_version_follows_the_ledger() {
    let scheme = VersionScheme::default();

    let stale = orchestrator::next_version(
        &scheme,
        ReleaseVersion::new(1, 0, 0, 0),
        Some(ReleaseVersion::new(1, 0, 0, 2)),
    );
    assert_eq!(stale.version, ReleaseVersion::new(1, 0, 0, 3));
    assert_eq!(stale.rationale.to_string(), "based on published version");

    let ahead = orchestrator::next_version(
        &scheme,
        ReleaseVersion::new(2, 0, 0, 0),
        Some(ReleaseVersion::new(1, 0, 0, 9)),
    );
    assert_eq!(ahead.version, ReleaseVersion::new(2, 0, 0, 0));
    assert_eq!(ahead.rationale.to_string(), "current exceeds published");
}

#[test]
fn next_version_at_the_top_follows_overflow_policy() {
    let top = ReleaseVersion::new(9, 9, 9, 9);
    let reset = orchestrator::next_version(&VersionScheme::default(), top, None);
    assert_eq!(reset.version, ReleaseVersion::new(0, 0, 0, 1));

    let clamp = VersionScheme::default().with_overflow(OverflowPolicy::Clamp);
    assert_eq!(orchestrator::next_version(&clamp, top, Some(top)).version, top);
}

#[test]
fn plan_release_reads_the_branch_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("Demo_main_V1.0.0.2_abc.bin"), b"x").unwrap();
    fs::write(dir.path().join("Demo_dev_V1.5.0.0_abc.bin"), b"x").unwrap();
    let ledger = VersionLedger::new(dir.path());
    let scheme = VersionScheme::default();

    let plan = orchestrator::plan_release(&scheme, "V1.0.0.0", &ledger, Some("main")).unwrap();
    assert_eq!(plan.version, ReleaseVersion::new(1, 0, 0, 3));
    assert_eq!(plan.published, Some(ReleaseVersion::new(1, 0, 0, 2)));
    assert_eq!(plan.rationale, VersionRationale::BasedOnPublished);

    let fresh = orchestrator::plan_release(&scheme, "V1.0.0.0", &ledger, Some("hotfix")).unwrap();
    assert_eq!(fresh.version, ReleaseVersion::new(1, 0, 0, 1));
    assert_eq!(fresh.rationale, VersionRationale::NoPublishedVersion);

    assert!(matches!(
        orchestrator::plan_release(&scheme, "1.0.0.0", &ledger, None),
        Err(StampError::Format(_))
    ));
}

#[test]
fn failed_backup_is_reported_and_patch_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = demo_image(dir.path(), 0x200);
    fs::create_dir(dir.path().join("app_backup.bin")).expect("occupy backup path");

    let orchestrator = PatchOrchestrator::from_config(&demo_config()).unwrap();
    let mut observer = RecordingObserver::default();
    let result = orchestrator.patch_with(&image, "abc1234", &mut observer);

    assert!(result.is_success(), "{result:?}");
    assert!(matches!(result.backup, BackupOutcome::Skipped(_)));
    assert_eq!(result.backup_path(), None);
    assert!(result.warnings.iter().any(|w| w.starts_with("backup skipped")), "{:?}", result.warnings);
    assert!(observer
        .events
        .iter()
        .any(|(step, outcome)| *step == PatchStep::Backup && matches!(outcome, StepOutcome::Skipped(_))));
    assert!(result.fields_written.contains(&FieldName::Checksum));
    assert!(dir.path().join("app_backup.bin").is_dir());
}

#[test]
fn plan_release_rejects_ledger_versions_outside_the_scheme() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("p_main_V1.0.0.4294967295_abc.bin"), b"x").unwrap();
    let ledger = VersionLedger::new(dir.path());

    let scheme = VersionScheme::default();
    let err = orchestrator::plan_release(&scheme, "V1.0.0.0", &ledger, Some("main")).unwrap_err();
    assert!(matches!(err, StampError::Format(_)), "{err}");
    assert!(err.to_string().contains("p_main_V1.0.0.4294967295_abc.bin"), "{err}");

    fs::write(dir.path().join("p_dev_V10.0.0.0_abc.bin"), b"x").unwrap();
    let err = orchestrator::plan_release(&scheme, "V1.0.0.0", &ledger, Some("dev")).unwrap_err();
    assert!(err.to_string().contains("p_dev_V10.0.0.0_abc.bin"), "{err}");

    let wide = VersionScheme { component_max: 99, component_width: 2, ..Default::default() };
    let plan = orchestrator::plan_release(&wide, "V01.00.00.00", &ledger, Some("dev")).unwrap();
    assert_eq!(plan.version, ReleaseVersion::new(10, 0, 0, 1));
}

#[test]
fn plan_release_rejects_an_unrepresentable_scheme() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = VersionLedger::new(dir.path());
    let scheme = VersionScheme { component_max: u32::MAX, component_width: 9, ..Default::default() };
    assert!(matches!(
        orchestrator::plan_release(&scheme, "V000000001.000000000.000000000.000000000", &ledger, None),
        Err(StampError::Configuration(_))
    ));
}

#[test]
fn incrementing_a_saturated_component_still_moves_forward() {
    let top = ReleaseVersion::new(1, 0, 0, u32::MAX);
    let current = ReleaseVersion::new(1, 0, 0, 0);
    let plan = orchestrator::next_version(&VersionScheme::default(), current, Some(top));
    assert_eq!(plan.version, ReleaseVersion::new(1, 0, 1, 0));
    assert!(plan.version > top);
}
