use fwstamp_core::address::ResolvedOffsets;
use fwstamp_core::codec::{self, FieldSlot};
use fwstamp_core::patcher::{self, BackupOutcome};
use fwstamp_core::StampError;

fn write_image(dir: &std::path::Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0xFFu8; len]).expect("write image");
    path
}

#[test]
fn write_field_touches_only_its_slot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_image(dir.path(), "app.bin", 64);

    let slot = FieldSlot::revision_id(0x10, 7);
    let encoded = codec::encode_revision_id("A1B2C3D4E5F6", 7);
    patcher::write_field(&path, &slot, &encoded.bytes).expect("write");

    let data = std::fs::read(&path).unwrap();
    assert_eq!(&data[0x10..0x17], b"a1b2c3d");
    assert!(data[..0x10].iter().all(|&b| b == 0xFF));
    assert!(data[0x17..].iter().all(|&b| b == 0xFF));
    assert_eq!(patcher::read_field(&path, &slot).unwrap(), b"a1b2c3d");
}

#[test]
fn out_of_bounds_write_leaves_file_unmodified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_image(dir.path(), "app.bin", 32);
    let before = std::fs::read(&path).unwrap();

    let slot = FieldSlot::checksum(30);
    let err = patcher::write_field(&path, &slot, &codec::encode_u32(0xDEAD_BEEF)).unwrap_err();
    match err {
        StampError::Bounds { field, required, available } => {
            assert_eq!(field, "checksum");
            assert_eq!(required, 34);
            assert_eq!(available, 32);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn wrong_byte_count_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_image(dir.path(), "app.bin", 32);
    let err = patcher::write_field(&path, &FieldSlot::file_size(0), &[1, 2]).unwrap_err();
    assert!(matches!(err, StampError::Format(_)));
}

#[test]
fn missing_image_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = patcher::read_field(&dir.path().join("nope.bin"), &FieldSlot::file_size(0)).unwrap_err();
    assert!(matches!(err, StampError::Io { .. }));
}

#[test]
fn backup_is_created_next_to_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_image(dir.path(), "app.bin", 16);

    let outcome = patcher::create_backup(&path);
    let backup = outcome.path().expect("backup created").to_path_buf();
    assert_eq!(backup, dir.path().join("app_backup.bin"));
    assert_eq!(std::fs::read(&backup).unwrap(), std::fs::read(&path).unwrap());
}

#[test]
fn failed_backup_is_reported_not_raised() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = patcher::create_backup(&dir.path().join("missing.bin"));
    assert!(matches!(outcome, BackupOutcome::Skipped(_)));
    assert!(outcome.path().is_none());
}

#[test]
fn inspect_reads_fields_and_tolerates_short_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_image(dir.path(), "app.bin", 0x40);

    patcher::write_field(&path, &FieldSlot::firmware_version(0), b"V1.2.3.4\0\0").unwrap();
    patcher::write_field(&path, &FieldSlot::revision_id(0x10, 7), b"abc1234").unwrap();
    patcher::write_field(&path, &FieldSlot::file_size(0x18), &codec::encode_u32(0x40)).unwrap();
    patcher::write_field(&path, &FieldSlot::checksum(0x1C), &codec::encode_u32(0x1122_3344)).unwrap();

    let offsets = ResolvedOffsets {
        firmware_version: 0,
        revision_id: Some(0x10),
        file_size: Some(0x18),
        checksum: Some(0x1C),
        hash: Some(0x30),
    };
    let readout = patcher::inspect(&path, &offsets, 7).expect("inspect");
    assert_eq!(readout.image_len, 0x40);
    assert_eq!(readout.firmware_version.as_deref(), Some("V1.2.3.4"));
    assert_eq!(readout.revision_id.as_deref(), Some("abc1234"));
    assert_eq!(readout.file_size, Some(0x40));
    assert_eq!(readout.checksum, Some(0x1122_3344));
    // 0x30 + 32 > 0x40
    assert_eq!(readout.hash_value, None);
}
