use fwstamp_core::model::{FeatureToggleSet, FieldName};
use fwstamp_core::{version, StampError};

#[test]
fn version_is_non_empty() {
    let v = version();
    assert!(!v.is_empty());
}

#[test]
fn error_kinds_are_stable_tags() {
    assert_eq!(StampError::config("x").kind(), "configuration");
    assert_eq!(StampError::format("x").kind(), "format");
    let bounds = StampError::Bounds { field: "checksum".into(), required: 8, available: 4 };
    assert_eq!(bounds.kind(), "bounds");
    assert_eq!(bounds.to_string(), "checksum slot needs 8 bytes but the image has only 4");
}

#[test]
fn firmware_version_is_always_enabled() {
    let none = FeatureToggleSet::none();
    assert!(none.is_enabled(FieldName::FirmwareVersion));
    assert!(!none.is_enabled(FieldName::Checksum));
    assert!(none.with(FieldName::Checksum, true).is_enabled(FieldName::Checksum));
}
