use fwstamp_core::toolchain::{SymbolKeywords, ToolchainKind};
use fwstamp_core::version::VersionScheme;
use fwstamp_core::StampError;

const IAR_INFO: &str = r#"
#include <stdint.h>

#pragma location=0x08004410
__root const char __Firmware_Version[10] = "V1.0.0.0";
#pragma location=0x08004420
__root const char __git_commit_id[7] = "";
#pragma location=0x08004430
__root volatile const uint32_t __file_size = 0;
#pragma location=0x08004434
__root volatile const uint32_t __bin_checksum = 0;
#pragma location=0x08004438
__root volatile const uint32_t __hash_value = 0;
"#;

const MDK_INFO: &str = r#"
const char __Firmware_Version[10] __attribute__((at(0x8001000))) = "V0.0.7.4";
const char __git_commit_id[16] __attribute__((at(0x8001010))) = "";
const uint32_t __file_size __attribute__((at(0x8001020))) = 0;
const uint32_t __bin_checksum __attribute__((at(0x8001030))) = 0;
const uint8_t __hash_value[32] __attribute__((at(0x8001040))) = "";
"#;

#[test]
fn iar_pragma_locations_are_discovered() {
    let set = ToolchainKind::Iar.discover_addresses(IAR_INFO, &SymbolKeywords::default());
    assert_eq!(set.firmware_version, 0x0800_4410);
    assert_eq!(set.revision_id, 0x0800_4420);
    assert_eq!(set.file_size, 0x0800_4430);
    assert_eq!(set.checksum, 0x0800_4434);
    assert_eq!(set.hash, 0x0800_4438);
}

#[test]
fn mdk_at_attributes_are_discovered() {
    let set = ToolchainKind::Mdk.discover_addresses(MDK_INFO, &SymbolKeywords::default());
    assert_eq!(set.firmware_version, 0x0800_1000);
    assert_eq!(set.revision_id, 0x0800_1010);
    assert_eq!(set.file_size, 0x0800_1020);
    assert_eq!(set.checksum, 0x0800_1030);
    assert_eq!(set.hash, 0x0800_1040);
}

#[test]
fn wrong_toolchain_finds_nothing() {
    let set = ToolchainKind::Mdk.discover_addresses(IAR_INFO, &SymbolKeywords::default());
    assert_eq!(set.firmware_version, 0);
    assert_eq!(set.checksum, 0);
}

#[test]
fn custom_keywords_are_used() {
    let src = "const uint32_t g_crc __attribute__((at(0x8002000))) = 0;";
    let keywords = SymbolKeywords { checksum: "g_crc".into(), ..SymbolKeywords::default() };
    let set = ToolchainKind::Mdk.discover_addresses(src, &keywords);
    assert_eq!(set.checksum, 0x0800_2000);
}

#[test]
fn version_literal_is_extracted() {
    assert_eq!(
        ToolchainKind::Iar.extract_version(IAR_INFO, "__Firmware_Version").as_deref(),
        Some("V1.0.0.0")
    );
    assert_eq!(
        ToolchainKind::Mdk.extract_version(MDK_INFO, "__Firmware_Version").as_deref(),
        Some("V0.0.7.4")
    );
    assert_eq!(ToolchainKind::Mdk.extract_version("int x = 0;", "__Firmware_Version"), None);
}

#[test]
fn update_version_rewrites_only_the_literal() {
    let scheme = VersionScheme::default();
    let updated = ToolchainKind::Mdk
        .update_version(MDK_INFO, "__Firmware_Version", "V0.0.7.5", &scheme)
        .expect("update");
    assert!(updated.contains(r#"__attribute__((at(0x8001000))) = "V0.0.7.5";"#));
    assert_eq!(updated.len(), MDK_INFO.len());
    assert_eq!(
        ToolchainKind::Mdk.extract_version(&updated, "__Firmware_Version").as_deref(),
        Some("V0.0.7.5")
    );
}

#[test]
fn update_version_rejects_bad_input() {
    let scheme = VersionScheme::default();
    let bad_version = ToolchainKind::Iar.update_version(IAR_INFO, "__Firmware_Version", "1.0", &scheme);
    assert!(matches!(bad_version, Err(StampError::Format(_))));

    let no_symbol = ToolchainKind::Iar.update_version("int x;", "__Firmware_Version", "V1.0.0.1", &scheme);
    assert!(matches!(no_symbol, Err(StampError::Format(_))));
}
