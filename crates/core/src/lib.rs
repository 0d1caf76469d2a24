//! fwstamp-core
//!
//! Post-build metadata patching for embedded firmware images.
//!
//! A compiled image carries reserved slots at fixed addresses: a firmware
//! version string (written by the compiler), a revision id, the image size, a
//! CRC-32 checksum and a 32-byte hash slot. This crate resolves those slots,
//! fills them in place, verifies the result and keeps track of released
//! versions through the filenames in a publish directory.
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends; the CLI is a thin wrapper.

pub mod address;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod model;
pub mod orchestrator;
pub mod patcher;
pub mod toolchain;
pub mod version;

pub use error::{StampError, StampResult};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
