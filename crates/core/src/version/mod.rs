//! Four-component release versions (`V<major>.<minor>.<patch>.<build>`).
//!
//! Each component is bounded by `component_max`; incrementing carries from the
//! build number upwards. What happens when the major component overflows is a
//! policy choice, see [`OverflowPolicy`].

pub mod ledger;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StampError, StampResult};

/// A release version. Ordering is lexicographic over
/// `(major, minor, patch, build)`, which is what the derived `Ord` gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl ReleaseVersion {
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self { major, minor, patch, build }
    }

    pub fn components(&self) -> [u32; 4] {
        [self.major, self.minor, self.patch, self.build]
    }

    fn from_components(c: [u32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }

    /// Parse a filename-style token (`V` + any number of digits per component).
    ///
    /// Used for ledger entries, which may have been produced under a different
    /// component width than the current scheme.
    pub fn from_token(token: &str) -> Option<Self> {
        let body = token.strip_prefix('V')?;
        let mut parts = [0u32; 4];
        let mut count = 0;
        for part in body.split('.') {
            if count == 4 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            parts[count] = part.parse().ok()?;
            count += 1;
        }
        (count == 4).then(|| Self::from_components(parts))
    }
}

/// Unpadded `V1.2.3.4` form.
impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Behaviour when the most significant component overflows.
///
/// Tool versions have traditionally clamped while firmware versions wrap, so
/// both are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Pin every component at `component_max`.
    Clamp,
    /// Restart at `(0, 0, 0, 1)`.
    #[default]
    Reset,
}

fn default_component_max() -> u32 {
    9
}

fn default_component_width() -> usize {
    1
}

/// Parsing, formatting and increment rules for release versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionScheme {
    #[serde(default = "default_component_max")]
    pub component_max: u32,
    /// Exact number of decimal digits per component.
    #[serde(default = "default_component_width")]
    pub component_width: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for VersionScheme {
    fn default() -> Self {
        Self {
            component_max: default_component_max(),
            component_width: default_component_width(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl VersionScheme {
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Reject schemes whose `component_max` cannot be written in
    /// `component_width` digits.
    pub fn validate(&self) -> StampResult<()> {
        let width = self.component_width;
        if width == 0 || width > 9 {
            return Err(StampError::config("version.component_width must be between 1 and 9"));
        }
        if u64::from(self.component_max) >= 10u64.pow(width as u32) {
            return Err(StampError::config(format!(
                "version.component_max {} does not fit in {width} digit(s)",
                self.component_max
            )));
        }
        Ok(())
    }

    /// Whether every component of `version` is within `component_max`.
    pub fn admits(&self, version: &ReleaseVersion) -> bool {
        version.components().iter().all(|&c| c <= self.component_max)
    }

    /// Parse `V<d>.<d>.<d>.<d>` with exactly `component_width` digits per
    /// component, each no larger than `component_max`.
    pub fn parse(&self, text: &str) -> StampResult<ReleaseVersion> {
        let text = text.trim();
        let bad = |why: &str| StampError::format(format!("invalid version '{text}': {why}"));

        let body = text.strip_prefix('V').ok_or_else(|| bad("missing 'V' prefix"))?;
        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 4 {
            return Err(bad("expected four components"));
        }

        let mut components = [0u32; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.len() != self.component_width || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad(&format!("components must be {} digit(s)", self.component_width)));
            }
            let value: u32 = part.parse().map_err(|_| bad("component out of range"))?;
            if value > self.component_max {
                return Err(bad(&format!("component exceeds {}", self.component_max)));
            }
            *slot = value;
        }
        Ok(ReleaseVersion::from_components(components))
    }

    /// Inverse of [`parse`](Self::parse); components are zero-padded to the
    /// configured width.
    pub fn format(&self, version: &ReleaseVersion) -> String {
        let w = self.component_width;
        format!(
            "V{:0w$}.{:0w$}.{:0w$}.{:0w$}",
            version.major, version.minor, version.patch, version.build
        )
    }

    pub fn compare(a: &ReleaseVersion, b: &ReleaseVersion) -> Ordering {
        a.cmp(b)
    }

    /// Bump the build component, carrying into more significant components on
    /// overflow.
    pub fn increment(&self, version: &ReleaseVersion) -> ReleaseVersion {
        let max = self.component_max;
        let mut c = version.components();

        let mut idx = 3;
        loop {
            if let Some(bumped) = c[idx].checked_add(1).filter(|&v| v <= max) {
                c[idx] = bumped;
                break;
            }
            c[idx] = 0;
            if idx == 0 {
                let wrapped = match self.overflow {
                    OverflowPolicy::Clamp => ReleaseVersion::new(max, max, max, max),
                    OverflowPolicy::Reset => ReleaseVersion::new(0, 0, 0, 1),
                };
                warn!(from = %version, to = %wrapped, policy = ?self.overflow, "version overflow");
                return wrapped;
            }
            idx -= 1;
        }

        let next = ReleaseVersion::from_components(c);
        debug!(from = %version, to = %next, "version incremented");
        next
    }
}
