//! Error taxonomy shared by every stamping component.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for image patching, checksum and versioning operations.
#[derive(Debug, Error)]
pub enum StampError {
    /// Missing or zero mandatory address, or an address below the base address.
    ///
    /// Raised before any byte of the image is touched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A field slot does not fit inside the image.
    #[error("{field} slot needs {required} bytes but the image has only {available}")]
    Bounds { field: String, required: u64, available: u64 },

    /// Malformed revision id or version string.
    #[error("Format error: {0}")]
    Format(String),

    /// Underlying filesystem failure for a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StampError {
    pub fn config(msg: impl Into<String>) -> Self {
        StampError::Configuration(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        StampError::Format(msg.into())
    }

    /// Wrap an `io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StampError::Io { path: path.into(), source }
    }

    /// Short machine-friendly tag, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            StampError::Configuration(_) => "configuration",
            StampError::Bounds { .. } => "bounds",
            StampError::Format(_) => "format",
            StampError::Io { .. } => "io",
        }
    }
}

/// Convenience result type for stamping operations.
pub type StampResult<T> = Result<T, StampError>;
