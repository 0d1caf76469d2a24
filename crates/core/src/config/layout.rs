use std::path::{Path, PathBuf};

/// Logical layout of a stamping project on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself.
/// The CLI or other frontends are responsible for actually creating directories
/// and files based on this layout.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Root directory of the project.
    pub root: PathBuf,
    /// Directory for internal metadata (.fwstamp).
    pub meta_dir: PathBuf,
    /// Path to the project config file (JSON).
    pub config_path: PathBuf,
    /// Default publish directory (fw_publish).
    pub publish_dir: PathBuf,
}

impl ProjectLayout {
    /// Compute the default layout for a project rooted at `root`.
    ///
    /// This does *not* touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".fwstamp");
        let config_path = meta_dir.join("stamp.json");
        let publish_dir = root.join("fw_publish");

        Self { root, meta_dir, config_path, publish_dir }
    }

    /// Resolve a path stored in the config: absolute paths are kept, relative
    /// ones are taken from the project root.
    pub fn resolve(&self, configured: impl AsRef<Path>) -> PathBuf {
        let configured = configured.as_ref();
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }

    /// Express `path` relative to `root` when possible, for storing in config.
    pub fn relative_string(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }
}
