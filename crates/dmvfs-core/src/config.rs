//! VFS configuration.
//!
//! Table sizes and the initial mount list, loaded from RON:
//!
//! ```ron
//! (
//!     max_mount_points: 4,
//!     max_open_files: 32,
//!     mounts: [
//!         (fs: "ramfs", path: "/", config: None),
//!         (fs: "ramfs", path: "/tmp", config: Some("max_files=64")),
//!     ],
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default mount table capacity.
pub const DEFAULT_MAX_MOUNT_POINTS: usize = 8;
/// Default handle table capacity.
pub const DEFAULT_MAX_OPEN_FILES: usize = 16;

/// Errors from loading a [`VfsConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One filesystem to mount at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Registered driver name.
    pub fs: String,
    /// Mount point.
    pub path: String,
    /// Driver config string, passed to the driver's `init`.
    #[serde(default)]
    pub config: Option<String>,
}

impl MountSpec {
    pub fn new(fs: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            fs: fs.into(),
            path: path.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub max_mount_points: usize,
    pub max_open_files: usize,
    pub mounts: Vec<MountSpec>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_mount_points: DEFAULT_MAX_MOUNT_POINTS,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            mounts: Vec::new(),
        }
    }
}

impl VfsConfig {
    /// Parse and validate a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: VfsConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&text)
    }

    /// Reject configs that `Vfs::init_from_config` could never apply.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_mount_points == 0 {
            return Err(ConfigError::Invalid(
                "max_mount_points must be at least 1".to_string(),
            ));
        }
        if self.mounts.len() > self.max_mount_points {
            return Err(ConfigError::Invalid(format!(
                "{} mounts listed but only {} mount points",
                self.mounts.len(),
                self.max_mount_points
            )));
        }
        if let Some(spec) = self.mounts.iter().find(|m| m.fs.is_empty() || m.path.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "mount entry needs both fs and path: {spec:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = VfsConfig::from_ron_str("()").unwrap();
        assert_eq!(config, VfsConfig::default());
        assert_eq!(config.max_mount_points, 8);
        assert_eq!(config.max_open_files, 16);
    }

    #[test]
    fn test_parse_mounts() {
        let config = VfsConfig::from_ron_str(
            r#"(
                max_open_files: 4,
                mounts: [
                    (fs: "ramfs", path: "/"),
                    (fs: "ramfs", path: "/tmp", config: Some("max_files=2")),
                ],
            )"#,
        )
        .unwrap();

        assert_eq!(config.max_mount_points, 8);
        assert_eq!(config.max_open_files, 4);
        assert_eq!(
            config.mounts,
            vec![
                MountSpec::new("ramfs", "/"),
                MountSpec::new("ramfs", "/tmp").with_config("max_files=2"),
            ]
        );
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            VfsConfig::from_ron_str("(max_mount_points: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VfsConfig::from_ron_str(r#"(max_mount_points: 1, mounts: [(fs: "a", path: "/a"), (fs: "b", path: "/b")])"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VfsConfig::from_ron_str("(max_mount_points: \"many\")"),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"(mounts: [(fs: "ramfs", path: "/mnt")])"#).unwrap();

        let config = VfsConfig::load(file.path()).unwrap();
        assert_eq!(config.mounts.len(), 1);
        assert!(matches!(
            VfsConfig::load(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
