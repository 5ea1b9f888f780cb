use std::path::{Path, PathBuf};

use crate::env::FAT_ENV_FILENAME;

pub const DEFAULT_PARTITIONS: usize = 2;
pub const LOCK_FILE_NAME: &str = ".bgenv.lock";

/// Configuration for a directory of environment partitions.
///
/// Partition `i` lives at `<dir>/<i>/<file_name>`.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Directory holding one sub-directory per partition
    pub dir: PathBuf,

    /// Number of redundant partitions (default: 2)
    pub partitions: usize,

    /// Environment file name inside each partition (BGENV.DAT)
    pub file_name: String,

    /// Take an exclusive lock on the directory while it is open (default: true)
    pub lock: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/boot/bgenv"),
            partitions: DEFAULT_PARTITIONS,
            file_name: FAT_ENV_FILENAME.to_string(),
            lock: true,
        }
    }
}

impl EnvConfig {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the number of partitions
    pub fn partitions(mut self, count: usize) -> Self {
        self.partitions = count;
        self
    }

    /// Enable or disable directory locking
    pub fn lock(mut self, enabled: bool) -> Self {
        self.lock = enabled;
        self
    }

    pub fn partition_path(&self, index: usize) -> PathBuf {
        self.dir.join(index.to_string()).join(&self.file_name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }
}

/// Resolves a `-f` argument. A directory means "the environment file in
/// that directory", which older versions of the tool accepted.
pub fn resolve_env_file(arg: &Path) -> PathBuf {
    if arg.is_dir() {
        tracing::warn!("Using -f to specify only the output directory is deprecated.");
        arg.join(FAT_ENV_FILENAME)
    } else {
        arg.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EnvConfig::default();
        assert_eq!(config.dir, PathBuf::from("/boot/bgenv"));
        assert_eq!(config.partitions, 2);
        assert_eq!(config.file_name, "BGENV.DAT");
        assert!(config.lock);
    }

    #[test]
    fn test_config_builder() {
        let config = EnvConfig::new("/tmp/env").partitions(3).lock(false);

        assert_eq!(config.partitions, 3);
        assert!(!config.lock);
        assert_eq!(
            config.partition_path(2),
            PathBuf::from("/tmp/env/2/BGENV.DAT")
        );
        assert_eq!(config.lock_path(), PathBuf::from("/tmp/env/.bgenv.lock"));
    }

    #[test]
    fn test_resolve_env_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_env_file(dir.path()),
            dir.path().join("BGENV.DAT")
        );
        let file = dir.path().join("custom.dat");
        assert_eq!(resolve_env_file(&file), file);
    }
}
