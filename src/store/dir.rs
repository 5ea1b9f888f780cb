use std::fs;

use crate::config::EnvConfig;
use crate::env::EnvRecord;
use crate::error::Result;
use crate::flock::FileLock;
use crate::store::file::{read_env_file, write_env_file};
use crate::store::RecordStore;
use crate::Error;

/// Partitions laid out as numbered directories, each holding one
/// environment file. Typically the mount points of the environment
/// partitions, or plain directories in tests.
pub struct DirStore {
    config: EnvConfig,
    _lock: Option<FileLock>,
}

impl DirStore {
    pub fn open(config: EnvConfig) -> Result<Self> {
        if config.partitions == 0 {
            return Err(Error::validation("at least one partition is required"));
        }
        if !config.dir.is_dir() {
            return Err(Error::retrieval(format!(
                "environment directory {} does not exist",
                config.dir.display()
            )));
        }

        let lock = if config.lock {
            Some(FileLock::lock(config.lock_path()).map_err(Error::LockError)?)
        } else {
            None
        };

        tracing::debug!(
            dir = %config.dir.display(),
            partitions = config.partitions,
            "opened environment directory"
        );
        Ok(Self {
            config,
            _lock: lock,
        })
    }

    /// Writes a fresh, zeroed environment into every partition that does
    /// not have one yet.
    pub fn initialize(&self) -> Result<()> {
        for index in 0..self.config.partitions {
            let path = self.config.partition_path(index);
            if path.exists() {
                continue;
            }
            tracing::info!(partition = index, "initializing environment");
            self.save(index, &EnvRecord::new())?;
        }
        Ok(())
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}

impl RecordStore for DirStore {
    fn count(&self) -> usize {
        self.config.partitions
    }

    fn load(&self, index: usize) -> Result<EnvRecord> {
        let path = self.config.partition_path(index);
        read_env_file(&path).map_err(|e| {
            Error::retrieval(format!(
                "could not read environment for index {}: {}",
                index, e
            ))
        })
    }

    fn save(&self, index: usize, record: &EnvRecord) -> Result<()> {
        let path = self.config.partition_path(index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Persist(parent.display().to_string(), e))?;
        }
        write_env_file(&path, record)?;
        tracing::debug!(partition = index, revision = record.revision, "stored environment");
        Ok(())
    }
}
