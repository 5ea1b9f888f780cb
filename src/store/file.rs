//! Single environment records stored as flat files (`BGENV.DAT`).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::env::{EnvRecord, ENV_RECORD_SIZE};
use crate::error::Result;
use crate::Error;

/// Reads one record from `path`. A short file is an error; a stale stamp is
/// only logged, since the caller is about to restamp anyway.
pub fn read_env_file(path: &Path) -> Result<EnvRecord> {
    let mut file = File::open(path).map_err(|e| {
        Error::retrieval(format!("cannot open {}: {}", path.display(), e))
    })?;

    let mut buf = vec![0u8; ENV_RECORD_SIZE];
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::retrieval(format!(
            "error reading environment data from {}: end of file encountered",
            path.display()
        )),
        _ => Error::retrieval(format!(
            "error reading environment data from {}: {}",
            path.display(),
            e
        )),
    })?;

    let record = EnvRecord::decode(&buf)?;
    if let Err(e) = record.verify() {
        tracing::warn!(path = %path.display(), error = %e, "environment file has a stale stamp");
    }
    Ok(record)
}

/// Replaces `path` with `record`. The record goes to a sibling temporary
/// file first and is renamed into place once it is synced, so the target
/// holds either the old or the new record.
pub fn write_env_file(path: &Path, record: &EnvRecord) -> Result<()> {
    let bytes = record.encode();
    let tmp = temp_path(path);

    let result = write_synced(&tmp, &bytes).and_then(|_| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Persist(path.display().to_string(), e));
    }
    sync_parent(path);
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %parent.display(), error = %e, "could not sync directory");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BGENV.DAT");

        let mut record = EnvRecord::new();
        record.revision = 42;
        record.set_kernelparams("quiet")?;
        record.stamp();
        write_env_file(&path, &record)?;

        assert_eq!(fs::metadata(&path)?.len(), ENV_RECORD_SIZE as u64);
        assert!(!temp_path(&path).exists());
        assert_eq!(read_env_file(&path)?, record);
        Ok(())
    }

    #[test]
    fn test_overwrite_replaces_whole_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BGENV.DAT");
        fs::write(&path, vec![0xAA; ENV_RECORD_SIZE + 100])?;

        write_env_file(&path, &EnvRecord::new())?;
        assert_eq!(fs::metadata(&path)?.len(), ENV_RECORD_SIZE as u64);
        Ok(())
    }

    #[test]
    fn test_short_file_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BGENV.DAT");
        fs::write(&path, b"short")?;

        assert!(matches!(read_env_file(&path), Err(Error::Retrieval(_))));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let result = read_env_file(&dir.path().join("absent"));
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_unwritable_target_is_persist_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("BGENV.DAT");
        let result = write_env_file(&path, &EnvRecord::new());
        assert!(matches!(result, Err(Error::Persist(_, _))));
    }
}
