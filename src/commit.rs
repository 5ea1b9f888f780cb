//! Replaying a journal onto a record and persisting the result.
//!
//! Two targets are supported: a slot of a [`RecordStore`] chosen by
//! [`select_target`], and a single environment file outside the redundant
//! set. In both cases the journal is drained first, the record is stamped
//! and only then handed to storage.

use std::path::Path;

use crate::env::{EnvRecord, UpdateState};
use crate::error::Result;
use crate::journal::{ApplyReport, Journal, PendingAction, Task, WellKnownField};
use crate::select::{select_target, SelectMode};
use crate::store::file::{read_env_file, write_env_file};
use crate::store::RecordStore;
use crate::Error;

/// Sets the update state. Kept separate from plain field writes because
/// confirming an environment affects the other copies too.
pub trait UpdateStateApi {
    fn set_global_state(&mut self, target: &mut EnvRecord, state: UpdateState) -> Result<()>;
}

/// Only touches the target record. Used for standalone environment files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalState;

impl UpdateStateApi for LocalState {
    fn set_global_state(&mut self, target: &mut EnvRecord, state: UpdateState) -> Result<()> {
        target.set_update_state(state);
        Ok(())
    }
}

/// Update state over a whole partition set: setting OK also marks every
/// other partition OK, so no stale TESTING or FAILED copy survives a
/// confirmation.
pub struct StoreState<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    target_index: usize,
}

impl<'a, S: RecordStore + ?Sized> StoreState<'a, S> {
    pub fn new(store: &'a S, target_index: usize) -> Self {
        Self {
            store,
            target_index,
        }
    }
}

impl<S: RecordStore + ?Sized> UpdateStateApi for StoreState<'_, S> {
    fn set_global_state(&mut self, target: &mut EnvRecord, state: UpdateState) -> Result<()> {
        target.set_update_state(state);
        if state != UpdateState::Ok {
            return Ok(());
        }

        let mut first_error = None;
        for index in (0..self.store.count()).filter(|&i| i != self.target_index) {
            let mut handle = match self.store.open_by_index(index) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(partition = index, error = %e, "skipping partition");
                    continue;
                }
            };
            if handle.record.update_state() == UpdateState::Ok {
                self.store.close(handle);
                continue;
            }
            handle.record.set_update_state(UpdateState::Ok);
            let result = self.store.write(&mut handle);
            self.store.close(handle);
            match result {
                Ok(()) => tracing::debug!(partition = index, "confirmed partition"),
                Err(e) => {
                    tracing::error!(partition = index, error = %e, "could not confirm partition");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Applies a single journal action to `record`.
pub fn apply_action(
    record: &mut EnvRecord,
    action: &PendingAction,
    state_api: &mut dyn UpdateStateApi,
) -> Result<()> {
    match action.task {
        Task::Set => {
            tracing::debug!(
                key = %action.key,
                var_type = action.var_type,
                "task = SET"
            );
            match WellKnownField::from_key(&action.key) {
                Some(field) => field.apply(record, &action.payload, state_api),
                None => record
                    .uservars
                    .set(&action.key, action.var_type, &action.payload),
            }
        }
        Task::Delete => {
            tracing::debug!(key = %action.key, "task = DEL");
            if WellKnownField::from_key(&action.key).is_some() {
                return Err(Error::apply(
                    &action.key,
                    "built-in fields cannot be deleted",
                ));
            }
            record.uservars.delete(&action.key)
        }
    }
}

/// Drains `journal` onto `record` and restamps it.
pub fn apply(
    record: &mut EnvRecord,
    journal: &mut Journal,
    state_api: &mut dyn UpdateStateApi,
) -> ApplyReport {
    tracing::debug!(actions = journal.len(), "processing journal");
    let report = journal.drain_into(record, state_api);
    record.stamp();
    report
}

#[derive(Debug)]
pub struct CommitOutcome {
    /// Slot that was written; `None` for file targets.
    pub partition: Option<usize>,
    pub record: EnvRecord,
    pub report: ApplyReport,
}

/// Selects a slot, replays the journal onto it and writes it back. The
/// handle is closed on every path, including a failed write.
pub fn commit_backend<S: RecordStore + ?Sized>(
    store: &S,
    mode: SelectMode,
    journal: &mut Journal,
) -> Result<CommitOutcome> {
    let selection = select_target(store, mode)?;
    let source = selection.source;
    let mut handle = selection.target;
    let partition = handle.index();

    let report = {
        let mut state_api = StoreState::new(store, partition);
        apply(&mut handle.record, journal, &mut state_api)
    };

    let result = store.write(&mut handle);
    let record = handle.record.clone();
    store.close(handle);

    match result {
        Ok(()) => {
            tracing::info!(
                partition,
                source = ?source,
                revision = record.revision,
                "environment updated"
            );
            Ok(CommitOutcome {
                partition: Some(partition),
                record,
                report,
            })
        }
        Err(e) => {
            tracing::error!(partition, error = %e, "error storing environment");
            Err(e)
        }
    }
}

/// Replays the journal onto a standalone environment file. With `preserve`
/// the existing file is the starting point, otherwise a zeroed record.
pub fn commit_file(path: &Path, preserve: bool, journal: &mut Journal) -> Result<CommitOutcome> {
    let mut record = if preserve {
        read_env_file(path)?
    } else {
        EnvRecord::default()
    };

    let report = apply(&mut record, journal, &mut LocalState);
    write_env_file(path, &record)?;
    tracing::info!(path = %path.display(), "environment file written");

    Ok(CommitOutcome {
        partition: None,
        record,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::tempdir;

    fn store_with(revisions: &[u32]) -> MemoryStore {
        let store = MemoryStore::new(revisions.len());
        for (index, &revision) in revisions.iter().enumerate() {
            let mut record = EnvRecord::new();
            record.revision = revision;
            record.set_kernelfile("C:\\linux.efi").unwrap();
            record.set_update_state(UpdateState::Testing);
            record.stamp();
            store.save(index, &record).unwrap();
        }
        store.reset_counters();
        store
    }

    #[test]
    fn test_auto_update_promotes_oldest() {
        let store = store_with(&[5, 3]);
        let mut journal = Journal::new();
        journal
            .stage_field(WellKnownField::KernelParams, "root=/dev/sda3")
            .unwrap();

        let outcome = commit_backend(&store, SelectMode::AutoUpdate, &mut journal).unwrap();

        assert_eq!(outcome.partition, Some(1));
        let stored = store.load(1).unwrap();
        assert_eq!(stored.revision, 6);
        assert_eq!(stored.kernelfile(), "C:\\linux.efi");
        assert_eq!(stored.kernelparams(), "root=/dev/sda3");
        assert!(stored.is_valid());
        // The source copy is untouched.
        assert_eq!(store.load(0).unwrap().revision, 5);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_explicit_index() {
        let store = store_with(&[5, 3]);
        let mut journal = Journal::new();
        journal.stage_uservar_arg("slot=b").unwrap();

        commit_backend(&store, SelectMode::Index(1), &mut journal).unwrap();
        let stored = store.load(1).unwrap();
        assert_eq!(stored.revision, 3);
        assert!(stored.uservars.get("slot").unwrap().is_some());
        assert!(store.load(0).unwrap().uservars.get("slot").unwrap().is_none());
    }

    #[test]
    fn test_latest_is_default_target() {
        let store = store_with(&[2, 9]);
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::WatchdogTimeout, "10").unwrap();

        let outcome = commit_backend(&store, SelectMode::Latest, &mut journal).unwrap();
        assert_eq!(outcome.partition, Some(1));
        assert_eq!(store.load(1).unwrap().watchdog_timeout_sec, 10);
    }

    #[test]
    fn test_out_of_range_index_touches_nothing() {
        let store = store_with(&[1, 2]);
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::Revision, "7").unwrap();

        let result = commit_backend(&store, SelectMode::Index(2), &mut journal);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.loads(), 0);
        assert_eq!(store.saves(), 0);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_failed_write_still_closes() {
        let store = store_with(&[1, 2]);
        store.fail_writes(true);
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::Revision, "7").unwrap();

        let result = commit_backend(&store, SelectMode::Index(0), &mut journal);
        assert!(matches!(result, Err(Error::Persist(_, _))));
        assert_eq!(store.closes(), 1);
        assert_eq!(store.load(0).unwrap().revision, 1);
    }

    #[test]
    fn test_confirm_resets_other_partitions() {
        let store = store_with(&[4, 3, 2]);
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::UpdateState, "0").unwrap();

        commit_backend(&store, SelectMode::Index(0), &mut journal).unwrap();
        for index in 0..3 {
            let record = store.load(index).unwrap();
            assert_eq!(record.update_state(), UpdateState::Ok, "partition {}", index);
            assert!(record.is_valid());
        }
    }

    #[test]
    fn test_confirm_continues_past_failed_partition() {
        let store = store_with(&[4, 3, 2]);
        store.fail_writes_to(1);
        let mut target = store.load(0).unwrap();

        let result = StoreState::new(&store, 0).set_global_state(&mut target, UpdateState::Ok);
        assert!(matches!(result, Err(Error::Persist(_, _))));
        assert_eq!(target.update_state(), UpdateState::Ok);
        assert_eq!(store.load(1).unwrap().update_state(), UpdateState::Testing);
        assert_eq!(store.load(2).unwrap().update_state(), UpdateState::Ok);
        assert_eq!(store.closes(), 2);
    }

    #[test]
    fn test_corrupted_copy_never_replaces_good_one() {
        let store = store_with(&[3, 4]);
        let mut corrupt = store.load(1).unwrap();
        corrupt.revision = 900;
        corrupt.set_kernelfile("garbage").unwrap();
        store.save(1, &corrupt).unwrap();

        let mut journal = Journal::new();
        journal.stage_uservar_arg("slot=b").unwrap();
        let outcome = commit_backend(&store, SelectMode::AutoUpdate, &mut journal).unwrap();

        assert_eq!(outcome.partition, Some(0));
        let stored = store.load(0).unwrap();
        assert_eq!(stored.revision, 4);
        assert_eq!(stored.kernelfile(), "C:\\linux.efi");
        assert!(stored.uservars.get("slot").unwrap().is_some());
        assert!(stored.is_valid());
    }

    #[test]
    fn test_non_ok_state_is_local() {
        let store = store_with(&[4, 3]);
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::UpdateState, "FAILED").unwrap();

        commit_backend(&store, SelectMode::Index(0), &mut journal).unwrap();
        assert_eq!(store.load(0).unwrap().update_state(), UpdateState::Failed);
        assert_eq!(store.load(1).unwrap().update_state(), UpdateState::Testing);
    }

    #[test]
    fn test_apply_errors_do_not_fail_commit() {
        let store = store_with(&[1]);
        let mut journal = Journal::new();
        journal.stage(Task::Set, "ustate", 0, b"x\0");
        journal.stage_field(WellKnownField::Revision, "8").unwrap();

        let outcome = commit_backend(&store, SelectMode::Latest, &mut journal).unwrap();
        assert_eq!(outcome.report.failed.len(), 1);
        assert_eq!(store.load(0).unwrap().revision, 8);
    }

    #[test]
    fn test_builtin_delete_is_apply_error() {
        let mut record = EnvRecord::new();
        let action = PendingAction {
            task: Task::Delete,
            key: "revision".into(),
            var_type: 0,
            payload: vec![],
        };
        let result = apply_action(&mut record, &action, &mut LocalState);
        assert!(matches!(result, Err(Error::Apply { .. })));
    }

    #[test]
    fn test_stamp_is_idempotent() {
        let mut record = EnvRecord::new();
        let mut journal = Journal::new();
        journal.stage_uservar_arg("a=b").unwrap();
        apply(&mut record, &mut journal, &mut LocalState);
        let first = record.crc32();

        apply(&mut record, &mut journal, &mut LocalState);
        assert_eq!(record.crc32(), first);
        assert!(record.is_valid());
    }

    #[test]
    fn test_file_mode_fresh_record() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BGENV.DAT");
        std::fs::write(&path, b"junk")?;

        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::KernelFile, "vmlinuz")?;
        commit_file(&path, false, &mut journal)?;

        let stored = read_env_file(&path)?;
        assert_eq!(stored.kernelfile(), "vmlinuz");
        assert_eq!(stored.revision, 0);
        assert!(stored.is_valid());
        Ok(())
    }

    #[test]
    fn test_file_mode_preserve() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("BGENV.DAT");

        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::KernelFile, "vmlinuz")?;
        journal.stage_uservar_arg("keep=me")?;
        commit_file(&path, false, &mut journal)?;

        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::Revision, "3")?;
        commit_file(&path, true, &mut journal)?;

        let stored = read_env_file(&path)?;
        assert_eq!(stored.kernelfile(), "vmlinuz");
        assert_eq!(stored.revision, 3);
        assert!(stored.uservars.get("keep")?.is_some());

        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::Revision, "4")?;
        commit_file(&path, false, &mut journal)?;
        assert_eq!(read_env_file(&path)?.kernelfile(), "");
        Ok(())
    }

    #[test]
    fn test_file_mode_preserve_requires_readable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("BGENV.DAT");
        let mut journal = Journal::new();
        journal.stage_field(WellKnownField::Revision, "3").unwrap();

        let result = commit_file(&path, true, &mut journal);
        assert!(matches!(result, Err(Error::Retrieval(_))));
        assert!(!path.exists());
    }
}
