use bgenv::commit::{commit_backend, commit_file};
use bgenv::dump::{project, Fields};
use bgenv::journal::WellKnownField;
use bgenv::select::resolve_mode;
use bgenv::store::file::read_env_file;
use bgenv::{DirStore, EnvConfig, EnvRecord, Error, Journal, RecordStore, SelectMode, UpdateState};
use tempfile::tempdir;

fn seeded(dir: &std::path::Path, revisions: &[u32]) -> DirStore {
    let store = DirStore::open(EnvConfig::new(dir).partitions(revisions.len())).unwrap();
    for (index, &revision) in revisions.iter().enumerate() {
        let mut record = EnvRecord::new();
        record.revision = revision;
        record.set_kernelfile("C:\\linux-a.efi").unwrap();
        record.stamp();
        store.save(index, &record).unwrap();
    }
    store
}

#[test]
fn update_then_confirm_cycle() {
    let dir = tempdir().unwrap();
    let store = seeded(dir.path(), &[5, 3]);

    // Install a new kernel into the older copy.
    let mut journal = Journal::new();
    journal
        .stage_field(WellKnownField::KernelFile, "C:\\linux-b.efi")
        .unwrap();
    journal
        .stage_field(WellKnownField::UpdateState, "INSTALLED")
        .unwrap();
    let outcome = commit_backend(&store, SelectMode::AutoUpdate, &mut journal).unwrap();
    assert_eq!(outcome.partition, Some(1));
    assert!(outcome.report.is_clean());

    let installed = store.load(1).unwrap();
    assert_eq!(installed.revision, 6);
    assert_eq!(installed.kernelfile(), "C:\\linux-b.efi");
    assert_eq!(installed.update_state(), UpdateState::Installed);
    assert!(installed.is_valid());
    assert_eq!(store.open_latest().unwrap().index(), 1);
    assert_eq!(store.open_oldest().unwrap().index(), 0);

    // The bootloader marks it as under test, userspace confirms it.
    let mut journal = Journal::new();
    journal.stage_field(WellKnownField::UpdateState, "2").unwrap();
    commit_backend(&store, SelectMode::Latest, &mut journal).unwrap();
    assert_eq!(store.load(1).unwrap().update_state(), UpdateState::Testing);

    let mut journal = Journal::new();
    journal.stage_field(WellKnownField::UpdateState, "ok").unwrap();
    commit_backend(&store, SelectMode::Latest, &mut journal).unwrap();
    for index in 0..2 {
        assert_eq!(store.load(index).unwrap().update_state(), UpdateState::Ok);
    }
}

#[test]
fn conflicting_selection_is_rejected_before_io() {
    let result = resolve_mode(Some(0), true);
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn out_of_range_partition() {
    let dir = tempdir().unwrap();
    let store = seeded(dir.path(), &[1, 2]);
    let mut journal = Journal::new();
    journal.stage_uservar_arg("x=1").unwrap();

    let result = commit_backend(&store, SelectMode::Index(2), &mut journal);
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(store.load(0).unwrap().revision, 1);
    assert_eq!(store.load(1).unwrap().revision, 2);
}

#[test]
fn uservars_survive_updates_and_deletes() {
    let dir = tempdir().unwrap();
    let store = seeded(dir.path(), &[1, 2]);

    let mut journal = Journal::new();
    journal.stage_uservar_arg("color=blue").unwrap();
    journal.stage_uservar_arg("size=big").unwrap();
    commit_backend(&store, SelectMode::AutoUpdate, &mut journal).unwrap();

    let mut journal = Journal::new();
    journal.stage_uservar_arg("color=").unwrap();
    journal.stage_uservar_arg("size=small").unwrap();
    commit_backend(&store, SelectMode::AutoUpdate, &mut journal).unwrap();

    let latest = store.open_latest().unwrap();
    assert_eq!(latest.record.revision, 4);
    let text = project(&latest.record, Fields::USER);
    assert_eq!(text, "Values:\n\nuser variables:\nsize = small\n\n\n");
}

#[test]
fn file_mode_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BGENV.DAT");

    let mut journal = Journal::new();
    journal.stage_field(WellKnownField::KernelParams, "quiet").unwrap();
    journal.stage_field(WellKnownField::InProgress, "1").unwrap();
    commit_file(&path, false, &mut journal).unwrap();

    let record = read_env_file(&path).unwrap();
    assert_eq!(
        project(&record, "in_progress,kernelargs".parse().unwrap()),
        "Values:\nin_progress:      yes\nkernelargs:       quiet\n\n\n"
    );
}
