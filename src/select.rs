//! Choosing which redundant copy an update operates on.
//!
//! Revisions order the copies: the highest revision is the environment the
//! bootloader prefers, the lowest revision above zero is the next one to be
//! overwritten. Ties go to the lower slot index.

use crate::env::EnvRecord;
use crate::error::Result;
use crate::store::{EnvHandle, RecordStore};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Index(usize),
    Oldest,
    Latest,
    /// Clone the latest copy over the oldest one and bump its revision.
    AutoUpdate,
}

/// Turns the partition options of one invocation into a single mode.
/// Without any option the latest copy is updated.
pub fn resolve_mode(part: Option<usize>, auto_update: bool) -> Result<SelectMode> {
    match (part, auto_update) {
        (Some(_), true) => Err(Error::validation(
            "both automatic and manual partition selection. Cannot use -p and -u simultaneously",
        )),
        (Some(index), false) => Ok(SelectMode::Index(index)),
        (None, true) => Ok(SelectMode::AutoUpdate),
        (None, false) => Ok(SelectMode::Latest),
    }
}

pub fn validate_index(index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(Error::validation(format!(
            "Selected partition {} out of range. Valid range: 0..{}",
            index,
            count.saturating_sub(1)
        )));
    }
    Ok(())
}

/// Slot with the highest revision.
pub fn latest_index(revisions: &[u32]) -> Result<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &revision) in revisions.iter().enumerate() {
        if best.map_or(true, |(_, r)| revision > r) {
            best = Some((index, revision));
        }
    }
    best.map(|(index, _)| index)
        .ok_or_else(|| Error::retrieval("no environment partitions available"))
}

/// Slot with the lowest revision above zero. When every slot is at zero the
/// first slot is used.
pub fn oldest_index(revisions: &[u32]) -> Result<usize> {
    if revisions.is_empty() {
        return Err(Error::retrieval("no environment partitions available"));
    }
    let mut best: Option<(usize, u32)> = None;
    for (index, &revision) in revisions.iter().enumerate() {
        if revision == 0 {
            continue;
        }
        if best.map_or(true, |(_, r)| revision < r) {
            best = Some((index, revision));
        }
    }
    Ok(best.map_or(0, |(index, _)| index))
}

#[derive(Debug)]
pub struct Selection {
    pub target: EnvHandle,
    /// Slot the target was cloned from in auto-update mode.
    pub source: Option<usize>,
}

/// Opens the record an update should be applied to.
pub fn select_target<S: RecordStore + ?Sized>(store: &S, mode: SelectMode) -> Result<Selection> {
    match mode {
        SelectMode::Index(index) => {
            validate_index(index, store.count())?;
            let target = store.open_by_index(index)?;
            Ok(Selection {
                target,
                source: None,
            })
        }
        SelectMode::Latest => Ok(Selection {
            target: store.open_latest()?,
            source: None,
        }),
        SelectMode::Oldest => Ok(Selection {
            target: store.open_oldest()?,
            source: None,
        }),
        SelectMode::AutoUpdate => {
            let latest = store.open_latest()?;
            let mut target = match store.open_oldest() {
                Ok(handle) => handle,
                Err(e) => {
                    store.close(latest);
                    return Err(e);
                }
            };
            tracing::info!(
                source = latest.index(),
                target = target.index(),
                revision = target.record.revision,
                "updating environment"
            );
            promote(&latest.record, &mut target.record);
            let source = latest.index();
            store.close(latest);
            Ok(Selection {
                target,
                source: Some(source),
            })
        }
    }
}

/// Copies `latest` over `target` and makes the copy the newest revision.
pub fn promote(latest: &EnvRecord, target: &mut EnvRecord) {
    *target = latest.clone();
    target.revision = latest.revision.wrapping_add(1);
}
