//! Access to the redundant environment copies.
//!
//! A [`RecordStore`] exposes N numbered slots, each holding one
//! [`EnvRecord`]. Opening a slot hands out an [`EnvHandle`] that owns an
//! in-memory copy of the record; `write` persists the copy back to its slot
//! and `close` releases the handle.

pub mod dir;
pub mod file;
pub mod memory;

use crate::env::EnvRecord;
use crate::error::Result;
use crate::select;

pub use dir::DirStore;
pub use memory::MemoryStore;

/// An open environment slot.
#[derive(Debug, Clone)]
pub struct EnvHandle {
    index: usize,
    pub record: EnvRecord,
}

impl EnvHandle {
    pub fn new(index: usize, record: EnvRecord) -> Self {
        Self { index, record }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

pub trait RecordStore {
    /// Number of redundant slots.
    fn count(&self) -> usize;

    /// Reads the record stored in slot `index`.
    fn load(&self, index: usize) -> Result<EnvRecord>;

    /// Replaces the record in slot `index`. Either the whole record is stored
    /// or the slot keeps its previous content.
    fn save(&self, index: usize, record: &EnvRecord) -> Result<()>;

    fn open_by_index(&self, index: usize) -> Result<EnvHandle> {
        select::validate_index(index, self.count())?;
        Ok(EnvHandle::new(index, self.load_verified(index)?))
    }

    /// Loads slot `index`. A copy whose stamp does not match is replaced by
    /// a zeroed, revision 0 record, so it is never selected as latest and
    /// never cloned over a good copy.
    fn load_verified(&self, index: usize) -> Result<EnvRecord> {
        let record = self.load(index)?;
        if let Err(e) = record.verify() {
            tracing::warn!(partition = index, error = %e, "ignoring corrupted environment");
            return Ok(EnvRecord::default());
        }
        Ok(record)
    }

    /// Opens the slot with the highest revision.
    fn open_latest(&self) -> Result<EnvHandle> {
        let index = select::latest_index(&self.revisions()?)?;
        self.open_by_index(index)
    }

    /// Opens the slot with the lowest revision above zero.
    fn open_oldest(&self) -> Result<EnvHandle> {
        let index = select::oldest_index(&self.revisions()?)?;
        self.open_by_index(index)
    }

    /// Stamps and persists the handle's record into its slot.
    fn write(&self, handle: &mut EnvHandle) -> Result<()> {
        handle.record.stamp();
        self.save(handle.index, &handle.record)
    }

    fn close(&self, handle: EnvHandle) {
        tracing::trace!(partition = handle.index, "closing environment");
        drop(handle);
    }

    /// Revision of every slot, in slot order.
    fn revisions(&self) -> Result<Vec<u32>> {
        (0..self.count())
            .map(|index| self.load_verified(index).map(|record| record.revision))
            .collect()
    }
}
