use std::cell::{Cell, RefCell};

use crate::env::EnvRecord;
use crate::error::Result;
use crate::store::{EnvHandle, RecordStore};
use crate::Error;

/// Slots kept in memory. Counts every access, can drop slots and can be
/// told to fail writes, which makes it the backend of choice for exercising
/// the update protocol.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RefCell<Vec<Option<EnvRecord>>>,
    fail_writes: Cell<bool>,
    failing_slot: Cell<Option<usize>>,
    loads: Cell<usize>,
    saves: Cell<usize>,
    closes: Cell<usize>,
}

impl MemoryStore {
    /// `count` zero-initialized slots.
    pub fn new(count: usize) -> Self {
        Self {
            slots: RefCell::new(vec![Some(EnvRecord::new()); count]),
            ..Default::default()
        }
    }

    /// Makes slot `index` unreadable.
    pub fn remove(&self, index: usize) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(index) {
            *slot = None;
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Rejects writes to slot `index` only.
    pub fn fail_writes_to(&self, index: usize) {
        self.failing_slot.set(Some(index));
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }

    pub fn saves(&self) -> usize {
        self.saves.get()
    }

    pub fn closes(&self) -> usize {
        self.closes.get()
    }

    pub fn reset_counters(&self) {
        self.loads.set(0);
        self.saves.set(0);
        self.closes.set(0);
    }
}

impl RecordStore for MemoryStore {
    fn count(&self) -> usize {
        self.slots.borrow().len()
    }

    fn load(&self, index: usize) -> Result<EnvRecord> {
        self.loads.set(self.loads.get() + 1);
        self.slots
            .borrow()
            .get(index)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| {
                Error::retrieval(format!("could not read environment for index {}", index))
            })
    }

    fn save(&self, index: usize, record: &EnvRecord) -> Result<()> {
        if self.fail_writes.get() || self.failing_slot.get() == Some(index) {
            return Err(Error::Persist(
                format!("partition {}", index),
                std::io::Error::new(std::io::ErrorKind::Other, "write rejected"),
            ));
        }
        let mut slots = self.slots.borrow_mut();
        let slot = slots.get_mut(index).ok_or_else(|| {
            Error::validation(format!("partition {} does not exist", index))
        })?;
        *slot = Some(record.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }

    fn close(&self, handle: EnvHandle) {
        self.closes.set(self.closes.get() + 1);
        drop(handle);
    }
}
