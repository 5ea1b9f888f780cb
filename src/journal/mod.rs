//! Ordered journal of pending environment edits.
//!
//! Edits are staged while the command line is read and replayed onto one
//! environment record afterwards. The journal is a plain FIFO: nothing is
//! merged or reordered, so a later edit of a key always wins over an earlier
//! one. Replay is best effort; an action that fails is reported and the
//! next one still runs.

pub mod field;

use std::collections::VecDeque;

use crate::codec;
use crate::commit::{self, UpdateStateApi};
use crate::env::EnvRecord;
use crate::error::Result;
use crate::Error;

pub use field::WellKnownField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Set,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub task: Task,
    pub key: String,
    pub var_type: u64,
    pub payload: Vec<u8>,
}

/// Outcome of replaying a journal.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: Vec<Error>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    actions: VecDeque<PendingAction>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.iter()
    }

    /// Appends an action to the tail.
    pub fn stage(&mut self, task: Task, key: impl Into<String>, var_type: u64, payload: &[u8]) {
        self.actions.push_back(PendingAction {
            task,
            key: key.into(),
            var_type,
            payload: payload.to_vec(),
        });
    }

    /// Validates `arg` for a well-known field and stages it.
    pub fn stage_field(&mut self, field: WellKnownField, arg: &str) -> Result<()> {
        let payload = field.encode_arg(arg)?;
        tracing::debug!(key = field.key(), value = arg, "staged field");
        self.stage(Task::Set, field.key(), 0, &payload);
        Ok(())
    }

    /// Stages a user variable. `None` stages its deletion.
    pub fn stage_uservar(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        if key.is_empty() || key.contains('\0') {
            return Err(Error::validation(format!(
                "Invalid user variable name: {:?}",
                key
            )));
        }
        match value {
            Some(value) => {
                let (var_type, payload) = codec::uservar_string(value);
                self.stage(Task::Set, key, var_type, &payload);
            }
            None => self.stage(Task::Delete, key, codec::uservar_deletion(), &[]),
        }
        Ok(())
    }

    /// Parses a `KEY=VALUE` argument. `KEY` or `KEY=` deletes the variable.
    pub fn stage_uservar_arg(&mut self, arg: &str) -> Result<()> {
        match arg.split_once('=') {
            Some((key, "")) => self.stage_uservar(key, None),
            Some((key, value)) => self.stage_uservar(key, Some(value)),
            None => self.stage_uservar(arg, None),
        }
    }

    /// Replays every staged action onto `record` in staging order and leaves
    /// the journal empty.
    pub fn drain_into(
        &mut self,
        record: &mut EnvRecord,
        state_api: &mut dyn UpdateStateApi,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        while let Some(action) = self.actions.pop_front() {
            match commit::apply_action(record, &action, state_api) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::error!(key = %action.key, error = %e, "journal action failed");
                    report.failed.push(e);
                }
            }
        }
        report
    }
}
