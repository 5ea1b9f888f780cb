//! Read-only text rendering of an environment record.

use std::fmt::Write;
use std::str::FromStr;

use crate::codec;
use crate::env::{EnvRecord, UserVars};
use crate::error::Result;
use crate::Error;

/// Set of fields to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields(u8);

impl Fields {
    pub const IN_PROGRESS: Fields = Fields(1 << 0);
    pub const REVISION: Fields = Fields(1 << 1);
    pub const KERNEL: Fields = Fields(1 << 2);
    pub const KERNELARGS: Fields = Fields(1 << 3);
    pub const WATCHDOG_TIMEOUT: Fields = Fields(1 << 4);
    pub const USTATE: Fields = Fields(1 << 5);
    pub const USER: Fields = Fields(1 << 6);

    pub const NONE: Fields = Fields(0);
    pub const ALL: Fields = Fields(0x7f);

    const NAMES: [(&'static str, Fields); 7] = [
        ("in_progress", Fields::IN_PROGRESS),
        ("revision", Fields::REVISION),
        ("kernel", Fields::KERNEL),
        ("kernelargs", Fields::KERNELARGS),
        ("watchdog_timeout", Fields::WATCHDOG_TIMEOUT),
        ("ustate", Fields::USTATE),
        ("user", Fields::USER),
    ];

    pub fn contains(self, other: Fields) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Fields) {
        self.0 |= other.0;
    }
}

impl Default for Fields {
    fn default() -> Self {
        Fields::ALL
    }
}

impl FromStr for Fields {
    type Err = Error;

    /// Comma-separated field names; empty items are ignored.
    fn from_str(list: &str) -> Result<Self> {
        let mut fields = Fields::NONE;
        for token in list.split(',').filter(|t| !t.is_empty()) {
            let field = Self::NAMES
                .iter()
                .find(|(name, _)| *name == token)
                .map(|(_, field)| *field)
                .ok_or_else(|| Error::validation(format!("Unknown output field: {}", token)))?;
            fields.insert(field);
        }
        Ok(fields)
    }
}

/// Renders the selected fields of `record` in a fixed order.
pub fn project(record: &EnvRecord, fields: Fields) -> String {
    let mut out = String::from("Values:\n");
    // Writing into a String cannot fail.
    if fields.contains(Fields::IN_PROGRESS) {
        let _ = writeln!(
            out,
            "in_progress:      {}",
            if record.in_progress { "yes" } else { "no" }
        );
    }
    if fields.contains(Fields::REVISION) {
        let _ = writeln!(out, "revision:         {}", record.revision);
    }
    if fields.contains(Fields::KERNEL) {
        let _ = writeln!(out, "kernel:           {}", record.kernelfile());
    }
    if fields.contains(Fields::KERNELARGS) {
        let _ = writeln!(out, "kernelargs:       {}", record.kernelparams());
    }
    if fields.contains(Fields::WATCHDOG_TIMEOUT) {
        let _ = writeln!(
            out,
            "watchdog timeout: {} seconds",
            record.watchdog_timeout_sec
        );
    }
    if fields.contains(Fields::USTATE) {
        let _ = writeln!(
            out,
            "ustate:           {} ({})",
            record.ustate_raw(),
            record.update_state()
        );
    }
    if fields.contains(Fields::USER) {
        out.push_str("\nuser variables:\n");
        out.push_str(&render_uservars(&record.uservars));
    }
    out.push_str("\n\n");
    out
}

/// One line per live variable, walking the area up to its terminator.
pub fn render_uservars(vars: &UserVars) -> String {
    let mut out = String::new();
    for var in vars.iter() {
        let var = match var {
            Ok(var) => var,
            Err(e) => {
                tracing::warn!(error = %e, "stopped reading user variables");
                break;
            }
        };
        if var.is_deleted() {
            continue;
        }
        let _ = writeln!(out, "{} {}", var.key, codec::render(var.var_type, var.data));
    }
    out
}
