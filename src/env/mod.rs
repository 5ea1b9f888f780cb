//! On-disk environment record.
//!
//! Every redundant copy of the boot environment is one fixed-size,
//! little-endian record. The bootloader reads the same layout, so field
//! order and widths are fixed:
//!
//! ```text
//! +----------------------+--------+
//! | kernelfile           | 510    |  255 x UTF-16LE, NUL padded
//! | kernelparams         | 510    |  255 x UTF-16LE, NUL padded
//! | in_progress:u8       | 1      |
//! | ustate:u8            | 1      |
//! | watchdog_timeout:u16 | 2      |
//! | revision:u32         | 4      |
//! | user variables       | 131072 |
//! | crc32:u32            | 4      |  over every byte above
//! +----------------------+--------+
//! ```

pub mod ustate;
pub mod uservars;

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::hasher::Hasher;
use crate::Error;

pub use ustate::UpdateState;
pub use uservars::{UserVar, UserVars, ENV_MEM_USERVARS};

pub const ENV_STRING_LENGTH: usize = 255;
/// Longest kernel path or argument string; one unit is kept for the NUL.
pub const ENV_STRING_MAX_CHARS: usize = ENV_STRING_LENGTH - 1;
pub const ENV_RECORD_SIZE: usize = 2 * ENV_STRING_LENGTH * 2 + 1 + 1 + 2 + 4 + ENV_MEM_USERVARS + 4;
pub const CRC_SIZE: usize = 4;
pub const FAT_ENV_FILENAME: &str = "BGENV.DAT";

/// A text field as stored: UTF-16 units, NUL padded. Kept raw so a record
/// written by the bootloader survives a read-modify-write unchanged.
type RawText = [u16; ENV_STRING_LENGTH];

#[derive(Clone, PartialEq, Eq)]
pub struct EnvRecord {
    kernelfile: RawText,
    kernelparams: RawText,
    pub in_progress: bool,
    ustate: u8,
    pub watchdog_timeout_sec: u16,
    pub revision: u32,
    pub uservars: UserVars,
    crc32: u32,
}

impl fmt::Debug for EnvRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvRecord")
            .field("revision", &self.revision)
            .field("kernelfile", &self.kernelfile())
            .field("kernelparams", &self.kernelparams())
            .field("in_progress", &self.in_progress)
            .field("ustate", &self.update_state())
            .field("watchdog_timeout_sec", &self.watchdog_timeout_sec)
            .field("uservars", &self.uservars)
            .field("crc32", &format_args!("{:#010x}", self.crc32))
            .finish()
    }
}

impl Default for EnvRecord {
    fn default() -> Self {
        Self {
            kernelfile: [0; ENV_STRING_LENGTH],
            kernelparams: [0; ENV_STRING_LENGTH],
            in_progress: false,
            ustate: 0,
            watchdog_timeout_sec: 0,
            revision: 0,
            uservars: UserVars::default(),
            crc32: 0,
        }
    }
}

impl EnvRecord {
    /// A zero-initialized record with a valid stamp.
    pub fn new() -> Self {
        let mut record = Self::default();
        record.stamp();
        record
    }

    /// Text up to the first NUL. Invalid UTF-16 is replaced for display
    /// only; the stored units are left alone.
    pub fn kernelfile(&self) -> String {
        raw_to_string(&self.kernelfile)
    }

    pub fn kernelparams(&self) -> String {
        raw_to_string(&self.kernelparams)
    }

    pub fn set_kernelfile(&mut self, value: &str) -> Result<()> {
        check_text("kernelfile", value)?;
        self.kernelfile = string_to_raw(value);
        Ok(())
    }

    pub fn set_kernelparams(&mut self, value: &str) -> Result<()> {
        check_text("kernelparams", value)?;
        self.kernelparams = string_to_raw(value);
        Ok(())
    }

    pub fn update_state(&self) -> UpdateState {
        UpdateState::from_raw(self.ustate)
    }

    /// Raw byte as stored, which may lie outside the known states.
    pub fn ustate_raw(&self) -> u8 {
        self.ustate
    }

    pub fn set_update_state(&mut self, state: UpdateState) {
        self.ustate = state.as_raw();
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Checksum of the record with the stamp field excluded.
    pub fn compute_crc(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.write(&self.encode_body());
        hasher.checksum()
    }

    /// Recomputes and stores the integrity stamp.
    pub fn stamp(&mut self) -> u32 {
        self.crc32 = self.compute_crc();
        self.crc32
    }

    pub fn is_valid(&self) -> bool {
        self.crc32 == self.compute_crc()
    }

    pub fn verify(&self) -> Result<()> {
        let computed = self.compute_crc();
        if computed != self.crc32 {
            return Err(Error::ChecksumMismatch {
                stored: self.crc32,
                computed,
            });
        }
        Ok(())
    }

    /// Serializes the complete record, stamp included as currently stored.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.encode_body();
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        debug_assert_eq!(buf.len(), ENV_RECORD_SIZE);
        buf
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENV_RECORD_SIZE);
        encode_raw(&mut buf, &self.kernelfile);
        encode_raw(&mut buf, &self.kernelparams);
        buf.push(self.in_progress as u8);
        buf.push(self.ustate);
        buf.extend_from_slice(&self.watchdog_timeout_sec.to_le_bytes());
        buf.extend_from_slice(&self.revision.to_le_bytes());
        buf.extend_from_slice(self.uservars.as_bytes());
        buf
    }

    /// Parses a record without checking its stamp; see [`EnvRecord::verify`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENV_RECORD_SIZE {
            return Err(Error::Decode(
                "environment record",
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", ENV_RECORD_SIZE, buf.len()),
                ),
            ));
        }

        let mut cursor = Cursor::new(&buf[..ENV_RECORD_SIZE]);
        let mut kernelfile = [0u16; ENV_STRING_LENGTH];
        cursor
            .read_u16_into::<LittleEndian>(&mut kernelfile)
            .map_err(|e| Error::Decode("kernelfile", e))?;
        let mut kernelparams = [0u16; ENV_STRING_LENGTH];
        cursor
            .read_u16_into::<LittleEndian>(&mut kernelparams)
            .map_err(|e| Error::Decode("kernelparams", e))?;
        let in_progress = cursor
            .read_u8()
            .map_err(|e| Error::Decode("in_progress", e))?;
        let ustate = cursor.read_u8().map_err(|e| Error::Decode("ustate", e))?;
        let watchdog_timeout_sec = cursor
            .read_u16::<LittleEndian>()
            .map_err(|e| Error::Decode("watchdog_timeout_sec", e))?;
        let revision = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Decode("revision", e))?;

        let mut blob = vec![0u8; ENV_MEM_USERVARS];
        cursor
            .read_exact(&mut blob)
            .map_err(|e| Error::Decode("user variables", e))?;
        let uservars = UserVars::from_bytes(&blob)?;

        let crc32 = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Decode("crc32", e))?;

        Ok(Self {
            kernelfile,
            kernelparams,
            in_progress: in_progress != 0,
            ustate,
            watchdog_timeout_sec,
            revision,
            uservars,
            crc32,
        })
    }
}

pub(crate) fn check_text(field: &str, value: &str) -> Result<()> {
    let units = value.encode_utf16().count();
    if units > ENV_STRING_MAX_CHARS {
        return Err(Error::validation(format!(
            "{} is too long: {} characters, maximum of {} permitted",
            field, units, ENV_STRING_MAX_CHARS
        )));
    }
    if value.contains('\0') {
        return Err(Error::validation(format!("{} contains a NUL character", field)));
    }
    Ok(())
}

// Callers have run check_text, so the value fits with room for the NUL.
fn string_to_raw(value: &str) -> RawText {
    let mut raw = [0u16; ENV_STRING_LENGTH];
    for (slot, unit) in raw.iter_mut().zip(value.encode_utf16()) {
        *slot = unit;
    }
    raw
}

fn raw_to_string(raw: &RawText) -> String {
    let len = raw.iter().position(|&u| u == 0).unwrap_or(ENV_STRING_LENGTH);
    String::from_utf16_lossy(&raw[..len])
}

fn encode_raw(buf: &mut Vec<u8>, raw: &RawText) {
    for &unit in raw {
        // Writing into a Vec cannot fail.
        let _ = buf.write_u16::<LittleEndian>(unit);
    }
}
