//! User variable area of an environment record.
//!
//! Variables are stored back to back in a fixed-capacity blob. Each entry
//! describes its own size, so the area can be walked without a length
//! prefix:
//!
//! ```text
//! +-----------+-----+------------------+-----------+-----------------+
//! | key bytes | NUL | payload_size:u32 | type:u64  | data            |
//! +-----------+-----+------------------+-----------+-----------------+
//!                   |<------------- payload_size ----------------->|
//! ```
//!
//! An entry with an empty key (a single zero byte) terminates the area.
//! Deleting a variable keeps its slot: the type becomes
//! `TYPE_DEFAULT | TYPE_DELETED` and the data shrinks to zero bytes.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::Error;

pub const ENV_MEM_USERVARS: usize = 131072;

pub const TYPE_CHAR: u64 = 1;
pub const TYPE_UINT8: u64 = 2;
pub const TYPE_UINT16: u64 = 3;
pub const TYPE_UINT32: u64 = 4;
pub const TYPE_UINT64: u64 = 5;
pub const TYPE_SINT8: u64 = 6;
pub const TYPE_SINT16: u64 = 7;
pub const TYPE_SINT32: u64 = 8;
pub const TYPE_SINT64: u64 = 9;
pub const TYPE_STRING_ASCII: u64 = 32;
pub const TYPE_BOOL: u64 = 64;

pub const TYPE_DEFAULT: u64 = 1 << 62;
pub const TYPE_DELETED: u64 = 1 << 63;
pub const STANDARD_TYPE_MASK: u64 = (1 << 32) - 1;

// payload_size:u32 + type:u64
const ENTRY_OVERHEAD: usize = 4 + 8;

/// Borrowed view of one entry in the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserVar<'a> {
    pub key: &'a str,
    pub var_type: u64,
    pub data: &'a [u8],
    offset: usize,
    record_size: usize,
}

impl<'a> UserVar<'a> {
    pub fn is_deleted(&self) -> bool {
        self.var_type & TYPE_DELETED != 0
    }

    pub fn standard_type(&self) -> u64 {
        self.var_type & STANDARD_TYPE_MASK
    }

    /// Total bytes occupied, key and terminator included.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserVars {
    blob: Vec<u8>,
}

impl std::fmt::Debug for UserVars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.iter().filter(|v| v.is_ok()).count();
        f.debug_struct("UserVars")
            .field("entries", &count)
            .field("capacity", &self.blob.len())
            .finish()
    }
}

impl Default for UserVars {
    fn default() -> Self {
        Self::new()
    }
}

impl UserVars {
    pub fn new() -> Self {
        Self {
            blob: vec![0; ENV_MEM_USERVARS],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENV_MEM_USERVARS {
            return Err(Error::CorruptedUserVars(format!(
                "expected {} bytes, got {}",
                ENV_MEM_USERVARS,
                bytes.len()
            )));
        }
        let mut blob = Vec::new();
        blob.try_reserve_exact(ENV_MEM_USERVARS)
            .map_err(|_| Error::AllocationFailure)?;
        blob.extend_from_slice(bytes);
        Ok(Self { blob })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn capacity(&self) -> usize {
        self.blob.len()
    }

    pub fn iter(&self) -> UserVarIter<'_> {
        UserVarIter {
            blob: &self.blob,
            offset: 0,
            done: false,
        }
    }

    /// Offset of the terminating entry.
    pub fn used(&self) -> Result<usize> {
        let mut end = 0;
        for var in self.iter() {
            let var = var?;
            end = var.offset + var.record_size;
        }
        Ok(end)
    }

    pub fn get(&self, key: &str) -> Result<Option<UserVar<'_>>> {
        for var in self.iter() {
            let var = var?;
            if var.key == key {
                return Ok(Some(var));
            }
        }
        Ok(None)
    }

    /// Sets `key` to `data`. An existing entry is rewritten in its slot,
    /// shifting the entries behind it when the size changes; a new key is
    /// appended before the terminator.
    pub fn set(&mut self, key: &str, var_type: u64, data: &[u8]) -> Result<()> {
        if key.is_empty() || key.as_bytes().contains(&0) {
            return Err(Error::apply(key, "invalid user variable name"));
        }

        let entry = encode_entry(key, var_type, data)?;
        let used = self.used()?;
        let (offset, old_size) = match self.get(key)? {
            Some(var) => (var.offset, var.record_size),
            None => (used, 0),
        };

        // One byte has to stay free for the terminator. A stored area may
        // already be filled to the last byte.
        let available = (self.blob.len() - 1).saturating_sub(used - old_size);
        if entry.len() > available {
            return Err(Error::UserVarOverflow {
                key: key.to_string(),
                needed: entry.len(),
                available,
            });
        }

        let capacity = self.blob.len();
        let new_used = used - old_size + entry.len();
        self.blob.splice(offset..offset + old_size, entry);
        self.blob.resize(capacity, 0);
        self.blob[new_used] = 0;
        Ok(())
    }

    /// Deletes `key` in place. Deleting a key that does not exist leaves a
    /// deleted marker behind, so readers of older copies see the removal.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.set(key, TYPE_DEFAULT | TYPE_DELETED, &[])
    }
}

fn encode_entry(key: &str, var_type: u64, data: &[u8]) -> Result<Vec<u8>> {
    let payload_size = ENTRY_OVERHEAD + data.len();
    let payload_size = u32::try_from(payload_size)
        .map_err(|_| Error::apply(key, "user variable too large"))?;

    let mut buf = Vec::with_capacity(key.len() + 1 + payload_size as usize);
    buf.extend_from_slice(key.as_bytes());
    buf.push(0);
    buf.write_u32::<LittleEndian>(payload_size)
        .map_err(|e| Error::Encode("user variable size", e))?;
    buf.write_u64::<LittleEndian>(var_type)
        .map_err(|e| Error::Encode("user variable type", e))?;
    buf.extend_from_slice(data);
    Ok(buf)
}

fn parse_entry(blob: &[u8], offset: usize) -> Result<Option<UserVar<'_>>> {
    match blob.get(offset) {
        None | Some(0) => return Ok(None),
        Some(_) => {}
    }

    let key_len = blob[offset..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::CorruptedUserVars(format!("unterminated key at {}", offset)))?;
    let key = std::str::from_utf8(&blob[offset..offset + key_len])
        .map_err(|_| Error::CorruptedUserVars(format!("key at {} is not UTF-8", offset)))?;

    let header_start = offset + key_len + 1;
    let header = blob
        .get(header_start..header_start + ENTRY_OVERHEAD)
        .ok_or_else(|| Error::CorruptedUserVars(format!("truncated entry {}", key)))?;
    let mut cursor = Cursor::new(header);
    let payload_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::Decode("user variable size", e))? as usize;
    let var_type = cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::Decode("user variable type", e))?;

    if payload_size < ENTRY_OVERHEAD || header_start + payload_size > blob.len() {
        return Err(Error::CorruptedUserVars(format!(
            "entry {} reports invalid size {}",
            key, payload_size
        )));
    }

    let data_start = header_start + ENTRY_OVERHEAD;
    Ok(Some(UserVar {
        key,
        var_type,
        data: &blob[data_start..header_start + payload_size],
        offset,
        record_size: key_len + 1 + payload_size,
    }))
}

/// Walks the blob front to back. Stops at the terminator or after the
/// first malformed entry.
pub struct UserVarIter<'a> {
    blob: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Iterator for UserVarIter<'a> {
    type Item = Result<UserVar<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match parse_entry(self.blob, self.offset) {
            Ok(Some(var)) => {
                self.offset += var.record_size;
                Some(Ok(var))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
