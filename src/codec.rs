//! Typed values for well-known fields and user variables.
//!
//! Values travel as `(type tag, payload bytes)` pairs. Well-known fields
//! carry their value as NUL-terminated decimal or text, the same way the
//! command line handed it over; user variables carry their native
//! little-endian representation.

use std::fmt;

use crate::env::uservars::{
    STANDARD_TYPE_MASK, TYPE_BOOL, TYPE_CHAR, TYPE_DEFAULT, TYPE_DELETED, TYPE_SINT16,
    TYPE_SINT32, TYPE_SINT64, TYPE_SINT8, TYPE_STRING_ASCII, TYPE_UINT16, TYPE_UINT32,
    TYPE_UINT64, TYPE_UINT8,
};

pub const NOT_PRINTABLE: &str = "( Type is not printable )";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Char(u8),
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    String(String),
}

impl Value {
    pub fn type_tag(&self) -> u64 {
        match self {
            Value::Char(_) => TYPE_CHAR,
            Value::Bool(_) => TYPE_BOOL,
            Value::U8(_) => TYPE_UINT8,
            Value::U16(_) => TYPE_UINT16,
            Value::U32(_) => TYPE_UINT32,
            Value::U64(_) => TYPE_UINT64,
            Value::I8(_) => TYPE_SINT8,
            Value::I16(_) => TYPE_SINT16,
            Value::I32(_) => TYPE_SINT32,
            Value::I64(_) => TYPE_SINT64,
            Value::String(_) => TYPE_STRING_ASCII,
        }
    }

    pub fn encode(&self) -> (u64, Vec<u8>) {
        let payload = match self {
            Value::Char(c) => vec![*c],
            Value::Bool(b) => vec![*b as u8],
            Value::U8(v) => v.to_le_bytes().to_vec(),
            Value::U16(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::U64(v) => v.to_le_bytes().to_vec(),
            Value::I8(v) => v.to_le_bytes().to_vec(),
            Value::I16(v) => v.to_le_bytes().to_vec(),
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::String(s) => nul_terminated(s),
        };
        (self.type_tag(), payload)
    }

    /// Decodes a payload according to the standard part of `var_type`.
    /// Returns `None` for types that have no printable form and for payloads
    /// too short for their type.
    pub fn decode(var_type: u64, data: &[u8]) -> Option<Value> {
        fn fixed<const N: usize>(data: &[u8]) -> Option<[u8; N]> {
            data.get(..N)?.try_into().ok()
        }

        let value = match var_type & STANDARD_TYPE_MASK {
            TYPE_STRING_ASCII => Value::String(text_payload(data)),
            TYPE_CHAR => Value::Char(*data.first()?),
            TYPE_BOOL => Value::Bool(*data.first()? != 0),
            TYPE_UINT8 => Value::U8(u8::from_le_bytes(fixed(data)?)),
            TYPE_UINT16 => Value::U16(u16::from_le_bytes(fixed(data)?)),
            TYPE_UINT32 => Value::U32(u32::from_le_bytes(fixed(data)?)),
            TYPE_UINT64 => Value::U64(u64::from_le_bytes(fixed(data)?)),
            TYPE_SINT8 => Value::I8(i8::from_le_bytes(fixed(data)?)),
            TYPE_SINT16 => Value::I16(i16::from_le_bytes(fixed(data)?)),
            TYPE_SINT32 => Value::I32(i32::from_le_bytes(fixed(data)?)),
            TYPE_SINT64 => Value::I64(i64::from_le_bytes(fixed(data)?)),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(c) => write!(f, "{}", *c as char),
            Value::Bool(b) => write!(f, "{}", b),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Renders a variable as `= value`, or the not-printable marker.
pub fn render(var_type: u64, data: &[u8]) -> String {
    match Value::decode(var_type, data) {
        Some(value) => format!("= {}", value),
        None => NOT_PRINTABLE.to_string(),
    }
}

/// Type and payload of a user variable set from the command line.
pub fn uservar_string(value: &str) -> (u64, Vec<u8>) {
    (TYPE_DEFAULT | TYPE_STRING_ASCII, nul_terminated(value))
}

/// Type of a user variable deletion; deletions carry no payload.
pub fn uservar_deletion() -> u64 {
    TYPE_DEFAULT | TYPE_DELETED
}

pub fn nul_terminated(value: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(value.len() + 1);
    payload.extend_from_slice(value.as_bytes());
    payload.push(0);
    payload
}

/// Text up to the first NUL; invalid UTF-8 is replaced.
pub fn text_payload(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
