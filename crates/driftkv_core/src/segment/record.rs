//! Record codec.
//!
//! A record is the atomic unit of storage. Its byte layout (little-endian
//! integers) is the compatibility contract for the whole data directory:
//!
//! ```text
//! | total_size (4) | key_len (4) | key (key_len) | tag (1) | value payload |
//! ```
//!
//! Value payloads by tag:
//! - `1` (STRING): `len (4)` followed by `len` opaque bytes
//! - `2` (INT64): 8-byte two's-complement integer
//!
//! Unknown tags are decoded leniently as STRING for forward compatibility.

use crate::error::{DbError, DbResult};
use std::io::{self, Read};

/// Wire tag for string values.
pub const TAG_STRING: u8 = 1;
/// Wire tag for 64-bit integer values.
pub const TAG_INT64: u8 = 2;

/// Fixed portion of every record: total_size (4) + key_len (4) + tag (1).
const MIN_RECORD_SIZE: usize = 9;

/// A typed value stored in a record.
///
/// String payloads are opaque bytes at this level; UTF-8 validation happens
/// at the database API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Byte string.
    Str(Vec<u8>),
    /// Signed 64-bit integer.
    Int64(i64),
}

impl Value {
    /// Returns the wire tag for this value.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Value::Str(_) => TAG_STRING,
            Value::Int64(_) => TAG_INT64,
        }
    }
}

/// A single key-value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key bytes. The empty key is a valid key.
    pub key: Vec<u8>,
    /// Typed value.
    pub value: Value,
}

impl Record {
    /// Creates a string record.
    #[must_use]
    pub fn string(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Value::Str(value.into()),
        }
    }

    /// Creates an int64 record.
    #[must_use]
    pub fn int64(key: impl Into<Vec<u8>>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: Value::Int64(value),
        }
    }

    /// Returns the encoded size of this record in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let payload = match &self.value {
            Value::Str(bytes) => 4 + bytes.len(),
            Value::Int64(_) => 8,
        };
        MIN_RECORD_SIZE + self.key.len() + payload
    }

    /// Encodes the record to its canonical bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let total = self.encoded_size();
        let mut buf = Vec::with_capacity(total);

        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.push(self.value.tag());

        match &self.value {
            Value::Str(bytes) => {
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
            Value::Int64(value) => buf.extend_from_slice(&value.to_le_bytes()),
        }

        buf
    }

    /// Decodes a record from a byte slice.
    pub fn decode(input: &[u8]) -> DbResult<Self> {
        if input.len() < MIN_RECORD_SIZE {
            return Err(DbError::corrupt("record shorter than fixed header"));
        }

        let total = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
        if total < MIN_RECORD_SIZE {
            return Err(DbError::corrupt(format!("invalid record size: {total}")));
        }
        if total > input.len() {
            return Err(DbError::corrupt("record extends past buffer"));
        }

        let key_len = u32::from_le_bytes([input[4], input[5], input[6], input[7]]) as usize;
        if MIN_RECORD_SIZE + key_len > total {
            return Err(DbError::corrupt("key length out of bounds"));
        }

        let key = input[8..8 + key_len].to_vec();
        let tag = input[8 + key_len];
        let payload = &input[8 + key_len + 1..total];

        let value = match tag {
            TAG_STRING => Value::Str(decode_string_payload(payload)?),
            TAG_INT64 => {
                if payload.len() < 8 {
                    return Err(DbError::corrupt("int64 payload too short"));
                }
                Value::Int64(i64::from_le_bytes([
                    payload[0], payload[1], payload[2], payload[3], payload[4], payload[5],
                    payload[6], payload[7],
                ]))
            }
            // Unknown tags carry the length-prefixed string form; fall back
            // to the raw payload when no length fits.
            _ => match decode_string_payload(payload) {
                Ok(bytes) => Value::Str(bytes),
                Err(_) => Value::Str(payload.to_vec()),
            },
        };

        Ok(Self { key, value })
    }

    /// Reads one record from a stream.
    ///
    /// Returns `Ok(None)` at a clean end of stream (zero bytes available at a
    /// record boundary); otherwise returns the decoded record together with
    /// the number of bytes consumed. A partial header or truncated body is
    /// corruption, never a clean end.
    pub fn read_from<R: Read>(reader: &mut R) -> DbResult<Option<(usize, Self)>> {
        let mut header = [0u8; 4];
        if !fill_or_eof(reader, &mut header)? {
            return Ok(None);
        }

        let total = u32::from_le_bytes(header) as usize;
        if total < MIN_RECORD_SIZE {
            return Err(DbError::corrupt(format!("invalid record size: {total}")));
        }

        let mut buf = vec![0u8; total];
        buf[..4].copy_from_slice(&header);
        reader.read_exact(&mut buf[4..]).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                DbError::corrupt("truncated record at end of segment")
            } else {
                DbError::Io(err)
            }
        })?;

        let record = Self::decode(&buf)?;
        Ok(Some((total, record)))
    }
}

fn decode_string_payload(payload: &[u8]) -> DbResult<Vec<u8>> {
    if payload.len() < 4 {
        return Err(DbError::corrupt("string length missing"));
    }
    let len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if 4 + len > payload.len() {
        return Err(DbError::corrupt("string payload too short"));
    }
    Ok(payload[4..4 + len].to_vec())
}

/// Fills `buf` from the reader. Returns `false` when the stream ends before
/// the first byte; ending mid-fill is corruption.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> DbResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(DbError::corrupt("truncated record header")),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(DbError::Io(err)),
        }
    }
    Ok(true)
}
