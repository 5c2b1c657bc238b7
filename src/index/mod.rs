//! Per-cycle field index.
//!
//! The index lists every message in a cycle's data object together with its
//! byte range, so a client can fetch one field with a single range read
//! instead of downloading the whole cycle.
//!
//! # Layout
//!
//! ```text
//! [MAGIC "IFSX"][VERSION u32 LE]
//! [BODY_LEN_LE][BODY_BYTES][BODY_CRC32_LE]
//! ```
//!
//! The body encodes the cycle time (`i64` Unix seconds) followed by
//! `Vec<IndexEntry>`.

#[cfg(test)]
mod tests;

use std::ops::Range;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::lexicon::FieldId;

const IDX_MAGIC: [u8; 4] = *b"IFSX";
const IDX_VERSION: u32 = 1;
const IDX_PREAMBLE_SIZE: usize = 8;

/// Errors produced while reading or building an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Encoding / decoding error, including checksum failures.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The buffer does not start with the index magic.
    #[error("bad index magic {0:02X?}")]
    BadMagic([u8; 4]),

    /// The index was written by an unknown format version.
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),

    /// The same field appears twice.
    #[error("duplicate index entry for {0}")]
    DuplicateEntry(String),

    /// An entry's byte range ends past `u64::MAX`.
    #[error("entry {field} at offset {offset} with length {length} overflows")]
    RangeOverflow {
        field: String,
        offset: u64,
        length: u64,
    },

    /// The cycle time is outside the representable range.
    #[error("invalid cycle time {0}")]
    InvalidTime(i64),
}

/// Location of one message in the data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Field stored at this location.
    pub id: FieldId,
    /// Byte offset of the message.
    pub offset: u64,
    /// Message length in bytes.
    pub length: u64,
}

impl IndexEntry {
    /// Byte range of the message within the data object.
    ///
    /// Entries of a [`CycleIndex`] never overflow; a hand-built entry that
    /// does is clamped to `u64::MAX`.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset.saturating_add(self.length)
    }
}

impl Encode for IndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.id.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        self.length.encode_to(buf)
    }
}

impl Decode for IndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (id, mut offset) = FieldId::decode_from(buf)?;
        let (msg_offset, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (length, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                id,
                offset: msg_offset,
                length,
            },
            offset,
        ))
    }
}

/// All messages of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleIndex {
    time: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl CycleIndex {
    /// Builds an index, rejecting duplicate fields and byte ranges that
    /// overflow.
    pub fn new(time: DateTime<Utc>, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        if let Some(e) = entries.iter().find(|e| e.offset.checked_add(e.length).is_none()) {
            return Err(IndexError::RangeOverflow {
                field: e.id.to_string(),
                offset: e.offset,
                length: e.length,
            });
        }

        let mut ids: Vec<&FieldId> = entries.iter().map(|e| &e.id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(IndexError::DuplicateEntry(pair[0].to_string()));
        }
        Ok(Self { time, entries })
    }

    /// Cycle time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Entries in data-object order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Location of `id`, if the cycle contains it.
    pub fn find(&self, id: &FieldId) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Serializes the index.
    pub fn encode(&self) -> Result<Vec<u8>, IndexError> {
        let mut body = Vec::new();
        self.time.timestamp().encode_to(&mut body)?;
        encoding::encode_vec(&self.entries, &mut body)?;

        let mut buf = Vec::with_capacity(IDX_PREAMBLE_SIZE + body.len() + 8);
        IDX_MAGIC.encode_to(&mut buf)?;
        IDX_VERSION.encode_to(&mut buf)?;
        encoding::encode_block(&body, &mut buf)?;
        Ok(buf)
    }

    /// Parses and verifies a serialized index.
    pub fn decode(buf: &[u8]) -> Result<Self, IndexError> {
        let (magic, _) = <[u8; 4]>::decode_from(buf)?;
        if magic != IDX_MAGIC {
            return Err(IndexError::BadMagic(magic));
        }
        let (version, _) = u32::decode_from(&buf[4..])?;
        if version != IDX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let (body, _) = encoding::decode_block(&buf[IDX_PREAMBLE_SIZE..])?;
        let (secs, offset) = i64::decode_from(body)?;
        let (entries, _) = encoding::decode_vec::<IndexEntry>(&body[offset..])?;
        let time = DateTime::from_timestamp(secs, 0).ok_or(IndexError::InvalidTime(secs))?;
        Self::new(time, entries)
    }
}
