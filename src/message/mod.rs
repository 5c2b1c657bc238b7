//! Field message codec.
//!
//! A cycle's data object is a concatenation of self-describing field
//! messages. Each message carries its identity, valid time, lattice and
//! packing parameters, followed by the packed values. Both sections are
//! CRC32-protected blocks (see [`crate::encoding::encode_block`]).
//!
//! # Layout
//!
//! ```text
//! [MAGIC "IFSM"][VERSION u32 LE]
//! [HEADER_LEN_LE][HEADER_BYTES][HEADER_CRC32_LE]
//! [DATA_LEN_LE][PACKED_U16_LE × nlat·nlon][DATA_CRC32_LE]
//! ```
//!
//! The header encodes, in order: [`FieldId`], valid time as Unix seconds
//! (`i64`), [`GridSpec`] and [`Packing`].

pub mod packing;


pub use packing::Packing;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::grid::GridSpec;
use crate::lexicon::FieldId;

const MSG_MAGIC: [u8; 4] = *b"IFSM";
const MSG_VERSION: u32 = 1;
const MSG_PREAMBLE_SIZE: usize = 8;

/// Errors produced while encoding or decoding a field message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Encoding / decoding error, including checksum failures.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The buffer does not start with the message magic.
    #[error("bad message magic {0:02X?}")]
    BadMagic([u8; 4]),

    /// The message was written by an unknown format version.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(u32),

    /// Packed data does not match the declared lattice.
    #[error("field {field} declares {expected} points but carries {actual}")]
    LengthMismatch {
        /// Field being decoded.
        field: String,
        /// Points implied by the lattice.
        expected: usize,
        /// Points present in the data block.
        actual: usize,
    },

    /// A value is infinite; only finite values and NaN can be packed.
    #[error("field {field} has a non-finite value at point {index}")]
    NonFinite {
        /// Field being encoded.
        field: String,
        /// Position of the first offending value.
        index: usize,
    },

    /// The data block uses a code width this codec cannot unpack.
    #[error("unsupported packing width of {0} bits")]
    UnsupportedBits(u8),

    /// The valid time is outside the representable range.
    #[error("invalid valid time {0}")]
    InvalidTime(i64),
}

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Provider identity.
    pub id: FieldId,
    /// Valid time (the cycle time; all messages are step 0).
    pub time: DateTime<Utc>,
    /// Lattice the values are laid out on, row-major.
    pub grid: GridSpec,
    /// Values; NaN marks missing points.
    pub values: Vec<f32>,
}

/// Header section of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// Provider identity.
    pub id: FieldId,
    /// Valid time as Unix seconds.
    pub time: i64,
    /// Lattice.
    pub grid: GridSpec,
    /// Packing parameters of the data section.
    pub packing: Packing,
}

impl Encode for MessageHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.id.encode_to(buf)?;
        self.time.encode_to(buf)?;
        self.grid.encode_to(buf)?;
        self.packing.encode_to(buf)
    }
}

impl Decode for MessageHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (id, mut offset) = FieldId::decode_from(buf)?;
        let (time, n) = i64::decode_from(&buf[offset..])?;
        offset += n;
        let (grid, n) = GridSpec::decode_from(&buf[offset..])?;
        offset += n;
        let (packing, n) = Packing::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                id,
                time,
                grid,
                packing,
            },
            offset,
        ))
    }
}

/// Encodes `field` as a message, packing values with `decimal_scale`.
///
/// NaN values are stored as missing; infinite values are rejected.
pub fn encode_message(field: &Field, decimal_scale: i32) -> Result<Vec<u8>, MessageError> {
    let expected = field.grid.len();
    if field.values.len() != expected {
        return Err(MessageError::LengthMismatch {
            field: field.id.to_string(),
            expected,
            actual: field.values.len(),
        });
    }

    if let Some(index) = field.values.iter().position(|v| v.is_infinite()) {
        return Err(MessageError::NonFinite {
            field: field.id.to_string(),
            index,
        });
    }

    let (packing, codes) = packing::pack(&field.values, decimal_scale);
    let header = MessageHeader {
        id: field.id.clone(),
        time: field.time.timestamp(),
        grid: field.grid,
        packing,
    };
    let header_bytes = encoding::encode_to_vec(&header)?;

    let mut buf = Vec::with_capacity(MSG_PREAMBLE_SIZE + header_bytes.len() + codes.len() + 16);
    MSG_MAGIC.encode_to(&mut buf)?;
    MSG_VERSION.encode_to(&mut buf)?;
    encoding::encode_block(&header_bytes, &mut buf)?;
    encoding::encode_block(&codes, &mut buf)?;
    Ok(buf)
}

/// Decodes only the preamble and header of a message.
///
/// Returns the header and the offset of the data block.
pub fn decode_header(buf: &[u8]) -> Result<(MessageHeader, usize), MessageError> {
    let (magic, _) = <[u8; 4]>::decode_from(buf)?;
    if magic != MSG_MAGIC {
        return Err(MessageError::BadMagic(magic));
    }
    let (version, _) = u32::decode_from(&buf[4..])?;
    if version != MSG_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }

    let (header_bytes, consumed) = encoding::decode_block(&buf[MSG_PREAMBLE_SIZE..])?;
    let (header, _) = encoding::decode_from_slice::<MessageHeader>(header_bytes)?;
    if header.packing.bits != packing::BITS_PER_VALUE {
        return Err(MessageError::UnsupportedBits(header.packing.bits));
    }
    Ok((header, MSG_PREAMBLE_SIZE + consumed))
}

/// Decodes a complete message, verifying both checksums.
pub fn decode_message(buf: &[u8]) -> Result<Field, MessageError> {
    let (header, data_offset) = decode_header(buf)?;
    let (codes, _) = encoding::decode_block(&buf[data_offset..])?;

    let expected = header.grid.len();
    let actual = codes.len() / 2;
    if codes.len() % 2 != 0 || actual != expected {
        return Err(MessageError::LengthMismatch {
            field: header.id.to_string(),
            expected,
            actual,
        });
    }

    let time =
        DateTime::from_timestamp(header.time, 0).ok_or(MessageError::InvalidTime(header.time))?;
    let values = packing::unpack(&header.packing, codes);

    Ok(Field {
        id: header.id,
        time,
        grid: header.grid,
        values,
    })
}
