//! Simple packing of floating-point fields into fixed-width integers.
//!
//! Each value `Y` is stored as an unsigned code `X` such that
//!
//! ```text
//! Y × 10^D = R + X × 2^E
//! ```
//!
//! where `R` is the reference value (the scaled minimum), `E` the binary
//! scale factor and `D` the decimal scale factor. With 16-bit codes the
//! quantisation step is `2^E / 10^D`, chosen as small as the field's range
//! allows. When the field contains missing values (NaN), the all-ones code
//! marks them and valid values use one code less.

use crate::encoding::{Decode, Encode, EncodingError};

/// Width of a packed code.
pub const BITS_PER_VALUE: u8 = 16;

/// Code reserved for missing values when [`Packing::has_missing`] is set.
pub const MISSING_CODE: u16 = u16::MAX;

/// Parameters needed to unpack a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packing {
    /// Scaled minimum `R`.
    pub reference: f64,
    /// Binary scale factor `E`.
    pub binary_scale: i32,
    /// Decimal scale factor `D`.
    pub decimal_scale: i32,
    /// Code width in bits; messages with any width other than
    /// [`BITS_PER_VALUE`] are rejected on decode.
    pub bits: u8,
    /// Whether [`MISSING_CODE`] denotes a missing value.
    pub has_missing: bool,
}

impl Encode for Packing {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.reference.encode_to(buf)?;
        self.binary_scale.encode_to(buf)?;
        self.decimal_scale.encode_to(buf)?;
        self.bits.encode_to(buf)?;
        self.has_missing.encode_to(buf)
    }
}

impl Decode for Packing {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (reference, mut offset) = f64::decode_from(buf)?;
        let (binary_scale, n) = i32::decode_from(&buf[offset..])?;
        offset += n;
        let (decimal_scale, n) = i32::decode_from(&buf[offset..])?;
        offset += n;
        let (bits, n) = u8::decode_from(&buf[offset..])?;
        offset += n;
        let (has_missing, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                reference,
                binary_scale,
                decimal_scale,
                bits,
                has_missing,
            },
            offset,
        ))
    }
}

/// Packs `values` with decimal scale `decimal_scale`.
///
/// Values must be finite or NaN.
///
/// Returns the packing parameters and the little-endian 16-bit codes.
pub fn pack(values: &[f32], decimal_scale: i32) -> (Packing, Vec<u8>) {
    let decimal = 10f64.powi(decimal_scale);
    let has_missing = values.iter().any(|v| v.is_nan());
    let max_code = if has_missing {
        f64::from(MISSING_CODE - 1)
    } else {
        f64::from(MISSING_CODE)
    };

    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            let v = f64::from(*v) * decimal;
            (lo.min(v), hi.max(v))
        });
    let (reference, range) = if min.is_finite() {
        (min, max - min)
    } else {
        (0.0, 0.0)
    };

    let mut binary_scale = if range > 0.0 {
        (range / max_code).log2().ceil() as i32
    } else {
        0
    };
    // Guard against log2 rounding just below the true bound.
    while range / 2f64.powi(binary_scale) > max_code {
        binary_scale += 1;
    }
    let step = 2f64.powi(binary_scale);

    let mut codes = Vec::with_capacity(values.len() * 2);
    for v in values {
        let code = if v.is_nan() {
            MISSING_CODE
        } else {
            let x = ((f64::from(*v) * decimal - reference) / step).round();
            x.clamp(0.0, max_code) as u16
        };
        codes.extend_from_slice(&code.to_le_bytes());
    }

    (
        Packing {
            reference,
            binary_scale,
            decimal_scale,
            bits: BITS_PER_VALUE,
            has_missing,
        },
        codes,
    )
}

/// Unpacks little-endian 16-bit codes. Missing codes become NaN.
pub fn unpack(packing: &Packing, codes: &[u8]) -> Vec<f32> {
    let step = 2f64.powi(packing.binary_scale);
    let decimal = 10f64.powi(packing.decimal_scale);
    codes
        .chunks_exact(2)
        .map(|pair| {
            let code = u16::from_le_bytes([pair[0], pair[1]]);
            if packing.has_missing && code == MISSING_CODE {
                f32::NAN
            } else {
                ((packing.reference + f64::from(code) * step) / decimal) as f32
            }
        })
        .collect()
}
