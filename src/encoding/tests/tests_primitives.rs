//! Tests for primitive encodings: integers, floats, bool, strings and struct
//! vectors.

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// Integers
// ------------------------------------------------------------------------------------------------

#[test]
fn u32_is_little_endian() {
    let bytes = encode_to_vec(&0xDEAD_BEEFu32).unwrap();
    assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]);
    let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
    assert_eq!(decoded, 0xDEAD_BEEF);
    assert_eq!(consumed, 4);
}

#[test]
fn signed_extremes() {
    for val in [0i32, -1, i32::MIN, i32::MAX] {
        let bytes = encode_to_vec(&val).unwrap();
        assert_eq!(decode_from_slice::<i32>(&bytes).unwrap(), (val, 4));
    }
    for val in [0i64, -1, i64::MIN, i64::MAX] {
        let bytes = encode_to_vec(&val).unwrap();
        assert_eq!(decode_from_slice::<i64>(&bytes).unwrap(), (val, 8));
    }
}

#[test]
fn u32_short_buffer() {
    let err = decode_from_slice::<u32>(&[0x01, 0x02]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof {
            needed: 4,
            available: 2
        }
    ));
}

// ------------------------------------------------------------------------------------------------
// f64
// ------------------------------------------------------------------------------------------------

#[test]
fn f64_preserves_bits() {
    for val in [0.0f64, -0.0, 0.25, -180.0, 9.80665, f64::MAX, f64::MIN_POSITIVE] {
        let bytes = encode_to_vec(&val).unwrap();
        let (decoded, consumed) = decode_from_slice::<f64>(&bytes).unwrap();
        assert_eq!(decoded.to_bits(), val.to_bits());
        assert_eq!(consumed, 8);
    }
}

// ------------------------------------------------------------------------------------------------
// bool
// ------------------------------------------------------------------------------------------------

#[test]
fn bool_invalid_byte() {
    let err = decode_from_slice::<bool>(&[2]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidBool(2)));
}

// ------------------------------------------------------------------------------------------------
// Strings
// ------------------------------------------------------------------------------------------------

#[test]
fn string_and_str_encode_identically() {
    let owned = encode_to_vec(&String::from("tcwv")).unwrap();
    let borrowed = encode_to_vec(&"tcwv").unwrap();
    assert_eq!(owned, borrowed);
    assert_eq!(&owned[..4], &4u32.to_le_bytes());

    let (decoded, consumed) = decode_from_slice::<String>(&owned).unwrap();
    assert_eq!(decoded, "tcwv");
    assert_eq!(consumed, 8);
}

#[test]
fn string_invalid_utf8() {
    let mut buf = 2u32.to_le_bytes().to_vec();
    buf.extend_from_slice(&[0xC3, 0x28]);
    let err = decode_from_slice::<String>(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidUtf8(_)));
}

// ------------------------------------------------------------------------------------------------
// Vec<T>
// ------------------------------------------------------------------------------------------------

#[test]
fn vec_of_strings() {
    let names = vec!["u10m".to_string(), "v10m".to_string(), "msl".to_string()];
    let mut buf = Vec::new();
    encode_vec(&names, &mut buf).unwrap();
    let (decoded, consumed) = decode_vec::<String>(&buf).unwrap();
    assert_eq!(decoded, names);
    assert_eq!(consumed, buf.len());
}

#[test]
fn vec_truncated_element() {
    let mut buf = Vec::new();
    encode_vec(&[1u64, 2, 3], &mut buf).unwrap();
    buf.truncate(buf.len() - 3);
    let err = decode_vec::<u64>(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { .. }));
}
