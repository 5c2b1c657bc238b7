//! Variable registry and the mapping from canonical variable names to the
//! provider's parameter identifiers.
//!
//! Canonical names are short and level-qualified (`u10m`, `t2m`, `z500`).
//! The archive indexes fields by `(param, levtype, level)`. A few canonical
//! variables are derived: geopotential `z*` is published as geopotential
//! height `gh` and scaled by standard gravity after decoding.

use std::fmt;

use crate::encoding::{Decode, Encode, EncodingError};

/// Standard gravity, m s⁻².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Pressure levels (hPa) published for upper-air parameters.
pub const PRESSURE_LEVELS: [u32; 13] = [50, 100, 150, 200, 250, 300, 400, 500, 600, 700, 850, 925, 1000];

/// Ordered variable set of a 0.25 degree global forecast model: 7 surface
/// fields followed by `u`, `v`, `z`, `t` and `q` on every pressure level.
pub const VARIABLES: [&str; 72] = [
    "u10m", "v10m", "u100m", "v100m", "t2m", "msl", "tcwv", "u50", "u100", "u150", "u200", "u250",
    "u300", "u400", "u500", "u600", "u700", "u850", "u925", "u1000", "v50", "v100", "v150",
    "v200", "v250", "v300", "v400", "v500", "v600", "v700", "v850", "v925", "v1000", "z50",
    "z100", "z150", "z200", "z250", "z300", "z400", "z500", "z600", "z700", "z850", "z925",
    "z1000", "t50", "t100", "t150", "t200", "t250", "t300", "t400", "t500", "t600", "t700",
    "t850", "t925", "t1000", "q50", "q100", "q150", "q200", "q250", "q300", "q400", "q500",
    "q600", "q700", "q850", "q925", "q1000",
];

/// Surface fields: canonical name → provider short name.
const SURFACE: &[(&str, &str)] = &[
    ("u10m", "10u"),
    ("v10m", "10v"),
    ("u100m", "100u"),
    ("v100m", "100v"),
    ("t2m", "2t"),
    ("d2m", "2d"),
    ("sp", "sp"),
    ("msl", "msl"),
    ("tcwv", "tcwv"),
    ("skt", "skt"),
    ("tp", "tp"),
];

/// Upper-air fields: canonical prefix → provider short name.
const PRESSURE: &[(&str, &str)] = &[
    ("u", "u"),
    ("v", "v"),
    ("w", "w"),
    ("z", "gh"),
    ("t", "t"),
    ("q", "q"),
    ("r", "r"),
];

/// Vertical coordinate of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelType {
    /// Single-level (surface) field.
    Surface,
    /// Isobaric field; the level is in hPa.
    Pressure,
}

impl LevelType {
    /// Short identifier used in indices and cache file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelType::Surface => "sfc",
            LevelType::Pressure => "pl",
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Encode for LevelType {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let tag: u8 = match self {
            LevelType::Surface => 0,
            LevelType::Pressure => 1,
        };
        tag.encode_to(buf)
    }
}

impl Decode for LevelType {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u8::decode_from(buf)?;
        let levtype = match tag {
            0 => LevelType::Surface,
            1 => LevelType::Pressure,
            other => {
                return Err(EncodingError::InvalidTag {
                    tag: u32::from(other),
                    type_name: "LevelType",
                });
            }
        };
        Ok((levtype, consumed))
    }
}

/// Provider-side identity of a field within one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    /// Provider short name (`10u`, `gh`, ...).
    pub param: String,
    /// Vertical coordinate.
    pub levtype: LevelType,
    /// Level in hPa; `0` for surface fields.
    pub level: u32,
}

impl FieldId {
    /// A surface field.
    pub fn surface(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            levtype: LevelType::Surface,
            level: 0,
        }
    }

    /// A field on a pressure level.
    pub fn pressure(param: impl Into<String>, level: u32) -> Self {
        Self {
            param: param.into(),
            levtype: LevelType::Pressure,
            level,
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.param, self.levtype, self.level)
    }
}

impl Encode for FieldId {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.param.encode_to(buf)?;
        self.levtype.encode_to(buf)?;
        self.level.encode_to(buf)
    }
}

impl Decode for FieldId {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (param, mut offset) = String::decode_from(buf)?;
        let (levtype, n) = LevelType::decode_from(&buf[offset..])?;
        offset += n;
        let (level, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                param,
                levtype,
                level,
            },
            offset,
        ))
    }
}

/// Transformation applied to decoded values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modifier {
    /// Values are used as published.
    Identity,
    /// Values are multiplied by a constant.
    Scale(f64),
}

impl Modifier {
    /// Applies the modifier in place.
    pub fn apply(&self, values: &mut [f32]) {
        if let Modifier::Scale(factor) = *self {
            for v in values.iter_mut() {
                *v = (f64::from(*v) * factor) as f32;
            }
        }
    }
}

/// Resolution of a canonical variable name.
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconEntry {
    /// Field to read from the cycle.
    pub field: FieldId,
    /// Post-decode transformation.
    pub modifier: Modifier,
}

/// Resolves a canonical variable name, or `None` if the archive does not
/// provide it.
pub fn lookup(name: &str) -> Option<LexiconEntry> {
    if let Some((_, param)) = SURFACE.iter().find(|(n, _)| *n == name) {
        return Some(LexiconEntry {
            field: FieldId::surface(*param),
            modifier: Modifier::Identity,
        });
    }

    let split = name.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = name.split_at(split);
    if digits.starts_with('0') {
        return None;
    }
    let level: u32 = digits.parse().ok()?;
    if !PRESSURE_LEVELS.contains(&level) {
        return None;
    }
    let (_, param) = PRESSURE.iter().find(|(p, _)| *p == prefix)?;
    let modifier = if prefix == "z" {
        Modifier::Scale(STANDARD_GRAVITY)
    } else {
        Modifier::Identity
    };
    Some(LexiconEntry {
        field: FieldId::pressure(*param, level),
        modifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode_from_slice, encode_to_vec};

    #[test]
    fn every_registered_variable_resolves() {
        for name in VARIABLES {
            assert!(lookup(name).is_some(), "{name} missing from lexicon");
        }
        let mut unique = VARIABLES.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), VARIABLES.len());
    }

    #[test]
    fn surface_and_pressure_mapping() {
        let u10 = lookup("u10m").unwrap();
        assert_eq!(u10.field, FieldId::surface("10u"));
        assert_eq!(u10.modifier, Modifier::Identity);

        let t850 = lookup("t850").unwrap();
        assert_eq!(t850.field, FieldId::pressure("t", 850));

        let z500 = lookup("z500").unwrap();
        assert_eq!(z500.field, FieldId::pressure("gh", 500));
        assert_eq!(z500.modifier, Modifier::Scale(STANDARD_GRAVITY));
    }

    #[test]
    fn unknown_names() {
        for name in ["", "u", "u10", "t0850", "t855", "x500", "sst", "u10mm", "z-500"] {
            assert!(lookup(name).is_none(), "{name:?} should not resolve");
        }
    }

    #[test]
    fn scale_modifier() {
        let mut values = [1.0f32, 10.0, -2.0];
        Modifier::Scale(STANDARD_GRAVITY).apply(&mut values);
        assert!((values[0] - 9.80665).abs() < 1e-5);
        assert!((values[1] - 98.0665).abs() < 1e-4);
        assert!((values[2] + 19.6133).abs() < 1e-4);

        let mut untouched = [3.5f32];
        Modifier::Identity.apply(&mut untouched);
        assert_eq!(untouched, [3.5]);
    }

    #[test]
    fn field_id_encoding() {
        let id = FieldId::pressure("gh", 925);
        let bytes = encode_to_vec(&id).unwrap();
        let (decoded, consumed) = decode_from_slice::<FieldId>(&bytes).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(consumed, bytes.len());
        assert_eq!(id.to_string(), "gh::pl::925");

        let err = decode_from_slice::<LevelType>(&[9]).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidTag { tag: 9, .. }));
    }
}
