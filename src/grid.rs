//! The labeled 4-D result grid and the fixed 0.25 degree global lattice.
//!
//! A [`Grid`] holds `(time, variable, lat, lon)` values together with the
//! coordinates of every axis. Latitudes run north to south (90 to -90) and
//! longitudes east from Greenwich (0 to 359.75).
//!
//! Published fields describe their own lattice with a [`GridSpec`]. The
//! archive stores longitudes from -180, so [`conform`] rolls each row
//! onto the 0..360 convention (and flips south-to-north fields) before the
//! values reach a grid.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array4, ArrayView2, ArrayView3, Axis, s};

use crate::encoding::{Decode, Encode, EncodingError};

/// Number of latitude rows of the 0.25 degree global lattice.
pub const NLAT: usize = 721;

/// Number of longitude columns of the 0.25 degree global lattice.
pub const NLON: usize = 1440;

/// Lattice spacing in degrees.
pub const RESOLUTION: f64 = 0.25;

/// Points per field of the global lattice.
pub const FIELD_LEN: usize = NLAT * NLON;

// ------------------------------------------------------------------------------------------------
// GridSpec
// ------------------------------------------------------------------------------------------------

/// Geometry of a regular lat/lon field, as carried in a message header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Number of rows.
    pub nlat: u32,
    /// Number of columns.
    pub nlon: u32,
    /// Latitude of the first row.
    pub lat_first: f64,
    /// Longitude of the first column.
    pub lon_first: f64,
    /// Spacing in degrees along both axes.
    pub increment: f64,
}

impl GridSpec {
    /// Global 0.25 degree lattice as published: rows from the north pole,
    /// columns from the antimeridian.
    pub const ARCHIVE: GridSpec = GridSpec {
        nlat: NLAT as u32,
        nlon: NLON as u32,
        lat_first: 90.0,
        lon_first: -180.0,
        increment: RESOLUTION,
    };

    /// Global 0.25 degree lattice in the output convention.
    pub const OUTPUT: GridSpec = GridSpec {
        nlat: NLAT as u32,
        nlon: NLON as u32,
        lat_first: 90.0,
        lon_first: 0.0,
        increment: RESOLUTION,
    };

    /// Number of points in one field.
    pub fn len(&self) -> usize {
        self.nlat as usize * self.nlon as usize
    }

    /// Returns `true` for a lattice without points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Encode for GridSpec {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.nlat.encode_to(buf)?;
        self.nlon.encode_to(buf)?;
        self.lat_first.encode_to(buf)?;
        self.lon_first.encode_to(buf)?;
        self.increment.encode_to(buf)
    }
}

impl Decode for GridSpec {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (nlat, mut offset) = u32::decode_from(buf)?;
        let (nlon, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (lat_first, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (lon_first, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (increment, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                nlat,
                nlon,
                lat_first,
                lon_first,
                increment,
            },
            offset,
        ))
    }
}

/// Reorders a published field onto [`GridSpec::OUTPUT`].
///
/// Accepts global 0.25 degree fields whose first row is at either pole and
/// whose first column is at 0 or -180. Anything else is rejected with a
/// description of the mismatch.
pub fn conform(spec: &GridSpec, mut values: Vec<f32>) -> Result<Vec<f32>, String> {
    if spec.nlat as usize != NLAT || spec.nlon as usize != NLON {
        return Err(format!(
            "expected {NLAT}x{NLON} points, message has {}x{}",
            spec.nlat, spec.nlon
        ));
    }
    if (spec.increment - RESOLUTION).abs() > 1e-9 {
        return Err(format!(
            "expected {RESOLUTION} degree spacing, message has {}",
            spec.increment
        ));
    }
    if values.len() != FIELD_LEN {
        return Err(format!(
            "expected {FIELD_LEN} values, message has {}",
            values.len()
        ));
    }

    let north_first = match spec.lat_first {
        v if (v - 90.0).abs() < 1e-9 => true,
        v if (v + 90.0).abs() < 1e-9 => false,
        v => return Err(format!("first latitude {v} is not a pole")),
    };
    let shift = match spec.lon_first {
        v if v.abs() < 1e-9 => 0,
        v if (v + 180.0).abs() < 1e-9 => NLON / 2,
        v => return Err(format!("first longitude {v} is neither 0 nor -180")),
    };

    if shift != 0 {
        for row in values.chunks_exact_mut(NLON) {
            row.rotate_left(shift);
        }
    }
    if !north_first {
        let mut flipped = Vec::with_capacity(values.len());
        for row in values.chunks_exact(NLON).rev() {
            flipped.extend_from_slice(row);
        }
        values = flipped;
    }
    Ok(values)
}

// ------------------------------------------------------------------------------------------------
// Grid
// ------------------------------------------------------------------------------------------------

/// Fetched fields with their coordinates.
///
/// Equality compares values and every coordinate, so two grids are equal
/// only if they describe the same request with identical data.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    time: Vec<DateTime<Utc>>,
    variable: Vec<String>,
    lat: Array1<f64>,
    lon: Array1<f64>,
    values: Array4<f32>,
}

impl Grid {
    /// Zero-filled grid on the output lattice for the given coordinates.
    pub(crate) fn zeros(time: Vec<DateTime<Utc>>, variable: Vec<String>) -> Self {
        let shape = (time.len(), variable.len(), NLAT, NLON);
        Self {
            time,
            variable,
            lat: Array1::from_shape_fn(NLAT, |i| 90.0 - RESOLUTION * i as f64),
            lon: Array1::from_shape_fn(NLON, |j| RESOLUTION * j as f64),
            values: Array4::zeros(shape),
        }
    }

    /// Copies one conformed field into position `(t, v)`.
    pub(crate) fn set_field(&mut self, t: usize, v: usize, field: &[f32]) {
        let mut target = self.values.slice_mut(s![t, v, .., ..]);
        for (dst, src) in target.iter_mut().zip(field) {
            *dst = *src;
        }
    }

    /// `(time, variable, lat, lon)` extents.
    pub fn shape(&self) -> [usize; 4] {
        let (t, v, y, x) = self.values.dim();
        [t, v, y, x]
    }

    /// Time coordinate, in request order.
    pub fn time(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    /// Variable coordinate, in request order.
    pub fn variable(&self) -> &[String] {
        &self.variable
    }

    /// Latitude coordinate (90 to -90).
    pub fn lat(&self) -> &Array1<f64> {
        &self.lat
    }

    /// Longitude coordinate (0 to 359.75).
    pub fn lon(&self) -> &Array1<f64> {
        &self.lon
    }

    /// All values.
    pub fn values(&self) -> &Array4<f32> {
        &self.values
    }

    /// Consumes the grid, returning its values.
    pub fn into_values(self) -> Array4<f32> {
        self.values
    }

    /// Returns `true` if any value is NaN.
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// The `(lat, lon)` field at positions `t`, `v`.
    pub fn field(&self, t: usize, v: usize) -> ArrayView2<'_, f32> {
        self.values.slice(s![t, v, .., ..])
    }

    /// All times of one variable, or `None` if it was not requested.
    pub fn sel(&self, variable: &str) -> Option<ArrayView3<'_, f32>> {
        let v = self.variable.iter().position(|name| name == variable)?;
        Some(self.values.index_axis(Axis(1), v))
    }
}
