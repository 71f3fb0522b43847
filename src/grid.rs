//! Grid enumeration and canonical cell keys
//!
//! A [`GridRegion`] describes a bounding box and a step. Its cells are
//! enumerated lazily in row-major order (latitude outer, longitude inner) and
//! every coordinate is rounded to six decimals, so two enumerations over the
//! same parameters always produce identical sequences.
//!
//! [`CellKey`]s snap a coordinate back onto the grid before formatting it,
//! which makes them immune to floating-point drift: `-10.0000001`,
//! `-9.9999999` and `-10.0` all name the same cell.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds are inclusive within this tolerance
const BOUND_EPSILON: f64 = 1e-9;

/// Decimal digits kept in coordinates and keys
const COORD_SCALE: f64 = 1e6;

/// Round a coordinate to six decimal digits
///
/// Negative zero is normalized to zero so it never leaks into keys.
#[must_use]
pub fn round6(value: f64) -> f64 {
    (value * COORD_SCALE).round() / COORD_SCALE + 0.0
}

/// One grid square, identified by its snapped corner coordinate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GridCell {
    /// Create a cell at the given coordinate
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Canonical string identity of a cell, e.g. `"-40,110.5"`
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellKey(String);

impl CellKey {
    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-canonical key string (as read back from storage)
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CellKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bounding box and step of the crawl grid
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridRegion {
    /// Southern bound in degrees (default: -40.0)
    #[serde(default = "default_lat_min")]
    pub lat_min: f64,
    /// Northern bound in degrees, inclusive (default: -10.0)
    #[serde(default = "default_lat_max")]
    pub lat_max: f64,
    /// Western bound in degrees (default: 110.0)
    #[serde(default = "default_lon_min")]
    pub lon_min: f64,
    /// Eastern bound in degrees, inclusive (default: 154.0)
    #[serde(default = "default_lon_max")]
    pub lon_max: f64,
    /// Distance between neighbouring cells in degrees (default: 1.0)
    #[serde(default = "default_step")]
    pub step: f64,
}

impl Default for GridRegion {
    fn default() -> Self {
        Self {
            lat_min: default_lat_min(),
            lat_max: default_lat_max(),
            lon_min: default_lon_min(),
            lon_max: default_lon_max(),
            step: default_step(),
        }
    }
}

impl GridRegion {
    /// Create a region from explicit bounds
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64, step: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            step,
        }
    }

    /// Reject bounds and steps that cannot produce a finite grid
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("region.lat_min", self.lat_min),
            ("region.lat_max", self.lat_max),
            ("region.lon_min", self.lon_min),
            ("region.lon_max", self.lon_max),
        ];
        for (key, value) in bounds {
            if !value.is_finite() {
                return Err(Error::config(key, format!("must be finite, got {value}")));
            }
        }
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(Error::config(
                "region.step",
                format!("must be a positive number, got {}", self.step),
            ));
        }
        if self.lat_min > self.lat_max {
            return Err(Error::config(
                "region.lat_min",
                format!("{} is above lat_max {}", self.lat_min, self.lat_max),
            ));
        }
        if self.lon_min > self.lon_max {
            return Err(Error::config(
                "region.lon_min",
                format!("{} is above lon_max {}", self.lon_min, self.lon_max),
            ));
        }
        Ok(())
    }

    /// Number of rows (distinct latitudes) in the grid
    pub fn lat_steps(&self) -> usize {
        axis_steps(self.lat_min, self.lat_max, self.step)
    }

    /// Number of columns (distinct longitudes) in the grid
    pub fn lon_steps(&self) -> usize {
        axis_steps(self.lon_min, self.lon_max, self.step)
    }

    /// Total number of cells in the grid
    pub fn total_cells(&self) -> usize {
        self.lat_steps().saturating_mul(self.lon_steps())
    }

    /// Lazily enumerate every cell in row-major order
    ///
    /// Each call returns a fresh iterator starting from the first cell.
    pub fn cells(&self) -> GridIter {
        GridIter {
            region: *self,
            rows: self.lat_steps(),
            cols: self.lon_steps(),
            row: 0,
            col: 0,
        }
    }

    /// Canonical key of the cell containing `(lat, lon)`
    pub fn cell_key(&self, lat: f64, lon: f64) -> CellKey {
        let la = snap(lat, self.lat_min, self.step);
        let lo = snap(lon, self.lon_min, self.step);
        CellKey(format!("{la},{lo}"))
    }

    /// Canonical key of a cell
    pub fn key_of(&self, cell: &GridCell) -> CellKey {
        self.cell_key(cell.lat, cell.lon)
    }
}

fn snap(value: f64, min: f64, step: f64) -> f64 {
    round6(((value - min) / step).round() * step + min)
}

fn axis_steps(min: f64, max: f64, step: f64) -> usize {
    if !(step > 0.0) || max < min {
        return 0;
    }
    // Float-to-int casts saturate, so absurd spans cannot wrap around
    ((max - min) / step + BOUND_EPSILON).floor() as usize + 1
}

/// Row-major iterator over the cells of a [`GridRegion`]
#[derive(Clone, Debug)]
pub struct GridIter {
    region: GridRegion,
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
}

impl Iterator for GridIter {
    type Item = GridCell;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.rows || self.cols == 0 {
            return None;
        }

        let lat = round6(self.region.lat_min + self.row as f64 * self.region.step);
        let lon = round6(self.region.lon_min + self.col as f64 * self.region.step);

        self.col += 1;
        if self.col >= self.cols {
            self.col = 0;
            self.row += 1;
        }

        Some(GridCell { lat, lon })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.row >= self.rows || self.cols == 0 {
            0
        } else {
            (self.rows - self.row - 1)
                .saturating_mul(self.cols)
                .saturating_add(self.cols - self.col)
        };
        (remaining, Some(remaining))
    }
}

fn default_lat_min() -> f64 {
    -40.0
}

fn default_lat_max() -> f64 {
    -10.0
}

fn default_lon_min() -> f64 {
    110.0
}

fn default_lon_max() -> f64 {
    154.0
}

fn default_step() -> f64 {
    1.0
}
