use crate::codec::{Dimensions, PixelSource};
use crate::grid::PixelGrid;
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rule for narrowing a 16-bit channel sample to 8 bits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// Keep the most significant byte: `v >> 8`.
    #[default]
    HighByte,
    /// Keep the least significant byte: `v & 0xff`. Matches the high byte for 8-bit sources.
    LowByte,
}

impl Truncation {
    pub fn apply(self, v: u16) -> u8 {
        match self {
            Self::HighByte => (v >> 8) as u8,
            Self::LowByte => v as u8,
        }
    }

    pub fn apply_rgba(self, sample: [u16; 4]) -> Rgba<u8> {
        Rgba(sample.map(|c| self.apply(c)))
    }
}

impl FromStr for Truncation {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high_byte" | "high" | "msb" => Ok(Self::HighByte),
            "low_byte" | "low" | "lsb" => Ok(Self::LowByte),
            _ => Err(()),
        }
    }
}

/// Shape of the grid produced for a `width x height` source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GridShape {
    /// `height` rows of `width` columns.
    #[default]
    Exact,
    /// `height` rows of `height` columns. Columns past `height` are dropped;
    /// columns past `width` stay transparent black.
    SquareByHeight,
}

impl GridShape {
    /// Grid `(columns, rows)` for a source of size `dims`.
    pub fn grid_size(self, dims: Dimensions) -> (u32, u32) {
        match self {
            Self::Exact => (dims.width, dims.height),
            Self::SquareByHeight => (dims.height, dims.height),
        }
    }
}

impl FromStr for GridShape {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "square_by_height" | "square" => Ok(Self::SquareByHeight),
            _ => Err(()),
        }
    }
}

/// Copies `source` into a new grid, row-major, querying the source at `(x = col, y = row)`.
///
/// `dims` is the size reported by the metadata pass; it drives both the allocation
/// and the loop bounds. Samples the source cannot provide stay zero.
pub fn normalize(
    source: &dyn PixelSource,
    dims: Dimensions,
    shape: GridShape,
    truncation: Truncation,
) -> PixelGrid {
    let (cols, rows) = shape.grid_size(dims);
    let mut grid = PixelGrid::new(cols, rows);
    let col_bound = dims.width.min(cols);
    for row in 0..rows {
        for col in 0..col_bound {
            if let Some(sample) = source.sample(col, row) {
                grid.put(row, col, truncation.apply_rgba(sample));
            }
        }
    }
    grid
}
