use image::{Rgba, RgbaImage};

/// Normalized 8-bit RGBA samples, stored row-major and indexed `[row][col]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    samples: Vec<Rgba<u8>>,
}

impl PixelGrid {
    /// Allocates a grid of `width` columns by `height` rows, filled with transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize);
        Self {
            width,
            height,
            samples: vec![Rgba([0, 0, 0, 0]); len],
        }
    }

    /// Number of columns.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&Rgba<u8>> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.samples.get(self.index(row, col))
    }

    pub(crate) fn put(&mut self, row: u32, col: u32, px: Rgba<u8>) {
        let idx = self.index(row, col);
        self.samples[idx] = px;
    }

    /// Samples of one row, or an empty slice when `row` is out of range.
    pub fn row(&self, row: u32) -> &[Rgba<u8>] {
        if row >= self.height {
            return &[];
        }
        let start = (row as usize) * (self.width as usize);
        &self.samples[start..start + self.width as usize]
    }

    /// Iterates rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Rgba<u8>]> {
        (0..self.height).map(move |r| self.row(r))
    }

    /// Nested `[row][col]` copy of the samples.
    pub fn to_rows(&self) -> Vec<Vec<Rgba<u8>>> {
        self.rows().map(|r| r.to_vec()).collect()
    }

    pub fn as_samples(&self) -> &[Rgba<u8>] {
        &self.samples
    }

    /// Converts into an `RgbaImage` where pixel `(x, y)` is `grid[y][x]`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| self.samples[self.index(y, x)])
    }

    fn index(&self, row: u32, col: u32) -> usize {
        (row as usize) * (self.width as usize) + col as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_transparent_black() {
        let g = PixelGrid::new(3, 2);
        assert_eq!(g.dimensions(), (3, 2));
        assert_eq!(g.as_samples().len(), 6);
        assert!(g.as_samples().iter().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn row_major_layout() {
        let mut g = PixelGrid::new(3, 2);
        g.put(1, 2, Rgba([9, 8, 7, 6]));
        assert_eq!(g.get(1, 2), Some(&Rgba([9, 8, 7, 6])));
        assert_eq!(g.row(1)[2], Rgba([9, 8, 7, 6]));
        assert_eq!(g.as_samples()[5], Rgba([9, 8, 7, 6]));
        assert_eq!(g.get(2, 0), None);
        assert_eq!(g.get(0, 3), None);
        assert!(g.row(5).is_empty());
    }

    #[test]
    fn rgba_image_uses_col_as_x() {
        let mut g = PixelGrid::new(2, 1);
        g.put(0, 1, Rgba([1, 2, 3, 4]));
        let img = g.to_rgba_image();
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(*img.get_pixel(1, 0), Rgba([1, 2, 3, 4]));
        assert_eq!(g.to_rows()[0][1], Rgba([1, 2, 3, 4]));
    }
}
