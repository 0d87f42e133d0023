//! # Grid Color Codec
//!
//! Bijection between DEM cells and RGB colors. The gradient texture built
//! here is draped over the terrain by the external renderer; every pixel of
//! the resulting index image then names the DEM cell seen through it.
//!
//! ## Color layout
//! ```text
//! R = row ramp level      (0..=255)
//! G = column ramp level   (0..=255)
//! B = CELL_MARKER         (255 for every terrain cell)
//! ```
//! Black is the background sentinel. Anything else (blue channel not equal
//! to the marker, or a ramp level past the raster's last bucket) is an
//! unrecognized color, typically an antialiasing blend.
//!
//! ## Quantization
//! Each axis has at most 256 levels. An axis with more cells than that maps
//! `ceil(cells / 256)` adjacent cells onto one level and decodes to the first
//! cell of the bucket, so the decoded row/column can trail the original by
//! less than one bucket.
//!
//! ## Table of Contents
//! 1. RasterCell / ColorClass
//! 2. AxisRamp — One axis' quantization
//! 3. GridColorCodec
//! 4. DecodedIndex — Decoded index image

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{GeoRefError, Result};

/// Colors rendered where no terrain is visible
pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Blue channel value carried by every encoded cell
pub const CELL_MARKER: u8 = 255;

const MAX_LEVELS: u32 = 256;

// ============================================================================
// 1. RasterCell / ColorClass
// ============================================================================

/// Row/column of a DEM cell (row 0 = north edge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterCell {
    pub row: u32,
    pub col: u32,
}

impl RasterCell {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// What a single index-image color means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorClass {
    /// Terrain cell (bucket representative for large axes)
    Cell(RasterCell),
    /// Background sentinel: sky or void
    Background,
    /// Not produced by the codec for this raster
    Unrecognized,
}

// ============================================================================
// 2. AxisRamp — One axis' quantization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisRamp {
    cells: u32,
    levels: u32,
}

impl AxisRamp {
    fn new(cells: u32) -> Self {
        Self {
            cells,
            levels: cells.min(MAX_LEVELS),
        }
    }

    fn level(&self, index: u32) -> u8 {
        (index as u64 * self.levels as u64 / self.cells as u64) as u8
    }

    /// First cell of the bucket, or None for a level this axis never emits
    fn representative(&self, level: u8) -> Option<u32> {
        let level = level as u64;
        if level >= self.levels as u64 {
            return None;
        }
        let numerator = level * self.cells as u64;
        Some(numerator.div_ceil(self.levels as u64) as u32)
    }

    fn bucket_size(&self) -> u32 {
        self.cells.div_ceil(self.levels)
    }
}

// ============================================================================
// 3. GridColorCodec
// ============================================================================

/// Color codec bound to one raster's dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridColorCodec {
    rows: AxisRamp,
    cols: AxisRamp,
}

impl GridColorCodec {
    /// Codec for a raster of `rows` × `cols` cells
    pub fn new(rows: u32, cols: u32) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(GeoRefError::raster(format!(
                "cannot encode an empty raster ({}x{})",
                rows, cols
            )));
        }
        Ok(Self {
            rows: AxisRamp::new(rows),
            cols: AxisRamp::new(cols),
        })
    }

    /// Raster dimensions as (rows, cols)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.rows.cells, self.cols.cells)
    }

    /// Maximum decoding error per axis, in cells, as (rows, cols)
    pub fn bucket_size(&self) -> (u32, u32) {
        (self.rows.bucket_size(), self.cols.bucket_size())
    }

    /// Color for `cell`, or None when the cell is outside the raster
    pub fn encode(&self, cell: RasterCell) -> Option<Rgb<u8>> {
        if cell.row >= self.rows.cells || cell.col >= self.cols.cells {
            return None;
        }
        Some(Rgb([
            self.rows.level(cell.row),
            self.cols.level(cell.col),
            CELL_MARKER,
        ]))
    }

    /// Classify a rendered color
    pub fn classify(&self, color: Rgb<u8>) -> ColorClass {
        if color == BACKGROUND {
            return ColorClass::Background;
        }
        let [r, g, b] = color.0;
        if b != CELL_MARKER {
            return ColorClass::Unrecognized;
        }
        match (self.rows.representative(r), self.cols.representative(g)) {
            (Some(row), Some(col)) => ColorClass::Cell(RasterCell::new(row, col)),
            _ => ColorClass::Unrecognized,
        }
    }

    /// Cell named by `color`; background and unrecognized colors yield None
    pub fn decode(&self, color: Rgb<u8>) -> Option<RasterCell> {
        match self.classify(color) {
            ColorClass::Cell(cell) => Some(cell),
            ColorClass::Background | ColorClass::Unrecognized => None,
        }
    }

    /// Texture with one pixel per raster cell (x = column, y = row)
    pub fn gradient_texture(&self) -> RgbImage {
        RgbImage::from_fn(self.cols.cells, self.rows.cells, |x, y| {
            Rgb([self.rows.level(y), self.cols.level(x), CELL_MARKER])
        })
    }

    /// Decode every pixel of a rendered index image
    pub fn decode_image(&self, image: &RgbImage) -> DecodedIndex {
        let mut cells = Vec::with_capacity(image.width() as usize * image.height() as usize);
        let mut background = 0;
        let mut unrecognized = 0;

        for pixel in image.pixels() {
            match self.classify(*pixel) {
                ColorClass::Cell(cell) => cells.push(Some(cell)),
                ColorClass::Background => {
                    background += 1;
                    cells.push(None);
                }
                ColorClass::Unrecognized => {
                    unrecognized += 1;
                    cells.push(None);
                }
            }
        }

        if unrecognized > 0 {
            tracing::debug!(unrecognized, "index image contains undecodable colors");
        }

        DecodedIndex {
            width: image.width(),
            height: image.height(),
            cells,
            background,
            unrecognized,
        }
    }
}

// ============================================================================
// 4. DecodedIndex — Decoded index image
// ============================================================================

/// Index image after decoding: one optional cell per pixel, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedIndex {
    width: u32,
    height: u32,
    cells: Vec<Option<RasterCell>>,
    background: usize,
    unrecognized: usize,
}

impl DecodedIndex {
    /// Build from an explicit pixel grid (row-major, `width * height` entries)
    pub fn from_cells(width: u32, height: u32, cells: Vec<Option<RasterCell>>) -> Result<Self> {
        if cells.len() != width as usize * height as usize {
            return Err(GeoRefError::raster(format!(
                "index grid has {} entries, expected {}x{}",
                cells.len(),
                width,
                height
            )));
        }
        let background = cells.iter().filter(|c| c.is_none()).count();
        Ok(Self {
            width,
            height,
            cells,
            background,
            unrecognized: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Cell seen at pixel (x, y)
    pub fn get(&self, x: u32, y: u32) -> Option<RasterCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[y as usize * self.width as usize + x as usize]
    }

    /// Pixels that decoded to the background sentinel
    pub fn background_pixels(&self) -> usize {
        self.background
    }

    /// Pixels whose color the codec did not produce
    pub fn unrecognized_pixels(&self) -> usize {
        self.unrecognized
    }
}
