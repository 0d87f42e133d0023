//! # DEM Rasters
//!
//! Elevation grids the visibility resolver reads cell elevations and CRS
//! coordinates from.
//!
//! ## Grid convention
//! Row 0 is the northern edge, column 0 the western edge. A cell's CRS
//! coordinate is its center.
//!
//! ## Table of Contents
//! 1. DemRaster — Accessor trait
//! 2. GridDem — In-memory raster
//! 3. HGT file parsing (SRTM 1-arc-second and 3-arc-second)
//! 4. GeoTIFF import (feature-gated)

use std::path::Path;

use crate::crs::{RasterBounds, WGS84};
use crate::error::{GeoRefError, Result};
use crate::heights::ElevationRange;

// ============================================================================
// 1. DemRaster — Accessor trait
// ============================================================================

/// Read access to an elevation raster
pub trait DemRaster {
    /// Outer bounding box in CRS units
    fn bounds(&self) -> RasterBounds;

    /// CRS identifier (e.g. "EPSG:4326")
    fn crs(&self) -> &str;

    /// (rows, cols)
    fn dimensions(&self) -> (u32, u32);

    /// Elevation in meters; NaN for void cells or out-of-range indices
    fn elevation(&self, row: u32, col: u32) -> f64;

    /// Cell containing the CRS coordinate, or None outside the raster
    fn index_of(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let bounds = self.bounds();
        let (rows, cols) = self.dimensions();
        if rows == 0 || cols == 0 {
            return None;
        }
        if !(bounds.min_x..=bounds.max_x).contains(&x) || !(bounds.min_y..=bounds.max_y).contains(&y) {
            return None;
        }
        let col = ((x - bounds.min_x) / bounds.width() * cols as f64).floor() as u32;
        let row = ((bounds.max_y - y) / bounds.height() * rows as f64).floor() as u32;
        Some((row.min(rows - 1), col.min(cols - 1)))
    }

    /// CRS coordinate of the cell center
    fn to_crs_coordinate(&self, row: u32, col: u32) -> (f64, f64) {
        let bounds = self.bounds();
        let (rows, cols) = self.dimensions();
        let cell_w = bounds.width() / cols as f64;
        let cell_h = bounds.height() / rows as f64;
        (
            bounds.min_x + (col as f64 + 0.5) * cell_w,
            bounds.max_y - (row as f64 + 0.5) * cell_h,
        )
    }

    /// Lowest and highest finite elevation
    fn elevation_range(&self) -> Option<ElevationRange> {
        let (rows, cols) = self.dimensions();
        ElevationRange::from_samples(
            (0..rows).flat_map(|row| (0..cols).map(move |col| (row, col)))
                .map(|(row, col)| self.elevation(row, col)),
        )
    }
}

// ============================================================================
// 2. GridDem — In-memory raster
// ============================================================================

/// Row-major elevation grid with bounds and CRS
#[derive(Debug, Clone)]
pub struct GridDem {
    bounds: RasterBounds,
    crs: String,
    rows: u32,
    cols: u32,
    elevations: Vec<f32>,
}

impl GridDem {
    /// Build from row-major samples (`rows * cols` entries, NaN = void)
    pub fn new(
        bounds: RasterBounds,
        crs: impl Into<String>,
        rows: u32,
        cols: u32,
        elevations: Vec<f32>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(GeoRefError::raster("raster has no cells"));
        }
        if elevations.len() != rows as usize * cols as usize {
            return Err(GeoRefError::raster(format!(
                "expected {}x{} samples, got {}",
                rows,
                cols,
                elevations.len()
            )));
        }
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return Err(GeoRefError::raster("raster bounds are degenerate"));
        }
        Ok(Self {
            bounds,
            crs: crs.into(),
            rows,
            cols,
            elevations,
        })
    }

    /// Replace one cell's elevation
    pub fn set_elevation(&mut self, row: u32, col: u32, elevation: f32) {
        if row < self.rows && col < self.cols {
            self.elevations[row as usize * self.cols as usize + col as usize] = elevation;
        }
    }

    /// Geographic raster covering an SRTM tile (samples are cell centers)
    pub fn from_hgt(tile: &HgtTile) -> Self {
        let side = tile.resolution.samples_per_side();
        let spacing = 1.0 / (side - 1) as f64;
        let half = spacing / 2.0;
        let bounds = RasterBounds::new(
            tile.lon as f64 - half,
            tile.lat as f64 - half,
            (tile.lon + 1) as f64 + half,
            (tile.lat + 1) as f64 + half,
        );
        let elevations = tile
            .elevations
            .iter()
            .map(|&v| if v == HGT_VOID { f32::NAN } else { v as f32 })
            .collect();
        Self {
            bounds,
            crs: WGS84.to_string(),
            rows: side as u32,
            cols: side as u32,
            elevations,
        }
    }
}

impl DemRaster for GridDem {
    fn bounds(&self) -> RasterBounds {
        self.bounds
    }

    fn crs(&self) -> &str {
        &self.crs
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    fn elevation(&self, row: u32, col: u32) -> f64 {
        if row >= self.rows || col >= self.cols {
            return f64::NAN;
        }
        self.elevations[row as usize * self.cols as usize + col as usize] as f64
    }
}

// ============================================================================
// 3. HGT file parsing (SRTM 1-arc-second and 3-arc-second)
// ============================================================================

/// Void marker in SRTM tiles
pub const HGT_VOID: i16 = -32768;

/// SRTM resolution variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtmResolution {
    /// 1 arc-second (~30m) — 3601×3601 samples per tile
    OneArcSecond,
    /// 3 arc-second (~90m) — 1201×1201 samples per tile
    ThreeArcSecond,
}

impl SrtmResolution {
    /// Samples per side for this resolution
    pub fn samples_per_side(&self) -> usize {
        match self {
            SrtmResolution::OneArcSecond => 3601,
            SrtmResolution::ThreeArcSecond => 1201,
        }
    }

    fn from_file_size(len: usize) -> Option<Self> {
        match len {
            // 3601 * 3601 * 2 bytes
            25_934_402 => Some(SrtmResolution::OneArcSecond),
            // 1201 * 1201 * 2 bytes
            2_884_802 => Some(SrtmResolution::ThreeArcSecond),
            _ => None,
        }
    }
}

/// Parsed SRTM HGT tile
#[derive(Debug, Clone)]
pub struct HgtTile {
    /// SW corner latitude (integer degrees)
    pub lat: i32,
    /// SW corner longitude (integer degrees)
    pub lon: i32,
    pub resolution: SrtmResolution,
    /// Row-major samples, NW corner first. -32768 = void.
    pub elevations: Vec<i16>,
}

impl HgtTile {
    /// Parse an SRTM HGT file from disk.
    /// Filename encodes the SW corner: `N61E008.hgt` → lat=61, lon=8
    pub fn load(path: &Path) -> Result<Self> {
        let filename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| GeoRefError::raster(format!("invalid HGT filename: {}", path.display())))?;

        let (lat, lon) = parse_hgt_filename(filename).ok_or_else(|| {
            GeoRefError::raster(format!("cannot parse lat/lon from filename: {}", filename))
        })?;

        let data = std::fs::read(path)?;
        let resolution = SrtmResolution::from_file_size(data.len()).ok_or_else(|| {
            GeoRefError::raster(format!(
                "unexpected HGT file size: {} bytes (expected 25934402 or 2884802)",
                data.len()
            ))
        })?;

        // Big-endian i16 samples
        let elevations: Vec<i16> = data
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        tracing::info!(
            "Loaded HGT tile: {}°{} {}°{} ({:?}, {} samples)",
            lat.abs(),
            if lat >= 0 { "N" } else { "S" },
            lon.abs(),
            if lon >= 0 { "E" } else { "W" },
            resolution,
            elevations.len()
        );

        Ok(HgtTile {
            lat,
            lon,
            resolution,
            elevations,
        })
    }
}

/// Parse SRTM filename like "N61E008" → (61, 8)
fn parse_hgt_filename(name: &str) -> Option<(i32, i32)> {
    if name.len() < 7 || !name.is_ascii() {
        return None;
    }
    let name = name.to_uppercase();

    let lat_sign = match name.as_bytes()[0] {
        b'N' => 1,
        b'S' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;

    let lon_sign = match name.as_bytes()[3] {
        b'E' => 1,
        b'W' => -1,
        _ => return None,
    };
    let lon: i32 = name[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}

// ============================================================================
// 4. GeoTIFF import (feature-gated)
// ============================================================================

/// Single-band GeoTIFF elevation rasters
#[cfg(feature = "geotiff")]
pub mod geotiff {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use tiff::decoder::{Decoder, DecodingResult};
    use tiff::tags::Tag;

    use super::GridDem;
    use crate::crs::{RasterBounds, WGS84};
    use crate::error::{GeoRefError, Result};

    const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
    const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

    fn tiff_err(path: &Path, e: tiff::TiffError) -> GeoRefError {
        GeoRefError::raster(format!("{}: {}", path.display(), e))
    }

    /// Load a north-up GeoTIFF (ModelPixelScale + ModelTiepoint) into memory
    pub fn load(path: &Path) -> Result<GridDem> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| tiff_err(path, e))?;

        let (width, height) = decoder.dimensions().map_err(|e| tiff_err(path, e))?;
        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|e| tiff_err(path, e))?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|e| tiff_err(path, e))?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(GeoRefError::raster(format!(
                "{}: malformed georeferencing tags",
                path.display()
            )));
        }

        let crs = decoder
            .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
            .ok()
            .and_then(|keys| crs_from_geokeys(&keys))
            .unwrap_or_else(|| WGS84.to_string());

        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

        let samples: Vec<f64> = match decoder.read_image().map_err(|e| tiff_err(path, e))? {
            DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
            DecodingResult::F64(buf) => buf,
            _ => {
                return Err(GeoRefError::raster(format!(
                    "{}: unsupported sample format",
                    path.display()
                )))
            }
        };

        let elevations = samples
            .into_iter()
            .map(|v| match nodata {
                Some(nd) if v == nd => f32::NAN,
                _ => v as f32,
            })
            .collect();

        let (sx, sy) = (scale[0], scale[1]);
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let min_x = x - i * sx;
        let max_y = y + j * sy;
        let bounds = RasterBounds::new(
            min_x,
            max_y - height as f64 * sy,
            min_x + width as f64 * sx,
            max_y,
        );

        tracing::info!(
            "Loaded GeoTIFF DEM {} ({}x{}, {})",
            path.display(),
            width,
            height,
            crs
        );
        GridDem::new(bounds, crs, height, width, elevations)
    }

    /// EPSG code from a GeoKeyDirectory (projected CRS preferred over geographic)
    fn crs_from_geokeys(keys: &[u16]) -> Option<String> {
        if keys.len() < 4 {
            return None;
        }
        let count = keys[3] as usize;
        let entries: Vec<&[u16]> = keys[4..].chunks_exact(4).take(count).collect();
        let lookup = |id: u16| {
            entries
                .iter()
                .find(|e| e[0] == id && e[1] == 0)
                .map(|e| e[3])
                .filter(|code| *code != 0 && *code != 32767)
        };
        lookup(PROJECTED_CS_TYPE_GEO_KEY)
            .or_else(|| lookup(GEOGRAPHIC_TYPE_GEO_KEY))
            .map(|code| format!("EPSG:{}", code))
    }

}
