//! # Visibility Resolver
//!
//! Turns a decoded index image into the set of ground locations visible in
//! the photograph.
//!
//! ## Algorithm
//! ```text
//! for every stride-th pixel on both axes:
//!     cell  = index[x, y]          (skip background / undecodable)
//!     (x,y) = dem.to_crs_coordinate(cell)
//!     loc   = adapter.to_location(x, y, dem.elevation(cell))
//!     insert loc keyed by (round(lat, d), round(lon, d))
//! ```
//! Visible terrain varies smoothly, so sampling every few pixels loses
//! nothing the proximity filter can distinguish while cutting the work by
//! the square of the stride.
//!
//! ## Table of Contents
//! 1. VisibleSet
//! 2. ResolveStats
//! 3. VisibilityResolver

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::codec::DecodedIndex;
use crate::config::RegistrationConfig;
use crate::crs::{CrsAdapter, GeodeticTransform};
use crate::dem::DemRaster;
use crate::types::Location;

// ============================================================================
// 1. VisibleSet
// ============================================================================

/// Deduplicated visible locations, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleSet {
    locations: Vec<Location>,
}

impl VisibleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-deduplicated locations
    pub fn from_locations(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }
}

// ============================================================================
// 2. ResolveStats
// ============================================================================

/// Per-pixel outcome counts of one resolve pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    /// Pixels visited after striding
    pub sampled: usize,
    /// Sampled pixels with no cell (background or undecodable color)
    pub empty: usize,
    /// Cells beyond the raster's dimensions
    pub outside_raster: usize,
    /// Cells with a void elevation
    pub voids: usize,
    /// Cells whose coordinate conversion failed
    pub conversion_failures: usize,
    /// Locations kept after deduplication
    pub retained: usize,
}

// ============================================================================
// 3. VisibilityResolver
// ============================================================================

/// Strided index-image traversal with rounded-coordinate deduplication
#[derive(Debug, Clone, Copy)]
pub struct VisibilityResolver {
    stride: u32,
    decimals: u32,
}

impl VisibilityResolver {
    pub fn new(stride: u32, decimals: u32) -> Self {
        Self {
            stride: stride.max(1),
            decimals,
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.sample_stride, config.dedup_decimals)
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Resolve every sampled pixel of `index` to a visible location
    pub fn resolve<T: GeodeticTransform>(
        &self,
        index: &DecodedIndex,
        dem: &dyn DemRaster,
        adapter: &CrsAdapter<T>,
    ) -> (VisibleSet, ResolveStats) {
        let (rows, cols) = dem.dimensions();
        let bounds = dem.bounds();
        let scale = 10f64.powi(self.decimals as i32);

        let mut stats = ResolveStats::default();
        let mut seen: HashSet<(i64, i64)> = HashSet::new();
        let mut locations = Vec::new();

        for y in (0..index.height()).step_by(self.stride as usize) {
            for x in (0..index.width()).step_by(self.stride as usize) {
                stats.sampled += 1;
                let Some(cell) = index.get(x, y) else {
                    stats.empty += 1;
                    continue;
                };
                if cell.row >= rows || cell.col >= cols {
                    stats.outside_raster += 1;
                    continue;
                }
                let elevation = dem.elevation(cell.row, cell.col);
                if !elevation.is_finite() {
                    stats.voids += 1;
                    continue;
                }

                let (cx, cy) = dem.to_crs_coordinate(cell.row, cell.col);
                let location = match adapter
                    .normalize(&bounds, cx, cy)
                    .and_then(|_| adapter.to_location(cx, cy, elevation))
                {
                    Ok(location) => location,
                    Err(e) => {
                        tracing::trace!(row = cell.row, col = cell.col, "conversion failed: {}", e);
                        stats.conversion_failures += 1;
                        continue;
                    }
                };

                let key = (
                    (location.latitude * scale).round() as i64,
                    (location.longitude * scale).round() as i64,
                );
                if seen.insert(key) {
                    locations.push(location);
                }
            }
        }

        stats.retained = locations.len();
        if stats.conversion_failures > 0 {
            tracing::warn!(
                failures = stats.conversion_failures,
                "dropped cells whose coordinates could not be converted"
            );
        }
        if locations.is_empty() {
            tracing::warn!(sampled = stats.sampled, "index image shows no terrain");
        } else {
            tracing::debug!(
                sampled = stats.sampled,
                retained = stats.retained,
                empty = stats.empty,
                "resolved visible locations"
            );
        }

        (VisibleSet::from_locations(locations), stats)
    }
}

impl Default for VisibilityResolver {
    fn default() -> Self {
        Self::from_config(&RegistrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GridColorCodec, RasterCell};
    use crate::crs::tests::LocalMeters;
    use crate::crs::{GeographicIdentity, RasterBounds, WGS84};
    use crate::dem::GridDem;
    use crate::error::ConversionError;
    use image::{Rgb, RgbImage};

    /// 10x10 geographic grid, 0.001° cells, elevation = 1000 + row
    fn dem() -> GridDem {
        let elevations = (0..10)
            .flat_map(|row| (0..10).map(move |_| 1000.0 + row as f32))
            .collect();
        GridDem::new(
            RasterBounds::new(7.0, 45.0, 7.01, 45.01),
            WGS84,
            10,
            10,
            elevations,
        )
        .unwrap()
    }

    fn adapter() -> CrsAdapter<GeographicIdentity> {
        CrsAdapter::new(GeographicIdentity, 1e-9)
    }

    #[test]
    fn test_single_cell_resolves_to_cell_center() {
        let mut cells = vec![None; 9];
        cells[0] = Some(RasterCell::new(2, 3));
        let index = DecodedIndex::from_cells(3, 3, cells).unwrap();

        let (set, stats) = VisibilityResolver::new(1, 6).resolve(&index, &dem(), &adapter());
        assert_eq!(set.len(), 1);
        let loc = set.locations()[0];
        assert!((loc.latitude - 45.0075).abs() < 1e-9);
        assert!((loc.longitude - 7.0035).abs() < 1e-9);
        assert_eq!(loc.elevation, 1002.0);
        assert_eq!(stats.empty, 8);
        assert_eq!(stats.retained, 1);
    }

    #[test]
    fn test_stride_skips_pixels() {
        let cells = (0..36).map(|i| Some(RasterCell::new(i / 6, i % 6))).collect();
        let index = DecodedIndex::from_cells(6, 6, cells).unwrap();

        let (set, stats) = VisibilityResolver::new(3, 6).resolve(&index, &dem(), &adapter());
        // Pixels (0,0) (3,0) (0,3) (3,3)
        assert_eq!(stats.sampled, 4);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_duplicates_collapse() {
        let cells = vec![Some(RasterCell::new(4, 4)); 16];
        let index = DecodedIndex::from_cells(4, 4, cells).unwrap();

        let (set, stats) = VisibilityResolver::new(1, 6).resolve(&index, &dem(), &adapter());
        assert_eq!(stats.sampled, 16);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rounding_merges_neighbouring_cells() {
        let cells = vec![Some(RasterCell::new(0, 0)), Some(RasterCell::new(0, 1))];
        let index = DecodedIndex::from_cells(2, 1, cells).unwrap();

        // 0.001° apart: distinct at 6 decimals, merged at 2
        let fine = VisibilityResolver::new(1, 6).resolve(&index, &dem(), &adapter()).0;
        let coarse = VisibilityResolver::new(1, 2).resolve(&index, &dem(), &adapter()).0;
        assert_eq!(fine.len(), 2);
        assert_eq!(coarse.len(), 1);
    }

    #[test]
    fn test_background_image_is_empty_not_error() {
        let codec = GridColorCodec::new(10, 10).unwrap();
        let image = RgbImage::from_pixel(30, 20, Rgb([0, 0, 0]));
        let index = codec.decode_image(&image);

        let (set, stats) = VisibilityResolver::default().resolve(&index, &dem(), &adapter());
        assert!(set.is_empty());
        assert_eq!(stats.retained, 0);
        assert_eq!(stats.empty, stats.sampled);
    }

    #[test]
    fn test_voids_and_out_of_range_cells_are_skipped() {
        let mut raster = dem();
        raster.set_elevation(1, 1, f32::NAN);
        let cells = vec![
            Some(RasterCell::new(1, 1)),
            Some(RasterCell::new(50, 0)),
            Some(RasterCell::new(2, 2)),
        ];
        let index = DecodedIndex::from_cells(3, 1, cells).unwrap();

        let (set, stats) = VisibilityResolver::new(1, 6).resolve(&index, &raster, &adapter());
        assert_eq!(set.len(), 1);
        assert_eq!(stats.voids, 1);
        assert_eq!(stats.outside_raster, 1);
    }

    struct Failing;

    impl GeodeticTransform for Failing {
        fn forward(&self, _lat: f64, _lon: f64) -> Result<(f64, f64), ConversionError> {
            Err(ConversionError::Transform("unsupported".into()))
        }

        fn inverse(&self, _x: f64, _y: f64) -> Result<(f64, f64), ConversionError> {
            Err(ConversionError::Transform("unsupported".into()))
        }

        fn target_crs(&self) -> &str {
            "NONE"
        }
    }

    #[test]
    fn test_conversion_failures_only_drop_the_point() {
        let cells = vec![Some(RasterCell::new(0, 0)), Some(RasterCell::new(1, 1))];
        let index = DecodedIndex::from_cells(2, 1, cells).unwrap();

        let (set, stats) =
            VisibilityResolver::new(1, 6).resolve(&index, &dem(), &CrsAdapter::new(Failing, 0.0));
        assert!(set.is_empty());
        assert_eq!(stats.conversion_failures, 2);
    }

    #[test]
    fn test_projected_raster_round_trip() {
        // 1 km square in local meters around 61.6N 8.3E
        let raster = GridDem::new(
            RasterBounds::new(-500.0, -500.0, 500.0, 500.0),
            "LOCAL:METERS",
            10,
            10,
            vec![2000.0; 100],
        )
        .unwrap();
        let adapter = CrsAdapter::new(
            LocalMeters {
                origin_lat: 61.6,
                origin_lon: 8.3,
            },
            1e-9,
        );
        let cells = vec![Some(RasterCell::new(5, 5))];
        let index = DecodedIndex::from_cells(1, 1, cells).unwrap();

        let (set, _) = VisibilityResolver::new(1, 6).resolve(&index, &raster, &adapter);
        let loc = set.locations()[0];
        // Cell (5,5) center is 50 m east and 50 m south of the origin
        assert!((loc.latitude - (61.6 - 50.0 / 111_320.0)).abs() < 1e-9);
        assert!(loc.longitude > 8.3);
    }

    #[test]
    fn test_insertion_order_is_deterministic() {
        let cells = vec![
            Some(RasterCell::new(9, 9)),
            Some(RasterCell::new(0, 0)),
            Some(RasterCell::new(9, 9)),
        ];
        let index = DecodedIndex::from_cells(3, 1, cells).unwrap();
        let resolver = VisibilityResolver::new(1, 6);
        let (a, _) = resolver.resolve(&index, &dem(), &adapter());
        let (b, _) = resolver.resolve(&index, &dem(), &adapter());
        assert_eq!(a, b);
        assert_eq!(a.locations()[0].elevation, 1009.0);
    }
}
