//! # CRS Adapter
//!
//! Wraps an injected geodetic transform for one CRS pair and normalizes
//! projected coordinates against a raster's bounding box.
//!
//! ## Pipeline
//! ```text
//! Geographic (WGS84)  →  Projected (DEM CRS)  →  Normalized raster position
//!   lat/lon degrees       x/y in CRS units         (u, v) in [0,1]²
//! ```
//!
//! ## Table of Contents
//! 1. GeodeticTransform — Injected capability
//! 2. GeographicIdentity — DEMs already in WGS84
//! 3. PROJ-based transforms (feature-gated)
//! 4. RasterBounds
//! 5. CrsAdapter — Main entry point

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::heights::{ElevationRange, NormalizedPosition};
use crate::types::Location;

/// Authority code of WGS84 geographic coordinates
pub const WGS84: &str = "EPSG:4326";

// ============================================================================
// 1. GeodeticTransform — Injected capability
// ============================================================================

/// Forward/inverse transform between WGS84 and one target CRS
pub trait GeodeticTransform {
    /// WGS84 (lat, lon) → target CRS (x, y)
    fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError>;

    /// Target CRS (x, y) → WGS84 (lat, lon)
    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError>;

    /// Target CRS identifier (e.g. "EPSG:25833")
    fn target_crs(&self) -> &str;
}

impl<T: GeodeticTransform + ?Sized> GeodeticTransform for &T {
    fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
        (**self).forward(lat, lon)
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
        (**self).inverse(x, y)
    }

    fn target_crs(&self) -> &str {
        (**self).target_crs()
    }
}

impl<T: GeodeticTransform + ?Sized> GeodeticTransform for Box<T> {
    fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
        (**self).forward(lat, lon)
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
        (**self).inverse(x, y)
    }

    fn target_crs(&self) -> &str {
        (**self).target_crs()
    }
}

// ============================================================================
// 2. GeographicIdentity — DEMs already in WGS84
// ============================================================================

/// Transform for rasters stored in WGS84: x = longitude, y = latitude
#[derive(Debug, Clone, Copy, Default)]
pub struct GeographicIdentity;

impl GeodeticTransform for GeographicIdentity {
    fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
        Ok((lon, lat))
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
        Ok((y, x))
    }

    fn target_crs(&self) -> &str {
        WGS84
    }
}

// ============================================================================
// 3. PROJ-based transforms (feature-gated)
// ============================================================================

/// Transform backed by the PROJ library.
/// Holds one transformer per direction for a single CRS pair.
#[cfg(feature = "proj-transforms")]
pub struct ProjTransform {
    target_crs: String,
    forward: proj::Proj,
    inverse: proj::Proj,
}

#[cfg(feature = "proj-transforms")]
impl ProjTransform {
    /// Build transformers between WGS84 and `target_crs` (e.g. "EPSG:32632")
    pub fn new(target_crs: &str) -> Result<Self, ConversionError> {
        let forward = proj::Proj::new_known_crs(WGS84, target_crs, None)
            .map_err(|e| ConversionError::Transform(format!("PROJ init error: {}", e)))?;
        let inverse = proj::Proj::new_known_crs(target_crs, WGS84, None)
            .map_err(|e| ConversionError::Transform(format!("PROJ init error: {}", e)))?;
        tracing::info!("PROJ transform initialized: {} <-> {}", WGS84, target_crs);
        Ok(Self {
            target_crs: target_crs.to_string(),
            forward,
            inverse,
        })
    }
}

#[cfg(feature = "proj-transforms")]
impl GeodeticTransform for ProjTransform {
    fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
        // PROJ expects (lon, lat) order for EPSG:4326
        self.forward
            .convert((lon, lat))
            .map_err(|e| ConversionError::Transform(format!("PROJ transform error: {}", e)))
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
        let (lon, lat) = self
            .inverse
            .convert((x, y))
            .map_err(|e| ConversionError::Transform(format!("PROJ transform error: {}", e)))?;
        Ok((lat, lon))
    }

    fn target_crs(&self) -> &str {
        &self.target_crs
    }
}

// ============================================================================
// 4. RasterBounds
// ============================================================================

/// Bounding box of a raster in its own CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl RasterBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }
}

// ============================================================================
// 5. CrsAdapter — Main entry point
// ============================================================================

/// Geodetic transform plus raster-bounds normalization for one CRS pair
#[derive(Debug, Clone)]
pub struct CrsAdapter<T> {
    transform: T,
    tolerance: f64,
}

impl<T: GeodeticTransform> CrsAdapter<T> {
    /// Adapter accepting normalized positions up to `tolerance` outside [0,1]²
    pub fn new(transform: T, tolerance: f64) -> Self {
        Self {
            transform,
            tolerance,
        }
    }

    /// Target CRS identifier of the wrapped transform
    pub fn target_crs(&self) -> &str {
        self.transform.target_crs()
    }

    /// WGS84 → projected coordinate
    pub fn to_projected(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
        let (x, y) = self.transform.forward(lat, lon)?;
        finite(x, y)
    }

    /// Projected coordinate → Location carrying `elevation`
    pub fn to_location(&self, x: f64, y: f64, elevation: f64) -> Result<Location, ConversionError> {
        let (lat, lon) = self.transform.inverse(x, y)?;
        let (lat, lon) = finite(lat, lon)?;
        Ok(Location::new(lat, lon, elevation))
    }

    /// Projected coordinate → position in [0,1]² (u east, v north)
    pub fn normalize(&self, bounds: &RasterBounds, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
        if bounds.is_degenerate() {
            return Err(ConversionError::DegenerateBounds);
        }
        let (x, y) = finite(x, y)?;
        let u = (x - bounds.min_x) / bounds.width();
        let v = (y - bounds.min_y) / bounds.height();

        let range = -self.tolerance..=1.0 + self.tolerance;
        if !range.contains(&u) || !range.contains(&v) {
            return Err(ConversionError::OutsideRaster { u, v });
        }
        Ok((u.clamp(0.0, 1.0), v.clamp(0.0, 1.0)))
    }

    /// Position in [0,1]² → projected coordinate
    pub fn denormalize(&self, bounds: &RasterBounds, u: f64, v: f64) -> Result<(f64, f64), ConversionError> {
        if bounds.is_degenerate() {
            return Err(ConversionError::DegenerateBounds);
        }
        let (u, v) = finite(u, v)?;
        let range = -self.tolerance..=1.0 + self.tolerance;
        if !range.contains(&u) || !range.contains(&v) {
            return Err(ConversionError::OutsideRaster { u, v });
        }
        Ok((
            bounds.min_x + u * bounds.width(),
            bounds.min_y + v * bounds.height(),
        ))
    }

    /// Location → normalized (u, v, h) scene position within a raster
    pub fn normalized_position(
        &self,
        bounds: &RasterBounds,
        range: &ElevationRange,
        location: &Location,
    ) -> Result<NormalizedPosition, ConversionError> {
        let (x, y) = self.to_projected(location.latitude, location.longitude)?;
        let (u, v) = self.normalize(bounds, x, y)?;
        let h = range
            .normalize(location.elevation)
            .ok_or(ConversionError::NonFinite {
                x: location.elevation,
                y: range.span(),
            })?;
        Ok(NormalizedPosition { u, v, h })
    }
}

fn finite(x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
    if x.is_finite() && y.is_finite() {
        Ok((x, y))
    } else {
        Err(ConversionError::NonFinite { x, y })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Local transverse-plane stand-in for a projected CRS: meters east/north
    /// of an origin, scaled by latitude. Exactly invertible.
    pub(crate) struct LocalMeters {
        pub origin_lat: f64,
        pub origin_lon: f64,
    }

    impl GeodeticTransform for LocalMeters {
        fn forward(&self, lat: f64, lon: f64) -> Result<(f64, f64), ConversionError> {
            let k = 111_320.0;
            Ok((
                (lon - self.origin_lon) * k * self.origin_lat.to_radians().cos(),
                (lat - self.origin_lat) * k,
            ))
        }

        fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
            let k = 111_320.0;
            Ok((
                self.origin_lat + y / k,
                self.origin_lon + x / (k * self.origin_lat.to_radians().cos()),
            ))
        }

        fn target_crs(&self) -> &str {
            "LOCAL:METERS"
        }
    }

    struct Broken;

    impl GeodeticTransform for Broken {
        fn forward(&self, _lat: f64, _lon: f64) -> Result<(f64, f64), ConversionError> {
            Ok((f64::NAN, 0.0))
        }

        fn inverse(&self, _x: f64, _y: f64) -> Result<(f64, f64), ConversionError> {
            Ok((f64::INFINITY, 0.0))
        }

        fn target_crs(&self) -> &str {
            "BROKEN"
        }
    }

    fn bounds() -> RasterBounds {
        RasterBounds::new(-5_000.0, -5_000.0, 5_000.0, 5_000.0)
    }

    #[test]
    fn test_round_trip_within_raster_domain() {
        let adapter = CrsAdapter::new(
            LocalMeters {
                origin_lat: 61.6,
                origin_lon: 8.3,
            },
            1e-9,
        );
        for i in 0..20 {
            let lat = 61.58 + i as f64 * 0.002;
            let lon = 8.27 + i as f64 * 0.003;
            let (x, y) = adapter.to_projected(lat, lon).unwrap();
            adapter.normalize(&bounds(), x, y).unwrap();
            let back = adapter.to_location(x, y, 0.0).unwrap();
            assert!((back.latitude - lat).abs() < 1e-6);
            assert!((back.longitude - lon).abs() < 1e-6);
        }
    }

    #[test]
    fn test_identity_swaps_axes() {
        let adapter = CrsAdapter::new(GeographicIdentity, 0.0);
        assert_eq!(adapter.to_projected(45.0, 7.0).unwrap(), (7.0, 45.0));
        let loc = adapter.to_location(7.0, 45.0, 1200.0).unwrap();
        assert_eq!(loc, Location::new(45.0, 7.0, 1200.0));
        assert_eq!(adapter.target_crs(), WGS84);
    }

    #[test]
    fn test_normalize_corners_and_center() {
        let adapter = CrsAdapter::new(GeographicIdentity, 1e-9);
        let b = bounds();
        assert_eq!(adapter.normalize(&b, -5_000.0, -5_000.0).unwrap(), (0.0, 0.0));
        assert_eq!(adapter.normalize(&b, 5_000.0, 5_000.0).unwrap(), (1.0, 1.0));
        assert_eq!(adapter.normalize(&b, 0.0, 2_500.0).unwrap(), (0.5, 0.75));
        assert_eq!(adapter.denormalize(&b, 0.5, 0.75).unwrap(), (0.0, 2_500.0));
    }

    #[test]
    fn test_normalize_outside_raster_fails() {
        let adapter = CrsAdapter::new(GeographicIdentity, 1e-6);
        let err = adapter.normalize(&bounds(), 6_000.0, 0.0).unwrap_err();
        assert!(matches!(err, ConversionError::OutsideRaster { .. }));

        // Inside the tolerance band: clamped rather than rejected
        let (u, _) = adapter.normalize(&bounds(), 5_000.005, 0.0).unwrap();
        assert_eq!(u, 1.0);
    }

    #[test]
    fn test_non_finite_results_fail() {
        let adapter = CrsAdapter::new(Broken, 0.0);
        assert!(matches!(
            adapter.to_projected(45.0, 7.0),
            Err(ConversionError::NonFinite { .. })
        ));
        assert!(matches!(
            adapter.to_location(0.0, 0.0, 0.0),
            Err(ConversionError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_degenerate_bounds() {
        let adapter = CrsAdapter::new(GeographicIdentity, 0.0);
        let flat = RasterBounds::new(0.0, 0.0, 0.0, 10.0);
        assert_eq!(
            adapter.normalize(&flat, 0.0, 5.0),
            Err(ConversionError::DegenerateBounds)
        );
    }

    #[test]
    fn test_normalized_position_uses_elevation_range() {
        let adapter = CrsAdapter::new(GeographicIdentity, 1e-9);
        let b = RasterBounds::new(7.0, 45.0, 8.0, 46.0);
        let range = ElevationRange::new(1000.0, 3000.0);
        let pos = adapter
            .normalized_position(&b, &range, &Location::new(45.5, 7.25, 2500.0))
            .unwrap();
        assert!((pos.u - 0.25).abs() < 1e-12);
        assert!((pos.v - 0.5).abs() < 1e-12);
        assert!((pos.h - 0.75).abs() < 1e-12);
    }
}
