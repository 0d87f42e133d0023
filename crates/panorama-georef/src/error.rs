//! Error types for panorama-georef
//!
//! ## Table of Contents
//! - **ConversionError**: Per-point CRS / raster domain failure (absorbed by callers)
//! - **GeoRefError**: Run-level error enum
//! - **Result**: Type alias for `Result<T, GeoRefError>`

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for registration operations
pub type Result<T> = std::result::Result<T, GeoRefError>;

/// A single coordinate could not be converted.
///
/// Only the point being converted is lost; the resolver counts these and
/// carries on with the rest of the image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Transform produced NaN or an infinite value
    #[error("transform produced a non-finite result ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    /// Normalized position falls outside the raster's [0,1]² domain
    #[error("position ({u:.6}, {v:.6}) lies outside the raster domain")]
    OutsideRaster { u: f64, v: f64 },

    /// Raster bounds have zero width or height
    #[error("raster bounds are degenerate")]
    DegenerateBounds,

    /// Underlying geodetic transform failed
    #[error("transform error: {0}")]
    Transform(String),
}

/// Main error type for a registration run
#[derive(Error, Debug)]
pub enum GeoRefError {
    /// External renderer did not finish before its deadline
    #[error("renderer timed out after {after:?}")]
    RenderTimeout { after: Duration },

    /// External renderer exited abnormally or produced no usable image
    #[error("renderer failed: {0}")]
    RenderFailure(String),

    /// Catalog file could not be read or parsed
    #[error("failed to load catalog {}: {reason}", path.display())]
    Catalog { path: PathBuf, reason: String },

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// DEM raster could not be opened or is malformed
    #[error("raster error: {0}")]
    Raster(String),

    /// Persistence backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted entry exists but does not deserialize
    #[error("cache entry {key} is corrupt: {reason}")]
    CacheCorruption { key: String, reason: String },

    /// Coordinate conversion that the run cannot do without (e.g. the camera itself)
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GeoRefError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a raster error
    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a render failure
    pub fn render_failure(msg: impl Into<String>) -> Self {
        Self::RenderFailure(msg.into())
    }

    /// Create a catalog load error
    pub fn catalog(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the run as a renderer-level failure
    pub fn is_render_error(&self) -> bool {
        matches!(self, Self::RenderTimeout { .. } | Self::RenderFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_errors_are_classified() {
        assert!(GeoRefError::RenderTimeout {
            after: Duration::from_secs(1)
        }
        .is_render_error());
        assert!(GeoRefError::render_failure("exit status 1").is_render_error());
        assert!(!GeoRefError::storage("disk full").is_render_error());
    }

    #[test]
    fn test_catalog_error_message_names_the_file() {
        let err = GeoRefError::catalog("data/peaks.geojson", "not a FeatureCollection");
        let msg = err.to_string();
        assert!(msg.contains("data/peaks.geojson"));
        assert!(msg.contains("not a FeatureCollection"));
    }
}
