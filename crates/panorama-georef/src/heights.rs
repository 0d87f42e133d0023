//! # Height Normalization
//!
//! Maps elevations onto [0, 1] using a raster's elevation range, as needed
//! when placing a camera or target inside a unit-scaled scene.
//!
//! The denominator is always the elevation span (max − min). Scaling by the
//! raster's horizontal extent instead would mix CRS units with meters of
//! height and is not supported.

use serde::{Deserialize, Serialize};

/// Lowest and highest finite elevation of a raster, in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationRange {
    pub min: f64,
    pub max: f64,
}

impl ElevationRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range over all finite samples, or None when there are none
    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Option<Self> {
        samples
            .into_iter()
            .filter(|h| h.is_finite())
            .fold(None, |acc: Option<Self>, h| match acc {
                None => Some(Self::new(h, h)),
                Some(r) => Some(Self::new(r.min.min(h), r.max.max(h))),
            })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// `(elevation - min) / (max - min)`; None for a flat range or non-finite input.
    ///
    /// Elevations outside the range extrapolate past [0, 1].
    pub fn normalize(&self, elevation: f64) -> Option<f64> {
        let span = self.span();
        if !(span > 0.0) || !elevation.is_finite() {
            return None;
        }
        Some((elevation - self.min) / span)
    }

    /// Inverse of [`normalize`](Self::normalize)
    pub fn denormalize(&self, h: f64) -> f64 {
        self.min + h * self.span()
    }
}

/// Unit-scaled scene position: u east, v north, h up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPosition {
    pub u: f64,
    pub v: f64,
    pub h: f64,
}
