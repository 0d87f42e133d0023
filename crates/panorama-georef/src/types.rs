//! # Core Value Types
//!
//! Locations, camera frames and the points of interest a photograph may show.
//!
//! ## Table of Contents
//! 1. Location / Location3D
//! 2. PointOfInterest — Mountain / OtherPanorama
//! 3. CameraFrame

use geo::{Contains, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::config::EarthModel;
use crate::crs::{CrsAdapter, GeodeticTransform};
use crate::dem::DemRaster;
use crate::error::{GeoRefError, Result};
use crate::geodesy;

// ============================================================================
// 1. Location / Location3D
// ============================================================================

/// A point on the Earth's surface (WGS84 degrees, meters above sea level)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }

    /// Same horizontal position at a different elevation
    pub fn with_elevation(self, elevation: f64) -> Self {
        Self { elevation, ..self }
    }
}

/// Target position relative to one camera frame.
///
/// `yaw` is in [0, 360), `pitch` is positive above the camera's optical
/// height, `distance` is the great-circle surface distance in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location3D {
    pub yaw: f64,
    pub pitch: f64,
    pub distance: f64,
}

// ============================================================================
// 2. PointOfInterest — Mountain / OtherPanorama
// ============================================================================

/// A named summit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mountain {
    pub name: String,
    pub location: Location,
    pub bounds: Option<Polygon<f64>>,
}

/// Another catalogued photograph taken at a known position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panorama {
    pub name: String,
    pub location: Location,
    pub bounds: Option<Polygon<f64>>,
    /// Thumbnail shown when the panorama is found in sight
    pub thumbnail: Option<PathBuf>,
}

/// A catalog entry that may be visible from the camera.
///
/// Equality and hashing use the name only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PointOfInterest {
    Mountain(Mountain),
    OtherPanorama(Panorama),
}

impl PointOfInterest {
    /// Mountain without a bounding polygon
    pub fn mountain(name: impl Into<String>, location: Location) -> Self {
        Self::Mountain(Mountain {
            name: name.into(),
            location,
            bounds: None,
        })
    }

    /// Panorama without thumbnail or bounding polygon
    pub fn panorama(name: impl Into<String>, location: Location) -> Self {
        Self::OtherPanorama(Panorama {
            name: name.into(),
            location,
            bounds: None,
            thumbnail: None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Mountain(m) => &m.name,
            Self::OtherPanorama(p) => &p.name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Self::Mountain(m) => &m.location,
            Self::OtherPanorama(p) => &p.location,
        }
    }

    pub fn bounds(&self) -> Option<&Polygon<f64>> {
        match self {
            Self::Mountain(m) => m.bounds.as_ref(),
            Self::OtherPanorama(p) => p.bounds.as_ref(),
        }
    }

    /// Attach a bounding polygon (x = longitude, y = latitude)
    pub fn with_bounds(mut self, polygon: Polygon<f64>) -> Self {
        match &mut self {
            Self::Mountain(m) => m.bounds = Some(polygon),
            Self::OtherPanorama(p) => p.bounds = Some(polygon),
        }
        self
    }

    /// Whether `location` falls inside this entry's bounding polygon
    pub fn covers(&self, location: &Location) -> bool {
        self.bounds()
            .map(|polygon| polygon.contains(&Point::new(location.longitude, location.latitude)))
            .unwrap_or(false)
    }

    pub fn is_mountain(&self) -> bool {
        matches!(self, Self::Mountain(_))
    }
}

impl PartialEq for PointOfInterest {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for PointOfInterest {}

impl Hash for PointOfInterest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

// ============================================================================
// 3. CameraFrame
// ============================================================================

/// Where and in which direction a photograph was taken.
///
/// `photo_id` identifies the frame; cached visibility data is keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub photo_id: String,
    pub location: Location,
    /// Degrees clockwise from true north
    pub viewing_bearing: f64,
    /// Horizontal field of view in degrees; None keeps the full circle
    pub field_of_view: Option<f64>,
}

impl CameraFrame {
    pub fn new(photo_id: impl Into<String>, location: Location, viewing_bearing: f64) -> Self {
        Self {
            photo_id: photo_id.into(),
            location,
            viewing_bearing: geodesy::normalize_degrees(viewing_bearing),
            field_of_view: None,
        }
    }

    /// Narrow the frame to `degrees`. Non-finite or non-positive values
    /// leave it unclipped.
    pub fn with_field_of_view(mut self, degrees: f64) -> Self {
        self.field_of_view = usable_field_of_view(degrees);
        if self.field_of_view.is_none() {
            tracing::warn!(photo = %self.photo_id, degrees, "Ignoring unusable field of view");
        }
        self
    }

    /// Field of view the frame can actually be clipped to
    pub fn effective_field_of_view(&self) -> Option<f64> {
        self.field_of_view.and_then(usable_field_of_view)
    }

    /// Camera standing on the terrain: elevation is sampled from the DEM.
    pub fn on_terrain<T: GeodeticTransform>(
        photo_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        viewing_bearing: f64,
        dem: &dyn DemRaster,
        adapter: &CrsAdapter<T>,
    ) -> Result<Self> {
        let (x, y) = adapter.to_projected(latitude, longitude)?;
        let (row, col) = dem.index_of(x, y).ok_or_else(|| {
            GeoRefError::raster(format!(
                "camera position ({}, {}) lies outside the DEM",
                latitude, longitude
            ))
        })?;
        let elevation = dem.elevation(row, col);
        if !elevation.is_finite() {
            return Err(GeoRefError::raster(format!(
                "no elevation at camera cell ({}, {})",
                row, col
            )));
        }
        Ok(Self::new(
            photo_id,
            Location::new(latitude, longitude, elevation),
            viewing_bearing,
        ))
    }

    /// Point `distance_m` away along the viewing bearing, at camera elevation
    pub fn look_at(&self, distance_m: f64, earth: EarthModel) -> Location {
        geodesy::destination(&self.location, self.viewing_bearing, distance_m, earth)
    }
}

fn usable_field_of_view(degrees: f64) -> Option<f64> {
    (degrees.is_finite() && degrees > 0.0).then_some(degrees)
}
