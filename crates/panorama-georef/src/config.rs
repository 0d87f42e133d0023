//! # Registration Configuration
//!
//! Parses the TOML configuration for a geo-registration run. Every tunable
//! the pipeline stages share lives here, most importantly the single Earth
//! radius used by the proximity filter, the angular projector and the
//! destination-point helpers.
//!
//! ## Table of Contents
//! 1. RegistrationConfig — All pipeline tunables
//! 2. EarthModel — Sphere used for great-circle math
//! 3. Parsing and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GeoRefError, Result};

// ============================================================================
// 1. RegistrationConfig — All pipeline tunables
// ============================================================================

/// Tunables for one registration run.
///
/// ```toml
/// earth_radius_m = 6371100.0
/// sample_stride = 3
/// proximity_radius_m = 150.0
/// camera_height_offset_m = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Sphere radius in meters for all great-circle computations
    #[serde(default = "default_earth_radius")]
    pub earth_radius_m: f64,
    /// Index image sampling stride per axis, in pixels
    #[serde(default = "default_stride")]
    pub sample_stride: u32,
    /// Decimal places of latitude/longitude used to deduplicate visible locations
    #[serde(default = "default_dedup_decimals")]
    pub dedup_decimals: u32,
    /// Catalog entries farther than this from every visible location are dropped
    #[serde(default = "default_proximity_radius")]
    pub proximity_radius_m: f64,
    /// Added to the ground-derived camera elevation before computing pitch
    #[serde(default = "default_camera_height_offset")]
    pub camera_height_offset_m: f64,
    /// Below this surface distance a target is treated as the camera itself
    #[serde(default = "default_coincidence_epsilon")]
    pub coincidence_epsilon_m: f64,
    /// Slack accepted outside [0,1]² when normalizing raster positions
    #[serde(default = "default_normalization_tolerance")]
    pub normalization_tolerance: f64,
    /// Deadline for the external renderer
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
    /// Radius of the octagon generated around mountains without their own polygon
    #[serde(default = "default_bounds_radius")]
    pub bounds_radius_m: f64,
}

fn default_earth_radius() -> f64 { 6_371_100.0 }
fn default_stride() -> u32 { 3 }
fn default_dedup_decimals() -> u32 { 6 }
fn default_proximity_radius() -> f64 { 150.0 }
fn default_camera_height_offset() -> f64 { 2.0 }
fn default_coincidence_epsilon() -> f64 { 0.01 }
fn default_normalization_tolerance() -> f64 { 1e-9 }
fn default_render_timeout() -> u64 { 600 }
fn default_bounds_radius() -> f64 { 150.0 }

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            earth_radius_m: default_earth_radius(),
            sample_stride: default_stride(),
            dedup_decimals: default_dedup_decimals(),
            proximity_radius_m: default_proximity_radius(),
            camera_height_offset_m: default_camera_height_offset(),
            coincidence_epsilon_m: default_coincidence_epsilon(),
            normalization_tolerance: default_normalization_tolerance(),
            render_timeout_secs: default_render_timeout(),
            bounds_radius_m: default_bounds_radius(),
        }
    }
}

impl RegistrationConfig {
    /// Sphere model derived from `earth_radius_m`
    pub fn earth(&self) -> EarthModel {
        EarthModel::new(self.earth_radius_m)
    }

    /// Renderer deadline as a `Duration`
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Set the sampling stride
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.sample_stride = stride;
        self
    }

    /// Set the proximity radius
    pub fn with_proximity_radius(mut self, radius_m: f64) -> Self {
        self.proximity_radius_m = radius_m;
        self
    }

    /// Set the camera height offset
    pub fn with_camera_height_offset(mut self, offset_m: f64) -> Self {
        self.camera_height_offset_m = offset_m;
        self
    }
}

// ============================================================================
// 2. EarthModel — Sphere used for great-circle math
// ============================================================================

/// Spherical Earth with a fixed radius.
///
/// Always obtained from [`RegistrationConfig::earth`] so that distance,
/// bearing and destination math agree on one radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarthModel {
    radius_m: f64,
}

impl EarthModel {
    /// Sphere with the given radius in meters
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    /// Radius in meters
    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }
}

impl Default for EarthModel {
    fn default() -> Self {
        Self::new(default_earth_radius())
    }
}

// ============================================================================
// 3. Parsing and validation
// ============================================================================

impl RegistrationConfig {
    /// Load and validate a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GeoRefError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| GeoRefError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RegistrationConfig =
            toml::from_str(content).map_err(|e| GeoRefError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.earth_radius_m.is_finite() && self.earth_radius_m > 0.0) {
            return Err(GeoRefError::config("earth_radius_m must be positive"));
        }
        if self.sample_stride == 0 {
            return Err(GeoRefError::config("sample_stride must be at least 1"));
        }
        if self.dedup_decimals > 12 {
            return Err(GeoRefError::config("dedup_decimals must be at most 12"));
        }
        if !(self.proximity_radius_m.is_finite() && self.proximity_radius_m >= 0.0) {
            return Err(GeoRefError::config("proximity_radius_m must be non-negative"));
        }
        if !self.camera_height_offset_m.is_finite() {
            return Err(GeoRefError::config("camera_height_offset_m must be finite"));
        }
        if !(self.coincidence_epsilon_m >= 0.0 && self.normalization_tolerance >= 0.0) {
            return Err(GeoRefError::config("tolerances must be non-negative"));
        }
        Ok(())
    }
}
