//! # Angular Projector
//!
//! Places a target location in a camera frame as (yaw, pitch, distance).
//!
//! ```text
//! distance = haversine(camera, target)
//! yaw      = normalize(initial_bearing(camera, target) − viewing_bearing)
//! pitch    = atan2(target.elev − (camera.elev + height_offset), distance)
//! ```
//! The projector always returns the absolute yaw in [0, 360); re-centering
//! on a field of view is done by [`FieldOfView`] on the caller's side.
//!
//! ## Table of Contents
//! 1. AngularProjector
//! 2. FieldOfView — Re-centering and clipping
//! 3. Projection — Catalog entry paired with its frame position

use serde::{Deserialize, Serialize};

use crate::config::{EarthModel, RegistrationConfig};
use crate::geodesy;
use crate::types::{CameraFrame, Location, Location3D, PointOfInterest};

// ============================================================================
// 1. AngularProjector
// ============================================================================

/// Pure camera-relative projection of locations
#[derive(Debug, Clone, Copy)]
pub struct AngularProjector {
    earth: EarthModel,
    camera_height_offset: f64,
    epsilon: f64,
}

impl AngularProjector {
    pub fn new(earth: EarthModel, camera_height_offset: f64, epsilon: f64) -> Self {
        Self {
            earth,
            camera_height_offset,
            epsilon,
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(
            config.earth(),
            config.camera_height_offset_m,
            config.coincidence_epsilon_m,
        )
    }

    /// Position of `target` relative to `frame`.
    ///
    /// A target closer than the coincidence epsilon yields distance 0 and pitch 0.
    pub fn project(&self, frame: &CameraFrame, target: &Location) -> Location3D {
        let camera = &frame.location;
        let distance = geodesy::haversine_distance(camera, target, self.earth);
        if distance < self.epsilon {
            return Location3D {
                yaw: 0.0,
                pitch: 0.0,
                distance: 0.0,
            };
        }

        let bearing = geodesy::initial_bearing(camera, target);
        let yaw = geodesy::normalize_degrees(bearing - frame.viewing_bearing);
        let optical_height = camera.elevation + self.camera_height_offset;
        let pitch = (target.elevation - optical_height).atan2(distance).to_degrees();

        Location3D {
            yaw,
            pitch,
            distance,
        }
    }
}

impl Default for AngularProjector {
    fn default() -> Self {
        Self::from_config(&RegistrationConfig::default())
    }
}

// ============================================================================
// 2. FieldOfView — Re-centering and clipping
// ============================================================================

/// Horizontal field of view centered on the viewing bearing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    degrees: f64,
}

impl FieldOfView {
    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    /// Re-center an absolute yaw onto the frame.
    ///
    /// Returns the yaw measured from the frame's left edge, in [0, fov], or
    /// None when the yaw falls outside the field of view. A field of view of
    /// 360° or more keeps every yaw unchanged.
    pub fn frame_yaw(&self, yaw: f64) -> Option<f64> {
        if self.degrees >= 360.0 {
            return Some(yaw);
        }
        let half = self.degrees / 2.0;
        let offset = geodesy::signed_degrees(yaw);
        if offset.abs() <= half {
            Some(offset + half)
        } else {
            None
        }
    }

    /// Apply [`frame_yaw`](Self::frame_yaw) to a full projection
    pub fn clip(&self, location: Location3D) -> Option<Location3D> {
        self.frame_yaw(location.yaw)
            .map(|yaw| Location3D { yaw, ..location })
    }
}

// ============================================================================
// 3. Projection — Catalog entry paired with its frame position
// ============================================================================

/// A catalog entry with its position in one camera frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub poi: PointOfInterest,
    pub location: Location3D,
}

impl Projection {
    pub fn name(&self) -> &str {
        self.poi.name()
    }
}
