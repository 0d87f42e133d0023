//! # Spherical Geodesy
//!
//! Great-circle helpers on the sphere described by [`EarthModel`].
//!
//! ## Table of Contents
//! 1. Angle normalization
//! 2. Distance and bearing
//! 3. Destination point and bounding octagon

use geo::{LineString, Polygon};

use crate::config::EarthModel;
use crate::types::Location;

// ============================================================================
// 1. Angle normalization
// ============================================================================

/// Wrap an angle in degrees into [0, 360)
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle in degrees into (-180, 180]
pub fn signed_degrees(angle: f64) -> f64 {
    let wrapped = normalize_degrees(angle);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

// ============================================================================
// 2. Distance and bearing
// ============================================================================

/// Great-circle surface distance in meters (haversine formula).
///
/// Elevation is ignored. Symmetric in its arguments.
pub fn haversine_distance(a: &Location, b: &Location, earth: EarthModel) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    earth.radius_m() * c
}

/// Initial great-circle bearing from `from` to `to`, degrees true north in [0, 360)
pub fn initial_bearing(from: &Location, to: &Location) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

// ============================================================================
// 3. Destination point and bounding octagon
// ============================================================================

/// Point reached by travelling `distance_m` along `bearing` degrees from `origin`.
///
/// The result keeps the origin's elevation.
pub fn destination(origin: &Location, bearing: f64, distance_m: f64, earth: EarthModel) -> Location {
    let angular = distance_m / earth.radius_m();
    let theta = bearing.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Location::new(
        lat2.to_degrees(),
        signed_degrees(lon2.to_degrees()),
        origin.elevation,
    )
}

/// Eight points at 45° steps, `radius_m` from `center`, as a closed polygon.
///
/// Polygon coordinates are (x = longitude, y = latitude).
pub fn bounding_octagon(center: &Location, radius_m: f64, earth: EarthModel) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = (0..8)
        .map(|step| {
            let corner = destination(center, step as f64 * 45.0, radius_m, earth);
            (corner.longitude, corner.latitude)
        })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}
