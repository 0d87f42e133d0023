//! # Proximity Filter
//!
//! Keeps the catalog entries that lie within a radius of at least one
//! visible location. Distance is always great-circle (haversine) on the
//! configured Earth sphere.
//!
//! ## Strategies
//! - [`ExhaustiveProximity`]: checks every entry against every visible
//!   location. Fine for a few thousand locations and a few hundred entries.
//! - [`IndexedProximity`]: bulk-loads the visible locations into an R-tree,
//!   prefilters by a degree envelope around each entry, then applies the
//!   same haversine test. Returns exactly what the exhaustive scan returns.
//!
//! ## Table of Contents
//! 1. ProximityFilter — Strategy trait
//! 2. ExhaustiveProximity
//! 3. IndexedProximity — R-tree backed

use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use crate::config::EarthModel;
use crate::geodesy;
use crate::types::{Location, PointOfInterest};
use crate::visibility::VisibleSet;

// ============================================================================
// 1. ProximityFilter — Strategy trait
// ============================================================================

/// Selects catalog entries near the visible terrain
pub trait ProximityFilter: Send + Sync {
    /// Entries with some visible location within `radius_m`, in catalog order
    fn filter(
        &self,
        visible: &VisibleSet,
        catalog: &[PointOfInterest],
        radius_m: f64,
    ) -> Vec<PointOfInterest>;

    /// Strategy name (for logging)
    fn name(&self) -> &str;
}

// ============================================================================
// 2. ExhaustiveProximity
// ============================================================================

/// O(|visible| × |catalog|) scan
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveProximity {
    earth: EarthModel,
}

impl ExhaustiveProximity {
    pub fn new(earth: EarthModel) -> Self {
        Self { earth }
    }
}

impl ProximityFilter for ExhaustiveProximity {
    fn filter(
        &self,
        visible: &VisibleSet,
        catalog: &[PointOfInterest],
        radius_m: f64,
    ) -> Vec<PointOfInterest> {
        catalog
            .iter()
            .filter(|poi| {
                visible
                    .iter()
                    .any(|loc| geodesy::haversine_distance(poi.location(), loc, self.earth) <= radius_m)
            })
            .cloned()
            .collect()
    }

    fn name(&self) -> &str {
        "exhaustive"
    }
}

// ============================================================================
// 3. IndexedProximity — R-tree backed
// ============================================================================

/// Visible location as an R-tree point ([lon, lat]) tagged with its position in the set
type VisiblePoint = GeomWithData<[f64; 2], usize>;

/// R-tree prefilter plus exact haversine check
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedProximity {
    earth: EarthModel,
}

impl IndexedProximity {
    pub fn new(earth: EarthModel) -> Self {
        Self { earth }
    }

    /// Lon/lat boxes guaranteed to contain every point within `radius_m` of `center`.
    /// Boxes crossing the antimeridian are split in two.
    fn search_envelopes(&self, center: &Location, radius_m: f64) -> Vec<AABB<[f64; 2]>> {
        let angular = radius_m / self.earth.radius_m();
        let pad = 1e-9;
        let dlat = angular.to_degrees() + pad;
        let min_lat = (center.latitude - dlat).max(-90.0);
        let max_lat = (center.latitude + dlat).min(90.0);

        // Widest longitude offset of a spherical cap centered at this latitude
        let ratio = angular.sin() / center.latitude.to_radians().cos();
        if angular >= std::f64::consts::FRAC_PI_2 || !(ratio < 1.0) || min_lat <= -90.0 || max_lat >= 90.0 {
            return vec![AABB::from_corners([-180.0, min_lat], [180.0, max_lat])];
        }
        let dlon = ratio.asin().to_degrees() + pad;
        let lon = geodesy::signed_degrees(center.longitude);
        let min_lon = lon - dlon;
        let max_lon = lon + dlon;

        let mut envelopes = vec![AABB::from_corners(
            [min_lon.max(-180.0), min_lat],
            [max_lon.min(180.0), max_lat],
        )];
        if min_lon < -180.0 {
            envelopes.push(AABB::from_corners([min_lon + 360.0, min_lat], [180.0, max_lat]));
        }
        if max_lon > 180.0 {
            envelopes.push(AABB::from_corners([-180.0, min_lat], [max_lon - 360.0, max_lat]));
        }
        envelopes
    }
}

impl ProximityFilter for IndexedProximity {
    fn filter(
        &self,
        visible: &VisibleSet,
        catalog: &[PointOfInterest],
        radius_m: f64,
    ) -> Vec<PointOfInterest> {
        if visible.is_empty() {
            return Vec::new();
        }
        let points: Vec<VisiblePoint> = visible
            .iter()
            .enumerate()
            .map(|(i, loc)| GeomWithData::new([geodesy::signed_degrees(loc.longitude), loc.latitude], i))
            .collect();
        let tree = RTree::bulk_load(points);
        let locations = visible.locations();

        catalog
            .iter()
            .filter(|poi| {
                let center = poi.location();
                self.search_envelopes(center, radius_m).iter().any(|envelope| {
                    tree.locate_in_envelope(envelope).any(|point| {
                        geodesy::haversine_distance(center, &locations[point.data], self.earth) <= radius_m
                    })
                })
            })
            .cloned()
            .collect()
    }

    fn name(&self) -> &str {
        "rtree"
    }
}
