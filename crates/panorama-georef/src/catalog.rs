//! # Catalog Loading
//!
//! Reads catalogs of summits and of other panoramas from GeoJSON.
//!
//! ## Feature mapping
//! - `Point` → location at the point; mountains get a default bounding
//!   octagon of `bounds_radius_m`.
//! - `Polygon` → location at the outer ring's centroid; the polygon itself
//!   becomes the entry's bounds.
//! - Name from `name` / `Name` / `NAME`; elevation from `ele` / `elevation`
//!   or the third coordinate; panorama thumbnail from `thumbnail`.
//!
//! Features without a name or with another geometry type are skipped. When
//! two features share a name, the first one wins.
//!
//! ## Table of Contents
//! 1. CatalogKind / Catalog
//! 2. GeoJSON import
//! 3. Feature property extraction

use geo::{LineString, Polygon};
use geojson::{Feature, GeoJson, Value};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::RegistrationConfig;
use crate::error::{GeoRefError, Result};
use crate::geodesy;
use crate::types::{Location, Mountain, Panorama, PointOfInterest};

// ============================================================================
// 1. CatalogKind / Catalog
// ============================================================================

/// Which variant a catalog's entries become
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Mountains,
    Panoramas,
}

/// Named, immutable list of points of interest
#[derive(Debug, Clone)]
pub struct Catalog {
    id: String,
    kind: CatalogKind,
    entries: Vec<PointOfInterest>,
}

impl Catalog {
    /// Build from entries already in memory; duplicate names keep the first
    pub fn from_entries(id: impl Into<String>, kind: CatalogKind, entries: Vec<PointOfInterest>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|poi| seen.insert(poi.name().to_string()))
            .collect();
        Self {
            id: id.into(),
            kind,
            entries,
        }
    }

    /// Identity used for persisted results (file stem for file-backed catalogs)
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn entries(&self) -> &[PointOfInterest] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by name
    pub fn get(&self, name: &str) -> Option<&PointOfInterest> {
        self.entries.iter().find(|poi| poi.name() == name)
    }
}

// ============================================================================
// 2. GeoJSON import
// ============================================================================

impl Catalog {
    /// Load a GeoJSON FeatureCollection (or single Feature)
    pub fn from_geojson(path: &Path, kind: CatalogKind, config: &RegistrationConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GeoRefError::catalog(path, e.to_string()))?;
        let geojson: GeoJson = content
            .parse()
            .map_err(|e: geojson::Error| GeoRefError::catalog(path, e.to_string()))?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(GeoRefError::catalog(
                    path,
                    "bare geometry has no properties to name entries",
                ))
            }
        };

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("catalog")
            .to_string();

        let total = features.len();
        let entries: Vec<PointOfInterest> = features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let entry = feature_to_poi(feature, kind, config, path);
                if entry.is_none() {
                    tracing::warn!(catalog = %id, index, "skipping feature without a name or point/polygon geometry");
                }
                entry
            })
            .collect();

        let catalog = Self::from_entries(id, kind, entries);
        tracing::info!(
            "Loaded {} {:?} entries from {} ({} features)",
            catalog.len(),
            kind,
            path.display(),
            total
        );
        Ok(catalog)
    }
}

fn feature_to_poi(
    feature: &Feature,
    kind: CatalogKind,
    config: &RegistrationConfig,
    path: &Path,
) -> Option<PointOfInterest> {
    let name = extract_name(&feature.properties)?;
    let geometry = feature.geometry.as_ref()?;

    let (coord, own_bounds) = match &geometry.value {
        Value::Point(coord) if coord.len() >= 2 => (coord.clone(), None),
        Value::Polygon(rings) => {
            let polygon = polygon_from_rings(rings)?;
            (centroid_of_ring(rings.first()?)?, Some(polygon))
        }
        _ => return None,
    };

    let elevation = extract_elevation(&feature.properties)
        .or_else(|| coord.get(2).copied())
        .unwrap_or(0.0);
    let location = Location::new(coord[1], coord[0], elevation);

    let poi = match kind {
        CatalogKind::Mountains => {
            let bounds = own_bounds
                .unwrap_or_else(|| geodesy::bounding_octagon(&location, config.bounds_radius_m, config.earth()));
            PointOfInterest::Mountain(Mountain {
                name,
                location,
                bounds: Some(bounds),
            })
        }
        CatalogKind::Panoramas => PointOfInterest::OtherPanorama(Panorama {
            name,
            location,
            bounds: own_bounds,
            thumbnail: extract_thumbnail(&feature.properties, path),
        }),
    };
    Some(poi)
}

/// GeoJSON rings ([lon, lat, ...]) → polygon (x = lon, y = lat)
fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let to_line = |ring: &Vec<Vec<f64>>| {
        LineString::from(
            ring.iter()
                .filter(|c| c.len() >= 2)
                .map(|c| (c[0], c[1]))
                .collect::<Vec<_>>(),
        )
    };
    let outer = rings.first()?;
    if outer.len() < 3 {
        return None;
    }
    Some(Polygon::new(
        to_line(outer),
        rings.iter().skip(1).map(to_line).collect(),
    ))
}

/// Vertex average of a ring, closing vertex excluded; keeps the first vertex's elevation
fn centroid_of_ring(ring: &[Vec<f64>]) -> Option<Vec<f64>> {
    let open = match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a == b => &ring[..ring.len() - 1],
        _ => ring,
    };
    if open.is_empty() {
        return None;
    }
    let n = open.len() as f64;
    let lon = open.iter().map(|c| c[0]).sum::<f64>() / n;
    let lat = open.iter().map(|c| c[1]).sum::<f64>() / n;
    let mut coord = vec![lon, lat];
    if let Some(ele) = open[0].get(2) {
        coord.push(*ele);
    }
    Some(coord)
}

// ============================================================================
// 3. Feature property extraction
// ============================================================================

/// Extract a "name" property from GeoJSON feature properties
fn extract_name(properties: &Option<Map<String, JsonValue>>) -> Option<String> {
    properties.as_ref().and_then(|props| {
        props
            .get("name")
            .or_else(|| props.get("Name"))
            .or_else(|| props.get("NAME"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Elevation in meters from `ele` or `elevation` (number or numeric string)
fn extract_elevation(properties: &Option<Map<String, JsonValue>>) -> Option<f64> {
    let props = properties.as_ref()?;
    let value = props.get("ele").or_else(|| props.get("elevation"))?;
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().trim_end_matches('m').trim().parse().ok(),
        _ => None,
    }
}

/// Thumbnail path, resolved against the catalog's directory when relative
fn extract_thumbnail(properties: &Option<Map<String, JsonValue>>, catalog_path: &Path) -> Option<PathBuf> {
    let raw = properties.as_ref()?.get("thumbnail")?.as_str()?;
    let thumb = PathBuf::from(raw);
    if thumb.is_absolute() {
        return Some(thumb);
    }
    Some(match catalog_path.parent() {
        Some(dir) => dir.join(thumb),
        None => thumb,
    })
}
