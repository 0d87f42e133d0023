//! # Panorama GeoRef — Which mountains does this photograph show?
//!
//! Registers a photograph taken at a known position and bearing against a
//! terrain model. An external renderer draws the DEM, textured with a color
//! per cell, from the camera's point of view. Decoding that index image
//! yields the ground locations actually in sight, which are then matched
//! against catalogs of summits and of other photographs and placed in the
//! frame as yaw / pitch / distance.
//!
//! ## Architecture
//! - Index image → [`codec`] → [`visibility`] → `VisibleSet` (cached per photo)
//! - `VisibleSet` + catalog → [`proximity`] → [`projection`] → nearest-first results
//! - [`pipeline`] runs the whole chain; [`storage`] persists its outputs
//!
//! ## Modules
//! - `config` — `RegistrationConfig` (TOML) and the shared `EarthModel`
//! - `error` — `GeoRefError` / `ConversionError`
//! - `geodesy` — Haversine distance, bearings, destination points
//! - `types` — Locations, points of interest, camera frames
//! - `codec` — DEM cell ↔ RGB color bijection and gradient texture
//! - `crs` — Injected geodetic transforms and raster-bounds normalization
//! - `heights` — Elevation-range normalization
//! - `dem` — Raster accessor, in-memory grid, SRTM HGT and GeoTIFF loaders
//! - `visibility` — Index image → deduplicated visible locations
//! - `proximity` — Catalog entries near visible terrain
//! - `projection` — Camera-relative yaw/pitch/distance and field-of-view clipping
//! - `catalog` — GeoJSON catalogs of mountains and panoramas
//! - `render` — External renderer supervision with a deadline
//! - `storage` — Byte stores for cached and final results
//! - `pipeline` — `GeoRegistration` orchestrator
//!
//! ## Table of Contents
//! 1. Module declarations
//! 2. Re-exports

pub mod catalog;
pub mod codec;
pub mod config;
pub mod crs;
pub mod dem;
pub mod error;
pub mod geodesy;
pub mod heights;
pub mod pipeline;
pub mod projection;
pub mod proximity;
pub mod render;
pub mod storage;
pub mod types;
pub mod visibility;

pub use catalog::{Catalog, CatalogKind};
pub use codec::{DecodedIndex, GridColorCodec, RasterCell};
pub use config::{EarthModel, RegistrationConfig};
pub use crs::{CrsAdapter, GeodeticTransform, GeographicIdentity, RasterBounds};
pub use dem::{DemRaster, GridDem, HgtTile};
pub use error::{ConversionError, GeoRefError, Result};
pub use heights::{ElevationRange, NormalizedPosition};
pub use pipeline::{GeoRegistration, Registration};
pub use projection::{AngularProjector, FieldOfView, Projection};
pub use proximity::{ExhaustiveProximity, IndexedProximity, ProximityFilter};
pub use render::{IndexRenderer, PrerenderedIndex, ProcessRenderer};
pub use storage::{ByteStore, FileStore, MemoryStore};
pub use types::{CameraFrame, Location, Location3D, PointOfInterest};
pub use visibility::{ResolveStats, VisibilityResolver, VisibleSet};

#[cfg(feature = "proj-transforms")]
pub use crs::ProjTransform;
