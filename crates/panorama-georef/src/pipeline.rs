//! # Geo-Registration Pipeline
//!
//! Runs one photograph through the whole chain:
//!
//! ```text
//! cache hit? ──yes──────────────────────────────┐
//!    │ no                                       ▼
//! render → decode (codec) → resolve ──store──► VisibleSet
//!                                               │
//!          ┌────────────────────────────────────┤
//!          ▼                                    ▼
//!   mountains: filter → project → clip   panoramas: filter → project → clip
//!          │                                    │
//!          └──── sort by distance, persist ─────┘
//! ```
//!
//! ## Cache policy
//! The VisibleSet is stored under `keys::visible_set(photo_id)` and reused
//! on every later run with the same photo id. Entries are only removed by
//! [`GeoRegistration::invalidate`] or when they fail to deserialize.
//!
//! ## Table of Contents
//! 1. Registration — Run output
//! 2. GeoRegistration — Orchestrator
//! 3. Visible set (cache + render path)
//! 4. Catalog projection and persistence

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::codec::GridColorCodec;
use crate::config::RegistrationConfig;
use crate::crs::{CrsAdapter, GeodeticTransform};
use crate::dem::DemRaster;
use crate::error::{GeoRefError, Result};
use crate::projection::{AngularProjector, FieldOfView, Projection};
use crate::proximity::{ExhaustiveProximity, ProximityFilter};
use crate::render::IndexRenderer;
use crate::storage::{self, keys, MemoryStore, SharedStore};
use crate::types::CameraFrame;
use crate::visibility::{ResolveStats, VisibilityResolver, VisibleSet};

// ============================================================================
// 1. Registration — Run output
// ============================================================================

/// Result of registering one photograph against two catalogs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub photo_id: String,
    pub visible: VisibleSet,
    /// Resolve counts; None when the visible set came from the cache
    pub stats: Option<ResolveStats>,
    /// Mountains in sight, nearest first
    pub mountains: Vec<Projection>,
    /// Other panoramas in sight, nearest first
    pub panoramas: Vec<Projection>,
}

impl Registration {
    pub fn from_cache(&self) -> bool {
        self.stats.is_none()
    }
}

// ============================================================================
// 2. GeoRegistration — Orchestrator
// ============================================================================

/// Single-threaded registration pipeline bound to a config, a store and a
/// proximity strategy
pub struct GeoRegistration {
    config: RegistrationConfig,
    store: SharedStore,
    proximity: Box<dyn ProximityFilter>,
}

impl GeoRegistration {
    /// Pipeline with an in-memory store and the exhaustive proximity scan
    pub fn new(config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        let proximity = Box::new(ExhaustiveProximity::new(config.earth()));
        Ok(Self {
            config,
            store: Arc::new(MemoryStore::new()),
            proximity,
        })
    }

    /// Use a different persistence backend
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = store;
        self
    }

    /// Use a different proximity strategy
    pub fn with_proximity(mut self, proximity: Box<dyn ProximityFilter>) -> Self {
        self.proximity = proximity;
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Register one photograph.
    ///
    /// Render failures abort the run before anything is persisted. The two
    /// catalog results are persisted together: when either write fails,
    /// neither is left in the store.
    pub fn run<T: GeodeticTransform>(
        &self,
        frame: &CameraFrame,
        dem: &dyn DemRaster,
        adapter: &CrsAdapter<T>,
        renderer: &dyn IndexRenderer,
        mountains: &Catalog,
        panoramas: &Catalog,
    ) -> Result<Registration> {
        tracing::info!(photo = %frame.photo_id, bearing = frame.viewing_bearing, "Registering photograph");

        let (visible, stats) = self.visible_set(frame, dem, adapter, renderer)?;

        let mountain_projections = self.project_catalog(frame, &visible, mountains);
        let panorama_projections = self.project_catalog(frame, &visible, panoramas);

        self.persist_projections(
            &frame.photo_id,
            [(mountains, &mountain_projections), (panoramas, &panorama_projections)],
        )?;

        tracing::info!(
            photo = %frame.photo_id,
            visible = visible.len(),
            mountains = mountain_projections.len(),
            panoramas = panorama_projections.len(),
            cached = stats.is_none(),
            "Registration complete"
        );

        Ok(Registration {
            photo_id: frame.photo_id.clone(),
            visible,
            stats,
            mountains: mountain_projections,
            panoramas: panorama_projections,
        })
    }

    // ========================================================================
    // 3. Visible set (cache + render path)
    // ========================================================================

    /// Cached visible set of the frame, or render, decode and resolve it.
    ///
    /// Stats are None on a cache hit.
    pub fn visible_set<T: GeodeticTransform>(
        &self,
        frame: &CameraFrame,
        dem: &dyn DemRaster,
        adapter: &CrsAdapter<T>,
        renderer: &dyn IndexRenderer,
    ) -> Result<(VisibleSet, Option<ResolveStats>)> {
        let key = keys::visible_set(&frame.photo_id);

        match storage::store_get::<VisibleSet>(self.store.as_ref(), &key) {
            Ok(Some(visible)) => {
                tracing::debug!(photo = %frame.photo_id, locations = visible.len(), "Visible set cache hit");
                return Ok((visible, None));
            }
            Ok(None) => {}
            Err(GeoRefError::CacheCorruption { key, reason }) => {
                tracing::warn!(key = %key, reason = %reason, store = self.store.name(), "Discarding corrupt visible set");
                self.store.delete(&key)?;
            }
            Err(e) => return Err(e),
        }

        let image = renderer.render(frame)?;
        let (rows, cols) = dem.dimensions();
        let codec = GridColorCodec::new(rows, cols)?;
        let index = codec.decode_image(&image);
        let (visible, stats) = VisibilityResolver::from_config(&self.config).resolve(&index, dem, adapter);

        storage::store_set(self.store.as_ref(), &key, &visible)?;
        Ok((visible, Some(stats)))
    }

    /// Drop the cached visible set of a photograph
    pub fn invalidate(&self, photo_id: &str) -> Result<()> {
        self.store.delete(&keys::visible_set(photo_id))
    }

    // ========================================================================
    // 4. Catalog projection and persistence
    // ========================================================================

    /// Filter, project and clip one catalog; nearest first.
    ///
    /// Never touches the catalog entries themselves, so one catalog can be
    /// reused across frames.
    pub fn project_catalog(&self, frame: &CameraFrame, visible: &VisibleSet, catalog: &Catalog) -> Vec<Projection> {
        let near = self
            .proximity
            .filter(visible, catalog.entries(), self.config.proximity_radius_m);
        let projector = AngularProjector::from_config(&self.config);
        let fov = frame.effective_field_of_view().map(FieldOfView::new);

        let mut projections: Vec<Projection> = near
            .into_iter()
            .filter_map(|poi| {
                let location = projector.project(frame, poi.location());
                let location = match fov {
                    Some(fov) => fov.clip(location)?,
                    None => location,
                };
                Some(Projection { poi, location })
            })
            .collect();
        projections.sort_by(|a, b| a.location.distance.total_cmp(&b.location.distance));

        tracing::debug!(
            catalog = catalog.id(),
            strategy = self.proximity.name(),
            entries = catalog.len(),
            kept = projections.len(),
            "Projected catalog"
        );
        projections
    }

    /// Write every catalog's projections or none of them.
    ///
    /// Payloads are encoded before the first write; a failed write removes
    /// the entries this call already wrote.
    fn persist_projections(&self, photo_id: &str, results: [(&Catalog, &Vec<Projection>); 2]) -> Result<()> {
        let mut payloads = Vec::with_capacity(results.len());
        for (catalog, projections) in results {
            payloads.push((keys::projections(photo_id, catalog.id()), storage::encode(projections)?));
        }

        let mut written: Vec<&str> = Vec::with_capacity(payloads.len());
        for (key, bytes) in &payloads {
            if let Err(e) = self.store.set(key, bytes.clone()) {
                for done in written {
                    if let Err(cleanup) = self.store.delete(done) {
                        tracing::warn!(key = %done, error = %cleanup, "Failed to roll back projection entry");
                    }
                }
                return Err(e);
            }
            written.push(key);
        }
        Ok(())
    }

    /// Projections persisted by an earlier run
    pub fn load_projections(&self, photo_id: &str, catalog_id: &str) -> Result<Option<Vec<Projection>>> {
        storage::store_get(self.store.as_ref(), &keys::projections(photo_id, catalog_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogKind;
    use crate::codec::RasterCell;
    use crate::config::EarthModel;
    use crate::crs::{GeographicIdentity, RasterBounds, WGS84};
    use crate::dem::GridDem;
    use crate::geodesy;
    use crate::proximity::IndexedProximity;
    use crate::storage::{ByteStore, FileStore};
    use crate::types::{Location, PointOfInterest};
    use image::{Rgb, RgbImage};
    use std::cell::Cell;

    const CELL_DEG: f64 = 0.001;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// 100x100 geographic DEM whose cell (10, 20) is centered on 45.000N 7.000E
    fn dem() -> GridDem {
        let min_x = 7.0 - 20.5 * CELL_DEG;
        let max_y = 45.0 + 10.5 * CELL_DEG;
        let mut dem = GridDem::new(
            RasterBounds::new(min_x, max_y - 100.0 * CELL_DEG, min_x + 100.0 * CELL_DEG, max_y),
            WGS84,
            100,
            100,
            vec![1000.0; 100 * 100],
        )
        .unwrap();
        dem.set_elevation(10, 20, 1200.0);
        dem
    }

    fn adapter() -> CrsAdapter<GeographicIdentity> {
        CrsAdapter::new(GeographicIdentity, 1e-9)
    }

    fn camera() -> CameraFrame {
        CameraFrame::new("IMG_0001", Location::new(45.001, 7.001, 1100.0), 90.0).with_field_of_view(360.0)
    }

    /// Index image showing only the given cells, each at pixel (x = col, y = row)
    fn index_image(cells: &[RasterCell]) -> RgbImage {
        let codec = GridColorCodec::new(100, 100).unwrap();
        let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        for cell in cells {
            if let Some(color) = codec.encode(*cell) {
                image.put_pixel(cell.col, cell.row, color);
            }
        }
        image
    }

    struct CountingRenderer {
        image: RgbImage,
        calls: Cell<usize>,
    }

    impl CountingRenderer {
        fn new(image: RgbImage) -> Self {
            Self {
                image,
                calls: Cell::new(0),
            }
        }
    }

    impl IndexRenderer for CountingRenderer {
        fn render(&self, _frame: &CameraFrame) -> Result<RgbImage> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.image.clone())
        }
    }

    struct FailingRenderer;

    impl IndexRenderer for FailingRenderer {
        fn render(&self, _frame: &CameraFrame) -> Result<RgbImage> {
            Err(GeoRefError::RenderTimeout {
                after: std::time::Duration::from_secs(600),
            })
        }
    }

    /// Memory store whose writes fail for keys containing `reject`
    struct RejectingStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    impl ByteStore for RejectingStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
            if key.contains(self.reject) {
                return Err(GeoRefError::storage(format!("write rejected: {}", key)));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_prefix(prefix)
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    fn mountains(entries: Vec<PointOfInterest>) -> Catalog {
        Catalog::from_entries("peaks", CatalogKind::Mountains, entries)
    }

    fn panoramas(entries: Vec<PointOfInterest>) -> Catalog {
        Catalog::from_entries("photos", CatalogKind::Panoramas, entries)
    }

    fn pipeline() -> GeoRegistration {
        GeoRegistration::new(RegistrationConfig::default().with_stride(1)).unwrap()
    }

    #[test]
    fn test_single_visible_summit() {
        init_tracing();
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let peaks = mountains(vec![
            PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0)),
            PointOfInterest::mountain("Far", Location::new(45.05, 7.05, 2000.0)),
        ]);

        let result = pipeline()
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();

        assert_eq!(result.visible.len(), 1);
        let seen = result.visible.locations()[0];
        assert!((seen.latitude - 45.0).abs() < 1e-9);
        assert!((seen.longitude - 7.0).abs() < 1e-9);
        assert_eq!(seen.elevation, 1200.0);

        assert_eq!(result.mountains.len(), 1);
        let punta = &result.mountains[0];
        assert_eq!(punta.name(), "Punta");
        assert!(punta.location.pitch > 0.0);
        assert!((0.0..360.0).contains(&punta.location.yaw));
        // South-west of a camera looking east
        assert!((punta.location.yaw - 125.0).abs() < 2.0);
        assert!((punta.location.distance - 136.0).abs() < 5.0);
        assert!(result.panoramas.is_empty());
    }

    #[test]
    fn test_narrow_field_of_view_clips() {
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let peaks = mountains(vec![PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0))]);

        let narrow = camera().with_field_of_view(60.0);
        let result = pipeline()
            .run(&narrow, &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();
        assert!(result.mountains.is_empty());

        let facing = CameraFrame::new("IMG_0002", camera().location, 215.0).with_field_of_view(60.0);
        let result = pipeline()
            .run(&facing, &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();
        assert_eq!(result.mountains.len(), 1);
        let yaw = result.mountains[0].location.yaw;
        assert!((0.0..=60.0).contains(&yaw));
        assert!((yaw - 30.0).abs() < 2.0);
    }

    #[test]
    fn test_background_only_image() {
        let renderer = CountingRenderer::new(index_image(&[]));
        let peaks = mountains(vec![PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0))]);
        let photos = panoramas(vec![PointOfInterest::panorama("Other", Location::new(45.0, 7.0, 1200.0))]);

        let result = pipeline()
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos)
            .unwrap();
        assert!(result.visible.is_empty());
        assert!(result.mountains.is_empty());
        assert!(result.panoramas.is_empty());
        assert_eq!(result.stats.unwrap().retained, 0);
    }

    #[test]
    fn test_radius_keeps_140m_drops_160m() {
        let earth = EarthModel::default();
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let seen = Location::new(45.0, 7.0, 1200.0);
        let photos = panoramas(vec![
            PointOfInterest::panorama("at 160 m", geodesy::destination(&seen, 0.0, 160.0, earth)),
            PointOfInterest::panorama("at 140 m", geodesy::destination(&seen, 0.0, 140.0, earth)),
        ]);

        for strategy in [
            Box::new(ExhaustiveProximity::new(earth)) as Box<dyn ProximityFilter>,
            Box::new(IndexedProximity::new(earth)),
        ] {
            let result = pipeline()
                .with_proximity(strategy)
                .run(&camera(), &dem(), &adapter(), &renderer, &mountains(vec![]), &photos)
                .unwrap();
            let names: Vec<&str> = result.panoramas.iter().map(|p| p.name()).collect();
            assert_eq!(names, vec!["at 140 m"]);
        }
    }

    #[test]
    fn test_second_run_uses_cache() {
        let renderer = CountingRenderer::new(index_image(&[
            RasterCell::new(10, 20),
            RasterCell::new(40, 60),
            RasterCell::new(90, 5),
        ]));
        let registration = pipeline();
        let peaks = mountains(vec![]);
        let photos = panoramas(vec![]);

        let first = registration
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos)
            .unwrap();
        let second = registration
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos)
            .unwrap();

        assert_eq!(renderer.calls.get(), 1);
        assert!(!first.from_cache());
        assert!(second.from_cache());
        assert_eq!(first.visible.len(), 3);
        assert_eq!(
            storage::encode(&first.visible).unwrap(),
            storage::encode(&second.visible).unwrap()
        );
    }

    #[test]
    fn test_cache_survives_restart_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let (peaks, photos) = (mountains(vec![]), panoramas(vec![]));

        let first = pipeline()
            .with_store(Arc::new(FileStore::open(dir.path()).unwrap()))
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos)
            .unwrap();
        let second = pipeline()
            .with_store(Arc::new(FileStore::open(dir.path()).unwrap()))
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos)
            .unwrap();

        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(first.visible, second.visible);
    }

    #[test]
    fn test_invalidate_forces_render() {
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let registration = pipeline();
        let (peaks, photos) = (mountains(vec![]), panoramas(vec![]));

        registration.run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos).unwrap();
        registration.invalidate("IMG_0001").unwrap();
        registration.run(&camera(), &dem(), &adapter(), &renderer, &peaks, &photos).unwrap();
        assert_eq!(renderer.calls.get(), 2);
    }

    #[test]
    fn test_corrupt_cache_is_recomputed() {
        init_tracing();
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let registration = pipeline();
        let key = keys::visible_set("IMG_0001");
        registration.store().set(&key, vec![0xFF, 0x01]).unwrap();

        let result = registration
            .run(&camera(), &dem(), &adapter(), &renderer, &mountains(vec![]), &panoramas(vec![]))
            .unwrap();
        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(result.visible.len(), 1);

        let stored: Option<VisibleSet> = storage::store_get(registration.store().as_ref(), &key).unwrap();
        assert_eq!(stored, Some(result.visible));
    }

    #[test]
    fn test_render_failure_persists_nothing() {
        let registration = pipeline();
        let err = registration
            .run(&camera(), &dem(), &adapter(), &FailingRenderer, &mountains(vec![]), &panoramas(vec![]))
            .unwrap_err();
        assert!(err.is_render_error());
        assert!(registration.store().list_prefix("").unwrap().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_no_partial_results() {
        init_tracing();
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let peaks = mountains(vec![PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0))]);
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            reject: "/photos",
        });

        let registration = pipeline().with_store(store);
        let err = registration
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap_err();
        assert!(matches!(err, GeoRefError::Storage(_)));
        assert!(registration.load_projections("IMG_0001", "peaks").unwrap().is_none());
        assert!(registration.load_projections("IMG_0001", "photos").unwrap().is_none());
        assert!(registration.store().list_prefix(keys::PROJECTIONS).unwrap().is_empty());
    }

    #[test]
    fn test_unusable_field_of_view_does_not_clip() {
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let peaks = mountains(vec![PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0))]);

        let mut frame = camera();
        frame.field_of_view = Some(f64::NAN);
        let result = pipeline()
            .run(&frame, &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();
        assert_eq!(result.mountains.len(), 1);
        assert!((result.mountains[0].location.yaw - 125.0).abs() < 2.0);
    }

    #[test]
    fn test_results_sorted_and_persisted() {
        let earth = EarthModel::default();
        let cells = [RasterCell::new(10, 20), RasterCell::new(60, 80)];
        let renderer = CountingRenderer::new(index_image(&cells));
        let d = dem();
        let far_cell = {
            let (x, y) = d.to_crs_coordinate(60, 80);
            Location::new(y, x, 1000.0)
        };
        let peaks = mountains(vec![
            PointOfInterest::mountain("Far", geodesy::destination(&far_cell, 90.0, 20.0, earth)),
            PointOfInterest::mountain("Near", Location::new(45.0, 7.0, 1200.0)),
        ]);

        let registration = pipeline();
        let result = registration
            .run(&camera(), &d, &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();
        let names: Vec<&str> = result.mountains.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Near", "Far"]);

        let stored = registration.load_projections("IMG_0001", "peaks").unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name(), "Near");
        assert_eq!(stored[1].location, result.mountains[1].location);
        assert!(registration.load_projections("IMG_0001", "photos").unwrap().unwrap().is_empty());
        assert!(registration.load_projections("IMG_9999", "peaks").unwrap().is_none());
    }

    #[test]
    fn test_catalog_entries_are_not_mutated() {
        let renderer = CountingRenderer::new(index_image(&[RasterCell::new(10, 20)]));
        let peaks = mountains(vec![PointOfInterest::mountain("Punta", Location::new(45.0, 7.0, 1200.0))]);
        let before = *peaks.entries()[0].location();

        let registration = pipeline();
        let a = registration
            .run(&camera(), &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();
        let other = CameraFrame::new("IMG_0002", Location::new(45.002, 7.0, 900.0), 180.0);
        let b = registration
            .run(&other, &dem(), &adapter(), &renderer, &peaks, &panoramas(vec![]))
            .unwrap();

        assert_eq!(*peaks.entries()[0].location(), before);
        assert_ne!(a.mountains[0].location, b.mountains[0].location);
    }
}
