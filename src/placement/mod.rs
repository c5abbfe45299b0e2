//! Rigid seating of objects on terrain.
//!
//! An object is lowered or raised as a whole so that its base rests on the
//! highest ground under its footprint. Nothing is rotated and nothing below
//! the footprint is modified.

mod footprint;

pub use footprint::{Footprint, FootprintSample, sample_footprint};

use std::fmt;

use serde::Serialize;

use crate::config::SeatingConfig;
use crate::error::TerrainError;
use crate::geom::{GeomMetrics, GeomTimingReport, TimingBucket, Transform, Vec3};
use crate::terrain::{RayOptions, TerrainModel};

/// Hits required for a seating decision, capped by the grid size.
const MIN_FOOTPRINT_HITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    /// A non-trivial translation was computed.
    Placed,
    /// The object already sits within tolerance of its target.
    AlreadyPlaced,
    /// No probe hit the terrain; the object must be left alone.
    NoTerrain,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatingResult {
    pub status: PlacementStatus,
    pub sample: FootprintSample,
    /// `target_elevation - base_elevation`.
    pub delta_z: Option<f64>,
    pub target_elevation: Option<f64>,
    pub error: Option<TerrainError>,
}

impl SeatingResult {
    fn failed(status: PlacementStatus, sample: FootprintSample, error: TerrainError) -> Self {
        Self {
            status,
            sample,
            delta_z: None,
            target_elevation: None,
            error: Some(error),
        }
    }

    /// Vertical move to apply; zero unless the status is `Placed`.
    #[must_use]
    pub fn translation(&self) -> Vec3 {
        match (self.status, self.delta_z) {
            (PlacementStatus::Placed, Some(dz)) => Vec3::new(0.0, 0.0, dz),
            _ => Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        Transform::translate(self.translation())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, PlacementStatus::Placed | PlacementStatus::AlreadyPlaced)
    }
}

/// Seats one footprint with the default ray settings.
pub fn seat_footprint(
    footprint: &Footprint,
    terrain: &TerrainModel,
    grid_resolution: usize,
    offset: f64,
) -> SeatingResult {
    seat_footprint_with_config(footprint, terrain, &SeatingConfig::with_grid(grid_resolution, offset))
}

pub fn seat_footprint_with_config(
    footprint: &Footprint,
    terrain: &TerrainModel,
    config: &SeatingConfig,
) -> SeatingResult {
    if let Err(err) = config.validate() {
        return SeatingResult::failed(PlacementStatus::Error, FootprintSample::default(), err);
    }
    if !footprint.is_finite() {
        return SeatingResult::failed(
            PlacementStatus::Error,
            FootprintSample::default(),
            TerrainError::InvalidInput {
                reason: "footprint has non-finite coordinates".to_string(),
            },
        );
    }

    let options = RayOptions {
        search_distance: config.vertical_search_distance,
        tolerance: config.tolerance,
        ..RayOptions::default()
    };
    let n = config.grid_resolution;
    let sample = sample_footprint(footprint, terrain, n, &options);
    log::debug!(
        "Footprint {:?}-{:?}: {} of {} rays hit",
        footprint.min,
        footprint.max,
        sample.hit_count,
        sample.sample_count()
    );

    let Some(max_elevation) = sample.max_elevation else {
        log::info!("Footprint {:?}-{:?}: no terrain, skipped", footprint.min, footprint.max);
        return SeatingResult::failed(
            PlacementStatus::NoTerrain,
            sample,
            TerrainError::NoCoverage {
                operation: "footprint seating",
                hits: 0,
                samples: sample.sample_count(),
            },
        );
    };

    let required = MIN_FOOTPRINT_HITS.min(sample.sample_count());
    if sample.hit_count < required {
        log::warn!(
            "Footprint {:?}-{:?}: only {} hits, {required} required",
            footprint.min,
            footprint.max,
            sample.hit_count
        );
        return SeatingResult::failed(
            PlacementStatus::Error,
            sample,
            TerrainError::TooFewFootprintHits {
                hits: sample.hit_count,
                required,
            },
        );
    }

    let target = max_elevation + config.vertical_offset;
    let delta = target - footprint.base_elevation;
    let status = if delta.abs() < config.tolerance {
        PlacementStatus::AlreadyPlaced
    } else {
        PlacementStatus::Placed
    };
    log::info!("Footprint {:?}-{:?}: {status:?}, dz = {delta:.4}", footprint.min, footprint.max);

    SeatingResult {
        status,
        sample,
        delta_z: Some(delta),
        target_elevation: Some(target),
        error: None,
    }
}

/// Outcome of seating several footprints, in input order.
#[derive(Debug, Clone, Default)]
pub struct PlacementReport {
    pub results: Vec<SeatingResult>,
    pub placed: usize,
    pub already_placed: usize,
    pub no_terrain: usize,
    pub errors: usize,
    pub timing: Option<GeomTimingReport>,
}

impl PlacementReport {
    fn push(&mut self, result: SeatingResult) {
        match result.status {
            PlacementStatus::Placed => self.placed += 1,
            PlacementStatus::AlreadyPlaced => self.already_placed += 1,
            PlacementStatus::NoTerrain => self.no_terrain += 1,
            PlacementStatus::Error => self.errors += 1,
        }
        self.results.push(result);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} footprints: {} placed, {} already placed, {} without terrain, {} errors",
            self.len(),
            self.placed,
            self.already_placed,
            self.no_terrain,
            self.errors
        )
    }
}

impl fmt::Display for PlacementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

pub fn seat_footprints(footprints: &[Footprint], terrain: &TerrainModel, config: &SeatingConfig) -> PlacementReport {
    let mut metrics = GeomMetrics::default();
    metrics.begin();
    let mut report = PlacementReport::default();
    for footprint in footprints {
        let result = metrics.time(TimingBucket::Seating, || {
            seat_footprint_with_config(footprint, terrain, config)
        });
        report.push(result);
    }
    report.timing = metrics.end();
    log::info!("{}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::geom::Point3;

    fn flat(z: f64, size: f64) -> TerrainModel {
        let vertices = vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(size, 0.0, z),
            Point3::new(size, size, z),
            Point3::new(0.0, size, z),
        ];
        TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3]]).expect("terrain")
    }

    #[test]
    fn test_seat_moves_to_highest_point() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 5.0);
        let result = seat_footprint(&fp, &flat(0.0, 100.0), 5, 0.0);
        assert_eq!(result.status, PlacementStatus::Placed);
        assert!((result.delta_z.expect("delta") + 5.0).abs() < 1e-9);
        assert_eq!(result.translation(), Vec3::new(0.0, 0.0, result.delta_z.expect("delta")));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_already_placed_within_tolerance() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 2.0004);
        let result = seat_footprint(&fp, &flat(2.0, 100.0), 3, 0.0);
        assert_eq!(result.status, PlacementStatus::AlreadyPlaced);
        assert!(result.delta_z.is_some());
        assert_eq!(result.translation(), Vec3::ZERO);
        assert!(result.transform().is_identity());
    }

    #[test]
    fn test_offset_is_added() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 0.0);
        let result = seat_footprint(&fp, &flat(1.0, 100.0), 2, 0.25);
        assert!((result.target_elevation.expect("target") - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_no_terrain_and_too_few_hits() {
        let terrain = flat(0.0, 100.0);
        let away = Footprint::new((200.0, 200.0), (210.0, 210.0), 0.0);
        let result = seat_footprint(&away, &terrain, 5, 0.0);
        assert_eq!(result.status, PlacementStatus::NoTerrain);
        assert_eq!(result.error.as_ref().map(TerrainError::kind), Some(ErrorKind::NoTerrainCoverage));

        // Only the corner sample at (100, 100) lands on terrain.
        let corner = Footprint::new((100.0, 100.0), (120.0, 120.0), 0.0);
        let result = seat_footprint(&corner, &terrain, 3, 0.0);
        assert_eq!(result.status, PlacementStatus::Error);
        assert_eq!(result.error.as_ref().map(TerrainError::kind), Some(ErrorKind::InsufficientData));
    }

    #[test]
    fn test_single_sample_grid_needs_one_hit() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 3.0);
        let result = seat_footprint(&fp, &flat(0.0, 100.0), 1, 0.0);
        assert_eq!(result.status, PlacementStatus::Placed);
        assert_eq!(result.sample.hit_count, 1);
    }

    #[test]
    fn test_batch_report_counts() {
        let terrain = flat(0.0, 100.0);
        let footprints = [
            Footprint::new((10.0, 10.0), (20.0, 20.0), 5.0),
            Footprint::new((30.0, 30.0), (40.0, 40.0), 0.0),
            Footprint::new((500.0, 500.0), (510.0, 510.0), 0.0),
        ];
        let report = seat_footprints(&footprints, &terrain, &SeatingConfig::default());
        assert_eq!(report.len(), 3);
        assert_eq!((report.placed, report.already_placed, report.no_terrain, report.errors), (1, 1, 1, 0));
        assert!(report.to_string().contains("3 footprints"));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 0.0);
        let result = seat_footprint(&fp, &flat(0.0, 100.0), 0, 0.0);
        assert_eq!(result.status, PlacementStatus::Error);
        assert!(matches!(result.error, Some(TerrainError::InvalidConfig { .. })));
    }

    #[test]
    fn test_oversized_grid_is_rejected_before_sampling() {
        let fp = Footprint::new((10.0, 10.0), (20.0, 20.0), 0.0);
        let result = seat_footprint(&fp, &flat(0.0, 100.0), 100_000, 0.0);
        assert_eq!(result.status, PlacementStatus::Error);
        assert!(matches!(
            result.error,
            Some(TerrainError::InvalidConfig { field: "grid_resolution", .. })
        ));
        assert_eq!(result.sample.sample_count(), 0);
    }
}
