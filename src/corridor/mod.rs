//! Terrain-following corridor surfaces.
//!
//! A reference path is flattened, projected onto the terrain, divided into
//! stations, given a terrain-snapped cross-section at every station and
//! finally lofted into one surface. Each stage can drop elements it cannot
//! handle; the operation only fails when too little is left to loft.

mod cross_section;
mod loft;
mod projector;
mod stations;

pub use cross_section::{
    CrossSection, CrossSectionParams, SectionBatch, build_cross_section, cross_section_axis,
    generate_cross_sections,
};
pub use loft::{CorridorSurface, loft_corridor, loft_corridor_with_context, unify_orientations};
pub use projector::{
    PathCurve, ProjectedPath, ProjectionMethod, ReferencePath, flatten_to_plane, project_path,
    projection_sample_count, try_project_path,
};
pub use stations::{Station, sample_stations, sample_stations_with};

use serde::Serialize;

use crate::config::CorridorConfig;
use crate::error::TerrainError;
use crate::geom::{Curve3, GeomContext, GeomTimingReport, TimingBucket, Tolerance, tessellate_curve_uniform};
use crate::terrain::{RayOptions, TerrainModel};

/// Counters reported with every corridor result, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorridorStatistics {
    /// Length of the projected path.
    pub length: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub z_range: f64,
    pub station_count: usize,
    /// Cross-sections attempted (one per station).
    pub section_count: usize,
    pub valid_sections: usize,
    pub skipped_stations: usize,
    /// Projection samples that hit or missed the terrain.
    pub hits: usize,
    pub misses: usize,
    /// Edge points that fell back to the station elevation.
    pub fallback_points: usize,
    pub reversed_sections: usize,
    /// `length * road_width`.
    pub surface_area_est: f64,
}

#[derive(Debug, Clone)]
pub struct CorridorResult {
    pub surface: Option<CorridorSurface>,
    pub error: Option<TerrainError>,
    pub statistics: CorridorStatistics,
    pub warnings: Vec<String>,
    pub timing: Option<GeomTimingReport>,
}

impl CorridorResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.surface.is_some()
    }
}

/// Runs the whole pipeline. Never panics; failures come back in `error`.
#[must_use]
pub fn build_corridor(path: &ReferencePath, terrain: &TerrainModel, config: &CorridorConfig) -> CorridorResult {
    let config = config.normalized();
    let mut ctx = GeomContext::with_tolerance(Tolerance::new(config.tolerance));
    ctx.metrics.begin();

    let mut statistics = CorridorStatistics::default();
    let mut warnings = Vec::new();
    let outcome = run_pipeline(path, terrain, &config, &mut ctx, &mut statistics, &mut warnings);
    let timing = ctx.metrics.end();

    match outcome {
        Ok(surface) => {
            warnings.extend(surface.warnings.iter().cloned());
            log::info!(
                "Corridor: {} sections lofted, {} skipped, {}",
                statistics.valid_sections,
                statistics.skipped_stations,
                if surface.valid { "valid" } else { "best effort" }
            );
            CorridorResult {
                surface: Some(surface),
                error: None,
                statistics,
                warnings,
                timing,
            }
        }
        Err(err) => {
            log::warn!("Corridor failed: {err}");
            CorridorResult {
                surface: None,
                error: Some(err),
                statistics,
                warnings,
                timing,
            }
        }
    }
}

fn run_pipeline(
    path: &ReferencePath,
    terrain: &TerrainModel,
    config: &CorridorConfig,
    ctx: &mut GeomContext,
    statistics: &mut CorridorStatistics,
    warnings: &mut Vec<String>,
) -> Result<CorridorSurface, TerrainError> {
    config.validate()?;

    let flat = path.flattened_polyline()?;
    if flat.length() < config.tolerance {
        return Err(TerrainError::DegenerateCurve {
            length: flat.length(),
            tolerance: config.tolerance,
        });
    }

    let ray = RayOptions {
        search_distance: config.vertical_search_distance,
        tolerance: config.tolerance,
        ..RayOptions::default()
    };
    let projected = ctx
        .metrics
        .time(TimingBucket::Projection, || try_project_path(path, terrain, &ray));
    let projected = match projected {
        Ok(projected) => projected,
        Err(err) => {
            if let TerrainError::NoCoverage { hits, samples, .. } = &err {
                statistics.hits = *hits;
                statistics.misses = samples.saturating_sub(*hits);
            }
            return Err(err);
        }
    };
    record_projection(statistics, &projected, config.road_width);

    let stations = ctx.metrics.time(TimingBucket::Stations, || {
        sample_stations_with(&projected.curve, terrain, config.sample_spacing, &ray)
    })?;
    statistics.station_count = stations.len();

    let params = CrossSectionParams::from_config(config);
    let mut batch = ctx.metrics.time(TimingBucket::CrossSections, || {
        generate_cross_sections(&stations, terrain, &params, config.parallel)
    });
    statistics.section_count = stations.len();
    statistics.valid_sections = batch.sections.len();
    statistics.skipped_stations = batch.skipped;
    statistics.fallback_points = batch.fallback_points();
    if batch.skipped > 0 {
        warnings.push(format!("{} of {} stations produced no cross-section", batch.skipped, stations.len()));
    }
    if batch.sections.len() < 2 {
        return Err(TerrainError::TooFewSections {
            valid: batch.sections.len(),
            required: 2,
            skipped: batch.skipped,
        });
    }

    statistics.reversed_sections = ctx.metrics.time(TimingBucket::Unify, || {
        unify_orientations(&mut batch.sections, config.orientation_rule)
    });

    loft_corridor_with_context(&batch.sections, projected.curve.is_closed(), ctx)
}

fn record_projection(statistics: &mut CorridorStatistics, projected: &ProjectedPath, road_width: f64) {
    let length = projected.curve.length();
    let samples = tessellate_curve_uniform(&projected.curve, projected.sample_count.max(2));
    let (z_min, z_max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));

    statistics.length = length;
    statistics.z_min = z_min;
    statistics.z_max = z_max;
    statistics.z_range = z_max - z_min;
    statistics.hits = projected.hit_count;
    statistics.misses = projected.miss_count();
    statistics.surface_area_est = length * road_width;
}
