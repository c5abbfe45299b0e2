//! Scattered survey points to terrain, and terrain to contour lines.
//!
//! Points are cleaned up first: non-finite records and elevation outliers are
//! dropped, then large surveys are thinned by striding. The survivors are
//! triangulated in XY and become a mesh [`TerrainModel`], so every query the
//! crate offers works on surveyed ground as well.

mod cleanup;
mod contours;
mod triangulate;

pub use cleanup::{PointStatistics, filter_outliers, thin_points};
pub use contours::{ContourLevel, ContourLine, ContourSet, contour_levels, extract_contours};
pub use triangulate::triangulate_xy;

use serde::Serialize;

use crate::config::SurveyConfig;
use crate::error::TerrainError;
use crate::geom::{GeomMetrics, GeomTimingReport, Point3, TimingBucket};
use crate::terrain::TerrainModel;

/// What happened to a survey on its way to a terrain.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyReport {
    pub input_points: usize,
    pub non_finite: usize,
    pub outliers_removed: usize,
    /// Point count before thinning, when thinning happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinned_from: Option<usize>,
    /// Points handed to the triangulator.
    pub point_count: usize,
    pub statistics: PointStatistics,
    pub triangle_count: usize,
    #[serde(skip)]
    pub timing: Option<GeomTimingReport>,
}

/// Builds a mesh terrain from scattered `points`.
pub fn terrain_from_survey(
    points: Vec<Point3>,
    config: &SurveyConfig,
) -> Result<(TerrainModel, SurveyReport), TerrainError> {
    config.validate()?;
    let mut metrics = GeomMetrics::default();
    metrics.begin();

    let input_points = points.len();
    let (points, finite, outliers_removed, thinned_from) = metrics.time(TimingBucket::SurveyCleanup, || {
        let mut points = points;
        points.retain(|p| p.is_finite());
        let finite = points.len();
        let (points, removed) = filter_outliers(points, config.outlier_sigma);
        let before_thinning = points.len();
        let points = thin_points(points, config.max_points);
        let thinned_from = (points.len() < before_thinning).then_some(before_thinning);
        (points, finite, removed, thinned_from)
    });
    let non_finite = input_points - finite;
    if non_finite > 0 {
        log::warn!("Survey: skipped {non_finite} points with non-finite coordinates");
    }

    let statistics = PointStatistics::of(&points).ok_or_else(|| {
        TerrainError::degenerate_terrain(format!("no usable survey points among {input_points}"))
    })?;
    let triangles = metrics.time(TimingBucket::Triangulation, || triangulate_xy(&points))?;
    let triangle_count = triangles.len();
    let terrain = TerrainModel::from_mesh(points, triangles)?;

    let report = SurveyReport {
        input_points,
        non_finite,
        outliers_removed,
        thinned_from,
        point_count: statistics.count,
        statistics,
        triangle_count,
        timing: metrics.end(),
    };
    log::info!(
        "Survey: {} of {input_points} points triangulated into {triangle_count} triangles, z {:.3} to {:.3}",
        report.point_count,
        statistics.min[2],
        statistics.max[2]
    );
    Ok((terrain, report))
}
