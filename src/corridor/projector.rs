use serde::Serialize;

use crate::error::TerrainError;
use crate::geom::{Curve3, NurbsCurve3, Point3, Polyline3, Vec3, curve_arc_length};
use crate::terrain::{RayOptions, TerrainModel};

/// Curves are sampled at least this many times when projected.
const MIN_PROJECTION_SAMPLES: usize = 50;
/// Smallest feature the sampled projection is meant to resolve.
const PROJECTION_RESOLUTION: f64 = 0.5;
const REFIT_DEGREE: usize = 3;
const LENGTH_SAMPLES: usize = 1024;

/// 2D reference geometry: a centerline as an ordered list of vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePath {
    pub points: Vec<Point3>,
    pub closed: bool,
}

impl ReferencePath {
    #[must_use]
    pub const fn new(points: Vec<Point3>, closed: bool) -> Self {
        Self { points, closed }
    }

    #[must_use]
    pub const fn open(points: Vec<Point3>) -> Self {
        Self::new(points, false)
    }

    pub(crate) fn flattened_polyline(&self) -> Result<Polyline3, TerrainError> {
        Polyline3::new(flatten_to_plane(&self.points), self.closed)
            .map_err(|reason| TerrainError::InvalidInput { reason })
    }
}

/// Drops incidental elevation so every path is projected from the same plane.
#[must_use]
pub fn flatten_to_plane(points: &[Point3]) -> Vec<Point3> {
    points.iter().map(|p| p.with_z(0.0)).collect()
}

/// Curve types a projected path or a profile can end up as.
#[derive(Debug, Clone, PartialEq)]
pub enum PathCurve {
    Nurbs(NurbsCurve3),
    Polyline(Polyline3),
}

impl PathCurve {
    /// Smooth interpolation through `points`, or a polyline if that fails.
    /// Errors only when neither curve can be built.
    pub fn fit(points: &[Point3], closed: bool) -> Result<Self, TerrainError> {
        let smooth_reason = match NurbsCurve3::interpolate_through_points(points, REFIT_DEGREE, closed) {
            Ok(curve) => return Ok(Self::Nurbs(curve)),
            Err(reason) => reason,
        };
        log::debug!("Curve refit failed ({smooth_reason}), using polyline");
        Polyline3::new(points.to_vec(), closed)
            .map(Self::Polyline)
            .map_err(|reason| TerrainError::CurveFit {
                reason: format!("{smooth_reason}; {reason}"),
            })
    }

    #[must_use]
    pub fn reversed(&self) -> Self {
        match self {
            Self::Nurbs(c) => Self::Nurbs(c.reversed()),
            Self::Polyline(p) => Self::Polyline(p.reversed()),
        }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        match self {
            Self::Polyline(p) => p.length(),
            Self::Nurbs(c) => curve_arc_length(c, LENGTH_SAMPLES),
        }
    }

    #[must_use]
    pub const fn is_smooth(&self) -> bool {
        matches!(self, Self::Nurbs(_))
    }
}

impl Curve3 for PathCurve {
    fn point_at(&self, t: f64) -> Point3 {
        match self {
            Self::Nurbs(c) => c.point_at(t),
            Self::Polyline(p) => p.point_at(t),
        }
    }

    fn domain(&self) -> (f64, f64) {
        match self {
            Self::Nurbs(c) => c.domain(),
            Self::Polyline(p) => p.domain(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Self::Nurbs(c) => c.is_closed(),
            Self::Polyline(p) => p.is_closed(),
        }
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        match self {
            Self::Nurbs(c) => c.derivative_at(t),
            Self::Polyline(p) => p.derivative_at(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMethod {
    /// Mesh terrain: sampled vertical hits refit into one curve.
    MeshSampling,
    /// Patch terrain: longest run of downward hits.
    PatchSampling,
    /// Patch terrain after the downward pass found nothing.
    PatchSamplingReversed,
}

#[derive(Debug, Clone)]
pub struct ProjectedPath {
    pub curve: PathCurve,
    pub method: ProjectionMethod,
    pub sample_count: usize,
    pub hit_count: usize,
}

impl ProjectedPath {
    #[must_use]
    pub const fn miss_count(&self) -> usize {
        self.sample_count - self.hit_count
    }
}

/// Number of samples used to project a path of the given planar length.
#[must_use]
pub fn projection_sample_count(length: f64) -> usize {
    if !length.is_finite() || length <= 0.0 {
        return MIN_PROJECTION_SAMPLES;
    }
    MIN_PROJECTION_SAMPLES.max((length / PROJECTION_RESOLUTION).floor() as usize)
}

/// Projects a path vertically onto the terrain; `None` when the terrain
/// does not cover it.
#[must_use]
pub fn project_path(path: &ReferencePath, terrain: &TerrainModel, options: &RayOptions) -> Option<ProjectedPath> {
    try_project_path(path, terrain, options).ok()
}

pub fn try_project_path(
    path: &ReferencePath,
    terrain: &TerrainModel,
    options: &RayOptions,
) -> Result<ProjectedPath, TerrainError> {
    let flat = path.flattened_polyline()?;
    let count = projection_sample_count(flat.length());
    let closed = path.closed;
    let samples: Vec<Point3> = if closed {
        (0..count).map(|i| flat.point_at(i as f64 / count as f64)).collect()
    } else {
        (0..count).map(|i| flat.point_at(i as f64 / (count - 1) as f64)).collect()
    };

    let probe = |options: &RayOptions| -> Vec<Option<Point3>> {
        samples
            .iter()
            .map(|p| {
                terrain
                    .intersect_vertical_with(p.x, p.y, options)
                    .elevation()
                    .map(|z| p.with_z(z))
            })
            .collect()
    };
    let no_coverage = |hits: usize| TerrainError::NoCoverage {
        operation: "path projection",
        hits,
        samples: count,
    };

    let projected = if terrain.is_mesh() {
        let hits: Vec<Point3> = probe(options).into_iter().flatten().collect();
        if hits.len() < 2 {
            return Err(no_coverage(hits.len()));
        }
        let hit_count = hits.len();
        let curve = PathCurve::fit(&hits, closed && hit_count == count)?;
        ProjectedPath {
            curve,
            method: ProjectionMethod::MeshSampling,
            sample_count: count,
            hit_count,
        }
    } else {
        let mut method = ProjectionMethod::PatchSampling;
        let mut probed = probe(options);
        if probed.iter().all(Option::is_none) {
            log::debug!("Projection: no downward hits, retrying upward");
            method = ProjectionMethod::PatchSamplingReversed;
            probed = probe(&options.reversed());
        }
        let hit_count = probed.iter().flatten().count();
        let fully_covered = hit_count == count;
        let curve = longest_run(&probed, closed && fully_covered).ok_or_else(|| no_coverage(hit_count))??;
        ProjectedPath {
            curve,
            method,
            sample_count: count,
            hit_count,
        }
    };

    log::info!(
        "Projection: {:?}, {}/{} samples hit, length {:.3}",
        projected.method,
        projected.hit_count,
        projected.sample_count,
        projected.curve.length()
    );
    Ok(projected)
}

/// Refits every run of consecutive hits and keeps the longest. `None` when
/// no run has two hits; the last fit error when no run could be fitted.
fn longest_run(samples: &[Option<Point3>], closed: bool) -> Option<Result<PathCurve, TerrainError>> {
    let mut best: Option<(f64, PathCurve)> = None;
    let mut failure = None;
    for run in samples.split(Option::is_none).filter(|run| run.len() >= 2) {
        let points: Vec<Point3> = run.iter().flatten().copied().collect();
        match PathCurve::fit(&points, closed) {
            Ok(curve) => {
                let length = curve.length();
                if best.as_ref().is_none_or(|(longest, _)| length > *longest) {
                    best = Some((length, curve));
                }
            }
            Err(err) => failure = Some(err),
        }
    }
    match (best, failure) {
        (Some((_, curve)), _) => Some(Ok(curve)),
        (None, Some(err)) => Some(Err(err)),
        (None, None) => None,
    }
}
