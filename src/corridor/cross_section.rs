//! Terrain-snapped profiles across the path, one per station.

use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::CorridorConfig;
use crate::geom::{Curve3, NurbsCurve3, Point3, Polyline3, Vec3};
use crate::terrain::{RayOptions, TerrainModel};

use super::projector::PathCurve;
use super::stations::Station;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSectionParams {
    pub width: f64,
    /// Odd, at least 3.
    pub point_count: usize,
    pub height_offset: f64,
    pub ray: RayOptions,
    pub tolerance: f64,
}

impl CrossSectionParams {
    #[must_use]
    pub fn from_config(config: &CorridorConfig) -> Self {
        Self {
            width: config.road_width,
            point_count: config.cross_section_point_count,
            height_offset: config.height_offset,
            ray: RayOptions {
                search_distance: config.vertical_search_distance,
                tolerance: config.tolerance,
                ..RayOptions::default()
            },
            tolerance: config.tolerance,
        }
    }

    /// Point count forced odd and at least 3.
    fn normalized_point_count(&self) -> usize {
        let n = self.point_count.max(3);
        if n % 2 == 0 { n + 1 } else { n }
    }
}

#[derive(Debug, Clone)]
pub struct CrossSection {
    /// Index of the station this section was built at.
    pub station_index: usize,
    pub station: Station,
    /// Profile points from one edge to the other.
    pub points: Vec<Point3>,
    pub curve: PathCurve,
    /// Unit direction from the first point towards the last.
    pub axis: Vec3,
    /// Edge points whose ray missed and took the station elevation instead.
    pub fallback_points: usize,
    /// Set once the unifier has flipped this section.
    pub reversed: bool,
}

impl CrossSection {
    #[must_use]
    pub fn start_point(&self) -> Point3 {
        self.curve.start_point()
    }

    #[must_use]
    pub fn end_point(&self) -> Point3 {
        self.curve.end_point()
    }

    /// Flips traversal direction in place.
    pub fn reverse(&mut self) {
        self.points.reverse();
        self.curve = self.curve.reversed();
        self.axis = -self.axis;
        self.reversed = !self.reversed;
    }
}

/// Horizontal-ish direction across the path at a station.
///
/// Tries `tangent x normal`, then `tangent x X`, then `tangent x Y`, and
/// orients the result towards +X (towards +Y when it has no X component).
#[must_use]
pub fn cross_section_axis(tangent: Vec3, normal: Vec3, tolerance: f64) -> Option<Vec3> {
    let axis = [normal, Vec3::X, Vec3::Y]
        .into_iter()
        .map(|other| tangent.cross(other))
        .find(|c| c.is_finite() && c.length() > tolerance)?
        .normalized()?;

    let flip = if axis.x.abs() > tolerance { axis.x < 0.0 } else { axis.y < 0.0 };
    Some(if flip { -axis } else { axis })
}

/// Builds the profile at one station, or `None` when the station has no
/// usable axis or no terrain under its center.
#[must_use]
pub fn build_cross_section(
    station_index: usize,
    station: &Station,
    terrain: &TerrainModel,
    params: &CrossSectionParams,
) -> Option<CrossSection> {
    let axis = cross_section_axis(station.tangent, station.normal, params.tolerance)?;
    let n = params.normalized_point_count();
    let center = station.position;

    let mut points = Vec::with_capacity(n);
    let mut fallback_points = 0usize;
    for i in 0..n {
        let offset = -params.width * 0.5 + params.width * (i as f64 / (n - 1) as f64);
        let p = center.add_vec(axis.mul_scalar(offset));
        let z = match terrain.intersect_vertical_with(p.x, p.y, &params.ray).elevation() {
            Some(ground) => ground,
            None if i == n / 2 => {
                log::debug!("Station {station_index}: no terrain under the center, skipped");
                return None;
            }
            None => {
                fallback_points += 1;
                center.z
            }
        };
        points.push(p.with_z(z + params.height_offset));
    }

    let degree = 3.min(n - 1);
    let curve = match NurbsCurve3::interpolate_uniform(&points, degree) {
        Ok(curve) => PathCurve::Nurbs(curve),
        Err(reason) => {
            log::debug!("Station {station_index}: profile fit failed ({reason}), using polyline");
            PathCurve::Polyline(Polyline3::new(points.clone(), false).ok()?)
        }
    };

    Some(CrossSection {
        station_index,
        station: *station,
        points,
        curve,
        axis,
        fallback_points,
        reversed: false,
    })
}

/// Cross-sections in station order plus how many stations produced none.
#[derive(Debug, Clone, Default)]
pub struct SectionBatch {
    pub sections: Vec<CrossSection>,
    pub skipped: usize,
    pub skipped_stations: Vec<usize>,
}

impl SectionBatch {
    #[must_use]
    pub fn fallback_points(&self) -> usize {
        self.sections.iter().map(|s| s.fallback_points).sum()
    }
}

pub fn generate_cross_sections(
    stations: &[Station],
    terrain: &TerrainModel,
    params: &CrossSectionParams,
    parallel: bool,
) -> SectionBatch {
    let total = stations.len();
    let step = (total / 10).max(1);
    let done = AtomicUsize::new(0);

    let build = |(index, station): (usize, &Station)| {
        let section = build_cross_section(index, station, terrain, params);
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % step == 0 || finished == total {
            log::info!("Cross-sections: {finished}/{total} ({}%)", finished * 100 / total);
        }
        section
    };

    #[cfg(feature = "parallel")]
    let built: Vec<Option<CrossSection>> = if parallel {
        stations.par_iter().enumerate().map(build).collect()
    } else {
        stations.iter().enumerate().map(build).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let built: Vec<Option<CrossSection>> = {
        let _ = parallel;
        stations.iter().enumerate().map(build).collect()
    };

    let mut batch = SectionBatch::default();
    for (index, section) in built.into_iter().enumerate() {
        match section {
            Some(section) => batch.sections.push(section),
            None => {
                batch.skipped += 1;
                batch.skipped_stations.push(index);
            }
        }
    }
    if batch.skipped > 0 {
        log::warn!("Cross-sections: {} of {total} stations failed and were skipped", batch.skipped);
    }
    batch
}
