use crate::error::TerrainError;
use crate::geom::{Curve3, Point3, Vec3, curve_arc_length, divide_curve_by_length, sample_curve_at};
use crate::terrain::{RayOptions, TerrainModel};

const LENGTH_SAMPLES: usize = 2048;

/// A sample along the projected path, in arc-length order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Station {
    pub parameter: f64,
    pub position: Point3,
    /// Unit direction of travel.
    pub tangent: Vec3,
    /// Unit terrain normal at the station's XY, Z non-negative.
    pub normal: Vec3,
}

/// Divides `curve` every `spacing` units (ends included) and attaches
/// tangents and terrain normals. A closed curve's end coincides with its
/// start, so it only yields the start station.
pub fn sample_stations<C: Curve3 + ?Sized>(
    curve: &C,
    terrain: &TerrainModel,
    spacing: f64,
    tolerance: f64,
) -> Result<Vec<Station>, TerrainError> {
    let ray = RayOptions {
        tolerance,
        ..RayOptions::default()
    };
    sample_stations_with(curve, terrain, spacing, &ray)
}

/// As [`sample_stations`], estimating normals with the given ray settings.
pub fn sample_stations_with<C: Curve3 + ?Sized>(
    curve: &C,
    terrain: &TerrainModel,
    spacing: f64,
    ray: &RayOptions,
) -> Result<Vec<Station>, TerrainError> {
    let tolerance = ray.tolerance;
    let length = curve_arc_length(curve, LENGTH_SAMPLES);
    if !length.is_finite() || length < tolerance {
        return Err(TerrainError::DegenerateCurve { length, tolerance });
    }

    let mut division = divide_curve_by_length(curve, spacing, tolerance);
    if division.is_empty() {
        log::debug!("Stations: division produced no points, using curve ends");
        let (t0, t1) = curve.domain();
        for t in [t0, t1] {
            let s = sample_curve_at(curve, t);
            division.points.push(s.point);
            division.tangents.push(s.tangent);
            division.parameters.push(s.parameter);
        }
    }
    if curve.is_closed() && division.len() > 2 {
        let last = division.len() - 1;
        if division.points[last].distance_to(division.points[0]) <= tolerance.max(length * 1e-9) {
            division.points.pop();
            division.tangents.pop();
            division.parameters.pop();
        }
    }

    let mut stations = Vec::with_capacity(division.len());
    let mut dropped = 0usize;
    for ((&point, &tangent), &parameter) in division
        .points
        .iter()
        .zip(&division.tangents)
        .zip(&division.parameters)
    {
        let Some(tangent) = tangent.normalized() else {
            dropped += 1;
            continue;
        };
        let normal = terrain.estimate_normal_with(point.x, point.y, ray);
        stations.push(Station {
            parameter,
            position: point,
            tangent,
            normal,
        });
    }

    if dropped > 0 {
        log::warn!("Stations: dropped {dropped} with a zero tangent");
    }
    log::info!("Stations: {} along {length:.3} at spacing {spacing}", stations.len());
    Ok(stations)
}
