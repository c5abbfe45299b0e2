//! Loft meshes through an ordered sequence of open profiles.
//!
//! Profiles are resampled to a common point count, densified along the loft
//! direction, then stitched row by row into a triangle strip and finalized.
//!
//! # Loft Types
//! - `Normal`: Catmull-Rom through every profile (the surface passes through each one).
//! - `Straight`: ruled strips between consecutive profiles.

use serde::Serialize;

use super::diagnostics::GeomMeshDiagnostics;
use super::mesh::{GeomContext, GeomMesh, finalize_mesh};
use super::metrics::TimingBucket;
use super::{Point3, Tolerance};

use std::f64::consts::FRAC_PI_4;

// ============================================================================
// Types and Options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoftType {
    /// Catmull-Rom (tension 0.5) through all profiles.
    #[default]
    Normal,
    /// Linear interpolation between neighbouring profiles.
    Straight,
}

impl LoftType {
    const fn default_sections_per_span(self) -> usize {
        match self {
            Self::Normal => 4,
            Self::Straight => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoftOptions {
    pub loft_type: LoftType,
    /// Connect the last profile back to the first.
    pub closed: bool,
    /// Rows generated per span between two input profiles (0 = per loft type).
    pub sections_per_span: usize,
    /// Resample every profile to this many points (0 = keep matching
    /// profiles as they are, otherwise use the longest profile's count).
    pub rebuild_point_count: usize,
}

impl Default for LoftOptions {
    fn default() -> Self {
        Self {
            loft_type: LoftType::Normal,
            closed: false,
            sections_per_span: 0,
            rebuild_point_count: 0,
        }
    }
}

impl LoftOptions {
    #[must_use]
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn straight() -> Self {
        Self {
            loft_type: LoftType::Straight,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoftDiagnostics {
    pub profile_count: usize,
    pub points_per_profile: usize,
    /// Rows in the output grid after densification.
    pub row_count: usize,
    pub closed: bool,
    /// Angle between consecutive profiles' start-to-end chords (radians).
    pub twist_angles: Vec<f64>,
    pub max_twist_angle: f64,
    /// Any chord turned by more than 45 degrees between neighbours.
    pub twist_detected: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoftError {
    #[error("loft requires at least 2 profiles, got {count}")]
    NotEnoughProfiles { count: usize },
    #[error("profile {index} has fewer than 2 points (has {point_count})")]
    ProfileTooShort { index: usize, point_count: usize },
    #[error("profile {index} contains non-finite coordinates at point {point_index}")]
    NonFinitePoint { index: usize, point_index: usize },
    #[error("closed loft requires at least 3 profiles, got {count}")]
    ClosedLoftTooFewProfiles { count: usize },
    #[error("degenerate profile {index} (zero length)")]
    DegenerateProfile { index: usize },
}

// ============================================================================
// Public API
// ============================================================================

pub fn loft_mesh(
    profiles: &[&[Point3]],
    options: LoftOptions,
) -> Result<(GeomMesh, GeomMeshDiagnostics, LoftDiagnostics), LoftError> {
    loft_mesh_with_tolerance(profiles, options, Tolerance::default_geom())
}

pub fn loft_mesh_with_tolerance(
    profiles: &[&[Point3]],
    options: LoftOptions,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics, LoftDiagnostics), LoftError> {
    let mut ctx = GeomContext::with_tolerance(tol);
    loft_mesh_with_context(profiles, options, &mut ctx)
}

/// Lofts with the caller's context so timings accumulate in `ctx.metrics`.
pub fn loft_mesh_with_context(
    profiles: &[&[Point3]],
    options: LoftOptions,
    ctx: &mut GeomContext,
) -> Result<(GeomMesh, GeomMeshDiagnostics, LoftDiagnostics), LoftError> {
    let tol = ctx.tolerance;

    if profiles.len() < 2 {
        return Err(LoftError::NotEnoughProfiles { count: profiles.len() });
    }
    if options.closed && profiles.len() < 3 {
        return Err(LoftError::ClosedLoftTooFewProfiles { count: profiles.len() });
    }
    validate_profiles(profiles, tol)?;

    let resampled = match rebuild_target(profiles, options.rebuild_point_count) {
        Some(count) => profiles.iter().map(|p| resample_polyline(p, count)).collect(),
        None => profiles.iter().map(|p| p.to_vec()).collect::<Vec<_>>(),
    };
    let points_per_profile = resampled[0].len();

    let twist_angles: Vec<f64> = resampled
        .windows(2)
        .map(|pair| chord_angle(&pair[0], &pair[1]))
        .collect();
    let max_twist_angle = twist_angles.iter().copied().fold(0.0, f64::max);

    let sections_per_span = match options.sections_per_span {
        0 => options.loft_type.default_sections_per_span(),
        n => n,
    };

    let (rows, uvs, indices) = ctx.metrics.time(TimingBucket::Loft, || {
        let rows = generate_interpolated_profiles(&resampled, options.loft_type, options.closed, sections_per_span);
        let (uvs, indices) = build_loft_mesh(&rows, options.closed);
        (rows, uvs, indices)
    });
    let row_count = rows.len();
    let vertices: Vec<Point3> = rows.into_iter().flatten().collect();

    let (mesh, mut mesh_diag) = ctx
        .metrics
        .time(TimingBucket::Welding, || finalize_mesh(vertices, Some(uvs), indices, tol));
    mesh_diag.timing = ctx.metrics.end();

    let loft_diag = LoftDiagnostics {
        profile_count: profiles.len(),
        points_per_profile,
        row_count,
        closed: options.closed,
        twist_detected: max_twist_angle > FRAC_PI_4,
        twist_angles,
        max_twist_angle,
    };
    Ok((mesh, mesh_diag, loft_diag))
}

// ============================================================================
// Profile preparation
// ============================================================================

fn validate_profiles(profiles: &[&[Point3]], tol: Tolerance) -> Result<(), LoftError> {
    for (index, profile) in profiles.iter().enumerate() {
        if profile.len() < 2 {
            return Err(LoftError::ProfileTooShort {
                index,
                point_count: profile.len(),
            });
        }
        if let Some(point_index) = profile.iter().position(|p| !p.is_finite()) {
            return Err(LoftError::NonFinitePoint { index, point_index });
        }
        if polyline_length(profile) <= tol.eps {
            return Err(LoftError::DegenerateProfile { index });
        }
    }
    Ok(())
}

/// `None` when the profiles can be used unchanged.
fn rebuild_target(profiles: &[&[Point3]], requested: usize) -> Option<usize> {
    if requested >= 2 {
        return Some(requested);
    }
    let first = profiles[0].len();
    if profiles.iter().all(|p| p.len() == first) {
        return None;
    }
    profiles.iter().map(|p| p.len()).max()
}

fn polyline_length(points: &[Point3]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(w[1])).sum()
}

/// Resamples an open polyline to `target_count` points evenly spaced by arc length.
pub(crate) fn resample_polyline(points: &[Point3], target_count: usize) -> Vec<Point3> {
    let target_count = target_count.max(2);
    if points.len() < 2 {
        return points.to_vec();
    }

    let mut cumulative = Vec::with_capacity(points.len());
    cumulative.push(0.0);
    for pair in points.windows(2) {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + pair[0].distance_to(pair[1]));
    }
    let total = cumulative[cumulative.len() - 1];
    if total <= 0.0 {
        return vec![points[0]; target_count];
    }

    (0..target_count)
        .map(|i| {
            let target = total * i as f64 / (target_count - 1) as f64;
            let seg = cumulative
                .partition_point(|d| *d <= target)
                .clamp(1, points.len() - 1)
                - 1;
            let len = cumulative[seg + 1] - cumulative[seg];
            let t = if len > 0.0 { (target - cumulative[seg]) / len } else { 0.0 };
            points[seg].lerp(points[seg + 1], t.clamp(0.0, 1.0))
        })
        .collect()
}

fn chord_angle(a: &[Point3], b: &[Point3]) -> f64 {
    let da = a[a.len() - 1].sub_point(a[0]);
    let db = b[b.len() - 1].sub_point(b[0]);
    match (da.normalized(), db.normalized()) {
        (Some(ua), Some(ub)) => ua.dot(ub).clamp(-1.0, 1.0).acos(),
        _ => 0.0,
    }
}

// ============================================================================
// Interpolation
// ============================================================================

/// Cardinal spline between `p1` and `p2`; `tension` 0.5 is Catmull-Rom.
pub(crate) fn catmull_rom_point(p0: Point3, p1: Point3, p2: Point3, p3: Point3, t: f64, tension: f64) -> Point3 {
    let t2 = t * t;
    let t3 = t2 * t;
    let tau = tension;
    let weights = [
        -tau * t3 + 2.0 * tau * t2 - tau * t,
        (2.0 - tau) * t3 + (tau - 3.0) * t2 + 1.0,
        (tau - 2.0) * t3 + (3.0 - 2.0 * tau) * t2 + tau * t,
        tau * t3 - tau * t2,
    ];
    let mut out = Point3::ORIGIN;
    for (p, w) in [p0, p1, p2, p3].into_iter().zip(weights) {
        out.x += w * p.x;
        out.y += w * p.y;
        out.z += w * p.z;
    }
    out
}

/// Point at global loft parameter `t` through `column` (one point per profile).
fn interpolate_column(column: &[Point3], t: f64, loft_type: LoftType, closed: bool) -> Point3 {
    let n = column.len();
    let spans = if closed { n } else { n - 1 };
    let scaled = t * spans as f64;
    let span = (scaled.floor() as usize).min(spans - 1);
    let local = scaled - span as f64;

    let at = |i: isize| -> Point3 {
        if closed {
            column[i.rem_euclid(n as isize) as usize]
        } else {
            column[i.clamp(0, n as isize - 1) as usize]
        }
    };
    let s = span as isize;
    match loft_type {
        LoftType::Straight => at(s).lerp(at(s + 1), local),
        LoftType::Normal => catmull_rom_point(at(s - 1), at(s), at(s + 1), at(s + 2), local, 0.5),
    }
}

/// Densifies the profile sequence. Input profiles reappear unchanged at
/// every `sections_per_span`-th row.
pub(crate) fn generate_interpolated_profiles(
    profiles: &[Vec<Point3>],
    loft_type: LoftType,
    closed: bool,
    sections_per_span: usize,
) -> Vec<Vec<Point3>> {
    let sections_per_span = sections_per_span.max(1);
    if profiles.len() < 2 || sections_per_span == 1 {
        return profiles.to_vec();
    }

    let spans = if closed { profiles.len() } else { profiles.len() - 1 };
    let row_count = spans * sections_per_span + usize::from(!closed);
    let width = profiles[0].len();
    let columns: Vec<Vec<Point3>> = (0..width)
        .map(|j| profiles.iter().map(|p| p[j]).collect())
        .collect();

    (0..row_count)
        .map(|row| {
            if row % sections_per_span == 0 {
                return profiles[row / sections_per_span].clone();
            }
            let t = row as f64 / (spans * sections_per_span) as f64;
            columns
                .iter()
                .map(|column| interpolate_column(column, t, loft_type, closed))
                .collect()
        })
        .collect()
}

/// UVs and quad-split triangle indices over a row-major point grid.
fn build_loft_mesh(rows: &[Vec<Point3>], closed: bool) -> (Vec<[f64; 2]>, Vec<u32>) {
    let row_count = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    if row_count < 2 || width < 2 {
        return (Vec::new(), Vec::new());
    }

    let v_denom = if closed { row_count } else { row_count - 1 } as f64;
    let mut uvs = Vec::with_capacity(row_count * width);
    for r in 0..row_count {
        for c in 0..width {
            uvs.push([c as f64 / (width - 1) as f64, r as f64 / v_denom]);
        }
    }

    let strips = if closed { row_count } else { row_count - 1 };
    let mut indices = Vec::with_capacity(strips * (width - 1) * 6);
    for r in 0..strips {
        let next = (r + 1) % row_count;
        for c in 0..width - 1 {
            let a = (r * width + c) as u32;
            let b = (r * width + c + 1) as u32;
            let d = (next * width + c + 1) as u32;
            let e = (next * width + c) as u32;
            indices.extend_from_slice(&[a, b, d, a, d, e]);
        }
    }
    (uvs, indices)
}
