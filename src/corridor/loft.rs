//! Orientation unification and the corridor loft.

use serde::Serialize;

use crate::config::OrientationRule;
use crate::error::TerrainError;
use crate::geom::{
    GeomContext, GeomMesh, GeomMeshDiagnostics, LoftDiagnostics, LoftOptions, LoftType, Point3, Tolerance,
    loft_mesh_with_context, repair_mesh, tessellate_curve_uniform,
};

use super::cross_section::CrossSection;

/// Profile samples per cross-section interval.
const PROFILE_SUBDIVISIONS: usize = 4;
/// Closure is detected within this multiple of the tolerance.
const CLOSURE_FACTOR: f64 = 10.0;

/// Makes every section run the same way as its predecessor. Returns the
/// number of sections reversed.
///
/// This is a greedy pass from the first section onwards; it never revisits
/// earlier decisions.
pub fn unify_orientations(sections: &mut [CrossSection], rule: OrientationRule) -> usize {
    let mut reversed = 0;
    for i in 1..sections.len() {
        let (prev_start, prev_end) = (sections[i - 1].start_point(), sections[i - 1].end_point());
        let current = &mut sections[i];
        let (start, end) = (current.start_point(), current.end_point());

        let flip = match rule {
            OrientationRule::MatchedEndpoints => {
                prev_start.distance_to(end) + prev_end.distance_to(start)
                    < prev_start.distance_to(start) + prev_end.distance_to(end)
            }
            OrientationRule::EndToStart => prev_end.distance_to(end) < prev_end.distance_to(start),
        };
        if flip {
            current.reverse();
            reversed += 1;
        }
    }
    if reversed > 0 {
        log::debug!("Unify: reversed {reversed} of {} sections", sections.len());
    }
    reversed
}

/// Lofted corridor mesh with its diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CorridorSurface {
    pub mesh: GeomMesh,
    pub diagnostics: GeomMeshDiagnostics,
    pub loft_diagnostics: LoftDiagnostics,
    pub closed: bool,
    /// False for a best-effort surface that failed validation after repair.
    pub valid: bool,
    pub repaired: bool,
    pub warnings: Vec<String>,
}

pub fn loft_corridor(sections: &[CrossSection], tolerance: f64) -> Result<CorridorSurface, TerrainError> {
    let mut ctx = GeomContext::with_tolerance(Tolerance::new(tolerance));
    loft_corridor_with_context(sections, false, &mut ctx)
}

/// Lofts `sections` in order. The loft closes when the first section starts
/// where the last one ends, or when `closed_path` says the sections stand on
/// a closed loop; the last section then connects back to the first.
pub fn loft_corridor_with_context(
    sections: &[CrossSection],
    closed_path: bool,
    ctx: &mut GeomContext,
) -> Result<CorridorSurface, TerrainError> {
    let tolerance = ctx.tolerance.eps;
    if sections.len() < 2 {
        return Err(TerrainError::TooFewSections {
            valid: sections.len(),
            required: 2,
            skipped: 0,
        });
    }

    let mut warnings = Vec::new();
    let (first, last) = (&sections[0], &sections[sections.len() - 1]);
    let touching = first.start_point().distance_to(last.end_point()) < CLOSURE_FACTOR * tolerance;
    let mut closed = closed_path || touching;
    if closed && sections.len() < 3 {
        let message = "closed corridor needs at least 3 sections, lofting open";
        log::warn!("Loft: {message}");
        warnings.push(message.to_string());
        closed = false;
    }
    log::info!("Loft: {} sections, {}", sections.len(), if closed { "closed" } else { "open" });

    let profiles = section_profiles(sections);
    let refs: Vec<&[Point3]> = profiles.iter().map(Vec::as_slice).collect();
    let options = LoftOptions {
        loft_type: LoftType::Normal,
        closed,
        ..LoftOptions::default()
    };
    let (mesh, mut diagnostics, loft_diagnostics) = loft_mesh_with_context(&refs, options, ctx)?;
    if mesh.triangle_count() == 0 {
        return Err(TerrainError::EmptyLoft {
            sections: sections.len(),
        });
    }
    if loft_diagnostics.twist_detected {
        warnings.push(format!(
            "profiles turn by up to {:.1} degrees between sections",
            loft_diagnostics.max_twist_angle.to_degrees()
        ));
    }

    let (mesh, valid, repaired) = match surface_problem(&mesh, &diagnostics) {
        None => (mesh, true, false),
        Some(problem) => {
            log::warn!("Loft: surface invalid ({problem}), attempting repair");
            let (fixed, repair_diag) = repair_mesh(&mesh, ctx.tolerance);
            diagnostics.absorb_repair(&repair_diag);
            match surface_problem(&fixed, &diagnostics) {
                None if fixed.triangle_count() > 0 => (fixed, true, true),
                None => (mesh, false, true),
                Some(problem) => {
                    let message = format!("surface is still invalid after repair ({problem}), returned as best effort");
                    log::warn!("Loft: {message}");
                    warnings.push(message);
                    let best = if fixed.triangle_count() > 0 { fixed } else { mesh };
                    (best, false, true)
                }
            }
        }
    };
    log::debug!("Loft mesh: {}", diagnostics.summary());

    Ok(CorridorSurface {
        mesh,
        diagnostics,
        loft_diagnostics,
        closed,
        valid,
        repaired,
        warnings,
    })
}

/// Every section resampled to the same number of points along its curve.
fn section_profiles(sections: &[CrossSection]) -> Vec<Vec<Point3>> {
    let widest = sections.iter().map(|s| s.points.len()).max().unwrap_or(3);
    let steps = PROFILE_SUBDIVISIONS * (widest.max(2) - 1);
    sections
        .iter()
        .map(|s| tessellate_curve_uniform(&s.curve, steps))
        .collect()
}

fn surface_problem(mesh: &GeomMesh, diagnostics: &GeomMeshDiagnostics) -> Option<String> {
    if let Err(reason) = mesh.validate() {
        return Some(reason);
    }
    if mesh.has_invalid_vertices() {
        return Some("non-finite vertices".to_string());
    }
    if diagnostics.non_manifold_edge_count > 0 {
        return Some(format!("{} non-manifold edges", diagnostics.non_manifold_edge_count));
    }
    None
}
