//! Serde records exchanged with hosts (the wasm bindings and the CLI).
//!
//! Geometry crosses the boundary as plain `[x, y, z]` arrays; the records in
//! here translate those into the crate's own types and back.

use serde::{Deserialize, Serialize};

use crate::config::{CorridorConfig, SeatingConfig, SurveyConfig};
use crate::corridor::{CorridorResult, CorridorStatistics, CorridorSurface, ReferencePath};
use crate::error::{ErrorReport, TerrainError};
use crate::geom::{NurbsSurface, PlaneSurface, Point3, Vec3};
use crate::placement::{Footprint, PlacementReport, PlacementStatus, SeatingResult};
use crate::survey::{ContourSet, SurveyReport, terrain_from_survey};
use crate::terrain::{PatchSurface, TerrainModel};

const fn point(p: [f64; 3]) -> Point3 {
    Point3::new(p[0], p[1], p[2])
}

const fn vector(v: [f64; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

// ============================================================================
// Terrain input
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchInput {
    Plane {
        origin: [f64; 3],
        u_axis: [f64; 3],
        v_axis: [f64; 3],
    },
    /// Control net in row-major order, `u_count` points per row.
    Nurbs {
        u_count: usize,
        v_count: usize,
        control_points: Vec<[f64; 3]>,
        #[serde(default = "default_degree")]
        degree_u: usize,
        #[serde(default = "default_degree")]
        degree_v: usize,
        #[serde(default)]
        knots_u: Option<Vec<f64>>,
        #[serde(default)]
        knots_v: Option<Vec<f64>>,
        #[serde(default)]
        weights: Option<Vec<f64>>,
    },
}

const fn default_degree() -> usize {
    3
}

impl PatchInput {
    pub fn into_surface(self) -> Result<PatchSurface, TerrainError> {
        match self {
            Self::Plane { origin, u_axis, v_axis } => Ok(PatchSurface::Plane(PlaneSurface::new(
                point(origin),
                vector(u_axis),
                vector(v_axis),
            ))),
            Self::Nurbs {
                u_count,
                v_count,
                control_points,
                degree_u,
                degree_v,
                knots_u,
                knots_v,
                weights,
            } => {
                let control_points: Vec<Point3> = control_points.into_iter().map(point).collect();
                let surface = match (knots_u, knots_v) {
                    (Some(knots_u), Some(knots_v)) => NurbsSurface::new(
                        degree_u,
                        degree_v,
                        u_count,
                        v_count,
                        control_points,
                        knots_u,
                        knots_v,
                        weights,
                    ),
                    (None, None) if weights.is_none() => {
                        NurbsSurface::from_grid(control_points, u_count, v_count, degree_u, degree_v)
                    }
                    _ => Err("knots_u and knots_v must be given together, and weights need explicit knots".to_string()),
                };
                surface
                    .map(PatchSurface::Nurbs)
                    .map_err(|reason| TerrainError::InvalidInput { reason })
            }
        }
    }
}

/// Builds a patch terrain from host records.
pub fn terrain_from_patches(patches: Vec<PatchInput>) -> Result<TerrainModel, TerrainError> {
    let surfaces = patches
        .into_iter()
        .map(PatchInput::into_surface)
        .collect::<Result<Vec<_>, _>>()?;
    TerrainModel::from_patches(surfaces)
}

/// Builds a mesh terrain from flat `xyz` coordinates and triangle indices.
pub fn terrain_from_buffers(vertices: &[f64], indices: &[u32]) -> Result<TerrainModel, TerrainError> {
    if vertices.len() % 3 != 0 {
        return Err(TerrainError::InvalidInput {
            reason: format!("vertex buffer length {} is not a multiple of 3", vertices.len()),
        });
    }
    if indices.len() % 3 != 0 {
        return Err(TerrainError::InvalidInput {
            reason: format!("index buffer length {} is not a multiple of 3", indices.len()),
        });
    }
    let points = vertices
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();
    let triangles = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
    TerrainModel::from_mesh(points, triangles)
}

/// Triangulates flat `xyz` survey coordinates into a mesh terrain.
pub fn terrain_from_coordinates(
    coordinates: &[f64],
    config: &SurveyConfig,
) -> Result<(TerrainModel, SurveyReport), TerrainError> {
    if coordinates.len() % 3 != 0 {
        return Err(TerrainError::InvalidInput {
            reason: format!("coordinate buffer length {} is not a multiple of 3", coordinates.len()),
        });
    }
    let points = coordinates
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();
    terrain_from_survey(points, config)
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeatingRequest {
    pub footprints: Vec<Footprint>,
    pub config: SeatingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorridorRequest {
    pub path: Vec<[f64; 3]>,
    pub closed: bool,
    pub config: CorridorConfig,
}

impl CorridorRequest {
    #[must_use]
    pub fn reference_path(&self) -> ReferencePath {
        ReferencePath::new(self.path.iter().copied().map(point).collect(), self.closed)
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatingView {
    pub status: PlacementStatus,
    pub delta_z: Option<f64>,
    pub target_elevation: Option<f64>,
    pub hit_count: usize,
    pub miss_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl From<&SeatingResult> for SeatingView {
    fn from(result: &SeatingResult) -> Self {
        Self {
            status: result.status,
            delta_z: result.delta_z,
            target_elevation: result.target_elevation,
            hit_count: result.sample.hit_count,
            miss_count: result.sample.miss_count,
            error: result.error.as_ref().map(ErrorReport::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementView {
    pub results: Vec<SeatingView>,
    pub placed: usize,
    pub already_placed: usize,
    pub no_terrain: usize,
    pub errors: usize,
}

impl From<&PlacementReport> for PlacementView {
    fn from(report: &PlacementReport) -> Self {
        Self {
            results: report.results.iter().map(SeatingView::from).collect(),
            placed: report.placed,
            already_placed: report.already_placed,
            no_terrain: report.no_terrain,
            errors: report.errors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorridorView<'a> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<&'a CorridorSurface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub statistics: &'a CorridorStatistics,
    pub warnings: &'a [String],
}

impl<'a> From<&'a CorridorResult> for CorridorView<'a> {
    fn from(result: &'a CorridorResult) -> Self {
        Self {
            success: result.is_success(),
            surface: result.surface.as_ref(),
            error: result.error.as_ref().map(ErrorReport::from),
            statistics: &result.statistics,
            warnings: &result.warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContourLineView {
    pub elevation: f64,
    pub is_index: bool,
    pub closed: bool,
    pub length: f64,
    pub points: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContourView {
    pub interval: f64,
    pub index_every: u32,
    pub lines: Vec<ContourLineView>,
    pub dropped_short: usize,
}

impl From<&ContourSet> for ContourView {
    fn from(set: &ContourSet) -> Self {
        let lines = set
            .levels
            .iter()
            .flat_map(|level| {
                level.lines.iter().map(|line| ContourLineView {
                    elevation: level.elevation,
                    is_index: level.is_index,
                    closed: line.closed,
                    length: line.length,
                    points: line.points.iter().map(|p| p.to_array()).collect(),
                })
            })
            .collect();
        Self {
            interval: set.interval,
            index_every: set.index_every,
            lines,
            dropped_short: set.dropped_short,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_plane_patch_from_json() {
        let json = r#"[{"type":"plane","origin":[0,0,2],"u_axis":[10,0,0],"v_axis":[0,10,0]}]"#;
        let patches: Vec<PatchInput> = serde_json::from_str(json).expect("json");
        let terrain = terrain_from_patches(patches).expect("terrain");
        let hit = terrain.intersect_vertical(5.0, 5.0);
        assert!(hit.hit);
        assert!((hit.elevation - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_nurbs_patch_defaults_to_uniform_knots() {
        let mut control_points = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                control_points.push([f64::from(i) * 5.0, f64::from(j) * 5.0, 1.0]);
            }
        }
        let input = PatchInput::Nurbs {
            u_count: 4,
            v_count: 4,
            control_points,
            degree_u: 3,
            degree_v: 3,
            knots_u: None,
            knots_v: None,
            weights: None,
        };
        assert!(matches!(input.into_surface(), Ok(PatchSurface::Nurbs(_))));
    }

    #[test]
    fn test_nurbs_patch_rejects_half_knots() {
        let input = PatchInput::Nurbs {
            u_count: 2,
            v_count: 2,
            control_points: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            degree_u: 1,
            degree_v: 1,
            knots_u: Some(vec![0.0, 0.0, 1.0, 1.0]),
            knots_v: None,
            weights: None,
        };
        let err = input.into_surface().expect_err("half knots");
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
    }

    #[test]
    fn test_buffers_must_be_triples() {
        assert!(terrain_from_buffers(&[0.0, 0.0], &[]).is_err());
        assert!(terrain_from_buffers(&[0.0; 9], &[0, 1]).is_err());
        let vertices = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0];
        let terrain = terrain_from_buffers(&vertices, &[0, 1, 2]).expect("terrain");
        assert!(terrain.is_mesh());
    }

    #[test]
    fn test_corridor_request_partial_config() {
        let json = r#"{"path":[[0,0,0],[50,0,3]],"config":{"road_width":6}}"#;
        let request: CorridorRequest = serde_json::from_str(json).expect("json");
        assert!(!request.closed);
        assert!((request.config.road_width - 6.0).abs() < 1e-12);
        assert!((request.config.sample_spacing - 5.0).abs() < 1e-12);
        assert_eq!(request.reference_path().points.len(), 2);
    }

    #[test]
    fn test_seating_view_carries_error_kind() {
        let vertices = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 0.0];
        let terrain = terrain_from_buffers(&vertices, &[0, 1, 2, 0, 2, 3]).expect("terrain");
        let request: SeatingRequest = serde_json::from_str(
            r#"{"footprints":[{"min":[2,2],"max":[4,4],"base_elevation":1},{"min":[50,50],"max":[52,52],"base_elevation":0}]}"#,
        )
        .expect("json");
        let report = crate::placement::seat_footprints(&request.footprints, &terrain, &request.config);
        let view = PlacementView::from(&report);
        assert_eq!(view.placed, 1);
        assert_eq!(view.no_terrain, 1);
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["results"][0]["status"], "placed");
        assert_eq!(json["results"][1]["error"]["kind"], "no_terrain_coverage");
    }

    #[test]
    fn test_survey_coordinates_to_contours() {
        let mut coordinates = Vec::new();
        for j in 0..6 {
            for i in 0..6 {
                let x = f64::from(i) * 10.0;
                coordinates.extend([x, f64::from(j) * 10.0, 1.5 + x / 5.0]);
            }
        }
        assert!(terrain_from_coordinates(&coordinates[..10], &SurveyConfig::default()).is_err());

        let (terrain, report) = terrain_from_coordinates(&coordinates, &SurveyConfig::default()).expect("terrain");
        assert_eq!(report.point_count, 36);
        let set = crate::survey::extract_contours(&terrain, &crate::config::ContourConfig::default()).expect("contours");
        let view = ContourView::from(&set);
        assert_eq!(view.lines.len(), 2);
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["lines"][0]["elevation"], 5.0);
        assert_eq!(json["lines"][1]["is_index"], false);
        assert_eq!(json["lines"][0]["points"][0][2], 5.0);
    }
}
