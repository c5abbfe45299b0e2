//! Unified terrain queries over parametric patch sets and triangle meshes.
//!
//! Every consumer talks to a [`TerrainModel`]; the representation is picked
//! once when the model is built and each variant answers the same two
//! questions: where does a vertical ray meet the ground, and which way is up
//! there.

mod mesh;
mod patches;

pub use mesh::TriangleMesh;
pub use patches::{PatchSet, PatchSurface};

use serde::Serialize;

use crate::config::{DEFAULT_TOLERANCE, RAY_CAST_DISTANCE};
use crate::error::TerrainError;
use crate::geom::{BBox, Point3, Vec3};

/// XY offset used by the numerical normal estimate on mesh terrain.
pub const NORMAL_SAMPLE_RADIUS: f64 = 0.5;

/// Cross products shorter than this count as degenerate.
const MIN_NORMAL_LENGTH: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RayDirection {
    /// Fired from above the terrain; the highest crossing wins.
    #[default]
    Down,
    /// Fired from below the terrain; the lowest crossing wins.
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayOptions {
    /// Hits farther than this from the ray origin are ignored.
    pub search_distance: f64,
    pub direction: RayDirection,
    /// Slack applied to XY containment tests.
    pub tolerance: f64,
}

impl Default for RayOptions {
    fn default() -> Self {
        Self {
            search_distance: RAY_CAST_DISTANCE,
            direction: RayDirection::Down,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl RayOptions {
    #[must_use]
    pub fn downward(search_distance: f64) -> Self {
        Self {
            search_distance,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn upward(search_distance: f64) -> Self {
        Self {
            search_distance,
            direction: RayDirection::Up,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn reversed(self) -> Self {
        let direction = match self.direction {
            RayDirection::Down => RayDirection::Up,
            RayDirection::Up => RayDirection::Down,
        };
        Self { direction, ..self }
    }

    /// Ray origin elevation for a terrain with the given bounds.
    pub(crate) fn origin_z(&self, bbox: BBox) -> f64 {
        match self.direction {
            RayDirection::Down => bbox.max.z + 1.0,
            RayDirection::Up => bbox.min.z - 1.0,
        }
    }

    /// Picks the crossing this ray reports, honouring the search distance.
    pub(crate) fn select(&self, origin_z: f64, hits: impl IntoIterator<Item = f64>) -> RaycastResult {
        let reachable = hits
            .into_iter()
            .filter(|z| z.is_finite() && (origin_z - z).abs() <= self.search_distance);
        let best = match self.direction {
            RayDirection::Down => reachable.fold(None, |acc: Option<f64>, z| Some(acc.map_or(z, |a| a.max(z)))),
            RayDirection::Up => reachable.fold(None, |acc: Option<f64>, z| Some(acc.map_or(z, |a| a.min(z)))),
        };
        best.map_or(RaycastResult::MISS, RaycastResult::at)
    }
}

/// Outcome of one vertical probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RaycastResult {
    pub hit: bool,
    /// Meaningful only when `hit` is set.
    pub elevation: f64,
}

impl RaycastResult {
    pub const MISS: Self = Self {
        hit: false,
        elevation: 0.0,
    };

    #[must_use]
    pub const fn at(elevation: f64) -> Self {
        Self { hit: true, elevation }
    }

    #[must_use]
    pub fn elevation(self) -> Option<f64> {
        self.hit.then_some(self.elevation)
    }
}

/// Read-only terrain, shared by every pipeline stage.
#[derive(Debug, Clone)]
pub enum TerrainModel {
    Patches(PatchSet),
    Mesh(TriangleMesh),
}

impl TerrainModel {
    pub fn from_patches(patches: Vec<PatchSurface>) -> Result<Self, TerrainError> {
        let set = PatchSet::new(patches)?;
        log::info!(
            "Terrain: {} patches, bbox {:?} to {:?}",
            set.len(),
            set.bbox().min,
            set.bbox().max
        );
        Ok(Self::Patches(set))
    }

    pub fn from_mesh(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Result<Self, TerrainError> {
        let mesh = TriangleMesh::new(vertices, triangles)?;
        log::info!(
            "Terrain: mesh with {} triangles, bbox {:?} to {:?}",
            mesh.triangle_count(),
            mesh.bbox().min,
            mesh.bbox().max
        );
        Ok(Self::Mesh(mesh))
    }

    #[must_use]
    pub fn intersect_vertical(&self, x: f64, y: f64) -> RaycastResult {
        self.intersect_vertical_with(x, y, &RayOptions::default())
    }

    #[must_use]
    pub fn intersect_vertical_with(&self, x: f64, y: f64, options: &RayOptions) -> RaycastResult {
        if !(x.is_finite() && y.is_finite()) {
            return RaycastResult::MISS;
        }
        match self {
            Self::Patches(set) => set.intersect_vertical(x, y, options),
            Self::Mesh(mesh) => mesh.intersect_vertical(x, y, options),
        }
    }

    /// Unit normal with non-negative Z; world up when the terrain gives no answer.
    #[must_use]
    pub fn estimate_normal(&self, x: f64, y: f64) -> Vec3 {
        self.estimate_normal_with(x, y, &RayOptions::default())
    }

    /// As [`Self::estimate_normal`], probing with the caller's ray settings.
    #[must_use]
    pub fn estimate_normal_with(&self, x: f64, y: f64, options: &RayOptions) -> Vec3 {
        if !(x.is_finite() && y.is_finite()) {
            return Vec3::Z;
        }
        let normal = match self {
            Self::Patches(set) => set.estimate_normal(x, y, options),
            Self::Mesh(mesh) => mesh.estimate_normal(x, y, options),
        };
        normal
            .filter(|n| n.is_finite())
            .and_then(Vec3::normalized)
            .map_or(Vec3::Z, Vec3::facing_up)
    }

    #[must_use]
    pub fn bbox(&self) -> BBox {
        match self {
            Self::Patches(set) => set.bbox(),
            Self::Mesh(mesh) => mesh.bbox(),
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Patches(_) => "patches",
            Self::Mesh(_) => "mesh",
        }
    }

    /// Patch count or triangle count.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        match self {
            Self::Patches(set) => set.len(),
            Self::Mesh(mesh) => mesh.triangle_count(),
        }
    }

    #[must_use]
    pub const fn is_mesh(&self) -> bool {
        matches!(self, Self::Mesh(_))
    }
}

/// Rejects bounds that are non-finite or flat in X or Y.
pub(crate) fn validate_extent(bbox: Option<BBox>) -> Result<BBox, TerrainError> {
    let bbox = bbox
        .filter(|b| b.is_valid())
        .ok_or_else(|| TerrainError::degenerate_terrain("terrain has no valid bounding box"))?;
    let size = bbox.size();
    if size.x < DEFAULT_TOLERANCE || size.y < DEFAULT_TOLERANCE {
        return Err(TerrainError::degenerate_terrain(format!(
            "horizontal extent {:.6} x {:.6} is below tolerance {DEFAULT_TOLERANCE}",
            size.x, size.y
        )));
    }
    Ok(bbox)
}

/// Normal from three vertical samples around `(x, y)`.
pub(crate) fn sampled_normal(
    x: f64,
    y: f64,
    radius: f64,
    mut probe: impl FnMut(f64, f64) -> Option<f64>,
) -> Option<Vec3> {
    let z0 = probe(x, y)?;
    let zx = probe(x + radius, y)?;
    let zy = probe(x, y + radius)?;
    let origin = Point3::new(x, y, z0);
    let dx = Point3::new(x + radius, y, zx).sub_point(origin);
    let dy = Point3::new(x, y + radius, zy).sub_point(origin);
    let n = dx.cross(dy);
    if n.length() < MIN_NORMAL_LENGTH {
        return None;
    }
    n.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::geom::PlaneSurface;

    fn flat_mesh(z: f64) -> TerrainModel {
        let vertices = vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(100.0, 0.0, z),
            Point3::new(100.0, 100.0, z),
            Point3::new(0.0, 100.0, z),
        ];
        TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3]]).expect("terrain")
    }

    #[test]
    fn test_ray_select_direction() {
        let down = RayOptions::default();
        assert_eq!(down.select(10.0, [1.0, 5.0, 3.0]).elevation(), Some(5.0));
        let up = down.reversed();
        assert_eq!(up.select(-10.0, [1.0, 5.0, 3.0]).elevation(), Some(1.0));
        let short = RayOptions::downward(2.0);
        assert!(!short.select(10.0, [1.0, 5.0]).hit);
    }

    #[test]
    fn test_model_dispatch_mesh() {
        let terrain = flat_mesh(3.0);
        assert_eq!(terrain.kind_name(), "mesh");
        assert_eq!(terrain.primitive_count(), 2);
        assert_eq!(terrain.intersect_vertical(50.0, 50.0).elevation(), Some(3.0));
        assert!(!terrain.intersect_vertical(150.0, 50.0).hit);
        assert!(!terrain.intersect_vertical(f64::NAN, 50.0).hit);
        assert_eq!(terrain.estimate_normal(50.0, 50.0), Vec3::Z);
    }

    #[test]
    fn test_normal_honours_search_distance() {
        // Slope z = x / 10 over a 100 x 100 square.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 10.0),
            Point3::new(100.0, 100.0, 10.0),
            Point3::new(0.0, 100.0, 0.0),
        ];
        let terrain = TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3]]).expect("terrain");
        let sloped = terrain.estimate_normal_with(20.0, 50.0, &RayOptions::default());
        assert!(sloped.x < 0.0);
        assert_eq!(terrain.estimate_normal(20.0, 50.0), sloped);
        // Ray origin is 11 units up; the ground at x = 20 is 9 below it.
        assert_eq!(terrain.estimate_normal_with(20.0, 50.0, &RayOptions::downward(5.0)), Vec3::Z);
        assert_eq!(terrain.estimate_normal_with(f64::NAN, 50.0, &RayOptions::default()), Vec3::Z);
    }

    #[test]
    fn test_model_dispatch_patches() {
        let terrain = TerrainModel::from_patches(vec![PatchSurface::Plane(PlaneSurface::horizontal(
            0.0, 0.0, 10.0, 10.0, 2.0,
        ))])
        .expect("terrain");
        assert_eq!(terrain.kind_name(), "patches");
        assert_eq!(terrain.primitive_count(), 1);
        let hit = terrain.intersect_vertical(5.0, 5.0);
        assert!(hit.hit);
        assert!((hit.elevation - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_extent_is_degenerate() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(5.0, 0.0, 1.0),
        ];
        let err = TerrainModel::from_mesh(vertices, vec![[0, 1, 2]]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
    }

    #[test]
    fn test_sampled_normal_on_slope() {
        let n = sampled_normal(0.0, 0.0, 0.5, |x, _| Some(x)).expect("normal");
        let expected = Vec3::new(-1.0, 0.0, 1.0).normalized().expect("unit");
        assert!((n - expected).length() < 1e-12);
        assert!(sampled_normal(0.0, 0.0, 0.5, |x, _| (x < 0.25).then_some(0.0)).is_none());
    }
}
