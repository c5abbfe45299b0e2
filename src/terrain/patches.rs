use crate::error::TerrainError;
use crate::geom::{
    BBox, Bvh, NurbsSurface, PlaneSurface, Point3, Surface, SurfaceSampleGrid, Vec3,
    sample_surface_grid,
};

use super::{RayOptions, RaycastResult, validate_extent};

const MAX_NEWTON_ITERATIONS: usize = 20;
/// XY residual at which a vertical solve counts as converged.
const NEWTON_TOLERANCE: f64 = 1e-9;
const BARYCENTRIC_EPS: f64 = 1e-9;
const MIN_PROXY_RESOLUTION: usize = 16;
const MAX_PROXY_RESOLUTION: usize = 64;

/// One parametric terrain patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchSurface {
    Plane(PlaneSurface),
    Nurbs(NurbsSurface),
}

impl Surface for PatchSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        match self {
            Self::Plane(s) => s.point_at(u, v),
            Self::Nurbs(s) => s.point_at(u, v),
        }
    }

    fn domain_u(&self) -> (f64, f64) {
        match self {
            Self::Plane(s) => s.domain_u(),
            Self::Nurbs(s) => s.domain_u(),
        }
    }

    fn domain_v(&self) -> (f64, f64) {
        match self {
            Self::Plane(s) => s.domain_v(),
            Self::Nurbs(s) => s.domain_v(),
        }
    }

    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        match self {
            Self::Plane(s) => s.partial_derivatives_at(u, v),
            Self::Nurbs(s) => s.partial_derivatives_at(u, v),
        }
    }

    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        match self {
            Self::Plane(s) => s.normal_at(u, v),
            Self::Nurbs(s) => s.normal_at(u, v),
        }
    }
}

impl PatchSurface {
    /// Proxy grid size per direction. Planes are exact at 2x2.
    fn proxy_resolution(&self) -> (usize, usize) {
        match self {
            Self::Plane(_) => (2, 2),
            Self::Nurbs(s) => (
                (s.u_count * 4).clamp(MIN_PROXY_RESOLUTION, MAX_PROXY_RESOLUTION),
                (s.v_count * 4).clamp(MIN_PROXY_RESOLUTION, MAX_PROXY_RESOLUTION),
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct Patch {
    surface: PatchSurface,
    grid: SurfaceSampleGrid,
    bbox: BBox,
}

impl Patch {
    fn new(index: usize, surface: PatchSurface) -> Result<Self, TerrainError> {
        let (nu, nv) = surface.proxy_resolution();
        let grid = sample_surface_grid(&surface, nu, nv);
        if grid.points.iter().any(|p| !p.is_finite()) {
            return Err(TerrainError::degenerate_terrain(format!(
                "patch {index} evaluates to non-finite points"
            )));
        }
        if let PatchSurface::Plane(plane) = &surface {
            if plane.normal_at(0.5, 0.5).is_none() {
                return Err(TerrainError::degenerate_terrain(format!("plane patch {index} has zero area")));
            }
        }
        let mut bbox = BBox::from_points(&grid.points)
            .ok_or_else(|| TerrainError::degenerate_terrain(format!("patch {index} has no extent")))?;
        if let PatchSurface::Nurbs(nurbs) = &surface {
            if let Some(hull) = nurbs.control_bbox() {
                bbox = bbox.union(hull);
            }
        }
        Ok(Self { surface, grid, bbox })
    }

    /// Elevation where the vertical line through `(x, y)` crosses this patch
    /// inside proxy triangle `tri`.
    fn vertical_hit(&self, tri: [u32; 3], x: f64, y: f64) -> Option<f64> {
        let [a, b, c] = tri.map(|i| self.grid.points[i as usize]);
        let w = xy_barycentric(a, b, c, x, y)?;
        let [ua, ub, uc] = tri.map(|i| self.grid.uvs[i as usize]);
        let seed = (
            w[0] * ua[0] + w[1] * ub[0] + w[2] * uc[0],
            w[0] * ua[1] + w[1] * ub[1] + w[2] * uc[1],
        );
        match solve_vertical(&self.surface, x, y, seed) {
            Some(p) => Some(p.z),
            None => Some(w[0] * a.z + w[1] * b.z + w[2] * c.z),
        }
    }

    /// `(u, v, squared distance)` of the surface point closest to `probe`.
    fn closest_point(&self, probe: Point3) -> Option<(f64, f64, f64)> {
        let (seed_idx, seed_d2) = self
            .grid
            .points
            .iter()
            .map(|p| p.distance_squared_to(probe))
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let [su, sv] = self.grid.uvs[seed_idx];

        let (u0, u1) = self.surface.domain_u();
        let (v0, v1) = self.surface.domain_v();
        let (mut u, mut v) = (su, sv);
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let r = self.surface.point_at(u, v).sub_point(probe);
            let (pu, pv) = self.surface.partial_derivatives_at(u, v);
            let (a, b, c) = (pu.dot(pu), pu.dot(pv), pv.dot(pv));
            let det = a * c - b * b;
            if det.abs() < 1e-20 {
                break;
            }
            let (gu, gv) = (r.dot(pu), r.dot(pv));
            let step_u = (c * gu - b * gv) / det;
            let step_v = (a * gv - b * gu) / det;
            u = (u - step_u).clamp(u0, u1);
            v = (v - step_v).clamp(v0, v1);
            if step_u.abs() + step_v.abs() < 1e-12 {
                break;
            }
        }

        let d2 = self.surface.point_at(u, v).distance_squared_to(probe);
        if d2.is_finite() && d2 <= seed_d2 {
            Some((u, v, d2))
        } else {
            Some((su, sv, seed_d2))
        }
    }
}

/// Terrain made of parametric patches that may overlap.
#[derive(Debug, Clone)]
pub struct PatchSet {
    patches: Vec<Patch>,
    proxy_triangles: Vec<(usize, [u32; 3])>,
    triangle_bvh: Bvh,
    patch_bvh: Bvh,
    bbox: BBox,
}

impl PatchSet {
    pub fn new(surfaces: Vec<PatchSurface>) -> Result<Self, TerrainError> {
        if surfaces.is_empty() {
            return Err(TerrainError::degenerate_terrain("patch terrain has no patches"));
        }
        let patches = surfaces
            .into_iter()
            .enumerate()
            .map(|(i, s)| Patch::new(i, s))
            .collect::<Result<Vec<_>, _>>()?;

        let bbox = validate_extent(patches.iter().map(|p| p.bbox).reduce(BBox::union))?;

        let mut proxy_triangles = Vec::new();
        let mut triangle_boxes = Vec::new();
        for (index, patch) in patches.iter().enumerate() {
            for tri in patch.grid.triangles() {
                let corners = tri.map(|i| patch.grid.points[i as usize]);
                if let Some(b) = BBox::from_points(&corners) {
                    proxy_triangles.push((index, tri));
                    triangle_boxes.push(b);
                }
            }
        }
        let patch_boxes: Vec<BBox> = patches.iter().map(|p| p.bbox).collect();
        let (Some(triangle_bvh), Some(patch_bvh)) = (Bvh::build(&triangle_boxes), Bvh::build(&patch_boxes)) else {
            return Err(TerrainError::degenerate_terrain("could not index terrain patches"));
        };

        Ok(Self {
            patches,
            proxy_triangles,
            triangle_bvh,
            patch_bvh,
            bbox,
        })
    }

    #[must_use]
    pub const fn bbox(&self) -> BBox {
        self.bbox
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn surfaces(&self) -> impl Iterator<Item = &PatchSurface> {
        self.patches.iter().map(|p| &p.surface)
    }

    pub(crate) fn intersect_vertical(&self, x: f64, y: f64, options: &RayOptions) -> RaycastResult {
        if !self.bbox.contains_xy(x, y, options.tolerance) {
            return RaycastResult::MISS;
        }
        let mut hits = Vec::new();
        self.triangle_bvh.query_column(x, y, options.tolerance, |t| {
            let (patch, tri) = self.proxy_triangles[t];
            if let Some(z) = self.patches[patch].vertical_hit(tri, x, y) {
                hits.push(z);
            }
            true
        });
        options.select(options.origin_z(self.bbox), hits)
    }

    /// Normal of the patch closest to the ground point the ray reports at `(x, y)`.
    pub(crate) fn estimate_normal(&self, x: f64, y: f64, options: &RayOptions) -> Option<Vec3> {
        let z = self.intersect_vertical(x, y, options).elevation()?;
        let probe = Point3::new(x, y, z);

        let mut solved = vec![None; self.patches.len()];
        let (best, _) = self.patch_bvh.nearest(probe, |i| {
            let (u, v, d2) = self.patches[i].closest_point(probe)?;
            solved[i] = Some((u, v));
            Some(d2)
        })?;
        let (u, v) = solved[best]?;
        self.patches[best].surface.normal_at(u, v).map(Vec3::facing_up)
    }
}

/// Barycentric weights of `(x, y)` in the XY projection of `abc`, or `None`
/// when the point is outside or the projection is degenerate.
fn xy_barycentric(a: Point3, b: Point3, c: Point3, x: f64, y: f64) -> Option<[f64; 3]> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < 1e-14 {
        return None;
    }
    let w0 = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / det;
    let w1 = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / det;
    let w2 = 1.0 - w0 - w1;
    (w0 >= -BARYCENTRIC_EPS && w1 >= -BARYCENTRIC_EPS && w2 >= -BARYCENTRIC_EPS).then_some([w0, w1, w2])
}

/// Newton solve for the surface point whose XY equals `(x, y)`.
fn solve_vertical(surface: &impl Surface, x: f64, y: f64, seed: (f64, f64)) -> Option<Point3> {
    let (u0, u1) = surface.domain_u();
    let (v0, v1) = surface.domain_v();
    let (mut u, mut v) = (seed.0.clamp(u0, u1), seed.1.clamp(v0, v1));

    for _ in 0..MAX_NEWTON_ITERATIONS {
        let p = surface.point_at(u, v);
        let (fx, fy) = (p.x - x, p.y - y);
        if fx.hypot(fy) <= NEWTON_TOLERANCE {
            return Some(p);
        }
        let (du, dv) = surface.partial_derivatives_at(u, v);
        let det = du.x * dv.y - dv.x * du.y;
        if !det.is_finite() || det.abs() < 1e-14 {
            return None;
        }
        u = (u - (fx * dv.y - dv.x * fy) / det).clamp(u0, u1);
        v = (v - (du.x * fy - du.y * fx) / det).clamp(v0, v1);
    }

    let p = surface.point_at(u, v);
    ((p.x - x).hypot(p.y - y) <= NEWTON_TOLERANCE).then_some(p)
}
