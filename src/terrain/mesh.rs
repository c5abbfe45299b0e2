use crate::error::TerrainError;
use crate::geom::{BBox, Bvh, Point3, Vec3};

use super::{NORMAL_SAMPLE_RADIUS, RayDirection, RayOptions, RaycastResult, sampled_normal, validate_extent};

/// Determinant below which a ray is treated as parallel to a triangle.
const PARALLEL_EPS: f64 = 1e-14;
/// Barycentric slack so rays along shared edges hit one of the neighbours.
const EDGE_EPS: f64 = 1e-9;

/// Triangulated terrain with a BVH over triangle bounds.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
    bvh: Bvh,
    bbox: BBox,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Result<Self, TerrainError> {
        if vertices.is_empty() || triangles.is_empty() {
            return Err(TerrainError::degenerate_terrain("mesh terrain has no triangles"));
        }
        if let Some(index) = vertices.iter().position(|p| !p.is_finite()) {
            return Err(TerrainError::degenerate_terrain(format!(
                "mesh vertex {index} has non-finite coordinates"
            )));
        }
        let vertex_count = vertices.len();
        if let Some(t) = triangles
            .iter()
            .position(|tri| tri.iter().any(|&i| i as usize >= vertex_count))
        {
            return Err(TerrainError::degenerate_terrain(format!(
                "mesh triangle {t} references a vertex outside 0..{vertex_count}"
            )));
        }

        let bbox = validate_extent(BBox::from_points(&vertices))?;
        let boxes: Vec<BBox> = triangles
            .iter()
            .map(|tri| {
                BBox::from_points(&tri.map(|i| vertices[i as usize])).unwrap_or(BBox::new(
                    vertices[tri[0] as usize],
                    vertices[tri[0] as usize],
                ))
            })
            .collect();
        let bvh = Bvh::build(&boxes)
            .ok_or_else(|| TerrainError::degenerate_terrain("could not index mesh triangles"))?;

        Ok(Self {
            vertices,
            triangles,
            bvh,
            bbox,
        })
    }

    #[must_use]
    pub const fn bbox(&self) -> BBox {
        self.bbox
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    #[must_use]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub(crate) fn intersect_vertical(&self, x: f64, y: f64, options: &RayOptions) -> RaycastResult {
        if !self.bbox.contains_xy(x, y, options.tolerance) {
            return RaycastResult::MISS;
        }
        let origin_z = options.origin_z(self.bbox);
        let origin = Point3::new(x, y, origin_z);
        let dir = match options.direction {
            RayDirection::Down => Vec3::new(0.0, 0.0, -1.0),
            RayDirection::Up => Vec3::Z,
        };

        let mut hits = Vec::new();
        self.bvh.query_column(x, y, options.tolerance, |t| {
            let [a, b, c] = self.triangles[t].map(|i| self.vertices[i as usize]);
            if let Some(dist) = ray_triangle(origin, dir, a, b, c) {
                hits.push(origin_z + dir.z * dist);
            }
            true
        });
        options.select(origin_z, hits)
    }

    pub(crate) fn estimate_normal(&self, x: f64, y: f64, options: &RayOptions) -> Option<Vec3> {
        sampled_normal(x, y, NORMAL_SAMPLE_RADIUS, |sx, sy| {
            self.intersect_vertical(sx, sy, options).elevation()
        })
    }
}

/// Möller–Trumbore; returns the ray distance to the crossing, if any.
fn ray_triangle(origin: Point3, dir: Vec3, a: Point3, b: Point3, c: Point3) -> Option<f64> {
    let e1 = b.sub_point(a);
    let e2 = c.sub_point(a);
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < PARALLEL_EPS {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin.sub_point(a);
    let u = s.dot(p) * inv;
    if !(-EDGE_EPS..=1.0 + EDGE_EPS).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < -EDGE_EPS || u + v > 1.0 + EDGE_EPS {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t >= 0.0).then_some(t)
}
