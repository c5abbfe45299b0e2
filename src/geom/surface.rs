use super::core::{BBox, Point3, Tolerance, Vec3};
use super::curve::{basis_functions, find_span};

pub trait Surface {
    fn point_at(&self, u: f64, v: f64) -> Point3;

    #[must_use]
    fn domain_u(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn domain_v(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    /// First partials `(dP/du, dP/dv)` by finite differences, one-sided at edges.
    #[must_use]
    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = u.clamp(u0, u1);
        let v = v.clamp(v0, v1);

        let du = {
            let h = Tolerance::DERIVATIVE.relative_to(u1 - u0);
            let (a, b) = ((u - h).max(u0), (u + h).min(u1));
            if b > a {
                self.point_at(b, v).sub_point(self.point_at(a, v)).mul_scalar(1.0 / (b - a))
            } else {
                Vec3::ZERO
            }
        };
        let dv = {
            let h = Tolerance::DERIVATIVE.relative_to(v1 - v0);
            let (a, b) = ((v - h).max(v0), (v + h).min(v1));
            if b > a {
                self.point_at(u, b).sub_point(self.point_at(u, a)).mul_scalar(1.0 / (b - a))
            } else {
                Vec3::ZERO
            }
        };
        (du, dv)
    }

    #[must_use]
    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        let (du, dv) = self.partial_derivatives_at(u, v);
        du.cross(dv).normalized()
    }
}

/// Bounded parallelogram `origin + u * u_axis + v * v_axis` over `[0, 1]²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneSurface {
    pub origin: Point3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl PlaneSurface {
    #[must_use]
    pub const fn new(origin: Point3, u_axis: Vec3, v_axis: Vec3) -> Self {
        Self {
            origin,
            u_axis,
            v_axis,
        }
    }

    /// Axis-aligned rectangle at constant elevation `z`.
    #[must_use]
    pub const fn horizontal(min_x: f64, min_y: f64, max_x: f64, max_y: f64, z: f64) -> Self {
        Self::new(
            Point3::new(min_x, min_y, z),
            Vec3::new(max_x - min_x, 0.0, 0.0),
            Vec3::new(0.0, max_y - min_y, 0.0),
        )
    }

    #[must_use]
    pub fn corners(&self) -> [Point3; 4] {
        [
            self.origin,
            self.origin + self.u_axis,
            self.origin + self.u_axis + self.v_axis,
            self.origin + self.v_axis,
        ]
    }
}

impl Surface for PlaneSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        self.origin
            .add_vec(self.u_axis.mul_scalar(u))
            .add_vec(self.v_axis.mul_scalar(v))
    }

    fn partial_derivatives_at(&self, _u: f64, _v: f64) -> (Vec3, Vec3) {
        (self.u_axis, self.v_axis)
    }

    fn normal_at(&self, _u: f64, _v: f64) -> Option<Vec3> {
        self.u_axis.cross(self.v_axis).normalized()
    }
}

/// Tensor-product NURBS surface. Control points are stored row by row in v,
/// so `(i, j)` lives at `j * u_count + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct NurbsSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    pub u_count: usize,
    pub v_count: usize,
    pub control_points: Vec<Point3>,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub weights: Option<Vec<f64>>,
}

impl NurbsSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        u_count: usize,
        v_count: usize,
        control_points: Vec<Point3>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, String> {
        if u_count < 2 || v_count < 2 {
            return Err("nurbs surface requires at least a 2x2 control net".to_string());
        }
        if degree_u == 0 || degree_v == 0 || degree_u >= u_count || degree_v >= v_count {
            return Err("nurbs surface degrees must be >= 1 and < control point counts".to_string());
        }
        if control_points.len() != u_count * v_count {
            return Err(format!(
                "nurbs surface expects {} control points, got {}",
                u_count * v_count,
                control_points.len()
            ));
        }
        if control_points.iter().any(|p| !p.is_finite()) {
            return Err("nurbs surface control points must be finite".to_string());
        }
        for (label, knots, count, degree) in [("u", &knots_u, u_count, degree_u), ("v", &knots_v, v_count, degree_v)] {
            if knots.len() != count + degree + 1 {
                return Err(format!(
                    "nurbs surface {label} knot length must be {}, got {}",
                    count + degree + 1,
                    knots.len()
                ));
            }
            if knots.windows(2).any(|w| !(w[0] <= w[1])) || knots[degree] >= knots[count] {
                return Err(format!("nurbs surface {label} knots must be non-decreasing with a non-empty domain"));
            }
        }
        if let Some(w) = &weights {
            if w.len() != control_points.len() || w.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err("nurbs surface weights must be positive, one per control point".to_string());
            }
        }

        Ok(Self {
            degree_u,
            degree_v,
            u_count,
            v_count,
            control_points,
            knots_u,
            knots_v,
            weights,
        })
    }

    /// Non-rational surface over a control grid with clamped uniform knots on `[0, 1]`.
    pub fn from_grid(
        control_points: Vec<Point3>,
        u_count: usize,
        v_count: usize,
        degree_u: usize,
        degree_v: usize,
    ) -> Result<Self, String> {
        if u_count < 2 || v_count < 2 {
            return Err("nurbs surface requires at least a 2x2 control net".to_string());
        }
        let degree_u = degree_u.clamp(1, u_count - 1);
        let degree_v = degree_v.clamp(1, v_count - 1);
        Self::new(
            degree_u,
            degree_v,
            u_count,
            v_count,
            control_points,
            clamped_uniform_knots(u_count, degree_u),
            clamped_uniform_knots(v_count, degree_v),
            None,
        )
    }

    /// Box around the control net; contains the surface by the convex hull property.
    #[must_use]
    pub fn control_bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.control_points)
    }
}

impl Surface for NurbsSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u = if u.is_nan() { u0 } else { u.clamp(u0, u1) };
        let v = if v.is_nan() { v0 } else { v.clamp(v0, v1) };

        let (p, q) = (self.degree_u, self.degree_v);
        let span_u = find_span(self.u_count - 1, p, u, &self.knots_u);
        let span_v = find_span(self.v_count - 1, q, v, &self.knots_v);
        let nu = basis_functions(span_u, u, p, &self.knots_u);
        let nv = basis_functions(span_v, v, q, &self.knots_v);

        let mut acc = Vec3::ZERO;
        let mut weight_sum = 0.0;
        for (l, bv) in nv.iter().enumerate() {
            let row = (span_v - q + l) * self.u_count;
            for (k, bu) in nu.iter().enumerate() {
                let idx = row + span_u - p + k;
                let w = self.weights.as_ref().map_or(1.0, |w| w[idx]) * bu * bv;
                acc = acc.add(self.control_points[idx].to_vec3().mul_scalar(w));
                weight_sum += w;
            }
        }
        if weight_sum.abs() < 1e-14 {
            return self.control_points[span_v * self.u_count + span_u];
        }
        let c = acc.mul_scalar(1.0 / weight_sum);
        Point3::new(c.x, c.y, c.z)
    }

    fn domain_u(&self) -> (f64, f64) {
        (self.knots_u[self.degree_u], self.knots_u[self.u_count])
    }

    fn domain_v(&self) -> (f64, f64) {
        (self.knots_v[self.degree_v], self.knots_v[self.v_count])
    }
}

fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let interior = count - degree - 1;
    let mut knots = vec![0.0; degree + 1];
    knots.extend((1..=interior).map(|i| i as f64 / (interior + 1) as f64));
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}

/// Regular sample grid over a surface's parameter domain.
#[derive(Debug, Clone)]
pub struct SurfaceSampleGrid {
    pub u_count: usize,
    pub v_count: usize,
    pub points: Vec<Point3>,
    pub uvs: Vec<[f64; 2]>,
}

impl SurfaceSampleGrid {
    #[must_use]
    pub const fn index(&self, i: usize, j: usize) -> usize {
        j * self.u_count + i
    }

    /// Two triangles per grid cell, counter-clockwise in (u, v).
    #[must_use]
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let mut tris = Vec::with_capacity((self.u_count - 1) * (self.v_count - 1) * 2);
        for j in 0..self.v_count - 1 {
            for i in 0..self.u_count - 1 {
                let a = self.index(i, j) as u32;
                let b = self.index(i + 1, j) as u32;
                let c = self.index(i + 1, j + 1) as u32;
                let d = self.index(i, j + 1) as u32;
                tris.push([a, b, c]);
                tris.push([a, c, d]);
            }
        }
        tris
    }
}

#[must_use]
pub fn sample_surface_grid(surface: &impl Surface, u_count: usize, v_count: usize) -> SurfaceSampleGrid {
    let u_count = u_count.max(2);
    let v_count = v_count.max(2);
    let (u0, u1) = surface.domain_u();
    let (v0, v1) = surface.domain_v();

    let mut points = Vec::with_capacity(u_count * v_count);
    let mut uvs = Vec::with_capacity(u_count * v_count);
    for j in 0..v_count {
        let v = v0 + (v1 - v0) * (j as f64 / (v_count - 1) as f64);
        for i in 0..u_count {
            let u = u0 + (u1 - u0) * (i as f64 / (u_count - 1) as f64);
            points.push(surface.point_at(u, v));
            uvs.push([u, v]);
        }
    }
    SurfaceSampleGrid {
        u_count,
        v_count,
        points,
        uvs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saddle(n: usize) -> NurbsSurface {
        let mut pts = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                let x = i as f64 * 10.0;
                let y = j as f64 * 10.0;
                pts.push(Point3::new(x, y, 0.01 * (x - 15.0) * (y - 15.0)));
            }
        }
        NurbsSurface::from_grid(pts, n, n, 3, 3).expect("surface")
    }

    #[test]
    fn test_plane_surface_partials_and_normal() {
        let plane = PlaneSurface::horizontal(0.0, 0.0, 100.0, 50.0, 7.0);
        assert_eq!(plane.point_at(0.5, 0.5), Point3::new(50.0, 25.0, 7.0));
        assert_eq!(plane.normal_at(0.2, 0.8), Some(Vec3::Z));
        assert_eq!(plane.corners()[2], Point3::new(100.0, 50.0, 7.0));
    }

    #[test]
    fn test_nurbs_surface_interpolates_corners() {
        let s = saddle(4);
        assert!(s.point_at(0.0, 0.0).distance_to(s.control_points[0]) < 1e-12);
        assert!(s.point_at(1.0, 1.0).distance_to(s.control_points[15]) < 1e-12);
        assert!(s.point_at(1.0, 0.0).distance_to(s.control_points[3]) < 1e-12);
    }

    #[test]
    fn test_flat_nurbs_normal_points_up() {
        let pts: Vec<Point3> = (0..9)
            .map(|k| Point3::new((k % 3) as f64 * 5.0, (k / 3) as f64 * 5.0, 2.0))
            .collect();
        let s = NurbsSurface::from_grid(pts, 3, 3, 2, 2).expect("surface");
        let n = s.normal_at(0.4, 0.6).expect("normal");
        assert!((n.z - 1.0).abs() < 1e-9);
        assert!((s.point_at(0.3, 0.3).z - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_knots() {
        let pts = vec![Point3::ORIGIN; 4];
        let err = NurbsSurface::new(1, 1, 2, 2, pts, vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 1.0, 1.0], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_sample_grid_layout() {
        let grid = sample_surface_grid(&saddle(4), 5, 3);
        assert_eq!(grid.points.len(), 15);
        assert_eq!(grid.uvs[grid.index(4, 2)], [1.0, 1.0]);
        assert_eq!(grid.triangles().len(), 4 * 2 * 2);
    }
}
