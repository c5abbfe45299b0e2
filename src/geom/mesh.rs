use std::collections::HashMap;

use serde::Serialize;

use super::diagnostics::GeomMeshDiagnostics;
use super::metrics::GeomMetrics;
use super::{BBox, Point3, Tolerance, Vec3};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GeomMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<[f64; 2]>>,
    pub normals: Option<Vec<[f64; 3]>>,
}

impl GeomMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            uvs: None,
            normals: None,
        }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn has_invalid_vertices(&self) -> bool {
        self.positions.iter().flatten().any(|c| !c.is_finite())
    }

    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.positions.len();
        self.indices.iter().all(|&i| (i as usize) < n)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err("mesh indices are not a triangle list (len % 3 != 0)".to_string());
        }
        if self.has_invalid_vertices() {
            return Err("mesh has invalid vertex coordinates (NaN/Inf)".to_string());
        }
        if !self.has_valid_indices() {
            return Err("mesh has out-of-bounds vertex indices".to_string());
        }
        let n = self.positions.len();
        if self.uvs.as_ref().is_some_and(|uvs| uvs.len() != n)
            || self.normals.as_ref().is_some_and(|normals| normals.len() != n)
        {
            return Err("mesh attribute buffers do not match vertex count".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn points(&self) -> Vec<Point3> {
        self.positions.iter().copied().map(Point3::from).collect()
    }

    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.points())
    }

    #[must_use]
    pub fn surface_area(&self) -> f64 {
        let points = self.points();
        self.indices
            .chunks_exact(3)
            .filter_map(|tri| triangle_normal(&points, tri))
            .map(|n| 0.5 * n.length())
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct GeomContext {
    pub tolerance: Tolerance,
    pub metrics: GeomMetrics,
}

impl GeomContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tolerance(Tolerance::default_geom())
    }

    #[must_use]
    pub fn with_tolerance(tolerance: Tolerance) -> Self {
        Self {
            tolerance,
            metrics: GeomMetrics::default(),
        }
    }
}

impl Default for GeomContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Welds, cleans and orients a raw triangle soup into a single mesh.
///
/// Faces are wound consistently and then flipped as a whole if their
/// area-weighted normal points down, so terrain-following surfaces always
/// come out facing up.
pub(crate) fn finalize_mesh(
    points: Vec<Point3>,
    uvs: Option<Vec<[f64; 2]>>,
    indices: Vec<u32>,
    tol: Tolerance,
) -> (GeomMesh, GeomMeshDiagnostics) {
    let (points, uvs, indices, welded_vertex_count) = weld_mesh_vertices(points, uvs.as_deref(), indices, tol);
    let (indices, non_finite_triangle_count) = drop_non_finite_triangles(&points, indices);
    let (mut indices, degenerate_triangle_count) = cull_degenerate_triangles(&points, &indices, tol);

    let flipped_triangle_count = fix_triangle_winding_consistency(&mut indices);
    let (open_edge_count, non_manifold_edge_count) = count_edge_topology(&indices);

    let mut diagnostics = GeomMeshDiagnostics {
        welded_vertex_count,
        flipped_triangle_count,
        degenerate_triangle_count,
        non_finite_triangle_count,
        open_edge_count,
        non_manifold_edge_count,
        ..GeomMeshDiagnostics::default()
    };

    if average_normal(&points, &indices).is_some_and(|n| n.z < 0.0) {
        flip_all_triangles(&mut indices);
        diagnostics.add_warning("mesh orientation flipped (upward)");
    }
    if non_manifold_edge_count > 0 {
        diagnostics.add_warning("mesh has non-manifold edges");
    }

    let normals = compute_smooth_normals(&points, &indices);
    let mesh = GeomMesh {
        positions: points.into_iter().map(Point3::to_array).collect(),
        indices,
        uvs,
        normals: Some(normals),
    };
    diagnostics.vertex_count = mesh.vertex_count();
    diagnostics.triangle_count = mesh.triangle_count();
    (mesh, diagnostics)
}

/// One clean-up pass over an already finalized mesh with a looser weld.
pub(crate) fn repair_mesh(mesh: &GeomMesh, tol: Tolerance) -> (GeomMesh, GeomMeshDiagnostics) {
    let loose = Tolerance::new((tol.eps * 10.0).max(Tolerance::DEFAULT.eps));
    let (repaired, mut diagnostics) = finalize_mesh(mesh.points(), mesh.uvs.clone(), mesh.indices.clone(), loose);
    diagnostics.repair_attempted = true;
    (repaired, diagnostics)
}

/// Merges vertices closer than `tol`, returning the remapped buffers and
/// the number of vertices removed. Non-finite points are never merged.
pub(crate) fn weld_mesh_vertices(
    points: Vec<Point3>,
    uvs: Option<&[[f64; 2]]>,
    indices: Vec<u32>,
    tol: Tolerance,
) -> (Vec<Point3>, Option<Vec<[f64; 2]>>, Vec<u32>, usize) {
    if !tol.eps.is_finite() || tol.eps <= 0.0 {
        return (points, uvs.map(<[[f64; 2]]>::to_vec), indices, 0);
    }

    let inv = 1.0 / tol.eps;
    let cell_of = |p: Point3| -> Option<(i64, i64, i64)> {
        p.is_finite()
            .then(|| ((p.x * inv).floor() as i64, (p.y * inv).floor() as i64, (p.z * inv).floor() as i64))
    };

    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    let mut remap = Vec::with_capacity(points.len());
    let mut out_points: Vec<Point3> = Vec::with_capacity(points.len());
    let mut out_uvs = uvs.map(|_| Vec::with_capacity(points.len()));

    for (i, &p) in points.iter().enumerate() {
        let cell = cell_of(p);
        let existing = cell.and_then(|(cx, cy, cz)| {
            neighbour_offsets()
                .filter_map(|(dx, dy, dz)| grid.get(&(cx + dx, cy + dy, cz + dz)))
                .flatten()
                .copied()
                .find(|&cand| tol.approx_eq_point3(out_points[cand as usize], p))
        });

        let index = existing.unwrap_or_else(|| {
            let next = out_points.len() as u32;
            out_points.push(p);
            if let (Some(src), Some(dst)) = (uvs, out_uvs.as_mut()) {
                dst.push(src.get(i).copied().unwrap_or([0.0, 0.0]));
            }
            if let Some(cell) = cell {
                grid.entry(cell).or_default().push(next);
            }
            next
        });
        remap.push(index);
    }

    let out_indices = indices
        .into_iter()
        .map(|idx| remap.get(idx as usize).copied().unwrap_or(idx))
        .collect();
    let welded = points.len() - out_points.len();
    (out_points, out_uvs, out_indices, welded)
}

fn neighbour_offsets() -> impl Iterator<Item = (i64, i64, i64)> {
    (-1..=1).flat_map(|dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (dx, dy, dz))))
}

fn drop_non_finite_triangles(points: &[Point3], indices: Vec<u32>) -> (Vec<u32>, usize) {
    let before = indices.len() / 3;
    let kept: Vec<u32> = indices
        .chunks_exact(3)
        .filter(|tri| tri.iter().all(|&i| points.get(i as usize).is_some_and(|p| p.is_finite())))
        .flatten()
        .copied()
        .collect();
    let removed = before - kept.len() / 3;
    (kept, removed)
}

fn cull_degenerate_triangles(points: &[Point3], indices: &[u32], tol: Tolerance) -> (Vec<u32>, usize) {
    let mut out = Vec::with_capacity(indices.len());
    let mut removed = 0usize;
    for tri in indices.chunks_exact(3) {
        let keep = tri[0] != tri[1]
            && tri[1] != tri[2]
            && tri[0] != tri[2]
            && triangle_normal(points, tri)
                .is_some_and(|n| n.length_squared() > tol.eps_squared() * tol.eps_squared());
        if keep {
            out.extend_from_slice(tri);
        } else {
            removed += 1;
        }
    }
    (out, removed)
}

fn edge_key(a: u32, b: u32) -> (u32, u32, bool) {
    if a <= b { (a, b, true) } else { (b, a, false) }
}

/// Propagates winding across shared manifold edges so neighbours agree.
/// Returns the number of triangles flipped.
pub(crate) fn fix_triangle_winding_consistency(indices: &mut [u32]) -> usize {
    let tri_count = indices.len() / 3;
    let mut edges: HashMap<(u32, u32), Vec<(usize, bool)>> = HashMap::with_capacity(tri_count * 3);
    for (t, tri) in indices.chunks_exact(3).enumerate() {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let (lo, hi, forward) = edge_key(a, b);
            edges.entry((lo, hi)).or_default().push((t, forward));
        }
    }

    let mut visited = vec![false; tri_count];
    let mut flip = vec![false; tri_count];
    for seed in 0..tri_count {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut stack = vec![seed];
        while let Some(t) = stack.pop() {
            let tri = [indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]];
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let (lo, hi, forward) = edge_key(a, b);
                let Some(&[first, second]) = edges.get(&(lo, hi)).map(Vec::as_slice) else {
                    continue;
                };
                let (other, other_forward) = if first.0 == t { second } else { first };
                if visited[other] {
                    continue;
                }
                // Consistent neighbours traverse a shared edge in opposite directions.
                visited[other] = true;
                flip[other] = flip[t] ^ (forward == other_forward);
                stack.push(other);
            }
        }
    }

    let mut flipped = 0;
    for (t, &f) in flip.iter().enumerate() {
        if f {
            indices.swap(t * 3 + 1, t * 3 + 2);
            flipped += 1;
        }
    }
    flipped
}

/// `(open_edges, non_manifold_edges)`.
pub(crate) fn count_edge_topology(indices: &[u32]) -> (usize, usize) {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if a == b {
                continue;
            }
            let (lo, hi, _) = edge_key(a, b);
            *counts.entry((lo, hi)).or_insert(0) += 1;
        }
    }
    counts.values().fold((0, 0), |(open, non_manifold), &c| match c {
        1 => (open + 1, non_manifold),
        2 => (open, non_manifold),
        _ => (open, non_manifold + 1),
    })
}

fn flip_all_triangles(indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

/// Unnormalized face normal (twice the area), `None` for bad indices.
fn triangle_normal(points: &[Point3], tri: &[u32]) -> Option<Vec3> {
    let a = *points.get(tri[0] as usize)?;
    let b = *points.get(tri[1] as usize)?;
    let c = *points.get(tri[2] as usize)?;
    let n = b.sub_point(a).cross(c.sub_point(a));
    n.is_finite().then_some(n)
}

/// Area-weighted mean face normal, unit length.
pub(crate) fn average_normal(points: &[Point3], indices: &[u32]) -> Option<Vec3> {
    indices
        .chunks_exact(3)
        .filter_map(|tri| triangle_normal(points, tri))
        .fold(Vec3::ZERO, Vec3::add)
        .normalized()
}

fn compute_smooth_normals(points: &[Point3], indices: &[u32]) -> Vec<[f64; 3]> {
    let mut sums = vec![Vec3::ZERO; points.len()];
    for tri in indices.chunks_exact(3) {
        if let Some(n) = triangle_normal(points, tri) {
            for &i in tri {
                sums[i as usize] = sums[i as usize].add(n);
            }
        }
    }
    sums.into_iter()
        .map(|n| n.normalized().unwrap_or(Vec3::Z).to_array())
        .collect()
}
