//! Mesh diagnostics collected while finalizing and repairing meshes.
//!
//! Every meshing entry point returns one of these next to the mesh. The
//! corridor builder uses them to decide whether a lofted surface is valid,
//! needs a repair pass, or has to be reported as best effort.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GeomMeshDiagnostics {
    pub vertex_count: usize,
    pub triangle_count: usize,

    /// Vertices merged during tolerance-based welding.
    pub welded_vertex_count: usize,

    /// Triangles whose winding was flipped to agree with their neighbours.
    pub flipped_triangle_count: usize,

    /// Zero-area or collapsed triangles removed.
    pub degenerate_triangle_count: usize,

    /// Triangles dropped because a corner was NaN or infinite.
    pub non_finite_triangle_count: usize,

    /// Boundary edges. A corridor strip is open by nature, so this is
    /// informational rather than an error.
    pub open_edge_count: usize,

    /// Edges shared by more than two triangles.
    pub non_manifold_edge_count: usize,

    /// Set when a repair pass ran on this mesh.
    pub repair_attempted: bool,

    #[serde(skip)]
    pub timing: Option<super::metrics::GeomTimingReport>,

    /// Human-readable notes such as "mesh has non-manifold edges".
    pub warnings: Vec<String>,
}

impl GeomMeshDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.open_edge_count == 0
    }

    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    #[must_use]
    pub fn repair_count(&self) -> usize {
        self.welded_vertex_count
            + self.flipped_triangle_count
            + self.degenerate_triangle_count
            + self.non_finite_triangle_count
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Folds the counters of a later repair pass into this one. Topology
    /// counts are taken from `other` since they describe the final mesh.
    pub fn absorb_repair(&mut self, other: &Self) {
        self.vertex_count = other.vertex_count;
        self.triangle_count = other.triangle_count;
        self.open_edge_count = other.open_edge_count;
        self.non_manifold_edge_count = other.non_manifold_edge_count;
        self.welded_vertex_count += other.welded_vertex_count;
        self.flipped_triangle_count += other.flipped_triangle_count;
        self.degenerate_triangle_count += other.degenerate_triangle_count;
        self.non_finite_triangle_count += other.non_finite_triangle_count;
        self.repair_attempted |= other.repair_attempted;
        self.warnings.extend(other.warnings.iter().cloned());
    }

    /// Short single-line form for logs: `"V:120 T:200 welded:4 open:40"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("V:{} T:{}", self.vertex_count, self.triangle_count)];
        for (label, count) in [
            ("welded", self.welded_vertex_count),
            ("flipped", self.flipped_triangle_count),
            ("degenerate", self.degenerate_triangle_count),
            ("non-finite", self.non_finite_triangle_count),
            ("open", self.open_edge_count),
            ("non-manifold", self.non_manifold_edge_count),
        ] {
            if count > 0 {
                parts.push(format!("{label}:{count}"));
            }
        }
        if self.repair_attempted {
            parts.push("repaired".to_string());
        }
        parts.join(" ")
    }
}

impl fmt::Display for GeomMeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Diagnostics:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        if self.repair_count() > 0 {
            writeln!(f, "  Repairs: {}", self.repair_count())?;
        }
        if self.open_edge_count > 0 {
            writeln!(f, "  Open edges: {}", self.open_edge_count)?;
        }
        if self.non_manifold_edge_count > 0 {
            writeln!(f, "  Non-manifold edges: {}", self.non_manifold_edge_count)?;
        }
        if let Some(timing) = &self.timing {
            writeln!(f, "  Timing: {timing}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  Warning: {warning}")?;
        }
        Ok(())
    }
}
