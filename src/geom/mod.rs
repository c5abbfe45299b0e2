//! Geometry kernel shared by the terrain, placement and corridor layers.

mod bvh;
mod core;
mod curve;
mod diagnostics;
mod loft;
mod mesh;
mod metrics;
mod surface;

pub use core::{BBox, Point3, Tolerance, Transform, Vec3};
pub use curve::{
    ArcLengthTable, Curve3, CurveDivisionResult, CurveSample, NurbsCurve3, Polyline3,
    curve_arc_length, divide_curve_by_length, sample_curve_at, tessellate_curve_uniform,
};
pub use diagnostics::GeomMeshDiagnostics;
pub use loft::{
    LoftDiagnostics, LoftError, LoftOptions, LoftType, loft_mesh, loft_mesh_with_context,
    loft_mesh_with_tolerance,
};
pub use mesh::{GeomContext, GeomMesh};
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
pub use surface::{NurbsSurface, PlaneSurface, Surface, SurfaceSampleGrid, sample_surface_grid};

pub(crate) use bvh::Bvh;
pub(crate) use mesh::{finalize_mesh, repair_mesh};

#[cfg(test)]
mod tests;
