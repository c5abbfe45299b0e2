//! Opt-in timing hooks for the terrain and corridor pipeline.
//!
//! Timing is only collected when the `mesh_engine_metrics` feature is enabled
//! and the target is not `wasm32` (`std::time::Instant` is unavailable there).
//! Otherwise every call is a pass-through and [`GeomMetrics::end`] returns `None`.
//!
//! ```ignore
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let path = metrics.time(TimingBucket::Projection, || project(&terrain, &centerline));
//! if let Some(report) = metrics.end() {
//!     println!("{report}");
//! }
//! ```

use std::fmt;

/// Pipeline phase a measured span is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Terrain model construction (proxy grids, BVH build).
    TerrainBuild,
    /// Footprint seating probes.
    Seating,
    /// Centerline projection and refit.
    Projection,
    /// Station division along the projected path.
    Stations,
    /// Cross-section construction.
    CrossSections,
    /// Orientation unification.
    Unify,
    /// Loft mesh generation.
    Loft,
    /// Vertex welding and repair passes.
    Welding,
    /// Mesh diagnostics.
    Diagnostics,
    /// Survey outlier filtering and thinning.
    SurveyCleanup,
    /// Delaunay triangulation of survey points.
    Triangulation,
    /// Contour level slicing and chaining.
    Contours,
}

impl TimingBucket {
    pub const ALL: [Self; 12] = [
        Self::TerrainBuild,
        Self::Seating,
        Self::Projection,
        Self::Stations,
        Self::CrossSections,
        Self::Unify,
        Self::Loft,
        Self::Welding,
        Self::Diagnostics,
        Self::SurveyCleanup,
        Self::Triangulation,
        Self::Contours,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TerrainBuild => "terrain_build",
            Self::Seating => "seating",
            Self::Projection => "projection",
            Self::Stations => "stations",
            Self::CrossSections => "cross_sections",
            Self::Unify => "unify",
            Self::Loft => "loft",
            Self::Welding => "welding",
            Self::Diagnostics => "diagnostics",
            Self::SurveyCleanup => "survey_cleanup",
            Self::Triangulation => "triangulation",
            Self::Contours => "contours",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeomTimingReport {
    buckets: [u64; TimingBucket::ALL.len()],
}

impl GeomTimingReport {
    #[must_use]
    pub fn nanos(&self, bucket: TimingBucket) -> u64 {
        self.buckets[bucket.index()]
    }

    pub fn add(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = &mut self.buckets[bucket.index()];
        *slot = slot.saturating_add(nanos);
    }

    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.buckets.iter().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }
}

impl fmt::Display for GeomTimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total {:.3} ms", self.total_ms())?;
        for bucket in TimingBucket::ALL {
            let ns = self.nanos(bucket);
            if ns > 0 {
                write!(f, ", {} {:.3} ms", bucket.name(), ns as f64 / 1_000_000.0)?;
            }
        }
        Ok(())
    }
}

/// Accumulator for timing pipeline phases.
#[derive(Debug, Default, Clone)]
pub struct GeomMetrics {
    #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
    report: GeomTimingReport,
}

impl GeomMetrics {
    /// Resets all counters.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            self.report = GeomTimingReport::default();
        }
    }

    /// Accumulated report, or `None` when metrics are compiled out.
    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Runs `f` and charges its wall time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.report.add(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}
