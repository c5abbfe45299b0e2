//! Failure taxonomy shared by every top-level operation.
//!
//! Variants carry enough context for a host to report what went wrong. The
//! coarse [`ErrorKind`] groups them so callers can decide between skipping an
//! element and abandoning the operation.

use serde::Serialize;

use crate::geom::LoftError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Every ray at a query point missed the terrain.
    NoTerrainCoverage,
    /// Zero-length or zero-extent input, or an invalid configuration value.
    DegenerateGeometry,
    /// Too few valid elements survived to finish the operation.
    InsufficientData,
    /// Curve fitting or lofting produced invalid or empty output.
    ConstructionFailure,
}

impl ErrorKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoTerrainCoverage => "no_terrain_coverage",
            Self::DegenerateGeometry => "degenerate_geometry",
            Self::InsufficientData => "insufficient_data",
            Self::ConstructionFailure => "construction_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TerrainError {
    #[error("{operation}: terrain does not cover the query ({hits} of {samples} rays hit)")]
    NoCoverage {
        operation: &'static str,
        hits: usize,
        samples: usize,
    },

    #[error("degenerate terrain: {reason}")]
    DegenerateTerrain { reason: String },

    #[error("degenerate curve: length {length} is below tolerance {tolerance}")]
    DegenerateCurve { length: f64, tolerance: f64 },

    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("footprint has {hits} terrain hits, at least {required} required")]
    TooFewFootprintHits { hits: usize, required: usize },

    #[error("only {valid} valid cross-sections ({skipped} stations skipped), at least {required} required")]
    TooFewSections {
        valid: usize,
        required: usize,
        skipped: usize,
    },

    #[error("curve fit failed: {reason}")]
    CurveFit { reason: String },

    #[error("loft failed: {0}")]
    Loft(#[from] LoftError),

    #[error("loft of {sections} cross-sections produced no surface")]
    EmptyLoft { sections: usize },
}

impl TerrainError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCoverage { .. } => ErrorKind::NoTerrainCoverage,
            Self::DegenerateTerrain { .. }
            | Self::DegenerateCurve { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidInput { .. } => ErrorKind::DegenerateGeometry,
            Self::TooFewFootprintHits { .. } | Self::TooFewSections { .. } => ErrorKind::InsufficientData,
            Self::CurveFit { .. } | Self::Loft(_) | Self::EmptyLoft { .. } => ErrorKind::ConstructionFailure,
        }
    }

    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate_terrain(reason: impl Into<String>) -> Self {
        Self::DegenerateTerrain { reason: reason.into() }
    }
}

/// Serializable error record handed to hosts alongside partial results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TerrainError> for ErrorReport {
    fn from(err: &TerrainError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
