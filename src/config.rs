//! Scalar configuration for corridor building, footprint seating, survey
//! triangulation and contour extraction.
//!
//! Every struct deserializes from a partial JSON document; missing fields
//! take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::TerrainError;

/// Default vertical ray reach in model units.
pub const RAY_CAST_DISTANCE: f64 = 10_000.0;
/// Default "nearly equal" tolerance in model units.
pub const DEFAULT_TOLERANCE: f64 = 0.001;
/// Largest footprint grid accepted; the grid holds `resolution^2` samples.
pub const MAX_GRID_RESOLUTION: usize = 256;

/// How consecutive cross-sections are made to run the same way before lofting.
///
/// The default is [`OrientationRule::MatchedEndpoints`], not the plain
/// end-to-start comparison. `EndToStart` reverses every other section of an
/// already aligned run whenever sections are closer together than they are
/// wide, which twists the loft; select it explicitly to reproduce that
/// behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationRule {
    /// Reverse when crossing the endpoint pairs is shorter than matching them.
    #[default]
    MatchedEndpoints,
    /// Reverse when the previous end is closer to this end than to this start.
    EndToStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorridorConfig {
    pub road_width: f64,
    pub sample_spacing: f64,
    /// Odd, at least 3.
    pub cross_section_point_count: usize,
    pub height_offset: f64,
    pub vertical_search_distance: f64,
    pub tolerance: f64,
    /// Defaults to `MatchedEndpoints`; see [`OrientationRule`].
    pub orientation_rule: OrientationRule,
    /// Build cross-sections on the rayon pool when the `parallel` feature is on.
    pub parallel: bool,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            road_width: 10.0,
            sample_spacing: 5.0,
            cross_section_point_count: 3,
            height_offset: 0.0,
            vertical_search_distance: RAY_CAST_DISTANCE,
            tolerance: DEFAULT_TOLERANCE,
            orientation_rule: OrientationRule::MatchedEndpoints,
            parallel: true,
        }
    }
}

impl CorridorConfig {
    /// Point count forced to an odd value of at least 3.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut count = self.cross_section_point_count.max(3);
        if count % 2 == 0 {
            count += 1;
        }
        Self {
            cross_section_point_count: count,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), TerrainError> {
        positive("road_width", self.road_width)?;
        positive("sample_spacing", self.sample_spacing)?;
        if self.cross_section_point_count < 3 {
            return Err(TerrainError::invalid_config(
                "cross_section_point_count",
                format!("must be at least 3, got {}", self.cross_section_point_count),
            ));
        }
        if self.cross_section_point_count % 2 == 0 {
            return Err(TerrainError::invalid_config(
                "cross_section_point_count",
                format!("must be odd, got {}", self.cross_section_point_count),
            ));
        }
        if !(self.height_offset.is_finite() && self.height_offset >= 0.0) {
            return Err(TerrainError::invalid_config(
                "height_offset",
                format!("must be finite and non-negative, got {}", self.height_offset),
            ));
        }
        positive("vertical_search_distance", self.vertical_search_distance)?;
        positive("tolerance", self.tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatingConfig {
    /// Samples per side of the footprint grid.
    pub grid_resolution: usize,
    pub vertical_offset: f64,
    pub vertical_search_distance: f64,
    pub tolerance: f64,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            grid_resolution: 5,
            vertical_offset: 0.0,
            vertical_search_distance: RAY_CAST_DISTANCE,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SeatingConfig {
    #[must_use]
    pub fn with_grid(grid_resolution: usize, vertical_offset: f64) -> Self {
        Self {
            grid_resolution,
            vertical_offset,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.grid_resolution == 0 {
            return Err(TerrainError::invalid_config("grid_resolution", "must be at least 1"));
        }
        if self.grid_resolution > MAX_GRID_RESOLUTION {
            return Err(TerrainError::invalid_config(
                "grid_resolution",
                format!("must be at most {MAX_GRID_RESOLUTION}, got {}", self.grid_resolution),
            ));
        }
        if !self.vertical_offset.is_finite() {
            return Err(TerrainError::invalid_config("vertical_offset", "must be finite"));
        }
        positive("vertical_search_distance", self.vertical_search_distance)?;
        positive("tolerance", self.tolerance)
    }
}

/// Cleanup applied to scattered survey points before they are triangulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Points further than this many standard deviations from the mean
    /// elevation are dropped. Zero disables the filter.
    pub outlier_sigma: f64,
    /// Larger surveys are thinned to at most this many points by striding.
    pub max_points: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            outlier_sigma: 3.5,
            max_points: 40_000,
        }
    }
}

impl SurveyConfig {
    pub fn validate(&self) -> Result<(), TerrainError> {
        if !(self.outlier_sigma.is_finite() && self.outlier_sigma >= 0.0) {
            return Err(TerrainError::invalid_config(
                "outlier_sigma",
                format!("must be finite and non-negative, got {}", self.outlier_sigma),
            ));
        }
        if self.max_points < 3 {
            return Err(TerrainError::invalid_config(
                "max_points",
                format!("must be at least 3, got {}", self.max_points),
            ));
        }
        Ok(())
    }
}

/// Most contour levels one extraction may produce.
pub const MAX_CONTOUR_LEVELS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Vertical distance between contour levels.
    pub interval: f64,
    /// Every this-many-th level (counted from elevation zero) is an index contour.
    pub index_every: u32,
    /// Lines no longer than ten times this are dropped as noise.
    pub tolerance: f64,
    /// Slice levels on the rayon pool when the `parallel` feature is on.
    pub parallel: bool,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            interval: 5.0,
            index_every: 5,
            tolerance: DEFAULT_TOLERANCE,
            parallel: true,
        }
    }
}

impl ContourConfig {
    pub fn validate(&self) -> Result<(), TerrainError> {
        positive("interval", self.interval)?;
        if self.index_every == 0 {
            return Err(TerrainError::invalid_config("index_every", "must be at least 1"));
        }
        positive("tolerance", self.tolerance)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), TerrainError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TerrainError::invalid_config(
            field,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_validate() {
        assert!(CorridorConfig::default().validate().is_ok());
        assert!(SeatingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_orientation_rule_is_matched_endpoints() {
        assert_eq!(OrientationRule::default(), OrientationRule::MatchedEndpoints);
        assert_eq!(CorridorConfig::default().orientation_rule, OrientationRule::MatchedEndpoints);
        let config: CorridorConfig = serde_json::from_str("{}").expect("json");
        assert_eq!(config.orientation_rule, OrientationRule::MatchedEndpoints);
    }

    #[test]
    fn test_normalized_point_count() {
        let mut config = CorridorConfig::default();
        config.cross_section_point_count = 4;
        assert_eq!(config.normalized().cross_section_point_count, 5);
        config.cross_section_point_count = 1;
        assert_eq!(config.normalized().cross_section_point_count, 3);
        config.cross_section_point_count = 7;
        assert_eq!(config.normalized().cross_section_point_count, 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CorridorConfig {
            sample_spacing: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
        assert!(matches!(err, TerrainError::InvalidConfig { field: "sample_spacing", .. }));

        let config = CorridorConfig {
            cross_section_point_count: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CorridorConfig {
            height_offset: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let seating = SeatingConfig::with_grid(0, 0.0);
        assert!(seating.validate().is_err());
    }

    #[test]
    fn test_grid_resolution_is_capped() {
        assert!(SeatingConfig::with_grid(MAX_GRID_RESOLUTION, 0.0).validate().is_ok());
        let err = SeatingConfig::with_grid(MAX_GRID_RESOLUTION + 1, 0.0).validate().unwrap_err();
        assert!(matches!(err, TerrainError::InvalidConfig { field: "grid_resolution", .. }));
        let huge: SeatingConfig = serde_json::from_str(r#"{ "grid_resolution": 1000000 }"#).expect("json");
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_survey_and_contour_configs() {
        assert!(SurveyConfig::default().validate().is_ok());
        assert!(ContourConfig::default().validate().is_ok());

        let survey = SurveyConfig {
            outlier_sigma: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            survey.validate(),
            Err(TerrainError::InvalidConfig { field: "outlier_sigma", .. })
        ));
        let survey = SurveyConfig {
            max_points: 2,
            ..Default::default()
        };
        assert!(survey.validate().is_err());

        let contours: ContourConfig = serde_json::from_str(r#"{ "interval": 2.0 }"#).expect("json");
        assert_eq!(contours.index_every, 5);
        assert!(contours.validate().is_ok());
        let contours = ContourConfig {
            index_every: 0,
            ..Default::default()
        };
        assert!(contours.validate().is_err());
        let contours = ContourConfig {
            interval: f64::NAN,
            ..Default::default()
        };
        assert!(contours.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CorridorConfig =
            serde_json::from_str(r#"{ "road_width": 12.5, "orientation_rule": "end_to_start" }"#).expect("json");
        assert_eq!(config.road_width, 12.5);
        assert_eq!(config.sample_spacing, 5.0);
        assert_eq!(config.orientation_rule, OrientationRule::EndToStart);

        let seating: SeatingConfig = serde_json::from_str("{}").expect("json");
        assert_eq!(seating, SeatingConfig::default());
    }
}
