#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod corridor;
pub mod error;
pub mod geom;
pub mod host;
pub mod placement;
pub mod survey;
pub mod terrain;

pub use config::{ContourConfig, CorridorConfig, OrientationRule, SeatingConfig, SurveyConfig};
pub use corridor::{CorridorResult, CorridorStatistics, CorridorSurface, ReferencePath, build_corridor};
pub use error::{ErrorKind, ErrorReport, TerrainError};
pub use placement::{Footprint, PlacementReport, PlacementStatus, SeatingResult, seat_footprint, seat_footprints};
pub use survey::{ContourSet, SurveyReport, extract_contours, terrain_from_survey};
pub use terrain::{RaycastResult, TerrainModel};

use std::fmt;

use host::{ContourView, CorridorRequest, CorridorView, PatchInput, PlacementView, SeatingRequest};
use serde::Serialize;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            // no-op fallback when panic hook is disabled
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {
    // no-op fallback when debug logs are disabled
}

#[cfg(all(feature = "parallel", target_arch = "wasm32"))]
#[wasm_bindgen]
pub async fn initialize_parallel(worker_count: Option<u32>) -> Result<(), JsError> {
    let threads = worker_count
        .map(|count| count.max(1) as usize)
        .or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .ok()
        })
        .unwrap_or(1);

    wasm_bindgen_rayon::init_thread_pool(threads)
        .await
        .map_err(|err| JsError::new(&format!("could not start the rayon thread pool: {err}")))
}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Terrain handle for JavaScript hosts.
///
/// A terrain is loaded once, either as a triangle mesh or as a patch set,
/// and then queried by any number of seating and corridor requests.
#[wasm_bindgen]
pub struct TerrainEngine {
    terrain: Option<TerrainModel>,
}

impl Default for TerrainEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl TerrainEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> TerrainEngine {
        TerrainEngine { terrain: None }
    }

    #[wasm_bindgen]
    pub fn has_terrain(&self) -> bool {
        self.terrain.is_some()
    }

    /// `"mesh"`, `"patches"` or an empty string before anything is loaded.
    #[wasm_bindgen]
    pub fn terrain_kind(&self) -> String {
        self.terrain
            .as_ref()
            .map_or_else(String::new, |terrain| terrain.kind_name().to_string())
    }

    /// Loads a triangle mesh from flat `xyz` coordinates and index triples.
    #[wasm_bindgen]
    pub fn load_mesh(&mut self, vertices: Vec<f64>, indices: Vec<u32>) -> Result<(), JsValue> {
        let terrain = host::terrain_from_buffers(&vertices, &indices).map_err(to_js_error)?;
        debug_log!("terrain mesh loaded: {} triangles", terrain.primitive_count());
        self.terrain = Some(terrain);
        Ok(())
    }

    /// Loads a patch set; `patches` is an array of plane or NURBS records.
    #[wasm_bindgen]
    pub fn load_patches(&mut self, patches: JsValue) -> Result<(), JsValue> {
        let patches: Vec<PatchInput> = serde_wasm_bindgen::from_value(patches).map_err(to_js_error)?;
        let terrain = host::terrain_from_patches(patches).map_err(to_js_error)?;
        debug_log!("terrain patches loaded: {}", terrain.primitive_count());
        self.terrain = Some(terrain);
        Ok(())
    }

    /// Triangulates scattered `xyz` survey points into a mesh terrain.
    /// Resolves to the cleanup report.
    #[wasm_bindgen]
    pub fn load_points(&mut self, coordinates: Vec<f64>, config: JsValue) -> Result<JsValue, JsValue> {
        let config: SurveyConfig = if config.is_undefined() || config.is_null() {
            SurveyConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(to_js_error)?
        };
        let (terrain, report) = host::terrain_from_coordinates(&coordinates, &config).map_err(to_js_error)?;
        debug_log!("terrain triangulated from {} survey points", report.point_count);
        self.terrain = Some(terrain);
        to_js_value(&report)
    }

    /// Vertical probe at `(x, y)`; resolves to the elevation or `undefined`.
    #[wasm_bindgen]
    pub fn elevation_at(&self, x: f64, y: f64) -> Result<Option<f64>, JsValue> {
        Ok(self.terrain()?.intersect_vertical(x, y).elevation())
    }

    #[wasm_bindgen]
    pub fn seat_footprints(&self, request: JsValue) -> Result<JsValue, JsValue> {
        let terrain = self.terrain()?;
        let request: SeatingRequest = serde_wasm_bindgen::from_value(request).map_err(to_js_error)?;
        let report = placement::seat_footprints(&request.footprints, terrain, &request.config);
        to_js_value(&PlacementView::from(&report))
    }

    #[wasm_bindgen]
    pub fn build_corridor(&self, request: JsValue) -> Result<JsValue, JsValue> {
        let terrain = self.terrain()?;
        let request: CorridorRequest = serde_wasm_bindgen::from_value(request).map_err(to_js_error)?;
        let result = corridor::build_corridor(&request.reference_path(), terrain, &request.config);
        to_js_value(&CorridorView::from(&result))
    }

    #[wasm_bindgen]
    pub fn extract_contours(&self, config: JsValue) -> Result<JsValue, JsValue> {
        let terrain = self.terrain()?;
        let config: ContourConfig = if config.is_undefined() || config.is_null() {
            ContourConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(to_js_error)?
        };
        let contours = survey::extract_contours(terrain, &config).map_err(to_js_error)?;
        to_js_value(&ContourView::from(&contours))
    }
}

impl TerrainEngine {
    fn terrain(&self) -> Result<&TerrainModel, JsValue> {
        self.terrain
            .as_ref()
            .ok_or_else(|| js_error("no terrain has been loaded"))
    }
}

fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value.serialize(&serializer).map_err(to_js_error)
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::warn!("{message}");
        JsValue::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [f64; 12] = [0.0, 0.0, 1.0, 20.0, 0.0, 1.0, 20.0, 20.0, 1.0, 0.0, 20.0, 1.0];

    #[test]
    fn test_engine_starts_empty() {
        let engine = TerrainEngine::new();
        assert!(!engine.has_terrain());
        assert!(engine.terrain_kind().is_empty());
        assert!(engine.elevation_at(1.0, 1.0).is_err());
    }

    #[test]
    fn test_engine_loads_mesh() {
        let mut engine = TerrainEngine::new();
        assert!(engine.load_mesh(SQUARE.to_vec(), vec![0, 1, 2, 0, 2, 3]).is_ok());
        assert!(engine.has_terrain());
        assert_eq!(engine.terrain_kind(), "mesh");
        let z = engine.elevation_at(5.0, 5.0).expect("terrain loaded");
        assert!(z.is_some_and(|z| (z - 1.0).abs() < 1e-9));
        assert_eq!(engine.elevation_at(50.0, 5.0).expect("terrain loaded"), None);
    }

    #[test]
    fn test_failed_load_keeps_previous_terrain() {
        let mut engine = TerrainEngine::new();
        assert!(engine.load_mesh(SQUARE.to_vec(), vec![0, 1, 2, 0, 2, 3]).is_ok());
        assert!(engine.load_mesh(SQUARE.to_vec(), vec![0, 1, 9]).is_err());
        assert_eq!(engine.terrain_kind(), "mesh");
    }

    #[test]
    fn test_engine_contours_need_terrain() {
        let engine = TerrainEngine::new();
        assert!(engine.extract_contours(JsValue::UNDEFINED).is_err());
    }
}
