#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = native::run() {
        eprintln!("terrain_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    use terrain_engine::corridor::{ReferencePath, build_corridor, sample_stations, try_project_path};
    use terrain_engine::geom::{GeomMesh, GeomMetrics, Point3, TimingBucket};
    use terrain_engine::host::{ContourView, CorridorView, PlacementView};
    use terrain_engine::placement::{Footprint, seat_footprints};
    use terrain_engine::survey::{extract_contours, terrain_from_survey};
    use terrain_engine::terrain::{RayOptions, TerrainModel};
    use terrain_engine::{ContourConfig, CorridorConfig, SeatingConfig, SurveyConfig};

    const USAGE: &str = r"terrain_cli (terrain-engine)

USAGE:
  terrain_cli list
  terrain_cli run <scenario|all> [options]

SCENARIOS:
  seat_flat            footprint lowered onto flat ground
  project_plane        straight path projected onto a raised plane
  stations_spacing     station division with an inclusive endpoint
  corridor_gap         corridor over terrain with a gap under its midpoint
  corridor_hill        corridor over a sloped, curved mesh
  survey_contours      scattered survey with a spike, triangulated and contoured

OPTIONS (run):
  --out-dir <dir>    Write <scenario>.json and, for corridors, <scenario>.obj
  --obj <path>       Write the corridor OBJ (single scenario only)
  --config <path>    Corridor settings as JSON; missing fields keep their defaults
  --overwrite        Overwrite existing output files
  -h, --help         Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                for scenario in Scenario::ALL {
                    println!("{}", scenario.name());
                }
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut out_dir: Option<PathBuf> = None;
        let mut obj_path: Option<PathBuf> = None;
        let mut config_path: Option<PathBuf> = None;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--obj" => obj_path = Some(PathBuf::from(args.value("--obj")?)),
                "--config" => config_path = Some(PathBuf::from(args.value("--config")?)),
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let config = match config_path {
            Some(path) => load_config(&path)?,
            None => CorridorConfig::default(),
        };

        let scenarios: Vec<Scenario> = if scenario_name == "all" {
            if out_dir.is_none() {
                return Err("`run all` requires --out-dir".to_string());
            }
            Scenario::ALL.to_vec()
        } else {
            vec![Scenario::from_str(&scenario_name).ok_or_else(|| unknown_scenario(&scenario_name))?]
        };
        if out_dir.is_some() && obj_path.is_some() {
            return Err("use either --out-dir or --obj (not both)".to_string());
        }
        if let Some(dir) = out_dir.as_ref() {
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;
        }

        for scenario in scenarios {
            let output = run_scenario(scenario, &config)?;
            eprintln!("{}: {}", output.name, output.summary);

            match out_dir.as_deref() {
                Some(dir) => {
                    let path = dir.join(format!("{}.json", output.name));
                    write_text_file(&path, &output.report, overwrite)?;
                    eprintln!("wrote {}", path.display());
                    if let Some(mesh) = output.mesh.as_ref() {
                        let path = dir.join(format!("{}.obj", output.name));
                        write_obj_file(&path, mesh, output.name, overwrite)?;
                        eprintln!("wrote {}", path.display());
                    }
                }
                None => println!("{}", output.report),
            }

            if let Some(path) = obj_path.as_deref() {
                let mesh = output
                    .mesh
                    .as_ref()
                    .ok_or_else(|| format!("scenario `{}` produced no mesh", output.name))?;
                write_obj_file(path, mesh, output.name, overwrite)?;
                eprintln!("wrote {}", path.display());
            }
        }

        Ok(())
    }

    fn load_config(path: &Path) -> Result<CorridorConfig, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        let config: CorridorConfig =
            serde_json::from_str(&text).map_err(|e| format!("parse {}: {e}", path.display()))?;
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = format!("unknown scenario `{name}`\n\navailable scenarios:\n");
        for scenario in Scenario::ALL {
            msg.push_str("  ");
            msg.push_str(scenario.name());
            msg.push('\n');
        }
        msg
    }

    fn write_text_file(path: &Path, text: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        let mut text = text.replace("\r\n", "\n");
        if !text.ends_with('\n') {
            text.push('\n');
        }
        fs::write(path, text).map_err(|e| format!("write {}: {e}", path.display()))
    }

    fn write_obj_file(path: &Path, mesh: &GeomMesh, name: &str, overwrite: bool) -> Result<(), String> {
        mesh.validate().map_err(|e| format!("mesh validation failed: {e}"))?;

        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);
        let io = |e: std::io::Error| format!("write obj: {e}");

        writeln!(w, "# terrain-engine terrain_cli").map_err(io)?;
        writeln!(w, "o {name}").map_err(io)?;
        for p in &mesh.positions {
            writeln!(w, "v {} {} {}", p[0], p[1], p[2]).map_err(io)?;
        }
        if let Some(uvs) = mesh.uvs.as_ref() {
            for uv in uvs {
                writeln!(w, "vt {} {}", uv[0], uv[1]).map_err(io)?;
            }
        }
        let has_uvs = mesh.uvs.is_some();
        for tri in mesh.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] + 1, tri[1] + 1, tri[2] + 1);
            if has_uvs {
                writeln!(w, "f {a}/{a} {b}/{b} {c}/{c}").map_err(io)?;
            } else {
                writeln!(w, "f {a} {b} {c}").map_err(io)?;
            }
        }

        w.flush().map_err(|e| format!("flush {}: {e}", path.display()))
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    #[derive(Debug, Clone, Copy)]
    enum Scenario {
        SeatFlat,
        ProjectPlane,
        StationsSpacing,
        CorridorGap,
        CorridorHill,
        SurveyContours,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::SeatFlat,
            Scenario::ProjectPlane,
            Scenario::StationsSpacing,
            Scenario::CorridorGap,
            Scenario::CorridorHill,
            Scenario::SurveyContours,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::SeatFlat => "seat_flat",
                Scenario::ProjectPlane => "project_plane",
                Scenario::StationsSpacing => "stations_spacing",
                Scenario::CorridorGap => "corridor_gap",
                Scenario::CorridorHill => "corridor_hill",
                Scenario::SurveyContours => "survey_contours",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Self::ALL.iter().copied().find(|s| s.name() == name)
        }
    }

    struct ScenarioOutput {
        name: &'static str,
        summary: String,
        /// Pretty JSON of the scenario result.
        report: String,
        mesh: Option<GeomMesh>,
    }

    fn run_scenario(scenario: Scenario, config: &CorridorConfig) -> Result<ScenarioOutput, String> {
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let terrain = metrics.time(TimingBucket::TerrainBuild, || scenario_terrain(scenario))?;
        let mut output = match scenario {
            Scenario::SeatFlat => scenario_seat_flat(&terrain)?,
            Scenario::ProjectPlane => scenario_project_plane(&terrain)?,
            Scenario::StationsSpacing => scenario_stations_spacing(&terrain, config)?,
            Scenario::CorridorGap => corridor_scenario(scenario, &terrain, gap_path(), config)?,
            Scenario::CorridorHill => corridor_scenario(scenario, &terrain, hill_path(), config)?,
            Scenario::SurveyContours => scenario_survey_contours(&terrain)?,
        };
        if let Some(timing) = metrics.end() {
            output.summary.push_str(&format!(" | terrain {timing}"));
        }
        Ok(output)
    }

    fn scenario_terrain(scenario: Scenario) -> Result<TerrainModel, String> {
        match scenario {
            Scenario::SeatFlat => grid_terrain((0.0, 0.0), (100.0, 100.0), 2, |_, _| Some(0.0)),
            Scenario::ProjectPlane | Scenario::StationsSpacing => {
                grid_terrain((-10.0, -20.0), (80.0, 20.0), 2, |_, _| Some(10.0))
            }
            // Columns of cells between x = 45 and x = 55 are left out.
            Scenario::CorridorGap => grid_terrain((0.0, -20.0), (100.0, 20.0), 21, |x, _| {
                (!(45.0..55.0).contains(&x)).then_some(0.0)
            }),
            Scenario::CorridorHill => grid_terrain((-20.0, -60.0), (120.0, 60.0), 29, |x, y| {
                Some(8.0 * (x / 30.0).sin() + 0.04 * y)
            }),
            Scenario::SurveyContours => {
                let (terrain, report) =
                    terrain_from_survey(survey_points(), &SurveyConfig::default()).map_err(|e| e.to_string())?;
                eprintln!(
                    "survey: {} of {} points kept, {} outliers",
                    report.point_count, report.input_points, report.outliers_removed
                );
                Ok(terrain)
            }
        }
    }

    /// Jittered samples of a round hill, with one blunder far above it.
    fn survey_points() -> Vec<Point3> {
        let mut points = Vec::new();
        for j in 0..41u32 {
            for i in 0..41u32 {
                let jitter = f64::from((i * 7 + j * 11) % 9) * 0.2;
                let (x, y) = (f64::from(i) * 5.0 + jitter, f64::from(j) * 5.0 - jitter);
                let r2 = (x - 100.0).powi(2) + (y - 100.0).powi(2);
                points.push(Point3::new(x, y, 200.0 + 40.0 * (-r2 / 3_000.0).exp()));
            }
        }
        points.push(Point3::new(101.0, 99.0, 9_000.0));
        points
    }

    /// Regular grid mesh; `height` returns `None` to leave the cell whose
    /// lower-left corner sits at `(x, y)` out of the mesh.
    fn grid_terrain(
        min: (f64, f64),
        max: (f64, f64),
        n: u32,
        height: impl Fn(f64, f64) -> Option<f64>,
    ) -> Result<TerrainModel, String> {
        let step_x = (max.0 - min.0) / f64::from(n - 1);
        let step_y = (max.1 - min.1) / f64::from(n - 1);
        let mut vertices = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let (x, y) = (min.0 + f64::from(i) * step_x, min.1 + f64::from(j) * step_y);
                vertices.push(Point3::new(x, y, height(x, y).unwrap_or(0.0)));
            }
        }
        let mut triangles = Vec::new();
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let (x, y) = (min.0 + f64::from(i) * step_x, min.1 + f64::from(j) * step_y);
                if height(x, y).is_none() {
                    continue;
                }
                let a = j * n + i;
                triangles.push([a, a + 1, a + n + 1]);
                triangles.push([a, a + n + 1, a + n]);
            }
        }
        TerrainModel::from_mesh(vertices, triangles).map_err(|e| e.to_string())
    }

    fn gap_path() -> ReferencePath {
        ReferencePath::open(vec![Point3::new(5.0, 0.0, 0.0), Point3::new(95.0, 0.0, 0.0)])
    }

    fn hill_path() -> ReferencePath {
        ReferencePath::open(vec![
            Point3::new(0.0, -30.0, 0.0),
            Point3::new(35.0, -10.0, 0.0),
            Point3::new(60.0, 15.0, 0.0),
            Point3::new(100.0, 30.0, 0.0),
        ])
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
        serde_json::to_string_pretty(value).map_err(|e| format!("serialize report: {e}"))
    }

    fn scenario_seat_flat(terrain: &TerrainModel) -> Result<ScenarioOutput, String> {
        let footprints = [Footprint::new((10.0, 10.0), (20.0, 20.0), 5.0)];
        let report = seat_footprints(&footprints, terrain, &SeatingConfig::default());
        Ok(ScenarioOutput {
            name: Scenario::SeatFlat.name(),
            summary: report.summary(),
            report: to_json(&PlacementView::from(&report))?,
            mesh: None,
        })
    }

    fn scenario_project_plane(terrain: &TerrainModel) -> Result<ScenarioOutput, String> {
        let path = ReferencePath::open(vec![Point3::new(0.0, 0.0, 99.0), Point3::new(50.0, 0.0, 99.0)]);
        let projected = try_project_path(&path, terrain, &RayOptions::default()).map_err(|e| e.to_string())?;
        let length = projected.curve.length();
        let summary = format!(
            "{:?}, {}/{} samples hit, length {length:.6}",
            projected.method, projected.hit_count, projected.sample_count
        );
        let report = serde_json::json!({
            "method": format!("{:?}", projected.method),
            "hits": projected.hit_count,
            "samples": projected.sample_count,
            "length": length,
        });
        Ok(ScenarioOutput {
            name: Scenario::ProjectPlane.name(),
            summary,
            report: to_json(&report)?,
            mesh: None,
        })
    }

    fn scenario_stations_spacing(terrain: &TerrainModel, config: &CorridorConfig) -> Result<ScenarioOutput, String> {
        let path = ReferencePath::open(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(22.0, 0.0, 0.0)]);
        let projected = try_project_path(&path, terrain, &RayOptions::default()).map_err(|e| e.to_string())?;
        let stations = sample_stations(&projected.curve, terrain, config.sample_spacing, config.tolerance)
            .map_err(|e| e.to_string())?;
        let xs: Vec<f64> = stations.iter().map(|s| s.position.x).collect();
        Ok(ScenarioOutput {
            name: Scenario::StationsSpacing.name(),
            summary: format!("{} stations at spacing {}", stations.len(), config.sample_spacing),
            report: to_json(&serde_json::json!({ "station_x": xs }))?,
            mesh: None,
        })
    }

    fn scenario_survey_contours(terrain: &TerrainModel) -> Result<ScenarioOutput, String> {
        let set = extract_contours(terrain, &ContourConfig::default()).map_err(|e| e.to_string())?;
        Ok(ScenarioOutput {
            name: Scenario::SurveyContours.name(),
            summary: set.summary(),
            report: to_json(&ContourView::from(&set))?,
            mesh: None,
        })
    }

    fn corridor_scenario(
        scenario: Scenario,
        terrain: &TerrainModel,
        path: ReferencePath,
        config: &CorridorConfig,
    ) -> Result<ScenarioOutput, String> {
        let result = build_corridor(&path, terrain, config);
        let stats = &result.statistics;
        let mut summary = format!(
            "{} stations, {} sections, {} skipped, length {:.3}",
            stats.station_count, stats.valid_sections, stats.skipped_stations, stats.length
        );
        match (&result.surface, &result.error) {
            (Some(surface), _) => summary.push_str(&format!(" | {}", surface.diagnostics.summary())),
            (None, Some(err)) => summary.push_str(&format!(" | failed: {err}")),
            (None, None) => {}
        }
        if let Some(timing) = result.timing.as_ref() {
            summary.push_str(&format!(" | {timing}"));
        }
        Ok(ScenarioOutput {
            name: scenario.name(),
            summary,
            report: to_json(&CorridorView::from(&result))?,
            mesh: result.surface.as_ref().map(|s| s.mesh.clone()),
        })
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next().ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
