use terrain_engine::corridor::{
    CrossSectionParams, ReferencePath, build_corridor, generate_cross_sections, sample_stations, try_project_path,
};
use terrain_engine::geom::{Curve3, Point3, tessellate_curve_uniform};
use terrain_engine::placement::{Footprint, PlacementStatus, seat_footprint};
use terrain_engine::terrain::{RayOptions, TerrainModel};
use terrain_engine::{CorridorConfig, ErrorKind};

const EPS: f64 = 1e-6;

/// Regular grid mesh; cells whose lower-left corner makes `keep` false are left out.
fn grid(min: (f64, f64), max: (f64, f64), n: u32, z: f64, keep: impl Fn(f64, f64) -> bool) -> TerrainModel {
    let sx = (max.0 - min.0) / f64::from(n - 1);
    let sy = (max.1 - min.1) / f64::from(n - 1);
    let mut vertices = Vec::new();
    for j in 0..n {
        for i in 0..n {
            vertices.push(Point3::new(min.0 + f64::from(i) * sx, min.1 + f64::from(j) * sy, z));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            if !keep(min.0 + f64::from(i) * sx, min.1 + f64::from(j) * sy) {
                continue;
            }
            let a = j * n + i;
            triangles.push([a, a + 1, a + n + 1]);
            triangles.push([a, a + n + 1, a + n]);
        }
    }
    TerrainModel::from_mesh(vertices, triangles).expect("terrain")
}

fn flat(min: (f64, f64), max: (f64, f64), z: f64) -> TerrainModel {
    grid(min, max, 2, z, |_, _| true)
}

#[test]
fn seat_footprint_on_flat_ground() {
    let terrain = flat((0.0, 0.0), (100.0, 100.0), 0.0);
    let footprint = Footprint::new((10.0, 10.0), (20.0, 20.0), 5.0);

    let result = seat_footprint(&footprint, &terrain, 5, 0.0);

    assert_eq!(result.status, PlacementStatus::Placed);
    assert!((result.delta_z.expect("delta") + 5.0).abs() < EPS);
    assert_eq!(result.sample.hit_count, 25);
    assert!((result.translation().z + 5.0).abs() < EPS);
}

#[test]
fn project_straight_path_onto_raised_plane() {
    let terrain = flat((-10.0, -10.0), (60.0, 10.0), 10.0);
    let path = ReferencePath::open(vec![Point3::new(0.0, 0.0, 99.0), Point3::new(50.0, 0.0, 99.0)]);

    let projected = try_project_path(&path, &terrain, &RayOptions::default()).expect("projection");

    assert_eq!(projected.hit_count, projected.sample_count);
    assert!((projected.curve.length() - 50.0).abs() < 1e-3);
    for p in tessellate_curve_uniform(&projected.curve, 64) {
        assert!((p.z - 10.0).abs() < EPS, "z = {}", p.z);
        assert!(p.y.abs() < EPS);
    }
    assert!(projected.curve.start_point().distance_to(Point3::new(0.0, 0.0, 10.0)) < EPS);
    assert!(projected.curve.end_point().distance_to(Point3::new(50.0, 0.0, 10.0)) < EPS);
}

#[test]
fn stations_include_the_endpoint_and_sections_span_the_width() {
    let terrain = flat((-10.0, -20.0), (40.0, 20.0), 0.0);
    let path = ReferencePath::open(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(22.0, 0.0, 0.0)]);
    let config = CorridorConfig::default();

    let projected = try_project_path(&path, &terrain, &RayOptions::default()).expect("projection");
    let stations = sample_stations(&projected.curve, &terrain, config.sample_spacing, config.tolerance)
        .expect("stations");

    let xs: Vec<f64> = stations.iter().map(|s| s.position.x).collect();
    assert_eq!(xs.len(), 6, "{xs:?}");
    for (x, expected) in xs.iter().zip([0.0, 5.0, 10.0, 15.0, 20.0, 22.0]) {
        assert!((x - expected).abs() < 1e-3, "{xs:?}");
    }

    let batch = generate_cross_sections(&stations, &terrain, &CrossSectionParams::from_config(&config), false);
    assert_eq!(batch.sections.len(), 6);
    assert_eq!(batch.skipped, 0);
    for section in &batch.sections {
        let center = section.station.position;
        let start = (section.start_point() - center).dot(section.axis);
        let end = (section.end_point() - center).dot(section.axis);
        assert!((start + 5.0).abs() < 1e-6, "start offset {start}");
        assert!((end - 5.0).abs() < 1e-6, "end offset {end}");
    }
}

#[test]
fn corridor_over_a_gap_skips_stations_without_inventing_ground() {
    // No cells with a lower-left corner in [45, 55): a 10-unit gap under the midpoint.
    let terrain = grid((0.0, -20.0), (100.0, 20.0), 21, 0.0, |x, _| !(45.0..55.0).contains(&x));
    // Stations fall at 2.5, 7.5, ..., 92.5 and 97.5; only 47.5 and 52.5 are over the gap.
    let path = ReferencePath::open(vec![Point3::new(2.5, 0.0, 0.0), Point3::new(97.5, 0.0, 0.0)]);

    let result = build_corridor(&path, &terrain, &CorridorConfig::default());

    let stats = &result.statistics;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert!(stats.misses > 0);
    assert_eq!(stats.station_count, 20, "{stats:?}");
    assert_eq!(stats.skipped_stations, 2, "{stats:?}");
    assert_eq!(stats.valid_sections, 18);
    assert!(result.warnings.iter().any(|w| w.contains("2 of 20 stations")), "{:?}", result.warnings);

    let surface = result.surface.expect("lofted surface");
    assert!(!surface.closed);
    assert!(surface.mesh.triangle_count() > 0);
    assert!(surface.mesh.positions.iter().flatten().all(|c| c.is_finite()));
    assert!(surface.mesh.positions.iter().all(|p| p[2].abs() < 1e-6));
}

#[test]
fn closed_square_corridor_lofts_closed() {
    let terrain = flat((-20.0, -20.0), (120.0, 120.0), 0.0);
    let path = ReferencePath::new(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 0.0),
            Point3::new(100.0, 100.0, 0.0),
            Point3::new(0.0, 100.0, 0.0),
        ],
        true,
    );

    let result = build_corridor(&path, &terrain, &CorridorConfig::default());

    assert!(result.error.is_none(), "{:?}", result.error);
    let stats = &result.statistics;
    assert_eq!(stats.skipped_stations, 0);
    assert_eq!(stats.valid_sections, stats.station_count);
    // One station per started 5-unit interval; the closing point is not repeated.
    assert!((stats.station_count as f64 - stats.length / 5.0).abs() <= 1.0, "{stats:?}");
    let surface = result.surface.expect("lofted surface");
    assert!(surface.closed);
    assert!(surface.mesh.positions.iter().all(|p| p[2].abs() < 1e-6));
}

#[test]
fn corridor_beside_the_terrain_fails_with_no_coverage() {
    let terrain = grid((0.0, 30.0), (100.0, 60.0), 11, 0.0, |_, _| true);
    let path = ReferencePath::open(vec![Point3::new(5.0, 0.0, 0.0), Point3::new(95.0, 0.0, 0.0)]);

    let result = build_corridor(&path, &terrain, &CorridorConfig::default());

    assert!(result.surface.is_none());
    assert_eq!(result.error.as_ref().map(|e| e.kind()), Some(ErrorKind::NoTerrainCoverage));
    assert_eq!(result.statistics.hits, 0);
    assert_eq!(result.statistics.station_count, 0);
}

#[test]
fn surveyed_slope_supports_contours_and_corridors() {
    use terrain_engine::corridor::{ReferencePath, build_corridor};
    use terrain_engine::{ContourConfig, SurveyConfig, extract_contours, terrain_from_survey};

    // z = 2.25 + x / 10 over [0, 100]², with one blunder far below.
    let mut points = Vec::new();
    for j in 0..21u32 {
        for i in 0..21u32 {
            let x = f64::from(i) * 5.0 + f64::from((i + 2 * j) % 3) * 0.4;
            let y = f64::from(j) * 5.0;
            points.push(Point3::new(x.min(100.0), y, 2.25 + x.min(100.0) / 10.0));
        }
    }
    points.push(Point3::new(50.0, 52.5, -500.0));

    let (terrain, report) = terrain_from_survey(points, &SurveyConfig::default()).expect("survey terrain");
    assert_eq!(report.outliers_removed, 1);
    assert_eq!(report.point_count, 441);

    let contours = extract_contours(&terrain, &ContourConfig::default()).expect("contours");
    let elevations: Vec<f64> = contours.levels.iter().map(|l| l.elevation).collect();
    assert_eq!(elevations, vec![5.0, 10.0]);
    for level in &contours.levels {
        assert_eq!(level.lines.len(), 1);
        let line = &level.lines[0];
        assert!(!line.closed);
        let x = (level.elevation - 2.25) * 10.0;
        assert!(line.points.iter().all(|p| (p.x - x).abs() < 1e-6));
        assert!((line.length - 100.0).abs() < 1e-6);
    }

    let path = ReferencePath::open(vec![Point3::new(10.0, 50.0, 0.0), Point3::new(90.0, 50.0, 0.0)]);
    let result = build_corridor(&path, &terrain, &CorridorConfig::default());
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.statistics.skipped_stations, 0);
}
