use terrain_engine::OrientationRule;
use terrain_engine::corridor::{
    CrossSection, CrossSectionParams, ReferencePath, flatten_to_plane, generate_cross_sections, loft_corridor,
    sample_stations, try_project_path, unify_orientations,
};
use terrain_engine::geom::{BBox, NurbsSurface, PlaneSurface, Point3};
use terrain_engine::placement::{Footprint, sample_footprint};
use terrain_engine::terrain::{PatchSurface, RayOptions, TerrainModel};
use terrain_engine::CorridorConfig;

fn wavy_mesh() -> TerrainModel {
    let n = 11u32;
    let mut vertices = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let (x, y) = (f64::from(i) * 4.0, f64::from(j) * 4.0);
            vertices.push(Point3::new(x, y, 3.0 * (x / 7.0).sin() + 0.1 * y));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            triangles.push([a, a + 1, a + n + 1]);
            triangles.push([a, a + n + 1, a + n]);
        }
    }
    TerrainModel::from_mesh(vertices, triangles).expect("mesh terrain")
}

fn patch_terrain() -> TerrainModel {
    let mut control_points = Vec::new();
    for j in 0..5 {
        for i in 0..5 {
            let (x, y) = (40.0 + f64::from(i) * 5.0, f64::from(j) * 10.0);
            control_points.push(Point3::new(x, y, 2.0 + f64::from((i * j) % 3)));
        }
    }
    let hill = NurbsSurface::from_grid(control_points, 5, 5, 3, 3).expect("nurbs");
    TerrainModel::from_patches(vec![
        PatchSurface::Plane(PlaneSurface::horizontal(0.0, 0.0, 40.0, 40.0, 1.0)),
        PatchSurface::Nurbs(hill),
    ])
    .expect("patch terrain")
}

fn models() -> Vec<TerrainModel> {
    vec![wavy_mesh(), patch_terrain()]
}

fn inside_points() -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    for j in 0..9 {
        for i in 0..9 {
            points.push((0.5 + f64::from(i) * 4.3, 0.5 + f64::from(j) * 4.3));
        }
    }
    points
}

#[test]
fn vertical_hits_inside_stay_within_the_elevation_range() {
    for terrain in models() {
        let bbox = terrain.bbox();
        for (x, y) in inside_points() {
            let hit = terrain.intersect_vertical(x, y);
            assert!(hit.hit, "{} miss at ({x}, {y})", terrain.kind_name());
            assert!(
                hit.elevation >= bbox.min.z - 1e-9 && hit.elevation <= bbox.max.z + 1e-9,
                "{} elevation {} outside [{}, {}]",
                terrain.kind_name(),
                hit.elevation,
                bbox.min.z,
                bbox.max.z
            );
        }
    }
}

#[test]
fn vertical_rays_outside_the_extent_miss() {
    for terrain in models() {
        let bbox = terrain.bbox();
        let outside = [
            (bbox.min.x - 1.0, bbox.center().y),
            (bbox.max.x + 1.0, bbox.center().y),
            (bbox.center().x, bbox.min.y - 0.01),
            (bbox.center().x, bbox.max.y + 25.0),
            (f64::NAN, 1.0),
        ];
        for (x, y) in outside {
            assert!(!terrain.intersect_vertical(x, y).hit, "{} hit at ({x}, {y})", terrain.kind_name());
        }
    }
}

#[test]
fn normals_are_unit_and_face_up() {
    for terrain in models() {
        let mut points = inside_points();
        points.extend([(-50.0, -50.0), (500.0, 20.0), (42.5, 39.9)]);
        for (x, y) in points {
            let n = terrain.estimate_normal(x, y);
            assert!((n.length() - 1.0).abs() < 1e-9, "|n| = {}", n.length());
            assert!(n.z >= 0.0, "n.z = {}", n.z);
        }
    }
}

#[test]
fn one_by_one_footprint_samples_the_centroid() {
    let options = RayOptions::default();
    for terrain in models() {
        let footprint = Footprint::new((3.0, 5.0), (11.0, 17.0), 0.0);
        let (cx, cy) = footprint.centroid();
        let sample = sample_footprint(&footprint, &terrain, 1, &options);
        let center = terrain.intersect_vertical_with(cx, cy, &options);
        assert_eq!(sample.sample_count(), 1);
        assert_eq!(sample.max_elevation, center.elevation());
        assert_eq!(sample.min_elevation, center.elevation());
    }
}

fn sections_along(terrain: &TerrainModel, from: Point3, to: Point3) -> Vec<CrossSection> {
    let config = CorridorConfig::default();
    let path = ReferencePath::open(vec![from, to]);
    let projected = try_project_path(&path, terrain, &RayOptions::default()).expect("projection");
    let stations =
        sample_stations(&projected.curve, terrain, config.sample_spacing, config.tolerance).expect("stations");
    generate_cross_sections(&stations, terrain, &CrossSectionParams::from_config(&config), false).sections
}

#[test]
fn unifier_is_idempotent() {
    let terrain = wavy_mesh();
    for rule in [OrientationRule::MatchedEndpoints, OrientationRule::EndToStart] {
        let mut sections = sections_along(&terrain, Point3::new(5.0, 8.0, 0.0), Point3::new(35.0, 30.0, 0.0));
        assert!(sections.len() >= 5);
        sections[1].reverse();
        sections[3].reverse();

        unify_orientations(&mut sections, rule);
        let once: Vec<Vec<Point3>> = sections.iter().map(|s| s.points.clone()).collect();

        assert_eq!(unify_orientations(&mut sections, rule), 0, "{rule:?}");
        let twice: Vec<Vec<Point3>> = sections.iter().map(|s| s.points.clone()).collect();
        assert_eq!(once, twice, "{rule:?}");
    }
}

#[test]
fn matched_endpoints_restores_a_consistent_direction() {
    let terrain = wavy_mesh();
    let mut sections = sections_along(&terrain, Point3::new(5.0, 8.0, 0.0), Point3::new(35.0, 30.0, 0.0));
    sections[1].reverse();
    sections[3].reverse();

    let reversed = unify_orientations(&mut sections, OrientationRule::MatchedEndpoints);

    assert_eq!(reversed, 2);
    let first_axis = sections[0].axis;
    assert!(sections.iter().all(|s| s.axis.dot(first_axis) > 0.0));
}

#[test]
fn loft_of_parallel_sections_fills_their_bounding_box() {
    let terrain = TerrainModel::from_patches(vec![PatchSurface::Plane(PlaneSurface::horizontal(
        -10.0, -10.0, 30.0, 10.0, 2.0,
    ))])
    .expect("terrain");
    let sections = sections_along(&terrain, Point3::new(0.0, 0.0, 0.0), Point3::new(20.0, 0.0, 0.0));
    assert_eq!(sections.len(), 5);

    let stacked = sections
        .iter()
        .filter_map(|s| BBox::from_points(&s.points))
        .reduce(BBox::union)
        .expect("section bounds");
    let surface = loft_corridor(&sections, 0.001).expect("loft");
    let lofted = surface.mesh.bbox().expect("mesh bounds");

    assert!(surface.valid);
    assert!(!surface.closed);
    for (a, b) in [(lofted.min, stacked.min), (lofted.max, stacked.max)] {
        assert!(a.distance_to(b) < 1e-6, "{a:?} vs {b:?}");
    }
    assert!((surface.mesh.surface_area() - 200.0).abs() < 1e-6);
}

#[test]
fn flattening_a_planar_path_is_a_no_op() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(3.5, -2.0, 0.0),
        Point3::new(9.0, 4.25, 0.0),
    ];
    assert_eq!(flatten_to_plane(&points), points);

    let raised = vec![Point3::new(1.0, 2.0, 7.0), Point3::new(-4.0, 0.5, -3.0)];
    let flat = flatten_to_plane(&raised);
    assert!(flat.iter().all(|p| p.z == 0.0));
    assert_eq!(flatten_to_plane(&flat), flat);
}
