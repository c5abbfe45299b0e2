use crate::geom::{NurbsSurface, PlaneSurface, Point3, Surface, sample_surface_grid};

fn tilted_grid() -> NurbsSurface {
    let mut points = Vec::new();
    for j in 0..4 {
        for i in 0..4 {
            let x = f64::from(i) * 10.0;
            let y = f64::from(j) * 10.0;
            points.push(Point3::new(x, y, 0.1 * x));
        }
    }
    NurbsSurface::from_grid(points, 4, 4, 3, 3).expect("surface")
}

#[test]
fn planar_nurbs_grid_reproduces_plane() {
    let surface = tilted_grid();
    let p = surface.point_at(0.5, 0.5);
    assert!((p.z - 0.1 * p.x).abs() < 1e-9);
    let corner = surface.point_at(1.0, 1.0);
    assert!(corner.distance_to(Point3::new(30.0, 30.0, 3.0)) < 1e-9);
}

#[test]
fn nurbs_normal_is_perpendicular_to_slope() {
    let surface = tilted_grid();
    let n = surface.normal_at(0.3, 0.6).expect("normal");
    assert!((n.length() - 1.0).abs() < 1e-9);
    // Plane z = 0.1 x has normal parallel to (-0.1, 0, 1).
    assert!((n.x / n.z + 0.1).abs() < 1e-6);
    assert!(n.y.abs() < 1e-6);
}

#[test]
fn from_grid_rejects_single_row() {
    let points = vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0)];
    assert!(NurbsSurface::from_grid(points, 2, 1, 1, 1).is_err());
}

#[test]
fn sample_grid_covers_domain() {
    let plane = PlaneSurface::horizontal(0.0, 0.0, 20.0, 10.0, 5.0);
    let grid = sample_surface_grid(&plane, 5, 3);
    assert_eq!(grid.points.len(), 15);
    assert_eq!(grid.triangles().len(), 4 * 2 * 2);
    assert_eq!(grid.points[grid.index(4, 2)], Point3::new(20.0, 10.0, 5.0));
    assert_eq!(grid.uvs[grid.index(2, 1)], [0.5, 0.5]);
}
