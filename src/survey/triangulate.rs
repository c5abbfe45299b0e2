use crate::error::TerrainError;
use crate::geom::Point3;

/// Delaunay triangles over the XY projection of `points`, as vertex index
/// triples into `points`.
///
/// Coordinates are shifted to the XY minimum before triangulating so survey
/// offsets in the hundreds of thousands keep their precision. Points that
/// repeat an earlier XY position are left unreferenced.
pub fn triangulate_xy(points: &[Point3]) -> Result<Vec<[u32; 3]>, TerrainError> {
    if points.len() < 3 {
        return Err(TerrainError::degenerate_terrain(format!(
            "triangulation needs at least 3 points, got {}",
            points.len()
        )));
    }
    if u32::try_from(points.len()).is_err() {
        return Err(TerrainError::InvalidInput {
            reason: format!("{} points exceed the u32 index range", points.len()),
        });
    }

    let (x0, y0) = points
        .iter()
        .fold((f64::INFINITY, f64::INFINITY), |(x, y), p| (x.min(p.x), y.min(p.y)));
    let planar: Vec<delaunator::Point> = points
        .iter()
        .map(|p| delaunator::Point { x: p.x - x0, y: p.y - y0 })
        .collect();

    let triangulation = delaunator::triangulate(&planar);
    if triangulation.triangles.is_empty() {
        return Err(TerrainError::degenerate_terrain(
            "survey points are collinear in XY, nothing to triangulate",
        ));
    }

    let triangles: Vec<[u32; 3]> = triangulation
        .triangles
        .chunks_exact(3)
        .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
        .collect();
    log::debug!("Triangulation: {} points, {} triangles", points.len(), triangles.len());
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_square_gives_two_triangles() {
        let points = [
            Point3::new(500_000.0, 4_200_000.0, 1.0),
            Point3::new(500_010.0, 4_200_000.0, 2.0),
            Point3::new(500_010.0, 4_200_010.0, 3.0),
            Point3::new(500_000.0, 4_200_011.0, 4.0),
        ];
        let triangles = triangulate_xy(&points).expect("triangles");
        assert_eq!(triangles.len(), 2);
        let mut used: Vec<u32> = triangles.iter().flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_collinear_and_tiny_sets_fail() {
        let line: Vec<Point3> = (0..5).map(|i| Point3::new(f64::from(i), f64::from(i), 0.0)).collect();
        let err = triangulate_xy(&line).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
        assert!(triangulate_xy(&line[..2]).is_err());
    }
}
