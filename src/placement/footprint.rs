use serde::{Deserialize, Serialize};

use crate::geom::{BBox, Point3};
use crate::terrain::{RayOptions, TerrainModel};

/// Axis-aligned XY rectangle plus the elevation of the object's lowest point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub min: (f64, f64),
    pub max: (f64, f64),
    pub base_elevation: f64,
}

impl Footprint {
    /// Corners may be given in any order.
    #[must_use]
    pub fn new(a: (f64, f64), b: (f64, f64), base_elevation: f64) -> Self {
        Self {
            min: (a.0.min(b.0), a.1.min(b.1)),
            max: (a.0.max(b.0), a.1.max(b.1)),
            base_elevation,
        }
    }

    /// Footprint of an object: its XY bounds, seated by its lowest point.
    #[must_use]
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let bbox = BBox::from_points(points).filter(|b| b.is_valid())?;
        Some(Self {
            min: (bbox.min.x, bbox.min.y),
            max: (bbox.max.x, bbox.max.y),
            base_elevation: bbox.min.z,
        })
    }

    #[must_use]
    pub fn centroid(&self) -> (f64, f64) {
        ((self.min.0 + self.max.0) * 0.5, (self.min.1 + self.max.1) * 0.5)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        (self.max.0 - self.min.0) * (self.max.1 - self.min.1)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        [self.min.0, self.min.1, self.max.0, self.max.1, self.base_elevation]
            .iter()
            .all(|v| v.is_finite())
    }

    /// `n x n` sample positions including both edges; the centroid when `n <= 1`.
    #[must_use]
    pub fn grid_points(&self, n: usize) -> Vec<(f64, f64)> {
        if n <= 1 {
            return vec![self.centroid()];
        }
        let step = |lo: f64, hi: f64, i: usize| lo + (hi - lo) * (i as f64 / (n - 1) as f64);
        (0..n)
            .flat_map(|j| (0..n).map(move |i| (i, j)))
            .map(|(i, j)| (step(self.min.0, self.max.0, i), step(self.min.1, self.max.1, j)))
            .collect()
    }
}

/// Aggregate of a grid of vertical probes under a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FootprintSample {
    pub max_elevation: Option<f64>,
    pub min_elevation: Option<f64>,
    pub hit_count: usize,
    pub miss_count: usize,
}

impl FootprintSample {
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.hit_count + self.miss_count
    }

    fn record(&mut self, elevation: Option<f64>) {
        match elevation {
            Some(z) => {
                self.hit_count += 1;
                self.max_elevation = Some(self.max_elevation.map_or(z, |m| m.max(z)));
                self.min_elevation = Some(self.min_elevation.map_or(z, |m| m.min(z)));
            }
            None => self.miss_count += 1,
        }
    }
}

pub fn sample_footprint(
    footprint: &Footprint,
    terrain: &TerrainModel,
    grid_resolution: usize,
    options: &RayOptions,
) -> FootprintSample {
    let mut sample = FootprintSample::default();
    for (x, y) in footprint.grid_points(grid_resolution) {
        sample.record(terrain.intersect_vertical_with(x, y, options).elevation());
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slope() -> TerrainModel {
        // z = x / 10 over [0, 100]^2
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 0.0, 10.0),
            Point3::new(100.0, 100.0, 10.0),
            Point3::new(0.0, 100.0, 0.0),
        ];
        TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3]]).expect("terrain")
    }

    #[test]
    fn test_grid_points_include_edges() {
        let fp = Footprint::new((20.0, 20.0), (10.0, 10.0), 0.0);
        assert_eq!(fp.min, (10.0, 10.0));
        let pts = fp.grid_points(3);
        assert_eq!(pts.len(), 9);
        assert_eq!(pts[0], (10.0, 10.0));
        assert_eq!(pts[4], (15.0, 15.0));
        assert_eq!(pts[8], (20.0, 20.0));
        assert_eq!(fp.grid_points(1), vec![(15.0, 15.0)]);
    }

    #[test]
    fn test_sample_reports_extremes() {
        let fp = Footprint::new((10.0, 10.0), (30.0, 20.0), 0.0);
        let sample = sample_footprint(&fp, &slope(), 5, &RayOptions::default());
        assert_eq!(sample.hit_count, 25);
        assert_eq!(sample.miss_count, 0);
        assert!((sample.max_elevation.expect("max") - 3.0).abs() < 1e-9);
        assert!((sample.min_elevation.expect("min") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_coverage_counts_misses() {
        let fp = Footprint::new((90.0, 10.0), (110.0, 20.0), 0.0);
        let sample = sample_footprint(&fp, &slope(), 3, &RayOptions::default());
        assert_eq!(sample.sample_count(), 9);
        assert_eq!(sample.hit_count, 6);
        assert_eq!(sample.miss_count, 3);
    }

    #[test]
    fn test_from_points_uses_lowest_point() {
        let fp = Footprint::from_points(&[
            Point3::new(1.0, 2.0, 7.0),
            Point3::new(4.0, 6.0, 3.0),
            Point3::new(2.0, 3.0, 9.0),
        ])
        .expect("footprint");
        assert_eq!(fp.min, (1.0, 2.0));
        assert_eq!(fp.max, (4.0, 6.0));
        assert_eq!(fp.base_elevation, 3.0);
        assert!(Footprint::from_points(&[]).is_none());
    }
}
