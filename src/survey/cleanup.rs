use serde::Serialize;

use crate::geom::{BBox, Point3};

/// Extent and elevation spread of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointStatistics {
    pub count: usize,
    pub min: [f64; 3],
    pub max: [f64; 3],
    pub z_mean: f64,
    /// Population standard deviation of Z.
    pub z_std: f64,
}

impl PointStatistics {
    /// `None` for an empty set.
    #[must_use]
    pub fn of(points: &[Point3]) -> Option<Self> {
        let bbox = BBox::from_points(points)?;
        let n = points.len() as f64;
        let z_mean = points.iter().map(|p| p.z).sum::<f64>() / n;
        let variance = points.iter().map(|p| (p.z - z_mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            count: points.len(),
            min: bbox.min.to_array(),
            max: bbox.max.to_array(),
            z_mean,
            z_std: variance.sqrt(),
        })
    }

    #[must_use]
    pub fn z_range(&self) -> f64 {
        self.max[2] - self.min[2]
    }
}

/// Keeps the points whose elevation lies within `sigma` standard deviations
/// of the mean. Returns the survivors and how many were dropped.
#[must_use]
pub fn filter_outliers(points: Vec<Point3>, sigma: f64) -> (Vec<Point3>, usize) {
    if !(sigma.is_finite() && sigma > 0.0) || points.len() < 3 {
        return (points, 0);
    }
    let Some(stats) = PointStatistics::of(&points) else {
        return (points, 0);
    };
    if !(stats.z_std.is_finite() && stats.z_std > 0.0) {
        return (points, 0);
    }

    let band = (stats.z_mean - sigma * stats.z_std)..=(stats.z_mean + sigma * stats.z_std);
    let before = points.len();
    let kept: Vec<Point3> = points.into_iter().filter(|p| band.contains(&p.z)).collect();
    let removed = before - kept.len();
    if removed > 0 {
        log::info!(
            "Survey: {removed} outliers beyond {sigma} sigma of z = {:.3} (std {:.3})",
            stats.z_mean,
            stats.z_std
        );
    }
    (kept, removed)
}

/// Keeps every `len / target`-th point, at most `target` of them.
#[must_use]
pub fn thin_points(points: Vec<Point3>, target: usize) -> Vec<Point3> {
    if target == 0 || points.len() <= target {
        return points;
    }
    let before = points.len();
    let stride = before / target;
    let thinned: Vec<Point3> = points.into_iter().step_by(stride).take(target).collect();
    log::info!("Survey: thinned {before} points to {} (stride {stride})", thinned.len());
    thinned
}
