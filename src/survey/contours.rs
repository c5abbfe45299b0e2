//! Contour lines: the terrain sliced by horizontal planes at a fixed interval.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{ContourConfig, MAX_CONTOUR_LEVELS};
use crate::error::TerrainError;
use crate::geom::{GeomMetrics, GeomTimingReport, Point3, TimingBucket, sample_surface_grid};
use crate::terrain::TerrainModel;

/// Samples per side when a parametric patch is tessellated for slicing.
const PATCH_SLICE_SAMPLES: usize = 33;
/// Lines no longer than this multiple of the tolerance are dropped.
const MIN_LENGTH_FACTOR: f64 = 10.0;
/// Slack above the highest elevation when enumerating levels.
const LEVEL_EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct ContourLine {
    /// Vertices in walking order; a closed line does not repeat its start.
    pub points: Vec<Point3>,
    pub closed: bool,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourLevel {
    pub elevation: f64,
    /// Set on every `index_every`-th level counted from elevation zero.
    pub is_index: bool,
    pub lines: Vec<ContourLine>,
}

#[derive(Debug, Clone, Default)]
pub struct ContourSet {
    pub interval: f64,
    pub index_every: u32,
    /// Levels that produced at least one line, lowest first.
    pub levels: Vec<ContourLevel>,
    /// Levels sliced, with or without lines.
    pub sliced_levels: usize,
    /// Lines dropped for being too short.
    pub dropped_short: usize,
    pub timing: Option<GeomTimingReport>,
}

impl ContourSet {
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.levels.iter().map(|l| l.lines.len()).sum()
    }

    #[must_use]
    pub fn index_levels(&self) -> impl Iterator<Item = &ContourLevel> {
        self.levels.iter().filter(|l| l.is_index)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} lines on {} of {} levels (interval {}, {} index levels), {} short lines dropped",
            self.line_count(),
            self.levels.len(),
            self.sliced_levels,
            self.interval,
            self.index_levels().count(),
            self.dropped_short
        )
    }
}

/// Elevations `k * interval` between `z_min` and `z_max`, with their `k`.
pub fn contour_levels(z_min: f64, z_max: f64, interval: f64) -> Result<Vec<(i64, f64)>, TerrainError> {
    if !(interval.is_finite() && interval > 0.0) {
        return Err(TerrainError::invalid_config(
            "interval",
            format!("must be finite and positive, got {interval}"),
        ));
    }
    if !(z_min.is_finite() && z_max.is_finite()) || z_max < z_min {
        return Err(TerrainError::degenerate_terrain(format!(
            "elevation range {z_min} to {z_max} is not usable for contours"
        )));
    }
    let first = (z_min / interval).ceil();
    let last = ((z_max + LEVEL_EPS) / interval).floor();
    if last < first {
        return Ok(Vec::new());
    }
    let count = last - first + 1.0;
    if count > MAX_CONTOUR_LEVELS as f64 {
        return Err(TerrainError::invalid_config(
            "interval",
            format!("{interval} yields {count} levels, at most {MAX_CONTOUR_LEVELS} allowed"),
        ));
    }
    let (first, last) = (first as i64, last as i64);
    Ok((first..=last).map(|k| (k, k as f64 * interval)).collect())
}

/// Slices `terrain` at every contour level inside its elevation range.
pub fn extract_contours(terrain: &TerrainModel, config: &ContourConfig) -> Result<ContourSet, TerrainError> {
    config.validate()?;
    let mut metrics = GeomMetrics::default();
    metrics.begin();

    let soups = triangle_soups(terrain);
    let (z_min, z_max) = soups
        .iter()
        .flat_map(|s| s.vertices.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));
    let levels = contour_levels(z_min, z_max, config.interval)?;
    log::info!(
        "Contours: {} levels every {} over z {z_min:.3} to {z_max:.3}",
        levels.len(),
        config.interval
    );

    let min_length = MIN_LENGTH_FACTOR * config.tolerance;
    let total = levels.len();
    let step = (total / 10).max(1);
    let done = AtomicUsize::new(0);
    let index_every = i64::from(config.index_every);

    let slice = |&(k, elevation): &(i64, f64)| {
        let mut lines = Vec::new();
        let mut dropped = 0usize;
        for soup in &soups {
            for line in soup.slice(elevation) {
                if line.length > min_length {
                    lines.push(line);
                } else {
                    dropped += 1;
                }
            }
        }
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % step == 0 || finished == total {
            log::info!("Contours: {finished}/{total} levels ({}%)", finished * 100 / total);
        }
        let level = ContourLevel {
            elevation,
            is_index: k.rem_euclid(index_every) == 0,
            lines,
        };
        (level, dropped)
    };

    let sliced: Vec<(ContourLevel, usize)> = metrics.time(TimingBucket::Contours, || {
        #[cfg(feature = "parallel")]
        {
            if config.parallel {
                levels.par_iter().map(slice).collect()
            } else {
                levels.iter().map(slice).collect()
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            levels.iter().map(slice).collect()
        }
    });

    let mut set = ContourSet {
        interval: config.interval,
        index_every: config.index_every,
        sliced_levels: total,
        ..ContourSet::default()
    };
    for (level, dropped) in sliced {
        set.dropped_short += dropped;
        if !level.lines.is_empty() {
            set.levels.push(level);
        }
    }
    if set.dropped_short > 0 {
        log::debug!("Contours: dropped {} lines of length <= {min_length}", set.dropped_short);
    }
    set.timing = metrics.end();
    log::info!("Contours: {}", set.summary());
    Ok(set)
}

/// Triangles the slicer walks. Mesh terrain is borrowed as is; each patch
/// is tessellated on its own, so lines stop at patch borders.
struct TriangleSoup<'a> {
    vertices: Cow<'a, [Point3]>,
    triangles: Cow<'a, [[u32; 3]]>,
}

type EdgeKey = (u32, u32);

fn triangle_soups(terrain: &TerrainModel) -> Vec<TriangleSoup<'_>> {
    match terrain {
        TerrainModel::Mesh(mesh) => vec![TriangleSoup {
            vertices: Cow::Borrowed(mesh.vertices()),
            triangles: Cow::Borrowed(mesh.triangles()),
        }],
        TerrainModel::Patches(set) => set
            .surfaces()
            .map(|surface| {
                let grid = sample_surface_grid(surface, PATCH_SLICE_SAMPLES, PATCH_SLICE_SAMPLES);
                let triangles = grid.triangles();
                TriangleSoup {
                    vertices: Cow::Owned(grid.points),
                    triangles: Cow::Owned(triangles),
                }
            })
            .collect(),
    }
}

impl TriangleSoup<'_> {
    /// Contour lines of this soup at `elevation`, chained through shared edges.
    fn slice(&self, elevation: f64) -> Vec<ContourLine> {
        let mut segments: Vec<[(EdgeKey, Point3); 2]> = Vec::new();
        for &tri in self.triangles.iter() {
            let above = tri.map(|i| self.vertices[i as usize].z > elevation);
            if above.iter().all(|&a| a) || above.iter().all(|&a| !a) {
                continue;
            }
            let mut crossings = [(0, 1), (1, 2), (2, 0)]
                .into_iter()
                .filter(|&(a, b)| above[a] != above[b])
                .map(|(a, b)| self.crossing(tri[a], tri[b], elevation));
            if let (Some(first), Some(second)) = (crossings.next(), crossings.next()) {
                segments.push([first, second]);
            }
        }
        chain_segments(&segments)
    }

    /// Where the level crosses edge `a-b`, computed from the lower index so
    /// both neighbours of an edge agree bit for bit.
    fn crossing(&self, a: u32, b: u32, elevation: f64) -> (EdgeKey, Point3) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (p, q) = (self.vertices[lo as usize], self.vertices[hi as usize]);
        let t = (elevation - p.z) / (q.z - p.z);
        let point = p.lerp(q, t).with_z(elevation);
        ((lo, hi), point)
    }
}

/// Joins segments that share a crossing edge into polylines. Open chains are
/// walked from their free ends first; what remains are loops.
fn chain_segments(segments: &[[(EdgeKey, Point3); 2]]) -> Vec<ContourLine> {
    let mut by_edge: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (index, segment) in segments.iter().enumerate() {
        for (key, _) in segment {
            by_edge.entry(*key).or_default().push(index);
        }
    }

    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();
    let mut free_ends = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        for (end, (key, _)) in segment.iter().enumerate() {
            if by_edge.get(key).is_some_and(|s| s.len() == 1) {
                free_ends.push((index, end));
            }
        }
    }
    let loop_starts = (0..segments.len()).map(|index| (index, 0));

    for (index, end) in free_ends.into_iter().chain(loop_starts) {
        if used[index] {
            continue;
        }
        lines.push(walk(segments, &by_edge, &mut used, index, end));
    }
    lines
}

fn walk(
    segments: &[[(EdgeKey, Point3); 2]],
    by_edge: &HashMap<EdgeKey, Vec<usize>>,
    used: &mut [bool],
    mut index: usize,
    mut entry: usize,
) -> ContourLine {
    let start_key = segments[index][entry].0;
    let mut points = vec![segments[index][entry].1];
    let mut exit_key;
    loop {
        used[index] = true;
        let (key, point) = segments[index][1 - entry];
        exit_key = key;
        points.push(point);
        let next = by_edge
            .get(&key)
            .and_then(|candidates| candidates.iter().copied().find(|&s| !used[s]));
        let Some(next) = next else { break };
        entry = usize::from(segments[next][0].0 != key);
        index = next;
    }

    let closed = exit_key == start_key && points.len() > 2;
    if closed {
        points.pop();
    }
    let mut length: f64 = points.windows(2).map(|w| w[0].distance_to(w[1])).sum();
    if closed {
        length += points[points.len() - 1].distance_to(points[0]);
    }
    ContourLine { points, closed, length }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::geom::{PlaneSurface, Vec3};
    use crate::terrain::PatchSurface;

    /// Square pyramid: apex (0, 0, 21) over a base at z = 1 with half-size 20.
    fn pyramid() -> TerrainModel {
        let vertices = vec![
            Point3::new(0.0, 0.0, 21.0),
            Point3::new(-20.0, -20.0, 1.0),
            Point3::new(20.0, -20.0, 1.0),
            Point3::new(20.0, 20.0, 1.0),
            Point3::new(-20.0, 20.0, 1.0),
        ];
        TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]]).expect("terrain")
    }

    /// Ramp `z = x / 10 + 0.5` on an 11 x 11 grid over `[0, 100]²`.
    fn ramp() -> TerrainModel {
        let n = 11u32;
        let mut vertices = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let x = f64::from(i) * 10.0;
                vertices.push(Point3::new(x, f64::from(j) * 10.0, x / 10.0 + 0.5));
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
        TerrainModel::from_mesh(vertices, triangles).expect("terrain")
    }

    #[test]
    fn test_levels_start_at_the_first_multiple() {
        let levels = contour_levels(1.0, 21.0, 5.0).expect("levels");
        assert_eq!(levels, vec![(1, 5.0), (2, 10.0), (3, 15.0), (4, 20.0)]);
        let below_zero = contour_levels(-7.0, 3.0, 5.0).expect("levels");
        assert_eq!(below_zero, vec![(-1, -5.0), (0, 0.0)]);
        assert!(contour_levels(3.0, 4.0, 5.0).expect("levels").is_empty());
        let err = contour_levels(0.0, 10.0, 1e-6).unwrap_err();
        assert!(matches!(err, TerrainError::InvalidConfig { field: "interval", .. }));
    }

    #[test]
    fn test_pyramid_gives_nested_closed_squares() {
        let config = ContourConfig {
            index_every: 2,
            ..ContourConfig::default()
        };
        let set = extract_contours(&pyramid(), &config).expect("contours");
        assert_eq!(set.sliced_levels, 4);
        assert_eq!(set.levels.len(), 4);
        for (level, (elevation, perimeter)) in set.levels.iter().zip([(5.0, 128.0), (10.0, 88.0), (15.0, 48.0), (20.0, 8.0)]) {
            assert_eq!(level.elevation, elevation);
            assert_eq!(level.is_index, elevation % 10.0 == 0.0);
            assert_eq!(level.lines.len(), 1);
            let line = &level.lines[0];
            assert!(line.closed);
            assert_eq!(line.points.len(), 4);
            assert!((line.length - perimeter).abs() < 1e-9, "{} vs {perimeter}", line.length);
            assert!(line.points.iter().all(|p| p.z == elevation));
        }
        assert_eq!(set.index_levels().count(), 2);
        assert_eq!(set.dropped_short, 0);
    }

    #[test]
    fn test_short_lines_are_dropped() {
        let config = ContourConfig {
            tolerance: 1.0,
            ..ContourConfig::default()
        };
        let set = extract_contours(&pyramid(), &config).expect("contours");
        assert_eq!(set.levels.len(), 3);
        assert_eq!(set.dropped_short, 1);
        assert!(set.levels.iter().all(|l| l.elevation < 20.0));
    }

    #[test]
    fn test_ramp_gives_open_lines_across_the_mesh() {
        let set = extract_contours(&ramp(), &ContourConfig::default()).expect("contours");
        let elevations: Vec<f64> = set.levels.iter().map(|l| l.elevation).collect();
        assert_eq!(elevations, vec![5.0, 10.0]);
        for level in &set.levels {
            assert_eq!(level.lines.len(), 1);
            let line = &level.lines[0];
            assert!(!line.closed);
            assert!((line.length - 100.0).abs() < 1e-9);
            let x = (level.elevation - 0.5) * 10.0;
            assert!(line.points.iter().all(|p| (p.x - x).abs() < 1e-9));
            let ends = [line.points[0].y, line.points[line.points.len() - 1].y];
            assert!(ends.contains(&0.0) && ends.contains(&100.0), "{ends:?}");
            assert!(!level.is_index);
        }
    }

    #[test]
    fn test_patch_terrain_is_sliced() {
        let plane = PlaneSurface::new(Point3::new(0.0, 0.0, 0.5), Vec3::new(100.0, 0.0, 10.0), Vec3::new(0.0, 100.0, 0.0));
        let terrain = TerrainModel::from_patches(vec![PatchSurface::Plane(plane)]).expect("terrain");
        let set = extract_contours(&terrain, &ContourConfig::default()).expect("contours");
        assert_eq!(set.levels.len(), 2);
        for level in &set.levels {
            assert_eq!(level.lines.len(), 1);
            assert!((level.lines[0].length - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_flat_terrain_has_no_lines_and_bad_config_fails() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(10.0, 0.0, 3.0),
            Point3::new(10.0, 10.0, 3.0),
            Point3::new(0.0, 10.0, 3.0),
        ];
        let flat = TerrainModel::from_mesh(vertices, vec![[0, 1, 2], [0, 2, 3]]).expect("terrain");
        let set = extract_contours(&flat, &ContourConfig::default()).expect("contours");
        assert_eq!(set.line_count(), 0);
        assert_eq!(set.sliced_levels, 0);

        let config = ContourConfig {
            interval: 0.0,
            ..ContourConfig::default()
        };
        let err = extract_contours(&flat, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
    }
}
