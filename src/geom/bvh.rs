//! Bounding volume hierarchy over primitive bounding boxes.
//!
//! Terrain models build one of these over triangle (or proxy triangle) boxes
//! so that vertical probes only touch the handful of primitives whose XY
//! footprint covers the query column.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{BBox, Point3};

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    bbox: BBox,
    left: u32,
    right: u32,
    first: u32,
    len: u32,
}

impl Node {
    const fn is_leaf(self) -> bool {
        self.len != 0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Bvh {
    nodes: Vec<Node>,
    order: Vec<u32>,
}

impl Bvh {
    const DEFAULT_LEAF_SIZE: usize = 6;

    #[must_use]
    pub(crate) fn build(bboxes: &[BBox]) -> Option<Self> {
        Self::build_with_leaf_size(bboxes, Self::DEFAULT_LEAF_SIZE)
    }

    #[must_use]
    pub(crate) fn build_with_leaf_size(bboxes: &[BBox], leaf_size: usize) -> Option<Self> {
        if bboxes.is_empty() || bboxes.len() >= NO_CHILD as usize {
            return None;
        }

        let leaf_size = leaf_size.clamp(1, 128);
        let order: Vec<u32> = (0..bboxes.len()).map(|i| i as u32).collect();
        let mut bvh = Self {
            nodes: Vec::with_capacity(bboxes.len() * 2),
            order,
        };
        bvh.split(bboxes, 0, bboxes.len(), leaf_size);
        Some(bvh)
    }

    fn split(&mut self, bboxes: &[BBox], first: usize, end: usize, leaf_size: usize) -> u32 {
        let bbox = self.order[first + 1..end]
            .iter()
            .fold(bboxes[self.order[first] as usize], |acc, &i| acc.union(bboxes[i as usize]));

        let index = self.nodes.len() as u32;
        let count = end - first;
        self.nodes.push(Node {
            bbox,
            left: NO_CHILD,
            right: NO_CHILD,
            first: first as u32,
            len: count as u32,
        });

        if count <= leaf_size {
            return index;
        }

        let axis = widest_centroid_axis(bboxes, &self.order[first..end]);
        let mid = first + count / 2;
        self.order[first..end].select_nth_unstable_by(mid - first, |&a, &b| {
            axis_value(bboxes[a as usize].center(), axis)
                .total_cmp(&axis_value(bboxes[b as usize].center(), axis))
        });

        let left = self.split(bboxes, first, mid, leaf_size);
        let right = self.split(bboxes, mid, end, leaf_size);
        let node = &mut self.nodes[index as usize];
        node.left = left;
        node.right = right;
        node.len = 0;
        index
    }

    /// Depth-first walk; `enter` prunes subtrees, `visit` returns `false` to stop.
    fn walk<E, F>(&self, mut enter: E, mut visit: F)
    where
        E: FnMut(BBox) -> bool,
        F: FnMut(usize) -> bool,
    {
        let mut stack = vec![0u32];
        while let Some(idx) = stack.pop() {
            let node = self.nodes[idx as usize];
            if !enter(node.bbox) {
                continue;
            }
            if node.is_leaf() {
                let first = node.first as usize;
                for &prim in &self.order[first..first + node.len as usize] {
                    if !visit(prim as usize) {
                        return;
                    }
                }
            } else {
                stack.push(node.right);
                stack.push(node.left);
            }
        }
    }

    /// Visits every primitive whose XY footprint contains `(x, y)`.
    ///
    /// This is a vertical ray with the Z range left unbounded, which is all
    /// terrain probes need.
    pub(crate) fn query_column<F>(&self, x: f64, y: f64, eps: f64, visit: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.walk(|bbox| bbox.contains_xy(x, y, eps), visit);
    }

    /// Best-first search for the primitive closest to `point`.
    ///
    /// `distance_to_prim` returns the squared distance to a primitive, or
    /// `None` to skip it. Returns the winning index and its squared distance.
    pub(crate) fn nearest<F>(&self, point: Point3, mut distance_to_prim: F) -> Option<(usize, f64)>
    where
        F: FnMut(usize) -> Option<f64>,
    {
        let mut best: Option<(usize, f64)> = None;
        let mut heap = BinaryHeap::new();
        heap.push(Candidate {
            dist2: self.nodes[0].bbox.distance_squared_to_point(point),
            node: 0,
        });

        while let Some(Candidate { dist2, node }) = heap.pop() {
            if best.is_some_and(|(_, d)| dist2 > d) {
                break;
            }
            let node = self.nodes[node as usize];
            if node.is_leaf() {
                let first = node.first as usize;
                for &prim in &self.order[first..first + node.len as usize] {
                    let Some(d2) = distance_to_prim(prim as usize).filter(|d| d.is_finite()) else {
                        continue;
                    };
                    if best.is_none_or(|(_, b)| d2 < b) {
                        best = Some((prim as usize, d2));
                    }
                }
                continue;
            }
            for child in [node.left, node.right] {
                let d2 = self.nodes[child as usize].bbox.distance_squared_to_point(point);
                if best.is_none_or(|(_, b)| d2 <= b) {
                    heap.push(Candidate { dist2: d2, node: child });
                }
            }
        }

        best
    }
}

fn axis_value(p: Point3, axis: usize) -> f64 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

fn widest_centroid_axis(bboxes: &[BBox], order: &[u32]) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for &i in order {
        let c = bboxes[i as usize].center().to_array();
        for axis in 0..3 {
            lo[axis] = lo[axis].min(c[axis]);
            hi[axis] = hi[axis].max(c[axis]);
        }
    }
    let extent = [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]];
    if extent[0] >= extent[1] && extent[0] >= extent[2] {
        0
    } else if extent[1] >= extent[2] {
        1
    } else {
        2
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist2: f64,
    node: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance.
        other
            .dist2
            .total_cmp(&self.dist2)
            .then_with(|| self.node.cmp(&other.node))
    }
}
