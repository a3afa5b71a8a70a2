//! SAH-based BVH builder.
//!
//! Constructs a flat BVH array from per-triangle bounds. Uses the Surface
//! Area Heuristic for split decisions and produces a compact node array that
//! the tracer walks with an explicit stack.

use crate::util::{Aabb, Vec3};

/// Number of SAH bins for split evaluation.
const NUM_BINS: usize = 16;

/// Cost ratio: traversal vs intersection.
const TRAVERSAL_COST: f32 = 1.0;
const INTERSECT_COST: f32 = 1.0;

/// Maximum triangles per leaf before forcing a split.
const MAX_LEAF_SIZE: usize = 4;

/// Flat BVH node.
///
/// Internal node: `left_or_first` = left child index (right = left + 1), `count` = 0
/// Leaf node: `left_or_first` = first entry in [`Bvh::tri_indices`], `count` > 0
#[derive(Debug, Clone, Copy)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left_or_first: u32,
    pub count: u32,
}

impl BvhNode {
    const PLACEHOLDER: Self = Self {
        bounds: Aabb::EMPTY,
        left_or_first: 0,
        count: 0,
    };

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Built BVH result.
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Reordered triangle indices (leaves reference into this).
    pub tri_indices: Vec<u32>,
}

struct Bin {
    bounds: Aabb,
    count: usize,
}

/// Build BVH over triangles described by their bounds and centroids.
///
/// Returns a flat node array + reordered triangle index list. The input
/// slices are not modified; indices map into them.
#[tracing::instrument(skip_all, fields(tri_count = aabbs.len()))]
pub fn build_bvh(aabbs: &[Aabb], centroids: &[Vec3]) -> Bvh {
    let n = aabbs.len();
    if n == 0 {
        return Bvh {
            nodes: vec![BvhNode::PLACEHOLDER],
            tri_indices: vec![],
        };
    }

    let mut indices: Vec<u32> = (0..n as u32).collect();
    let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * n);
    nodes.push(BvhNode::PLACEHOLDER);

    struct Task {
        node_idx: usize,
        start: usize,
        end: usize, // exclusive
    }

    let mut stack = vec![Task {
        node_idx: 0,
        start: 0,
        end: n,
    }];

    while let Some(task) = stack.pop() {
        let (start, end) = (task.start, task.end);
        let count = end - start;

        let mut node_aabb = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for &idx in &indices[start..end] {
            node_aabb.expand_by_box(&aabbs[idx as usize]);
            centroid_bounds.expand_by_point(centroids[idx as usize]);
        }

        let leaf = BvhNode {
            bounds: node_aabb,
            left_or_first: start as u32,
            count: count as u32,
        };

        if count <= MAX_LEAF_SIZE {
            nodes[task.node_idx] = leaf;
            continue;
        }

        let split = find_best_split(&indices[start..end], aabbs, centroids, &centroid_bounds);
        let leaf_cost = count as f32 * INTERSECT_COST * node_aabb.area();

        let Some((axis, split_pos, cost)) = split else {
            nodes[task.node_idx] = leaf;
            continue;
        };
        if cost >= leaf_cost && count <= 2 * MAX_LEAF_SIZE {
            nodes[task.node_idx] = leaf;
            continue;
        }

        let mid = partition(&mut indices[start..end], |&idx| {
            centroids[idx as usize][axis] < split_pos
        }) + start;

        // Degenerate partition: split in the middle
        let mid = if mid == start || mid == end {
            (start + end) / 2
        } else {
            mid
        };

        let left_idx = nodes.len();
        nodes.push(BvhNode::PLACEHOLDER);
        nodes.push(BvhNode::PLACEHOLDER);

        nodes[task.node_idx] = BvhNode {
            bounds: node_aabb,
            left_or_first: left_idx as u32,
            count: 0,
        };

        stack.push(Task {
            node_idx: left_idx + 1,
            start: mid,
            end,
        });
        stack.push(Task {
            node_idx: left_idx,
            start,
            end: mid,
        });
    }

    Bvh {
        nodes,
        tri_indices: indices,
    }
}

/// SAH binned split search across all 3 axes.
/// Returns `(axis, split_position, cost)`, or `None` when every axis is degenerate.
fn find_best_split(
    indices: &[u32],
    aabbs: &[Aabb],
    centroids: &[Vec3],
    centroid_bounds: &Aabb,
) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32, f32)> = None;

    for axis in 0..3 {
        let lo = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - lo;
        if extent < 1e-8 {
            continue;
        }

        let mut bins: Vec<Bin> = (0..NUM_BINS)
            .map(|_| Bin {
                bounds: Aabb::EMPTY,
                count: 0,
            })
            .collect();

        let inv_extent = NUM_BINS as f32 / extent;
        for &idx in indices {
            let bin_id = ((centroids[idx as usize][axis] - lo) * inv_extent) as usize;
            let bin = &mut bins[bin_id.min(NUM_BINS - 1)];
            bin.bounds.expand_by_box(&aabbs[idx as usize]);
            bin.count += 1;
        }

        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut sweep = Aabb::EMPTY;
        let mut sweep_count = 0;
        for i in 0..NUM_BINS - 1 {
            sweep.expand_by_box(&bins[i].bounds);
            sweep_count += bins[i].count;
            left_area[i] = sweep.area();
            left_count[i] = sweep_count;
        }

        sweep = Aabb::EMPTY;
        sweep_count = 0;
        for i in (1..NUM_BINS).rev() {
            sweep.expand_by_box(&bins[i].bounds);
            sweep_count += bins[i].count;
            if left_count[i - 1] == 0 || sweep_count == 0 {
                continue;
            }
            let cost = TRAVERSAL_COST
                + INTERSECT_COST
                    * (left_count[i - 1] as f32 * left_area[i - 1]
                        + sweep_count as f32 * sweep.area());

            if best.map_or(true, |(_, _, c)| cost < c) {
                let pos = lo + (i as f32 / NUM_BINS as f32) * extent;
                best = Some((axis, pos, cost));
            }
        }
    }

    best
}

/// Partition slice in-place. Returns count of elements where predicate is true.
fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}
