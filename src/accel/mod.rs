//! Ray-tracing acceleration structure over the baked triangle soup.
//!
//! ## Architecture
//! ```text
//! TriangleSoup → per-triangle bounds → BVH build (SAH) → RayScene
//!                                                         ├─ intersect / occluded        (scalar)
//!                                                         └─ *_packet (≤16 rays, shared traversal)
//! ```
//!
//! The scene owns the soup for its whole lifetime, so the `primID → source`
//! back-references stay valid while any worker is tracing.

pub mod bvh;

use smallvec::SmallVec;

use crate::scene::{FaceRef, MaterialId};
use crate::util::{Aabb, Error, Ray, Result, Vec3};

use bvh::{build_bvh, Bvh};

/// Rays traced together by the packet queries.
pub const PACKET_SIZE: usize = 16;

const DET_EPSILON: f32 = 1e-12;

type NodeStack = SmallVec<[u32; 64]>;

/// Flattened world-space triangles plus their back-references.
///
/// Parallel arrays are indexed by primitive id. Brush triangles carry a
/// [`FaceRef`]; model triangles carry their mesh material instead.
#[derive(Debug, Clone, Default)]
pub struct TriangleSoup {
    pub positions: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub prim_faces: Vec<Option<FaceRef>>,
    pub prim_materials: Vec<Option<MaterialId>>,
}

impl TriangleSoup {
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Append one world-space triangle and its back-reference.
    pub fn push_triangle(&mut self, verts: [Vec3; 3], face: Option<FaceRef>, material: Option<MaterialId>) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&verts);
        self.indices.push([base, base + 1, base + 2]);
        self.prim_faces.push(face);
        self.prim_materials.push(material);
    }

    #[inline]
    pub fn triangle(&self, prim: u32) -> [Vec3; 3] {
        let [a, b, c] = self.indices[prim as usize];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }
}

/// Closest-hit record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub prim_id: u32,
    pub distance: f32,
    /// Unit geometric normal following the triangle's winding.
    pub normal: Vec3,
}

/// Ray queries against static geometry.
///
/// Packet methods are an optional capability: the provided implementations
/// trace each ray on its own and give identical answers.
pub trait RayQuery: Sync {
    fn intersect(&self, ray: &Ray) -> Option<Hit>;

    fn occluded(&self, ray: &Ray) -> bool;

    fn intersect_packet(&self, rays: &[Ray], hits: &mut [Option<Hit>]) {
        for (ray, hit) in rays.iter().zip(hits.iter_mut()) {
            *hit = self.intersect(ray);
        }
    }

    fn occluded_packet(&self, rays: &[Ray], occluded: &mut [bool]) {
        for (ray, out) in rays.iter().zip(occluded.iter_mut()) {
            *out = self.occluded(ray);
        }
    }
}

/// Precomputed triangle in BVH leaf order.
#[derive(Debug, Clone, Copy)]
struct TriAccel {
    v0: Vec3,
    e1: Vec3,
    e2: Vec3,
    prim_id: u32,
}

impl TriAccel {
    /// Möller–Trumbore. Returns the hit distance inside `(tnear, tfar)`.
    #[inline]
    fn hit(&self, ray: &Ray, tfar: f32) -> Option<f32> {
        let pvec = ray.dir.cross(self.e2);
        let det = self.e1.dot(pvec);
        if det.abs() < DET_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.origin - self.v0;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(self.e1);
        let v = ray.dir.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = self.e2.dot(qvec) * inv_det;
        (t > ray.tnear && t < tfar).then_some(t)
    }

    #[inline]
    fn normal(&self) -> Vec3 {
        self.e1.cross(self.e2).normalize_or_zero()
    }
}

#[derive(Clone, Copy)]
struct Closest {
    t: f32,
    tri: usize,
}

/// Returns true when `(t, prim)` beats the current best; equal distances
/// are broken by primitive id so scalar and packet walks agree.
#[inline]
fn closer(t: f32, prim: u32, best: Option<Closest>, tris: &[TriAccel]) -> bool {
    match best {
        None => true,
        Some(b) => t < b.t || (t == b.t && prim < tris[b.tri].prim_id),
    }
}

/// Committed, read-only ray-tracing scene.
pub struct RayScene {
    soup: TriangleSoup,
    nodes: Vec<bvh::BvhNode>,
    tris: Vec<TriAccel>,
}

impl RayScene {
    /// Build the BVH over `soup`.
    ///
    /// Fails with [`Error::AccelBuild`] for geometry the tracer cannot
    /// represent (non-finite vertices, dangling indices, > u32 primitives).
    #[tracing::instrument(skip_all, fields(triangles = soup.triangle_count()))]
    pub fn build(soup: TriangleSoup) -> Result<Self> {
        if soup.triangle_count() > u32::MAX as usize {
            return Err(Error::AccelBuild(format!(
                "{} triangles exceed the primitive id range",
                soup.triangle_count()
            )));
        }
        if soup.prim_faces.len() != soup.triangle_count() || soup.prim_materials.len() != soup.triangle_count() {
            return Err(Error::AccelBuild("primitive back-reference arrays are incomplete".into()));
        }
        if let Some(p) = soup.positions.iter().find(|p| !p.is_finite()) {
            return Err(Error::AccelBuild(format!("non-finite vertex {p:?}")));
        }
        let vertex_count = soup.positions.len() as u32;
        if let Some(tri) = soup.indices.iter().find(|t| t.iter().any(|&i| i >= vertex_count)) {
            return Err(Error::AccelBuild(format!("index {tri:?} out of range ({vertex_count} vertices)")));
        }

        let (aabbs, centroids): (Vec<Aabb>, Vec<Vec3>) = (0..soup.triangle_count() as u32)
            .map(|prim| {
                let [a, b, c] = soup.triangle(prim);
                let mut bounds = Aabb::EMPTY;
                bounds.expand_by_point(a);
                bounds.expand_by_point(b);
                bounds.expand_by_point(c);
                (bounds, (a + b + c) / 3.0)
            })
            .unzip();

        let Bvh { nodes, tri_indices } = build_bvh(&aabbs, &centroids);

        let tris = tri_indices
            .iter()
            .map(|&prim| {
                let [a, b, c] = soup.triangle(prim);
                TriAccel {
                    v0: a,
                    e1: b - a,
                    e2: c - a,
                    prim_id: prim,
                }
            })
            .collect();

        tracing::debug!(nodes = nodes.len(), "BVH committed");
        Ok(Self { soup, nodes, tris })
    }

    #[inline]
    pub fn soup(&self) -> &TriangleSoup {
        &self.soup
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.tris.is_empty()
    }

    fn closest(&self, ray: &Ray) -> Option<Closest> {
        if self.is_empty() {
            return None;
        }
        let inv_dir = ray.dir.recip();
        let mut best: Option<Closest> = None;
        let mut tfar = ray.tfar;
        let mut stack = NodeStack::new();
        stack.push(0);

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            // Inclusive bound so equal-distance ties are still visited
            if node.bounds.hit_distance(ray.origin, inv_dir, ray.tnear, tfar).is_none() {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_or_first as usize;
                for i in first..first + node.count as usize {
                    let tri = &self.tris[i];
                    if let Some(t) = tri.hit(ray, inclusive(tfar)) {
                        if closer(t, tri.prim_id, best, &self.tris) {
                            best = Some(Closest { t, tri: i });
                            tfar = t;
                        }
                    }
                }
                continue;
            }

            let left = node.left_or_first;
            let right = left + 1;
            let dl = self.nodes[left as usize].bounds.hit_distance(ray.origin, inv_dir, ray.tnear, tfar);
            let dr = self.nodes[right as usize].bounds.hit_distance(ray.origin, inv_dir, ray.tnear, tfar);
            match (dl, dr) {
                (Some(l), Some(r)) => {
                    // Push the far child first so the near one is popped next
                    if l <= r {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
                (Some(_), None) => stack.push(left),
                (None, Some(_)) => stack.push(right),
                (None, None) => {}
            }
        }

        best
    }

    fn to_hit(&self, c: Closest) -> Hit {
        let tri = &self.tris[c.tri];
        Hit {
            prim_id: tri.prim_id,
            distance: c.t,
            normal: tri.normal(),
        }
    }

    /// Shared traversal for up to [`PACKET_SIZE`] rays. Each node is tested
    /// against every still-active ray and skipped when none of them reach it.
    fn packet_walk(&self, rays: &[Ray], any_hit: bool, best: &mut [Option<Closest>; PACKET_SIZE]) {
        let n = rays.len();
        debug_assert!(n <= PACKET_SIZE);
        let mut inv_dirs = [Vec3::ZERO; PACKET_SIZE];
        let mut tfar = [0.0f32; PACKET_SIZE];
        let mut done = [false; PACKET_SIZE];
        for i in 0..n {
            inv_dirs[i] = rays[i].dir.recip();
            tfar[i] = rays[i].tfar;
        }

        let mut stack = NodeStack::new();
        stack.push(0);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            let mut mask = 0u32;
            for i in 0..n {
                if !done[i]
                    && node
                        .bounds
                        .hit_distance(rays[i].origin, inv_dirs[i], rays[i].tnear, tfar[i])
                        .is_some()
                {
                    mask |= 1 << i;
                }
            }
            if mask == 0 {
                continue;
            }
            if !node.is_leaf() {
                stack.push(node.left_or_first + 1);
                stack.push(node.left_or_first);
                continue;
            }

            let first = node.left_or_first as usize;
            for ti in first..first + node.count as usize {
                let tri = &self.tris[ti];
                for i in 0..n {
                    if mask & (1 << i) == 0 || done[i] {
                        continue;
                    }
                    let Some(t) = tri.hit(&rays[i], inclusive(tfar[i])) else {
                        continue;
                    };
                    if closer(t, tri.prim_id, best[i], &self.tris) {
                        best[i] = Some(Closest { t, tri: ti });
                        tfar[i] = t;
                        if any_hit {
                            done[i] = true;
                        }
                    }
                }
            }
        }
    }
}

/// Next representable distance above `t`, so a candidate at exactly the
/// current best distance still reaches the tie-break.
#[inline]
fn inclusive(t: f32) -> f32 {
    if t.is_finite() && t >= 0.0 {
        f32::from_bits(t.to_bits() + 1)
    } else {
        t
    }
}

impl RayQuery for RayScene {
    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        self.closest(ray).map(|c| self.to_hit(c))
    }

    fn occluded(&self, ray: &Ray) -> bool {
        if self.is_empty() {
            return false;
        }
        let inv_dir = ray.dir.recip();
        let mut stack = NodeStack::new();
        stack.push(0);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if node.bounds.hit_distance(ray.origin, inv_dir, ray.tnear, ray.tfar).is_none() {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_or_first as usize;
                let tris = &self.tris[first..first + node.count as usize];
                if tris.iter().any(|tri| tri.hit(ray, inclusive(ray.tfar)).is_some()) {
                    return true;
                }
            } else {
                stack.push(node.left_or_first + 1);
                stack.push(node.left_or_first);
            }
        }
        false
    }

    fn intersect_packet(&self, rays: &[Ray], hits: &mut [Option<Hit>]) {
        for (rays, hits) in rays.chunks(PACKET_SIZE).zip(hits.chunks_mut(PACKET_SIZE)) {
            let mut best = [None; PACKET_SIZE];
            if !self.is_empty() {
                self.packet_walk(rays, false, &mut best);
            }
            for (hit, b) in hits.iter_mut().zip(best) {
                *hit = b.map(|c| self.to_hit(c));
            }
        }
    }

    fn occluded_packet(&self, rays: &[Ray], occluded: &mut [bool]) {
        for (rays, out) in rays.chunks(PACKET_SIZE).zip(occluded.chunks_mut(PACKET_SIZE)) {
            let mut best = [None; PACKET_SIZE];
            if !self.is_empty() {
                self.packet_walk(rays, true, &mut best);
            }
            for (o, b) in out.iter_mut().zip(best) {
                *o = b.is_some();
            }
        }
    }
}
