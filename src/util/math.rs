//! Math type re-exports and baker-specific math utilities.
//!
//! This module re-exports types from `glam` and provides the small set of
//! geometric helpers shared by the tracer, the evaluators and the filters.

pub use glam::{IVec3, Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use std::fmt;

/// Offset applied along the surface normal before launching rays.
pub const SURFACE_BIAS: f32 = 1e-3;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area (for SAH cost).
    #[inline]
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test against a ray with precomputed reciprocal direction.
    /// Returns the entry distance when the box is hit inside `[tnear, tfar]`.
    #[inline]
    pub fn hit_distance(&self, origin: Vec3, inv_dir: Vec3, tnear: f32, tfar: f32) -> Option<f32> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let t_enter = t0.min(t1).max_element().max(tnear);
        let t_exit = t0.max(t1).min_element().min(tfar);
        (t_enter <= t_exit).then_some(t_enter)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb({:?} - {:?})", self.min, self.max)
    }
}

/// A ray segment `origin + t * dir` for `t` in `(tnear, tfar]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
    pub tnear: f32,
    pub tfar: f32,
}

impl Ray {
    #[inline]
    pub fn new(origin: Vec3, dir: Vec3, tfar: f32) -> Self {
        Self {
            origin,
            dir,
            tnear: 0.0,
            tfar,
        }
    }

    /// Same segment, also accepting hits down to `t = -epsilon`, so a ray
    /// starting exactly on a surface reports that surface.
    #[inline]
    pub fn touching(self, epsilon: f32) -> Self {
        Self {
            tnear: -epsilon,
            ..self
        }
    }

    /// Ray with unbounded length (used for sun shadows).
    #[inline]
    pub fn infinite(origin: Vec3, dir: Vec3) -> Self {
        Self::new(origin, dir, f32::INFINITY)
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Orthonormal tangent frame `(tangent, bitangent)` around a unit normal.
///
/// Branchless construction (Duff et al. 2017), so nearby normals get
/// continuous frames.
#[inline]
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let t = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bt = Vec3::new(b, sign + n.y * n.y * a, -n.y);
    (t, bt)
}

/// Hermite smoothstep between `edge0` and `edge1`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Rec. 709 relative luminance.
#[inline]
pub fn luminance(c: Vec3) -> f32 {
    0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z
}

/// Normalize, falling back to `fallback` for zero-length vectors.
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len > 1e-12 && len.is_finite() {
        v / len
    } else {
        fallback
    }
}

/// Newell's method polygon normal (robust for slightly non-planar faces).
pub fn polygon_normal(points: &[Vec3]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_expand() {
        let mut b = Aabb::EMPTY;
        assert!(b.is_empty());
        b.expand_by_point(Vec3::new(1.0, 2.0, 3.0));
        b.expand_by_point(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(b.min, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 5.0));
        assert_eq!(b.center(), Vec3::new(0.0, 1.0, 4.0));
    }

    #[test]
    fn test_aabb_slab() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let origin = Vec3::new(-5.0, 0.0, 0.0);
        let inv = Vec3::new(1.0, 0.0, 0.0).recip();
        let t = b.hit_distance(origin, inv, 0.0, 100.0).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!(b.hit_distance(origin, inv, 0.0, 3.0).is_none());

        let inv = Vec3::new(-1.0, 0.0, 0.0).recip();
        assert!(b.hit_distance(origin, inv, 0.0, 100.0).is_none());
    }

    #[test]
    fn test_basis_is_orthonormal() {
        for n in [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
            Vec3::new(0.3, -0.5, 0.8).normalize(),
        ] {
            let (t, b) = orthonormal_basis(n);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_smoothstep() {
        assert_eq!(smoothstep(0.5, 0.9, 0.2), 0.0);
        assert_eq!(smoothstep(0.5, 0.9, 0.95), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_polygon_normal() {
        let quad = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!((polygon_normal(&quad) - Vec3::Z).length() < 1e-6);
    }
}
