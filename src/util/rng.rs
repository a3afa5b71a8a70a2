//! Deterministic sampling helpers.
//!
//! Every sample point owns its own generator, seeded purely from its world
//! position, so a texel always draws the same directions no matter which
//! worker thread bakes it or in which order jobs complete.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::math::{orthonormal_basis, Vec3};

/// Generator used for all Monte Carlo sampling in the baker.
pub type SampleRng = ChaCha8Rng;

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Hash a world-space position into a 64-bit seed.
///
/// `-0.0` and `0.0` hash identically.
pub fn position_seed(p: Vec3) -> u64 {
    let bits = |v: f32| if v == 0.0 { 0u32 } else { v.to_bits() };
    let mut h = 0x243F_6A88_85A3_08D3u64;
    for c in [p.x, p.y, p.z] {
        h = splitmix64(h ^ u64::from(bits(c)));
    }
    h
}

/// Generator seeded from a world-space position.
pub fn rng_for_position(p: Vec3) -> SampleRng {
    SampleRng::seed_from_u64(position_seed(p))
}

/// Cosine-weighted direction in the hemisphere around unit normal `n`.
///
/// Polar disk mapping (`r = sqrt(u1)`, `phi = 2*pi*u2`)
/// lifted to the hemisphere and rotated into the normal frame.
pub fn cosine_hemisphere(n: Vec3, u1: f32, u2: f32) -> Vec3 {
    let r = u1.sqrt();
    let phi = std::f32::consts::TAU * u2;
    let x = r * phi.cos();
    let y = r * phi.sin();
    let z = (1.0 - u1).max(0.0).sqrt();
    let (t, b) = orthonormal_basis(n);
    (t * x + b * y + n * z).normalize_or(n)
}

/// Uniform direction on the unit sphere.
pub fn uniform_sphere(u1: f32, u2: f32) -> Vec3 {
    let z = 1.0 - 2.0 * u1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = std::f32::consts::TAU * u2;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Draw a cosine-weighted hemisphere direction from `rng`.
#[inline]
pub fn sample_cosine_hemisphere<R: Rng>(rng: &mut R, n: Vec3) -> Vec3 {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    cosine_hemisphere(n, u1, u2)
}

/// Draw a uniform sphere direction from `rng`.
#[inline]
pub fn sample_uniform_sphere<R: Rng>(rng: &mut R) -> Vec3 {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    uniform_sphere(u1, u2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_stable() {
        let p = Vec3::new(1.25, -3.5, 7.0);
        assert_eq!(position_seed(p), position_seed(p));
        assert_ne!(position_seed(p), position_seed(p + Vec3::X * 1e-3));
        assert_eq!(position_seed(Vec3::new(0.0, 1.0, 2.0)), position_seed(Vec3::new(-0.0, 1.0, 2.0)));
    }

    #[test]
    fn test_same_position_same_stream() {
        let p = Vec3::new(4.0, 5.0, 6.0);
        let mut a = rng_for_position(p);
        let mut b = rng_for_position(p);
        for _ in 0..32 {
            assert_eq!(a.random::<u32>(), b.random::<u32>());
        }
    }

    #[test]
    fn test_cosine_hemisphere_stays_above_surface() {
        let n = Vec3::new(0.2, 0.9, -0.1).normalize();
        let mut rng = rng_for_position(Vec3::ONE);
        for _ in 0..256 {
            let d = sample_cosine_hemisphere(&mut rng, n);
            assert!((d.length() - 1.0).abs() < 1e-4);
            assert!(d.dot(n) >= -1e-5);
        }
    }

    #[test]
    fn test_uniform_sphere_is_unit() {
        let mut rng = rng_for_position(Vec3::ZERO);
        for _ in 0..64 {
            let d = sample_uniform_sphere(&mut rng);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }
}
