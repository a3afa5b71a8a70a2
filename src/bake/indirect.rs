//! Single-bounce Monte Carlo estimate of indirect light.

use crate::accel::{Hit, RayQuery, PACKET_SIZE};
use crate::util::rng::{sample_cosine_hemisphere, SampleRng};
use crate::util::{Ray, Vec3, Vec4Swizzles, SURFACE_BIAS};

use super::direct::direct_light;
use super::BakeContext;

/// Averaged indirect light at one sample point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndirectLight {
    pub radiance: Vec3,
    /// Normalized dominant incoming direction (zero when nothing arrives).
    pub direction: Vec3,
}

/// Radiance carried back along `dir` by one traced sample.
fn sample_radiance(ctx: &BakeContext<'_>, origin: Vec3, dir: Vec3, hit: Option<Hit>) -> Vec3 {
    let Some(hit) = hit else {
        return Vec3::ZERO;
    };
    let soup = ctx.tracer.soup();
    if let Some(emission) = ctx.emissive.at_prim(ctx.scene, soup, hit.prim_id) {
        return emission.radiance();
    }
    if hit.normal.dot(dir) >= 0.0 {
        return Vec3::ZERO;
    }
    let hit_point = origin + dir * hit.distance;
    let albedo = ctx.reflectivity.at_prim(soup, hit.prim_id).xyz();
    direct_light(ctx, hit_point, hit.normal).radiance * albedo
}

/// Estimate indirect light at `p` with unit normal `n` from `samples`
/// cosine-weighted rays.
///
/// Rays go out in packets of [`PACKET_SIZE`]; the remainder is traced one
/// by one. Directions are drawn in the same order either way, so the
/// estimate does not depend on packet support.
pub fn indirect_light(
    ctx: &BakeContext<'_>,
    p: Vec3,
    n: Vec3,
    rng: &mut SampleRng,
    samples: u32,
    bounces: u32,
) -> IndirectLight {
    if bounces == 0 || samples == 0 {
        return IndirectLight::default();
    }
    let origin = p + n * SURFACE_BIAS;
    let mut radiance = Vec3::ZERO;
    let mut weighted_dir = Vec3::ZERO;
    let mut accumulate = |dir: Vec3, hit: Option<Hit>| {
        let c = sample_radiance(ctx, origin, dir, hit);
        radiance += c;
        weighted_dir += dir * c.length();
    };

    let samples = samples as usize;
    let full_packets = samples / PACKET_SIZE;
    let mut rays = [Ray::infinite(origin, n); PACKET_SIZE];
    let mut hits = [None; PACKET_SIZE];
    for _ in 0..full_packets {
        for ray in rays.iter_mut() {
            *ray = Ray::infinite(origin, sample_cosine_hemisphere(rng, n));
        }
        ctx.tracer.intersect_packet(&rays, &mut hits);
        for (ray, hit) in rays.iter().zip(hits) {
            accumulate(ray.dir, hit);
        }
    }
    for _ in full_packets * PACKET_SIZE..samples {
        let dir = sample_cosine_hemisphere(rng, n);
        let hit = ctx.tracer.intersect(&Ray::infinite(origin, dir));
        accumulate(dir, hit);
    }

    IndirectLight {
        radiance: radiance / samples as f32,
        direction: weighted_dir.normalize_or_zero(),
    }
}
