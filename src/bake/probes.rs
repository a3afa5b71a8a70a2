//! Ambient probe placement and evaluation.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::accel::{RayQuery, PACKET_SIZE};
use crate::io::AmbientProbe;
use crate::scene::Scene;
use crate::util::rng::{rng_for_position, sample_uniform_sphere};
use crate::util::{Aabb, IVec3, Ray, Vec3};

use super::direct::direct_light;
use super::indirect::indirect_light;
use super::BakeContext;

/// Probe faces, in file order.
pub const PROBE_AXES: [Vec3; 6] = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

/// World bounds of every solid brush with geometry.
fn brush_bounds(scene: &Scene) -> Vec<Aabb> {
    scene
        .brushes
        .iter()
        .filter(|b| !b.kind.is_volume())
        .filter_map(|b| {
            let mut bounds = Aabb::EMPTY;
            for face in &b.faces {
                for p in b.world_vertices(face) {
                    bounds.expand_by_point(p);
                }
            }
            (!bounds.is_empty()).then_some(bounds)
        })
        .collect()
}

/// Lattice points at `spacing` inside any eligible brush's bounds.
///
/// Points are snapped to one global lattice, so overlapping bounds do not
/// produce duplicates. Output is z-major, then y, then x.
pub fn candidate_positions(scene: &Scene, spacing: f32) -> Vec<Vec3> {
    let mut cells = BTreeSet::new();
    for bounds in brush_bounds(scene) {
        let lo = (bounds.min / spacing).ceil();
        let hi = (bounds.max / spacing).floor();
        if !lo.is_finite() || !hi.is_finite() {
            continue;
        }
        let (lo, hi) = (lo.as_ivec3(), hi.as_ivec3());
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    cells.insert((z, y, x));
                }
            }
        }
    }
    cells
        .into_iter()
        .map(|(z, y, x)| IVec3::new(x, y, z).as_vec3() * spacing)
        .collect()
}

/// Validation rays also count surfaces within this distance behind their
/// origin, so lattice points lying on a brush face see that face.
const CONTACT_EPSILON: f32 = 1e-4;

/// Fraction of short random rays from `p` that hit geometry.
pub fn occlusion_ratio(ctx: &BakeContext<'_>, p: Vec3) -> f32 {
    let count = ctx.settings.probe_validation_rays as usize;
    if count == 0 {
        return 0.0;
    }
    let mut rng = rng_for_position(p);
    let length = ctx.settings.probe_validation_distance;
    let rays: Vec<Ray> = (0..count)
        .map(|_| Ray::new(p, sample_uniform_sphere(&mut rng), length).touching(CONTACT_EPSILON))
        .collect();
    let mut blocked = vec![false; count];
    for (rays, out) in rays.chunks(PACKET_SIZE).zip(blocked.chunks_mut(PACKET_SIZE)) {
        ctx.tracer.occluded_packet(rays, out);
    }
    blocked.iter().filter(|&&b| b).count() as f32 / count as f32
}

/// Light arriving at `p` along each axis, scaled for the runtime.
pub fn evaluate_probe(ctx: &BakeContext<'_>, p: Vec3) -> AmbientProbe {
    let settings = ctx.settings;
    let mut rng = rng_for_position(p);
    let mut colors = [Vec3::ZERO; 6];
    let mut weighted_dir = Vec3::ZERO;
    for (axis, color) in PROBE_AXES.iter().zip(colors.iter_mut()) {
        let direct = direct_light(ctx, p, *axis);
        let indirect = indirect_light(
            ctx,
            p,
            *axis,
            &mut rng,
            settings.probe_indirect_samples,
            settings.bounces,
        );
        *color = (direct.radiance + indirect.radiance) * settings.probe_scale;
        weighted_dir += direct.direction + indirect.direction * indirect.radiance.length();
    }
    AmbientProbe {
        position: p,
        colors,
        dominant_direction: weighted_dir.normalize_or_zero(),
    }
}

/// Place probes in open space and evaluate them.
///
/// Candidates whose occlusion ratio exceeds `probe_max_hit_ratio` sit in or
/// against solid geometry and are dropped.
#[tracing::instrument(skip_all)]
pub fn generate_probes(ctx: &BakeContext<'_>) -> Vec<AmbientProbe> {
    let candidates = candidate_positions(ctx.scene, ctx.settings.probe_spacing);
    let max_ratio = ctx.settings.probe_max_hit_ratio;
    let probes: Vec<AmbientProbe> = candidates
        .iter()
        .filter(|&&p| occlusion_ratio(ctx, p) <= max_ratio)
        .map(|&p| evaluate_probe(ctx, p))
        .collect();
    debug!(rejected = candidates.len() - probes.len(), "Probe validation done");
    info!(candidates = candidates.len(), probes = probes.len(), "Ambient probes evaluated");
    probes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::testing::{quad_at, Fixture};
    use crate::scene::{Brush, BrushKind};

    #[test]
    fn test_candidates_dedupe_and_skip_volumes() {
        let mut scene = Scene::default();
        let a = quad_at(0.0, 1.0); // x,z in [-1, 1], y = 0
        let mut b = quad_at(0.0, 1.0);
        b.transform = crate::util::Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let water = Brush {
            kind: BrushKind::Water,
            ..quad_at(5.0, 3.0)
        };
        scene.brushes = vec![a, b, water];
        let cells = candidate_positions(&scene, 1.0);
        // x in -1..=2, z in -1..=1, y = 0
        assert_eq!(cells.len(), 4 * 3);
        assert!(cells.iter().all(|p| p.y == 0.0));
        let unique: BTreeSet<_> = cells.iter().map(|p| p.to_array().map(f32::to_bits)).collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn test_occlusion_ratio() {
        let mut fx = Fixture::new(vec![quad_at(0.0, 10.0)]);
        fx.settings.probe_validation_rays = 256;
        fx.with_ctx(|ctx| {
            // far from everything
            assert_eq!(occlusion_ratio(ctx, Vec3::new(0.3, 5.0, 0.2)), 0.0);
            // resting on the floor: the lower half of the rays hit it
            let r = occlusion_ratio(ctx, Vec3::new(0.3, 0.01, 0.2));
            assert!(r > 0.25, "ratio {r}");
        });
    }

    #[test]
    fn test_point_on_face_is_occluded() {
        // default validation: 16 rays of length 0.5
        let fx = Fixture::new(vec![quad_at(0.0, 4.0)]);
        fx.with_ctx(|ctx| {
            for p in [Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 0.0), Vec3::new(-4.0, 0.0, 2.0)] {
                let r = occlusion_ratio(ctx, p);
                assert!(r > ctx.settings.probe_max_hit_ratio, "{p} ratio {r}");
            }
        });
    }

    #[test]
    fn test_probe_sees_sun_from_above() {
        let mut fx = Fixture::new(vec![quad_at(0.0, 10.0)]);
        fx.scene.sun.enabled = true;
        fx.settings.bounces = 0;
        fx.with_ctx(|ctx| {
            let probe = evaluate_probe(ctx, Vec3::new(0.3, 2.0, 0.2));
            // +Y face gets the sun, scaled
            assert!((probe.colors[2] - Vec3::splat(2.2)).length() < 1e-4);
            assert_eq!(probe.colors[3], Vec3::ZERO);
            assert!((probe.dominant_direction - Vec3::Y).length() < 1e-5);
        });
    }
}
