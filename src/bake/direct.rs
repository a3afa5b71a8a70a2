//! Direct light from the sun and static point/spot lights.

use crate::accel::RayQuery;
use crate::scene::{Light, LightKind};
use crate::util::{normalize_or, smoothstep, Ray, Vec3, SURFACE_BIAS};

use super::BakeContext;

/// Most surfaces a shadow ray walks through before giving up.
pub const MAX_SHADOW_SURFACES: usize = 64;
/// Transmission below which a path counts as fully blocked.
const OPAQUE_TRANSMISSION: f32 = 0.01;

/// Direct light arriving at one sample point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectLight {
    /// Sun plus static lights.
    pub radiance: Vec3,
    /// The sun's share of `radiance`.
    pub sun: Vec3,
    /// Light directions weighted by their radiance magnitude (not normalized).
    pub direction: Vec3,
}

impl DirectLight {
    fn add(&mut self, to_light: Vec3, contribution: Vec3) {
        self.radiance += contribution;
        self.direction += to_light * contribution.length();
    }
}

/// True when the segment from `origin` along `dir` (unit) is blocked.
///
/// The walk passes through translucent surfaces, multiplying transmission
/// by `1 - alpha` at each. It stops as shadowed once transmission falls
/// below 0.01; otherwise a path counts as shadowed if any surface
/// attenuated it at all.
pub fn is_in_shadow(ctx: &BakeContext<'_>, origin: Vec3, dir: Vec3, max_distance: f32) -> bool {
    let mut transmission = 1.0f32;
    let mut origin = origin;
    let mut remaining = max_distance;

    for _ in 0..MAX_SHADOW_SURFACES {
        let Some(hit) = ctx.tracer.intersect(&Ray::new(origin, dir, remaining)) else {
            return transmission < 1.0;
        };
        let alpha = ctx.reflectivity.at_prim(ctx.tracer.soup(), hit.prim_id).w;
        transmission *= 1.0 - alpha.clamp(0.0, 1.0);
        if transmission < OPAQUE_TRANSMISSION {
            return true;
        }
        let step = hit.distance + SURFACE_BIAS;
        origin += dir * step;
        remaining -= step;
        if remaining <= 0.0 {
            break;
        }
    }
    transmission < 1.0
}

/// Spot cone falloff: 1 inside the inner cone, 0 outside the outer one.
pub fn spot_factor(light: &Light, to_light: Vec3) -> f32 {
    match light.kind {
        LightKind::Point => 1.0,
        LightKind::Spot {
            inner_angle,
            outer_angle,
        } => {
            let axis = normalize_or(light.direction, Vec3::NEG_Y);
            let cos_inner = inner_angle.to_radians().cos();
            let cos_outer = outer_angle.to_radians().cos();
            smoothstep(cos_outer, cos_inner, (-to_light).dot(axis))
        }
    }
}

/// `max(0, 1 - d/r)^2 / (d^2 + 1)`
#[inline]
pub fn attenuation(distance: f32, radius: f32) -> f32 {
    let falloff = (1.0 - distance / radius).max(0.0);
    falloff * falloff / (distance * distance + 1.0)
}

/// Evaluate direct light at `p` with unit normal `n`.
pub fn direct_light(ctx: &BakeContext<'_>, p: Vec3, n: Vec3) -> DirectLight {
    let mut out = DirectLight::default();
    let origin = p + n * SURFACE_BIAS;

    let sun = &ctx.scene.sun;
    if sun.enabled {
        let to_sun = normalize_or(-sun.direction, Vec3::Y);
        let ndotl = n.dot(to_sun).max(0.0);
        if ndotl > 0.0 && !is_in_shadow(ctx, origin, to_sun, f32::INFINITY) {
            let c = sun.color * sun.intensity * ndotl;
            out.sun += c;
            out.add(to_sun, c);
        }
    }

    for light in ctx.scene.lights.iter().filter(|l| l.is_static) {
        let to_light = light.position - p;
        let distance = to_light.length();
        if distance > light.radius || distance <= 0.0 {
            continue;
        }
        let l = to_light / distance;
        let ndotl = n.dot(l);
        if ndotl <= 0.0 {
            continue;
        }
        let falloff = attenuation(distance, light.radius) * spot_factor(light, l);
        if falloff <= 0.0 {
            continue;
        }
        let to_origin = light.position - origin;
        let shadow_len = to_origin.length() - SURFACE_BIAS;
        if shadow_len > 0.0 && is_in_shadow(ctx, origin, to_origin / to_origin.length(), shadow_len) {
            continue;
        }
        out.add(l, light.color * light.intensity * ndotl * falloff);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::testing::{quad_at, Fixture};
    use crate::scene::{Light, Sun};

    #[test]
    fn test_attenuation() {
        assert_eq!(attenuation(0.0, 10.0), 1.0);
        assert_eq!(attenuation(10.0, 10.0), 0.0);
        assert!((attenuation(5.0, 10.0) - 0.25 / 26.0).abs() < 1e-7);
    }

    #[test]
    fn test_spot_factor() {
        let light = Light {
            kind: LightKind::Spot {
                inner_angle: 20.0,
                outer_angle: 40.0,
            },
            direction: Vec3::NEG_Y,
            ..Default::default()
        };
        // sample straight below the light
        assert_eq!(spot_factor(&light, Vec3::Y), 1.0);
        // 60 degrees off-axis
        let off = Vec3::new(60f32.to_radians().sin(), 60f32.to_radians().cos(), 0.0);
        assert_eq!(spot_factor(&light, off), 0.0);
        let mid = Vec3::new(30f32.to_radians().sin(), 30f32.to_radians().cos(), 0.0);
        let f = spot_factor(&light, mid);
        assert!(f > 0.0 && f < 1.0);
    }

    #[test]
    fn test_sun_facing_surface() {
        let mut fx = Fixture::new(vec![quad_at(0.0, 10.0)]);
        fx.scene.sun = Sun {
            enabled: true,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
        };
        fx.with_ctx(|ctx| {
            let d = direct_light(ctx, Vec3::new(0.0, 0.0, 0.0), Vec3::Y);
            assert!((d.radiance - Vec3::ONE).length() < 1e-5);
            assert_eq!(d.radiance, d.sun);
            assert!((d.direction.normalize() - Vec3::Y).length() < 1e-5);

            // tilted normal scales by N.L
            let n = Vec3::new(0.6, 0.8, 0.0);
            let d = direct_light(ctx, Vec3::ZERO, n);
            assert!((d.radiance - Vec3::splat(0.8)).length() < 1e-5);
        });
    }

    #[test]
    fn test_opaque_blocker_shadows_light() {
        // floor at y = 0, opaque blocker at y = 1, light at y = 2
        let mut fx = Fixture::new(vec![quad_at(0.0, 4.0), quad_at(1.0, 4.0)]);
        fx.scene.lights.push(Light {
            position: Vec3::new(0.25, 2.0, -0.5),
            radius: 10.0,
            ..Default::default()
        });
        fx.with_ctx(|ctx| {
            let below = direct_light(ctx, Vec3::new(0.25, 0.0, -0.5), Vec3::Y);
            assert_eq!(below.radiance, Vec3::ZERO);
            // above the blocker the light is visible
            let above = direct_light(ctx, Vec3::new(0.25, 1.0, -0.5), Vec3::Y);
            assert!(above.radiance.x > 0.0);
        });
    }

    #[test]
    fn test_static_only_and_range() {
        let mut fx = Fixture::new(vec![quad_at(0.0, 4.0)]);
        fx.scene.lights.push(Light {
            position: Vec3::new(0.0, 2.0, 0.0),
            is_static: false,
            ..Default::default()
        });
        fx.scene.lights.push(Light {
            position: Vec3::new(0.0, 20.0, 0.0),
            radius: 5.0,
            ..Default::default()
        });
        fx.with_ctx(|ctx| {
            assert_eq!(direct_light(ctx, Vec3::ZERO, Vec3::Y).radiance, Vec3::ZERO);
        });
    }

    #[test]
    fn test_translucent_surface_counts_as_shadow() {
        let mut fx = Fixture::new(vec![quad_at(1.0, 4.0)]);
        fx.alpha = 0.5;
        fx.with_ctx(|ctx| {
            assert!(is_in_shadow(ctx, Vec3::new(0.25, 0.0, -0.5), Vec3::Y, 5.0));
            assert!(!is_in_shadow(ctx, Vec3::new(0.25, 0.0, -0.5), Vec3::NEG_Y, 5.0));
        });
        fx.alpha = 0.0;
        fx.with_ctx(|ctx| {
            assert!(!is_in_shadow(ctx, Vec3::new(0.25, 0.0, -0.5), Vec3::Y, 5.0));
        });
    }
}
