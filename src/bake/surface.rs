//! Per-job bake pipelines for brush faces, decals and model vertices.
//!
//! Faces and decals are mapped to a planar lightmap, every texel centre is
//! lit, then the buffers go through the filter chain:
//! ```text
//! indirect ─ denoise ─┐
//! direct - sun ───────┴─ + ─ gaussian blur ─┬─ pad ─ .hdr
//! direction ───────── guided filter (luma) ─┴─ pad ─ .png
//! ```

use std::path::Path;

use tracing::debug;

use crate::config::{BakeSettings, MIN_LIGHTMAP_SIZE};
use crate::filter::{gaussian_blur, guided_filter, pad, TexelBuffer};
use crate::io::{write_direction_png, write_hdr};
use crate::scene::{FaceRef, Scene};
use crate::util::rng::rng_for_position;
use crate::util::{normalize_or, polygon_normal, Error, Mat3, Result, Vec3, Vec4Swizzles};

use super::direct::direct_light;
use super::indirect::indirect_light;
use super::jobs::VertexLightBuffers;
use super::BakeContext;

/// Lightmap edge for a world extent: `ceil(extent * texels_per_unit)`
/// clamped to `[4, resolution]`.
pub fn lightmap_size(extent: f32, texels_per_unit: f32, resolution: u32) -> usize {
    let texels = (extent * texels_per_unit).ceil();
    let texels = if texels.is_finite() && texels > 0.0 { texels as u32 } else { 0 };
    texels.clamp(MIN_LIGHTMAP_SIZE, resolution.max(MIN_LIGHTMAP_SIZE)) as usize
}

/// Tangent frame whose first axis comes from the world axis least aligned
/// with the normal's dominant component.
pub fn plane_frame(n: Vec3) -> (Vec3, Vec3) {
    let a = n.abs();
    let seed = if a.x >= a.y && a.x >= a.z { Vec3::Z } else { Vec3::X };
    let t = normalize_or(seed - n * n.dot(seed), Vec3::X);
    (t, n.cross(t))
}

/// Planar lightmap covering a polygon's bounds in its own plane.
#[derive(Debug, Clone, PartialEq)]
pub struct LightmapRect {
    pub width: usize,
    pub height: usize,
    pub normal: Vec3,
    corner: Vec3,
    step_u: Vec3,
    step_v: Vec3,
}

impl LightmapRect {
    /// Fit a rectangle around `points` (coplanar, unit normal `n`).
    pub fn fit(points: &[Vec3], n: Vec3, settings: &BakeSettings) -> Self {
        let (t, b) = plane_frame(n);
        let origin = points.first().copied().unwrap_or(Vec3::ZERO);
        let (mut min_u, mut max_u) = (f32::INFINITY, f32::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f32::INFINITY, f32::NEG_INFINITY);
        for &p in points {
            let d = p - origin;
            let (u, v) = (d.dot(t), d.dot(b));
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let (extent_u, extent_v) = ((max_u - min_u).max(0.0), (max_v - min_v).max(0.0));
        let width = lightmap_size(extent_u, settings.texels_per_unit, settings.resolution);
        let height = lightmap_size(extent_v, settings.texels_per_unit, settings.resolution);
        Self {
            width,
            height,
            normal: n,
            corner: origin + t * min_u + b * min_v,
            step_u: t * (extent_u / width as f32),
            step_v: b * (extent_v / height as f32),
        }
    }

    /// World position of texel `(x, y)`'s centre.
    #[inline]
    pub fn texel_center(&self, x: usize, y: usize) -> Vec3 {
        self.corner + self.step_u * (x as f32 + 0.5) + self.step_v * (y as f32 + 0.5)
    }
}

/// Unfiltered per-texel light.
struct RawLight {
    direct: TexelBuffer<Vec3>,
    sun: TexelBuffer<Vec3>,
    indirect: TexelBuffer<Vec3>,
    direction: TexelBuffer<Vec3>,
}

/// Direct and indirect light plus their combined dominant direction.
struct SampleLight {
    direct: Vec3,
    sun: Vec3,
    indirect: Vec3,
    direction: Vec3,
}

fn light_sample(ctx: &BakeContext<'_>, p: Vec3, n: Vec3, samples: u32) -> SampleLight {
    let mut rng = rng_for_position(p);
    let direct = direct_light(ctx, p, n);
    let indirect = indirect_light(ctx, p, n, &mut rng, samples, ctx.settings.bounces);
    let direction = (direct.direction + indirect.direction * indirect.radiance.length()).normalize_or_zero();
    SampleLight {
        direct: direct.radiance,
        sun: direct.sun,
        indirect: indirect.radiance,
        direction,
    }
}

fn light_rect(ctx: &BakeContext<'_>, rect: &LightmapRect) -> RawLight {
    let (w, h) = (rect.width, rect.height);
    let mut raw = RawLight {
        direct: TexelBuffer::new(w, h, Vec3::ZERO),
        sun: TexelBuffer::new(w, h, Vec3::ZERO),
        indirect: TexelBuffer::new(w, h, Vec3::ZERO),
        direction: TexelBuffer::new(w, h, Vec3::ZERO),
    };
    for y in 0..h {
        for x in 0..w {
            let s = light_sample(ctx, rect.texel_center(x, y), rect.normal, ctx.settings.indirect_samples);
            raw.direct.set(x, y, s.direct);
            raw.sun.set(x, y, s.sun);
            raw.indirect.set(x, y, s.indirect);
            raw.direction.set(x, y, s.direction);
        }
    }
    raw
}

/// Filtered, padded colour and direction maps ready to write.
pub struct Lightmap {
    pub color: TexelBuffer<Vec3>,
    pub direction: TexelBuffer<Vec3>,
}

fn filter_light(ctx: &BakeContext<'_>, raw: RawLight, albedo: Vec3, normal: Vec3) -> Result<Lightmap> {
    let settings = ctx.settings;
    let (w, h) = (raw.indirect.width(), raw.indirect.height());

    let indirect = if raw.indirect.is_all_zero() {
        raw.indirect
    } else {
        let albedo = TexelBuffer::new(w, h, albedo);
        let normals = TexelBuffer::new(w, h, normal);
        ctx.denoiser.denoise(&raw.indirect, &albedo, &normals)?
    };

    let color = raw
        .direct
        .zip_map(&raw.sun, |d, s| d - s)
        .zip_map(&indirect, |c, i| c + i);
    let color = gaussian_blur(&color, settings.blur_radius as usize);

    let direction = guided_filter(
        &raw.direction,
        &color.luminance(),
        settings.guided_radius as usize,
        settings.guided_epsilon,
    )?
    .map(|d| d.normalize_or_zero());

    let border = settings.padding as usize;
    Ok(Lightmap {
        color: pad(&color, border),
        direction: pad(&direction, border),
    })
}

/// Light and filter one planar rectangle.
pub fn bake_rect(ctx: &BakeContext<'_>, rect: &LightmapRect, albedo: Vec3) -> Result<Lightmap> {
    let raw = light_rect(ctx, rect);
    filter_light(ctx, raw, albedo, rect.normal)
}

fn write_lightmap(map: &Lightmap, color_path: &Path, dir_path: &Path) -> Result<()> {
    write_hdr(color_path, &map.color)?;
    write_direction_png(dir_path, &map.direction)
}

/// Bake `face_<i>_color.hdr` / `face_<i>_dir.png` for one brush face.
pub fn process_brush_face(ctx: &BakeContext<'_>, brush: usize, face: usize, output_dir: &Path) -> Result<()> {
    let b = ctx
        .scene
        .brushes
        .get(brush)
        .ok_or_else(|| Error::invalid_scene(format!("brush {brush} does not exist")))?;
    let f = b
        .faces
        .get(face)
        .ok_or_else(|| Error::invalid_scene(format!("brush {brush} has no face {face}")))?;

    let verts = b.world_vertices(f);
    let n = polygon_normal(&verts);
    if verts.len() < 3 || n == Vec3::ZERO {
        debug!(brush, face, "Degenerate face, nothing to bake");
        return Ok(());
    }

    let rect = LightmapRect::fit(&verts, n, ctx.settings);
    let albedo = ctx.reflectivity.face(FaceRef::new(brush, face)).xyz();
    let map = bake_rect(ctx, &rect, albedo)?;
    write_lightmap(
        &map,
        &output_dir.join(format!("face_{face}_color.hdr")),
        &output_dir.join(format!("face_{face}_dir.png")),
    )
}

/// Bake `lightmap_color.hdr` / `lightmap_dir.png` for one decal.
pub fn process_decal(ctx: &BakeContext<'_>, decal: usize, output_dir: &Path) -> Result<()> {
    let d = ctx
        .scene
        .decals
        .get(decal)
        .ok_or_else(|| Error::invalid_scene(format!("decal {decal} does not exist")))?;

    let n = normalize_or(d.normal, Vec3::Y);
    let (t, b) = plane_frame(n);
    let (hu, hv) = (t * d.size.x * 0.5, b * d.size.y * 0.5);
    let corners = [
        d.position - hu - hv,
        d.position + hu - hv,
        d.position + hu + hv,
        d.position - hu + hv,
    ];
    let rect = LightmapRect::fit(&corners, n, ctx.settings);
    let albedo = ctx.reflectivity.material(d.material).xyz();
    let map = bake_rect(ctx, &rect, albedo)?;
    write_lightmap(
        &map,
        &output_dir.join("lightmap_color.hdr"),
        &output_dir.join("lightmap_dir.png"),
    )
}

/// Light one model vertex into its slot of `output`.
///
/// A single sample has no neighbourhood, so no image filter runs.
pub fn process_model_vertex(
    ctx: &BakeContext<'_>,
    model: usize,
    vertex: usize,
    output: &VertexLightBuffers,
) -> Result<()> {
    let (p, n) = ctx
        .frames
        .vertex(model, vertex)
        .ok_or_else(|| Error::invalid_scene(format!("model {model} has no vertex {vertex}")))?;
    let s = light_sample(ctx, p, n, ctx.settings.indirect_samples);
    let color = s.direct - s.sun + s.indirect;
    output.set(vertex, color.extend(1.0), s.direction.extend(1.0));
    Ok(())
}

/// World-space positions and normals of every static model's vertices.
#[derive(Debug, Default)]
pub struct ModelFrames {
    models: Vec<Option<Vec<(Vec3, Vec3)>>>,
}

impl ModelFrames {
    /// Transform static meshes to world space. Meshes without a normal per
    /// vertex get area-weighted normals from their triangles.
    pub fn build(scene: &Scene) -> Self {
        let models = scene
            .objects
            .iter()
            .map(|object| -> Option<Vec<(Vec3, Vec3)>> {
                let mesh = object.static_mesh()?;
                let positions: Vec<Vec3> = mesh
                    .positions
                    .iter()
                    .map(|&p| object.transform.transform_point3(p))
                    .collect();

                let normals: Vec<Vec3> = if mesh.normals.len() == mesh.positions.len() {
                    let normal_matrix = Mat3::from_mat4(object.transform).inverse().transpose();
                    mesh.normals.iter().map(|&n| normal_matrix * n).collect()
                } else {
                    let mut acc = vec![Vec3::ZERO; positions.len()];
                    for idx in mesh.indices.chunks_exact(3) {
                        let [a, b, c] = [idx[0] as usize, idx[1] as usize, idx[2] as usize];
                        if a.max(b).max(c) >= positions.len() {
                            continue;
                        }
                        // Unnormalized cross product weights by area
                        let face_n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
                        acc[a] += face_n;
                        acc[b] += face_n;
                        acc[c] += face_n;
                    }
                    acc
                };

                Some(
                    positions
                        .into_iter()
                        .zip(normals)
                        .map(|(p, n)| (p, normalize_or(n, Vec3::Y)))
                        .collect(),
                )
            })
            .collect();
        Self { models }
    }

    #[inline]
    pub fn vertex(&self, model: usize, vertex: usize) -> Option<(Vec3, Vec3)> {
        self.models.get(model)?.as_ref()?.get(vertex).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::testing::{quad_at, Fixture};
    use crate::scene::{Mesh, SceneObject, Sun};
    use crate::util::Mat4;

    #[test]
    fn test_lightmap_size_clamps() {
        assert_eq!(lightmap_size(0.0, 8.0, 64), 4);
        assert_eq!(lightmap_size(0.1, 8.0, 64), 4);
        assert_eq!(lightmap_size(2.0, 8.0, 64), 16);
        assert_eq!(lightmap_size(1.01, 8.0, 64), 9);
        assert_eq!(lightmap_size(100.0, 8.0, 64), 64);
        assert_eq!(lightmap_size(100.0, 8.0, 2), 4);
        assert_eq!(lightmap_size(f32::NAN, 8.0, 64), 4);
    }

    #[test]
    fn test_rect_texels_lie_on_face() {
        let settings = BakeSettings::default();
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let pts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(-1.0, 1.0, 2.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let rect = LightmapRect::fit(&pts, n, &settings);
        assert_eq!(rect.width, 16);
        assert_eq!(rect.height, 12);
        for (x, y) in [(0, 0), (15, 11), (7, 3)] {
            let p = rect.texel_center(x, y);
            assert!(n.dot(p).abs() < 1e-5, "texel {x},{y} off plane");
            assert!(p.z > 0.0 && p.z < 2.0);
        }
    }

    #[test]
    fn test_plane_frame_is_orthonormal() {
        for n in [Vec3::X, Vec3::NEG_Y, Vec3::Z, Vec3::new(0.3, -0.4, 0.866).normalize()] {
            let (t, b) = plane_frame(n);
            assert!(t.dot(n).abs() < 1e-6);
            assert!(b.dot(n).abs() < 1e-6);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_model_frames() {
        let scene = Scene {
            objects: vec![
                SceneObject {
                    transform: Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)),
                    mesh: Some(Mesh {
                        positions: vec![Vec3::ZERO, Vec3::Z, Vec3::X],
                        indices: vec![0, 1, 2],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                SceneObject {
                    mass: 2.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let frames = ModelFrames::build(&scene);
        let (p, n) = frames.vertex(0, 2).unwrap();
        assert_eq!(p, Vec3::new(1.0, 3.0, 0.0));
        assert!((n - Vec3::Y).length() < 1e-6);
        assert!(frames.vertex(1, 0).is_none());
        assert!(frames.vertex(0, 3).is_none());
    }

    #[test]
    fn test_sun_only_face_bakes_to_zero() {
        // The sun is subtracted back out of the stored colour.
        let mut fx = Fixture::new(vec![quad_at(0.0, 1.0)]);
        fx.scene.sun = Sun {
            enabled: true,
            ..Default::default()
        };
        fx.settings.bounces = 0;
        fx.with_ctx(|ctx| {
            let b = &ctx.scene.brushes[0];
            let verts = b.world_vertices(&b.faces[0]);
            let rect = LightmapRect::fit(&verts, Vec3::Y, ctx.settings);
            let map = bake_rect(ctx, &rect, Vec3::splat(0.5)).unwrap();
            assert_eq!(map.color.width(), rect.width + 4);
            assert!(map.color.data().iter().all(|c| c.abs().max_element() < 1e-6));
            // the direction still points at the sun
            assert!(map.direction.data().iter().all(|d| d.y > 0.99));
        });
    }
}
