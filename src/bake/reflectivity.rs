//! Average surface reflectivity per material and per blended brush face.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::{debug, warn};

use crate::accel::TriangleSoup;
use crate::scene::{BrushFace, FaceRef, MaterialId, Scene};
use crate::util::{Result, Vec3, Vec4};

/// Used when a material has no readable diffuse texture.
pub const DEFAULT_REFLECTIVITY: Vec4 = Vec4::new(0.5, 0.5, 0.5, 1.0);

/// Read-only reflectivity tables shared by all workers.
///
/// RGB is the average albedo, alpha the average opacity.
#[derive(Debug, Clone, Default)]
pub struct Reflectivity {
    materials: HashMap<MaterialId, Vec4>,
    faces: HashMap<FaceRef, Vec4>,
}

impl Reflectivity {
    /// Sample every material referenced by faces, decals and static model
    /// meshes, then blend multi-layer brush faces.
    #[tracing::instrument(skip_all, fields(materials = scene.materials.len()))]
    pub fn build(scene: &Scene) -> Self {
        let mut used = BTreeSet::new();
        for brush in scene.brushes.iter().filter(|b| !b.kind.is_volume()) {
            for face in &brush.faces {
                used.extend(face.layers.iter().flatten().copied());
            }
        }
        used.extend(scene.decals.iter().filter_map(|d| d.material));
        used.extend(
            scene
                .objects
                .iter()
                .filter_map(|o| o.static_mesh())
                .filter_map(|m| m.material),
        );

        let mut materials = HashMap::with_capacity(used.len());
        for id in used {
            let value = match scene.material(id).and_then(|m| m.diffuse.as_deref().map(|p| (m, p))) {
                Some((material, path)) => texture_average(path).unwrap_or_else(|e| {
                    warn!(material = %material.name, path = %path.display(), error = %e,
                        "Diffuse texture unreadable, using neutral reflectivity");
                    DEFAULT_REFLECTIVITY
                }),
                None => {
                    debug!(material = id.0, "No diffuse texture, using neutral reflectivity");
                    DEFAULT_REFLECTIVITY
                }
            };
            materials.insert(id, value);
        }

        let mut table = Self {
            materials,
            faces: HashMap::new(),
        };
        for (bi, brush) in scene.brushes.iter().enumerate() {
            if brush.kind.is_volume() {
                continue;
            }
            for (fi, face) in brush.faces.iter().enumerate() {
                let blended = table.blend_face(face);
                table.faces.insert(FaceRef::new(bi, fi), blended);
            }
        }
        debug!(
            materials = table.materials.len(),
            faces = table.faces.len(),
            "Reflectivity tables ready"
        );
        table
    }

    /// Reflectivity of a material, neutral when unknown.
    pub fn material(&self, id: Option<MaterialId>) -> Vec4 {
        id.and_then(|id| self.materials.get(&id).copied())
            .unwrap_or(DEFAULT_REFLECTIVITY)
    }

    /// Blended reflectivity of a brush face.
    pub fn face(&self, face: FaceRef) -> Vec4 {
        self.faces.get(&face).copied().unwrap_or(DEFAULT_REFLECTIVITY)
    }

    /// Reflectivity of the surface a traced primitive came from.
    pub fn at_prim(&self, soup: &TriangleSoup, prim: u32) -> Vec4 {
        match soup.prim_faces.get(prim as usize).copied().flatten() {
            Some(face) => self.face(face),
            None => self.material(soup.prim_materials.get(prim as usize).copied().flatten()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_face_alpha(mut self, alpha: f32) -> Self {
        for v in self.faces.values_mut() {
            v.w = alpha;
        }
        self
    }

    /// Blend up to four layers by the face's average vertex paint.
    ///
    /// Paint r/g/b weight layers 1..=3 and are normalized only when their
    /// sum exceeds one; the base layer takes `1 - (r + g + b)`. Missing
    /// layers reuse the base reflectivity.
    fn blend_face(&self, face: &BrushFace) -> Vec4 {
        let base = self.material(face.base_material());
        if !face.is_blended() {
            return base;
        }
        let paint = face.average_paint();
        let mut weights = Vec3::new(paint.x, paint.y, paint.z);
        let sum = weights.x + weights.y + weights.z;
        if sum > 1.0 {
            weights /= sum;
        }
        let base_weight = 1.0 - (weights.x + weights.y + weights.z);

        let layer = |i: usize| face.layers[i].map_or(base, |id| self.material(Some(id)));
        base * base_weight + layer(1) * weights.x + layer(2) * weights.y + layer(3) * weights.z
    }
}

/// Mean RGBA over every texel of an image file.
pub fn texture_average(path: &Path) -> Result<Vec4> {
    let img = image::open(path)?.to_rgba32f();
    let count = (img.width() as usize * img.height() as usize).max(1);
    // f64 accumulation keeps large textures exact enough
    let mut sum = [0.0f64; 4];
    for px in img.pixels() {
        for (acc, &c) in sum.iter_mut().zip(px.0.iter()) {
            *acc += f64::from(c);
        }
    }
    Ok(Vec4::new(
        (sum[0] / count as f64) as f32,
        (sum[1] / count as f64) as f32,
        (sum[2] / count as f64) as f32,
        (sum[3] / count as f64) as f32,
    ))
}
