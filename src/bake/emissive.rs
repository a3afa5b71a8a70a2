//! Emissive surface table loaded from `lights.rad`.
//!
//! ```text
//! // comment
//! # comment
//! lamp_panel   255 240 200   4.0
//! ```
//! Each entry is `material r g b intensity`, colour components in 0..=255.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::accel::TriangleSoup;
use crate::scene::{MaterialId, Scene};
use crate::util::{Result, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    /// Linear colour in 0..=1.
    pub color: Vec3,
    pub intensity: f32,
}

impl Emission {
    #[inline]
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Parsed `lights.rad` line before material resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissiveEntry {
    pub material: String,
    pub emission: Emission,
}

/// Parse `lights.rad` text. Malformed lines are logged and skipped.
pub fn parse_lights_rad(text: &str) -> Vec<EmissiveEntry> {
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('/') || line.starts_with('#') {
            continue;
        }
        match parse_entry(line) {
            Some(entry) => entries.push(entry),
            None => warn!(line = line_no + 1, text = line, "Malformed lights.rad entry"),
        }
    }
    entries
}

fn parse_entry(line: &str) -> Option<EmissiveEntry> {
    let mut parts = line.split_whitespace();
    let material = parts.next()?.to_string();
    let mut channel = || parts.next()?.parse::<u8>().ok();
    let (r, g, b) = (channel()?, channel()?, channel()?);
    let intensity = parts.next()?.parse::<f32>().ok()?;
    Some(EmissiveEntry {
        material,
        emission: Emission {
            color: Vec3::new(r.into(), g.into(), b.into()) / 255.0,
            intensity,
        },
    })
}

/// Materials that act as light sources when hit by an indirect ray.
#[derive(Debug, Clone, Default)]
pub struct EmissiveTable {
    materials: HashMap<MaterialId, Emission>,
}

impl EmissiveTable {
    /// Load and resolve `path` against the scene's materials.
    ///
    /// A missing file yields an empty table.
    pub fn load(path: &Path, scene: &Scene) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No emissive surface file, skipping");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::resolve(&parse_lights_rad(&text), scene))
    }

    /// Keep entries whose material exists and is drawable.
    pub fn resolve(entries: &[EmissiveEntry], scene: &Scene) -> Self {
        let mut materials = HashMap::new();
        for entry in entries {
            let Some(id) = scene.find_material(&entry.material) else {
                warn!(material = %entry.material, "Emissive material not found");
                continue;
            };
            if scene.material(id).is_some_and(|m| m.no_draw) {
                warn!(material = %entry.material, "Skipping emissive no-draw material");
                continue;
            }
            materials.insert(id, entry.emission);
        }
        info!(count = materials.len(), "Emissive materials loaded");
        Self { materials }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<Emission> {
        self.materials.get(&id).copied()
    }

    /// Emission of a traced primitive: the face's base layer for brush
    /// triangles, the mesh material for model triangles.
    pub fn at_prim(&self, scene: &Scene, soup: &TriangleSoup, prim: u32) -> Option<Emission> {
        if self.is_empty() {
            return None;
        }
        let material = match soup.prim_faces.get(prim as usize).copied().flatten() {
            Some(face) => scene.face(face).and_then(|f| f.base_material()),
            None => soup.prim_materials.get(prim as usize).copied().flatten(),
        };
        material.and_then(|id| self.get(id))
    }
}
