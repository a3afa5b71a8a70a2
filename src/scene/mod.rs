//! Scene description consumed by the baker.
//!
//! The editor owns the scene; the baker reads brushes, decals, model
//! instances, lights, the sun and the material table, and only writes back
//! the location of the generated ambient probe file once a bake finishes.
//!
//! Scenes can be exchanged as JSON (see [`Scene::from_json_file`]); vectors
//! are `[x, y, z]` arrays and matrices are 16 column-major floats.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::{Mat4, Result, Vec2, Vec3, Vec4};

/// Index into [`Scene::materials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u32);

impl MaterialId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Back-reference from a traced triangle to the brush face it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceRef {
    pub brush: u32,
    pub face: u32,
}

impl FaceRef {
    #[inline]
    pub fn new(brush: usize, face: usize) -> Self {
        Self {
            brush: brush as u32,
            face: face as u32,
        }
    }
}

/// Surface material as seen by the baker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,
    /// Diffuse (albedo) texture, if any.
    pub diffuse: Option<PathBuf>,
    /// Invisible tool material; never emissive.
    pub no_draw: bool,
}

/// What a brush is used for. Only solid brushes take part in lighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    #[default]
    Solid,
    Trigger,
    ReflectionProbe,
    Dsp,
    Water,
}

impl BrushKind {
    /// Volumes that neither occlude light nor receive a lightmap.
    pub fn is_volume(self) -> bool {
        !matches!(self, BrushKind::Solid)
    }
}

/// One convex polygon of a brush.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushFace {
    /// Polygon corners in brush-local space, consistently wound.
    pub vertices: Vec<Vec3>,
    /// Base material followed by up to three vertex-paint blend layers.
    pub layers: [Option<MaterialId>; 4],
    /// Per-vertex paint colour; r/g/b weight layers 1..=3.
    pub vertex_colors: Vec<Vec4>,
}

impl BrushFace {
    #[inline]
    pub fn base_material(&self) -> Option<MaterialId> {
        self.layers[0]
    }

    /// True when any paint layer beyond the base is assigned.
    pub fn is_blended(&self) -> bool {
        self.layers[1..].iter().any(Option::is_some)
    }

    /// Average of the per-vertex paint colours (zero when unpainted).
    pub fn average_paint(&self) -> Vec4 {
        if self.vertex_colors.is_empty() {
            return Vec4::ZERO;
        }
        let sum: Vec4 = self.vertex_colors.iter().copied().sum();
        sum / self.vertex_colors.len() as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Brush {
    pub name: String,
    pub kind: BrushKind,
    /// Model matrix of the owning object.
    pub transform: Mat4,
    pub faces: Vec<BrushFace>,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: BrushKind::Solid,
            transform: Mat4::IDENTITY,
            faces: Vec::new(),
        }
    }
}

impl Brush {
    /// Corners of `face` transformed to world space.
    pub fn world_vertices(&self, face: &BrushFace) -> Vec<Vec3> {
        face.vertices
            .iter()
            .map(|&v| self.transform.transform_point3(v))
            .collect()
    }
}

/// Projected decal quad.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Decal {
    pub name: String,
    /// World-space centre of the quad.
    pub position: Vec3,
    /// Direction the decal faces.
    pub normal: Vec3,
    /// Width and height in world units.
    pub size: Vec2,
    pub material: Option<MaterialId>,
}

impl Default for Decal {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            normal: Vec3::Y,
            size: Vec2::ONE,
            material: None,
        }
    }
}

/// Triangle mesh of a model, in model-local space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub material: Option<MaterialId>,
}

impl Mesh {
    pub fn has_geometry(&self) -> bool {
        !self.positions.is_empty() && self.indices.len() >= 3
    }
}

/// Model instance placed in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneObject {
    pub name: String,
    pub transform: Mat4,
    /// Physics mass; zero means static.
    pub mass: f32,
    pub cast_shadows: bool,
    pub mesh: Option<Mesh>,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::IDENTITY,
            mass: 0.0,
            cast_shadows: true,
            mesh: None,
        }
    }
}

impl SceneObject {
    #[inline]
    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    /// Mesh of a static model, if it has any triangles.
    pub fn static_mesh(&self) -> Option<&Mesh> {
        self.mesh
            .as_ref()
            .filter(|m| self.is_static() && m.has_geometry())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LightKind {
    Point,
    /// Cone half-angles in degrees.
    Spot { inner_angle: f32, outer_angle: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    /// Spot axis; ignored for point lights.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    /// Only static lights are baked.
    pub is_static: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            is_static: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sun {
    pub enabled: bool,
    /// Direction the sunlight travels.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for Sun {
    fn default() -> Self {
        Self {
            enabled: false,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Complete scene handed to the baker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Map name; names the output directory.
    pub name: String,
    pub materials: Vec<Material>,
    pub brushes: Vec<Brush>,
    pub decals: Vec<Decal>,
    pub objects: Vec<SceneObject>,
    pub lights: Vec<Light>,
    pub sun: Sun,
    /// Set by the baker after the ambient probe grid is written.
    #[serde(skip)]
    pub ambient_probe_file: Option<PathBuf>,
}

impl Scene {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[inline]
    pub fn face(&self, face: FaceRef) -> Option<&BrushFace> {
        self.brushes
            .get(face.brush as usize)
            .and_then(|b| b.faces.get(face.face as usize))
    }

    #[inline]
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index())
    }

    /// Resolve a material by name (case-insensitive).
    pub fn find_material(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
            .map(|i| MaterialId(i as u32))
    }
}
