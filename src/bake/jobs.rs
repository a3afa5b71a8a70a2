//! Bake job list and output directory tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::scene::Scene;
use crate::util::{Error, Result, Vec4};

/// Per-model vertex outputs, one colour and one direction slot per vertex.
///
/// Slots hold `f32` bits in atomics so concurrent vertex jobs write their
/// own slot without locking. Each slot is written by exactly one job.
pub struct VertexLightBuffers {
    colors: Box<[AtomicU32]>,
    directions: Box<[AtomicU32]>,
}

fn atomic_slots(n: usize) -> Box<[AtomicU32]> {
    (0..n * 4).map(|_| AtomicU32::new(0)).collect()
}

fn store(slots: &[AtomicU32], index: usize, v: Vec4) {
    for (slot, c) in slots[index * 4..index * 4 + 4].iter().zip(v.to_array()) {
        slot.store(c.to_bits(), Ordering::Relaxed);
    }
}

fn load_all(slots: &[AtomicU32]) -> Vec<Vec4> {
    slots
        .chunks_exact(4)
        .map(|c| {
            Vec4::new(
                f32::from_bits(c[0].load(Ordering::Relaxed)),
                f32::from_bits(c[1].load(Ordering::Relaxed)),
                f32::from_bits(c[2].load(Ordering::Relaxed)),
                f32::from_bits(c[3].load(Ordering::Relaxed)),
            )
        })
        .collect()
}

impl VertexLightBuffers {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            colors: atomic_slots(vertex_count),
            directions: atomic_slots(vertex_count),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len() / 4
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn set(&self, vertex: usize, color: Vec4, direction: Vec4) {
        store(&self.colors, vertex, color);
        store(&self.directions, vertex, direction);
    }

    /// Snapshot of all colours; call after the pool has joined.
    pub fn colors(&self) -> Vec<Vec4> {
        load_all(&self.colors)
    }

    pub fn directions(&self) -> Vec<Vec4> {
        load_all(&self.directions)
    }
}

impl std::fmt::Debug for VertexLightBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexLightBuffers")
            .field("vertices", &self.len())
            .finish()
    }
}

/// One independent unit of bake work.
#[derive(Debug, Clone)]
pub enum Job {
    BrushFace {
        brush: usize,
        face: usize,
        output_dir: PathBuf,
    },
    Decal {
        decal: usize,
        output_dir: PathBuf,
    },
    ModelVertex {
        model: usize,
        vertex: usize,
        output: Arc<VertexLightBuffers>,
    },
}

impl Job {
    /// Short description used in logs and failure reports.
    pub fn describe(&self) -> String {
        match self {
            Job::BrushFace { brush, face, .. } => format!("brush {brush} face {face}"),
            Job::Decal { decal, .. } => format!("decal {decal}"),
            Job::ModelVertex { model, vertex, .. } => format!("model {model} vertex {vertex}"),
        }
    }
}

/// Where a model's vertex files go once every vertex job has run.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub model: usize,
    pub dir: PathBuf,
    pub buffers: Arc<VertexLightBuffers>,
}

#[derive(Debug, Default)]
pub struct JobList {
    pub jobs: Vec<Job>,
    pub models: Vec<ModelOutput>,
}

/// Replace characters outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Unique directory names within one map directory.
struct DirNames {
    used: HashSet<String>,
}

impl DirNames {
    fn claim(&mut self, name: &str, prefix: &str, index: usize) -> String {
        let mut dir = sanitize_name(name.trim());
        if dir.is_empty() {
            dir = format!("{prefix}_{index}");
        }
        if self.used.contains(&dir) {
            let base = format!("{dir}_{index}");
            dir = base.clone();
            let mut n = 1;
            while self.used.contains(&dir) {
                dir = format!("{base}_{n}");
                n += 1;
            }
        }
        self.used.insert(dir.clone());
        dir
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the job list and create `map_dir` with one subdirectory per
/// brush, decal and static model.
///
/// Failure to create the map directory aborts; a failed subdirectory is
/// logged and its jobs then fail individually when they write.
#[tracing::instrument(skip_all, fields(map_dir = %map_dir.display()))]
pub fn build_jobs(scene: &Scene, map_dir: &Path) -> Result<JobList> {
    create_dir(map_dir)?;
    let mut list = JobList::default();
    let mut names = DirNames {
        used: (0..scene.decals.len()).map(|i| format!("decal_{i}")).collect(),
    };

    let make_dir = |dir: PathBuf| {
        if let Err(e) = create_dir(&dir) {
            error!(error = %e, "Output directory unavailable");
        }
        dir
    };

    for (bi, brush) in scene.brushes.iter().enumerate() {
        if brush.kind.is_volume() || brush.faces.is_empty() {
            continue;
        }
        let dir = make_dir(map_dir.join(names.claim(&brush.name, "brush", bi)));
        debug!(brush = bi, dir = %dir.display(), faces = brush.faces.len(), "Brush queued");
        list.jobs.extend((0..brush.faces.len()).map(|face| Job::BrushFace {
            brush: bi,
            face,
            output_dir: dir.clone(),
        }));
    }

    for decal in 0..scene.decals.len() {
        list.jobs.push(Job::Decal {
            decal,
            output_dir: make_dir(map_dir.join(format!("decal_{decal}"))),
        });
    }

    for (mi, object) in scene.objects.iter().enumerate() {
        let Some(mesh) = object.static_mesh() else {
            continue;
        };
        let dir = make_dir(map_dir.join(names.claim(&object.name, "model", mi)));
        let buffers = Arc::new(VertexLightBuffers::new(mesh.positions.len()));
        list.jobs.extend((0..mesh.positions.len()).map(|vertex| Job::ModelVertex {
            model: mi,
            vertex,
            output: Arc::clone(&buffers),
        }));
        list.models.push(ModelOutput {
            model: mi,
            dir,
            buffers,
        });
    }

    info!(jobs = list.jobs.len(), models = list.models.len(), "Jobs built");
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Brush, BrushFace, BrushKind, Decal, Mesh, SceneObject};
    use crate::util::Vec3;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_name("Wall #3 (north)"), "Wall__3__north_");
        assert_eq!(sanitize_name("ok_name-1"), "ok_name-1");
    }

    #[test]
    fn test_vertex_buffers() {
        let buf = VertexLightBuffers::new(3);
        assert_eq!(buf.len(), 3);
        buf.set(1, Vec4::new(1.0, 2.0, 3.0, 1.0), Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(buf.colors()[1], Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(buf.colors()[0], Vec4::ZERO);
        assert_eq!(buf.directions()[1].y, 1.0);
    }

    #[test]
    fn test_build_jobs() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let face = BrushFace {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            ..Default::default()
        };
        let brush = |name: &str, kind| Brush {
            name: name.into(),
            kind,
            faces: vec![face.clone(), face.clone()],
            ..Default::default()
        };
        let mesh = Mesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::Y],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        };
        let scene = Scene {
            brushes: vec![
                brush("wall", BrushKind::Solid),
                brush("wall", BrushKind::Solid),
                brush("", BrushKind::Solid),
                brush("trigger", BrushKind::Trigger),
            ],
            decals: vec![Decal::default()],
            objects: vec![
                SceneObject {
                    name: "barrel".into(),
                    mesh: Some(mesh.clone()),
                    ..Default::default()
                },
                SceneObject {
                    name: "crate".into(),
                    mass: 1.0,
                    mesh: Some(mesh),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let list = build_jobs(&scene, tmp.path())?;
        // 3 solid brushes x 2 faces + 1 decal + 4 vertices
        assert_eq!(list.jobs.len(), 11);
        assert_eq!(list.models.len(), 1);
        assert_eq!(list.models[0].buffers.len(), 4);
        for dir in ["wall", "wall_1", "brush_2", "decal_0", "barrel"] {
            assert!(tmp.path().join(dir).is_dir(), "{dir} missing");
        }
        assert!(!tmp.path().join("trigger").exists());
        Ok(())
    }
}
