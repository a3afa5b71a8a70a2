//! Lightmap baking.
//!
//! ## Phases
//! ```text
//! gather ─► BVH ─► reflectivity + emissive ─► jobs      (single-threaded)
//!                                              │
//!                                       worker pool      (parallel)
//!                                              │
//!              vertex files ◄─ ambient probes ◄┘        (single-threaded)
//! ```
//!
//! Everything workers read is built before the pool starts and is
//! immutable while it runs. Workers write only their own files or their
//! own vertex slot.
//!
//! ## Example
//! ```ignore
//! use lightbake::prelude::*;
//!
//! let mut scene = Scene::from_json_file("e1m1.json".as_ref())?;
//! let report = generate(&mut scene, 64, 1)?;
//! println!("{} jobs, {} failed", report.jobs, report.failures.len());
//! ```

pub mod direct;
pub mod emissive;
pub mod gather;
pub mod indirect;
pub mod jobs;
pub mod probes;
pub mod reflectivity;
pub mod surface;
pub mod worker;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::accel::RayScene;
use crate::config::BakeSettings;
use crate::filter::{create_denoiser, Denoiser};
use crate::io::{write_probes, write_vertex_colors, write_vertex_directions};
use crate::scene::Scene;
use crate::util::Result;

pub use emissive::EmissiveTable;
pub use jobs::{Job, JobList, VertexLightBuffers};
pub use reflectivity::Reflectivity;
pub use surface::ModelFrames;
pub use worker::JobFailure;

/// File name of the probe grid inside the map directory.
pub const PROBE_FILE: &str = "ambient_probes.amp";

/// Read-only state shared by every worker.
pub struct BakeContext<'a> {
    pub scene: &'a Scene,
    pub tracer: &'a RayScene,
    pub reflectivity: &'a Reflectivity,
    pub emissive: &'a EmissiveTable,
    pub settings: &'a BakeSettings,
    pub denoiser: &'a dyn Denoiser,
    pub frames: &'a ModelFrames,
}

/// Summary of one bake.
#[derive(Debug, Default)]
pub struct BakeReport {
    pub triangles: usize,
    pub jobs: usize,
    /// Jobs taken by the workers; equals `jobs` after a complete run.
    pub processed: usize,
    /// Jobs taken by each worker thread.
    pub per_thread: Vec<usize>,
    pub failures: Vec<JobFailure>,
    pub probes: usize,
    pub probe_file: Option<PathBuf>,
    pub map_dir: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Dispatch one job to its pipeline.
pub fn process_job(ctx: &BakeContext<'_>, job: &Job) -> Result<()> {
    match job {
        Job::BrushFace {
            brush,
            face,
            output_dir,
        } => surface::process_brush_face(ctx, *brush, *face, output_dir),
        Job::Decal { decal, output_dir } => surface::process_decal(ctx, *decal, output_dir),
        Job::ModelVertex {
            model,
            vertex,
            output,
        } => surface::process_model_vertex(ctx, *model, *vertex, output),
    }
}

/// Bake `scene` with default settings at the given resolution and bounce
/// depth.
pub fn generate(scene: &mut Scene, resolution: u32, bounces: u32) -> Result<BakeReport> {
    generate_with(scene, &BakeSettings::new(resolution, bounces))
}

/// Bake `scene` and write every output under `settings.map_dir(scene.name)`.
///
/// Returns `Err` only for fatal setup failures (see [`crate::Error::is_fatal`]) or
/// when the map directory cannot be created. Per-job failures are logged
/// and listed in [`BakeReport::failures`].
#[tracing::instrument(skip_all, fields(map = %scene.name))]
pub fn generate_with(scene: &mut Scene, settings: &BakeSettings) -> Result<BakeReport> {
    let start = Instant::now();
    let settings = settings.clone().validated();
    let mut report = BakeReport::default();

    let soup = gather::gather_geometry(scene);
    report.triangles = soup.triangle_count();
    if soup.is_empty() {
        info!("Scene has no geometry, nothing to bake");
        report.elapsed = start.elapsed();
        return Ok(report);
    }

    let tracer = RayScene::build(soup)?;
    let reflectivity = Reflectivity::build(scene);
    let emissive = EmissiveTable::load(&settings.lights_file, scene).unwrap_or_else(|e| {
        warn!(path = %settings.lights_file.display(), error = %e, "Emissive surface file unreadable");
        EmissiveTable::default()
    });
    let denoiser = create_denoiser(settings.denoiser)?;
    let frames = ModelFrames::build(scene);

    let map_dir = settings.map_dir(&scene.name);
    let list = jobs::build_jobs(scene, &map_dir)?;
    report.jobs = list.jobs.len();
    report.map_dir = Some(map_dir.clone());

    let ctx = BakeContext {
        scene: &*scene,
        tracer: &tracer,
        reflectivity: &reflectivity,
        emissive: &emissive,
        settings: &settings,
        denoiser: denoiser.as_ref(),
        frames: &frames,
    };

    info!(jobs = list.jobs.len(), threads = settings.worker_threads(), "Baking");
    let run = worker::run_jobs(&list.jobs, settings.worker_threads(), |job| process_job(&ctx, job))?;
    report.processed = run.processed();
    report.failures = run.failures;
    report.per_thread = run.per_thread;

    for model in &list.models {
        if let Err(e) = write_model_outputs(model) {
            error!(model = model.model, error = %e, "Vertex light output failed");
            report.failures.push(JobFailure {
                index: report.jobs,
                job: format!("model {} vertex files", model.model),
                error: e.to_string(),
            });
        }
    }

    let probes = probes::generate_probes(&ctx);
    let probe_path = map_dir.join(PROBE_FILE);
    let probe_file = match write_probes(&probe_path, &probes) {
        Ok(()) => {
            report.probes = probes.len();
            Some(probe_path)
        }
        Err(e) => {
            error!(error = %e, "Ambient probe output failed");
            report.failures.push(JobFailure {
                index: report.jobs,
                job: "ambient probes".into(),
                error: e.to_string(),
            });
            None
        }
    };
    drop(probes);

    scene.ambient_probe_file = probe_file.clone();
    report.probe_file = probe_file;
    report.elapsed = start.elapsed();
    info!(
        processed = report.processed,
        failed = report.failures.len(),
        probes = report.probes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Bake finished"
    );
    Ok(report)
}

fn write_model_outputs(model: &jobs::ModelOutput) -> Result<()> {
    write_vertex_colors(&model.dir.join("vertex_colors.vlm"), &model.buffers.colors())?;
    write_vertex_directions(&model.dir.join("vertex_directions.vld"), &model.buffers.directions())
}

impl BakeReport {
    /// True when every job ran and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.processed == self.jobs && self.failures.is_empty()
    }
}
