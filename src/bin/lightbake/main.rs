//! Lightbake CLI - bake lightmaps, vertex lighting and ambient probes for a scene.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use lightbake::{BakeReport, BakeSettings, DenoiserKind, Scene};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LIGHTBAKE_BUILD_DATE"), ")");

#[derive(Parser, Debug)]
#[command(name = "lightbake", version = VERSION, about = "Offline lightmap baker")]
struct Args {
    /// Scene description (JSON)
    scene: PathBuf,

    #[arg(short, long)]
    /// Maximum lightmap edge in texels
    resolution: Option<u32>,

    #[arg(short, long)]
    /// Indirect bounce depth (0 disables indirect light)
    bounces: Option<u32>,

    #[arg(short, long)]
    /// Output root; maps go to <output>/<scene name>/
    output: Option<PathBuf>,

    #[arg(long)]
    /// Settings file (defaults to the user config dir)
    settings: Option<PathBuf>,

    #[arg(long)]
    /// Emissive surface table
    lights: Option<PathBuf>,

    #[arg(long)]
    /// auto, oidn, bilateral or none
    denoiser: Option<DenoiserKind>,

    #[arg(long)]
    /// Worker threads (0 = all cores)
    threads: Option<usize>,

    #[arg(long)]
    /// Store the effective settings as the user default
    save_settings: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    /// Debug output (-vv for trace)
    verbose: u8,

    #[arg(short, long)]
    /// Errors only
    quiet: bool,
}

fn load_settings(args: &Args) -> Result<BakeSettings> {
    let mut settings = match &args.settings {
        Some(path) => BakeSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => BakeSettings::load_or_default(),
    };

    if let Some(r) = args.resolution {
        settings.resolution = r;
    }
    if let Some(b) = args.bounces {
        settings.bounces = b;
    }
    if let Some(o) = &args.output {
        settings.output_root = o.clone();
    }
    if let Some(l) = &args.lights {
        settings.lights_file = l.clone();
    }
    if let Some(t) = args.threads {
        settings.threads = t;
    }
    if let Some(d) = args.denoiser {
        settings.denoiser = d;
    }
    Ok(settings.validated())
}

fn save_user_settings(settings: &BakeSettings) -> Result<()> {
    let path = BakeSettings::user_path().context("No user config directory")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    settings.save(&path)?;
    info!(path = %path.display(), "Saved settings");
    Ok(())
}

/// Console logging, plus a chrome trace when `LIGHTBAKE_TRACE=1`.
fn init_tracing(args: &Args) -> Option<tracing_chrome::FlushGuard> {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("LIGHTBAKE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("lightbake={level}")));
    let fmt = tracing_subscriber::fmt::layer().with_target(false);

    if std::env::var("LIGHTBAKE_TRACE").ok().as_deref() == Some("1") {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("trace.json")
            .build();
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .with(chrome_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
        None
    }
}

fn print_report(report: &BakeReport) {
    println!("Triangles:  {}", report.triangles);
    println!("Jobs:       {} ({} processed)", report.jobs, report.processed);
    if !report.per_thread.is_empty() {
        let counts: Vec<String> = report.per_thread.iter().map(|n| n.to_string()).collect();
        println!("Per thread: {}", counts.join(" "));
    }
    println!("Probes:     {}", report.probes);
    if let Some(dir) = &report.map_dir {
        println!("Output:     {}", dir.display());
    }
    println!("Elapsed:    {:.2}s", report.elapsed.as_secs_f64());
    if !report.failures.is_empty() {
        println!("Failed:     {}", report.failures.len());
        for f in &report.failures {
            println!("  [{}] {}: {}", f.index, f.job, f.error);
        }
    }
}

fn run(args: &Args) -> Result<BakeReport> {
    let settings = load_settings(args)?;
    if args.save_settings {
        save_user_settings(&settings)?;
    }

    let mut scene = Scene::from_json_file(&args.scene)
        .with_context(|| format!("Failed to load scene {}", args.scene.display()))?;
    if scene.name.is_empty() {
        scene.name = scene_stem(&args.scene);
    }

    let report = lightbake::generate_with(&mut scene, &settings)?;
    Ok(report)
}

fn scene_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _trace_guard = init_tracing(&args);
    info!("lightbake {VERSION}");

    match run(&args) {
        Ok(report) => {
            if !args.quiet {
                print_report(&report);
            }
            if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
