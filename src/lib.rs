//! # Lightbake
//!
//! Offline light baker for static level geometry.
//!
//! Given a scene of brushes, decals, static models and lights, the baker
//! traces direct and single-bounce indirect light and writes:
//! - per-face and per-decal lightmaps (HDR colour + RGBA8 dominant direction)
//! - per-vertex colour and direction files for static models
//! - a grid of six-axis ambient probes
//!
//! ## Modules
//!
//! - [`util`] - Errors, math types, seeded sampling
//! - [`scene`] - Read-only scene description
//! - [`accel`] - Triangle soup and BVH ray queries
//! - [`config`] - Bake settings
//! - [`filter`] - Blur, guided filter, padding, denoisers
//! - [`io`] - Lightmap, vertex and probe file formats
//! - [`bake`] - Jobs, worker pool and lighting pipelines
//!
//! ## Example
//!
//! ```ignore
//! use lightbake::prelude::*;
//!
//! let mut scene = Scene::from_json_file("e1m1.json".as_ref())?;
//! let report = generate_with(&mut scene, &BakeSettings::new(128, 1))?;
//! assert!(report.is_clean());
//! ```

pub mod util;
pub mod scene;
pub mod accel;
pub mod config;
pub mod filter;
pub mod io;
pub mod bake;

// Re-export commonly used types
pub use util::{Error, Result};
pub use scene::Scene;
pub use config::{BakeSettings, DenoiserKind};
pub use bake::{generate, generate_with, BakeReport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Vec3, Vec4, Mat4};
    pub use crate::scene::*;
    pub use crate::config::{BakeSettings, DenoiserKind};
    pub use crate::bake::{generate, generate_with, BakeReport};
    pub use crate::io::{read_probes, read_vertex_colors, read_vertex_directions, AmbientProbe};
}
