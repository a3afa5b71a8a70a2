//! Bake configuration.
//!
//! Settings are plain scalars with sensible defaults. They can be loaded from
//! JSON; missing keys fall back to [`BakeSettings::default`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bake::jobs::sanitize_name;
use crate::util::{Error, Result};

/// Which denoiser cleans the indirect-light buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiserKind {
    /// OIDN when compiled in, otherwise the bilateral filter.
    #[default]
    Auto,
    Oidn,
    Bilateral,
    None,
}

impl FromStr for DenoiserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "oidn" => Ok(Self::Oidn),
            "bilateral" => Ok(Self::Bilateral),
            "none" | "off" => Ok(Self::None),
            _ => Err(Error::InvalidSetting(format!(
                "unknown denoiser '{s}' (expected auto, oidn, bilateral or none)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    // Lightmaps
    /// Maximum lightmap edge in texels (minimum edge is always 4).
    pub resolution: u32,
    /// Indirect bounce depth; 0 disables indirect light.
    pub bounces: u32,
    pub texels_per_unit: f32,
    pub indirect_samples: u32,
    /// Border texels added around every lightmap.
    pub padding: u32,

    // Filtering
    pub denoiser: DenoiserKind,
    pub blur_radius: u32,
    pub guided_radius: u32,
    pub guided_epsilon: f32,

    // Ambient probes
    pub probe_spacing: f32,
    pub probe_validation_rays: u32,
    pub probe_validation_distance: f32,
    /// Candidates whose validation hit ratio exceeds this are rejected.
    pub probe_max_hit_ratio: f32,
    pub probe_indirect_samples: u32,
    pub probe_scale: f32,

    // Paths
    /// Root of the `<root>/<map>/...` output tree.
    pub output_root: PathBuf,
    /// Emissive surface table; missing file means no emissive surfaces.
    pub lights_file: PathBuf,

    /// Worker threads; 0 uses the hardware concurrency.
    pub threads: usize,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            resolution: 64,
            bounces: 1,
            texels_per_unit: 8.0,
            indirect_samples: 64,
            padding: 2,
            denoiser: DenoiserKind::Auto,
            blur_radius: 3,
            guided_radius: 4,
            guided_epsilon: 0.01,
            probe_spacing: 1.0,
            probe_validation_rays: 16,
            probe_validation_distance: 0.5,
            probe_max_hit_ratio: 0.25,
            probe_indirect_samples: 64,
            probe_scale: 2.2,
            output_root: PathBuf::from("lightmaps"),
            lights_file: PathBuf::from("lights.rad"),
            threads: 0,
        }
    }
}

/// Smallest lightmap edge.
pub const MIN_LIGHTMAP_SIZE: u32 = 4;

impl BakeSettings {
    /// Defaults with the two scalars the editor passes in.
    pub fn new(resolution: u32, bounces: u32) -> Self {
        Self {
            resolution,
            bounces,
            ..Self::default()
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        Ok(settings.validated())
    }

    /// User-level settings file: `<config dir>/lightbake/settings.json`.
    #[cfg(feature = "cli")]
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("lightbake");
            p.push("settings.json");
            p
        })
    }

    /// Settings from the user config dir, or defaults when absent or unreadable.
    #[cfg(feature = "cli")]
    pub fn load_or_default() -> Self {
        Self::user_path()
            .filter(|p| p.exists())
            .and_then(|p| {
                Self::load(&p)
                    .map_err(|e| tracing::warn!(path = %p.display(), error = %e, "Ignoring unreadable user settings"))
                    .ok()
            })
            .unwrap_or_default()
    }

    /// Save settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Clamp values into ranges the baker can work with.
    pub fn validated(mut self) -> Self {
        self.resolution = self.resolution.max(MIN_LIGHTMAP_SIZE);
        if !(self.texels_per_unit > 0.0) {
            self.texels_per_unit = Self::default().texels_per_unit;
        }
        if !(self.probe_spacing > 0.0) {
            self.probe_spacing = Self::default().probe_spacing;
        }
        if !(self.probe_validation_distance > 0.0) {
            self.probe_validation_distance = Self::default().probe_validation_distance;
        }
        self.probe_max_hit_ratio = self.probe_max_hit_ratio.clamp(0.0, 1.0);
        if !(self.guided_epsilon > 0.0) {
            self.guided_epsilon = Self::default().guided_epsilon;
        }
        self
    }

    /// Worker count actually used by the pool.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// `<output_root>/<map_name>`
    pub fn map_dir(&self, map_name: &str) -> PathBuf {
        let name = sanitize_name(map_name.trim());
        let name = if name.is_empty() { "untitled".to_string() } else { name };
        self.output_root.join(name)
    }
}
