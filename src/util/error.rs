//! Error types for the baker.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bake operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Ray-tracing acceleration structure could not be built
    #[error("Acceleration structure build failed: {0}")]
    AccelBuild(String),

    /// Worker thread pool could not be created
    #[error("Worker pool creation failed: {0}")]
    WorkerPool(String),

    /// Denoiser device could not be created or reported an error
    #[error("Denoiser device error: {0}")]
    DenoiserDevice(String),

    /// Denoise filter failed on a single buffer
    #[error("Denoise failed: {0}")]
    Denoise(String),

    /// Output file has the wrong magic bytes
    #[error("Invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// File ended before the declared record count was read
    #[error("Unexpected end of file in {0}")]
    UnexpectedEof(PathBuf),

    /// Could not create an output directory
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an output file
    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Buffer dimensions do not match their declared size
    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Scene references something that does not exist
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// Setting value that cannot be parsed
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON scene or settings error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an error raised while writing `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: impl Into<Error>) -> Self {
        Self::WriteFile {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }

    /// Create an invalid scene error.
    pub fn invalid_scene(msg: impl Into<String>) -> Self {
        Self::InvalidScene(msg.into())
    }

    /// Setup failures that abort the whole bake.
    ///
    /// Everything else is scoped to a single resource or job and is logged
    /// and skipped by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AccelBuild(_) | Self::WorkerPool(_) | Self::DenoiserDevice(_)
        )
    }
}

/// Result type alias for bake operations.
pub type Result<T> = std::result::Result<T, Error>;
