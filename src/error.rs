//! Error types for the tile pipeline.
//!
//! Per-tile errors ([`CacheError`], [`FetchError`]) never escape the
//! scheduler; they are folded into a `FetchOutcome::Failed`. Only
//! [`ConfigError`] reaches the command layer.

use std::path::PathBuf;

use thiserror::Error;

/// A tile address that does not exist on the grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("tile {x}/{y} is outside the {zoom}-level grid")]
    OutOfRange { zoom: u8, x: u32, y: u32 },

    #[error("zoom level {0} is deeper than the supported maximum")]
    ZoomTooDeep(u8),
}

/// Failures reading or writing the on-disk tile cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a valid image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("palette encoding failed: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("could not move tile into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("failed to scan cache: {0}")]
    Walk(#[from] walkdir::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("empty response body")]
    EmptyBody,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Configuration problems surfaced to the user before or between jobs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no bounding box found for country '{0}'")]
    UnknownCountry(String),

    #[error("failed to read presets {path:?}: {source}")]
    ReadPresets {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse presets {path:?}: {source}")]
    ParsePresets {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid zoom range {min}..={max}")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("zoom level {0} is deeper than the supported maximum")]
    ZoomTooDeep(u8),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}
