//! Fetch slippy-map raster tiles for the world and for a selected country,
//! cache them on disk as palette PNGs and package the cache into a zip.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod coords;
pub mod download;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod presets;
pub mod progress;
pub mod scheduler;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::CacheStore;
pub use coords::{BoundingBox, TileKey, TileRectangle, tile_for_point, tile_rectangle};
pub use error::{CacheError, ConfigError, CoordError, FetchError};
pub use fetch::{FetchOutcome, Fetcher, HttpSource, RetryPolicy, TileSource};
pub use progress::{JobSummary, ProgressAggregator, ProgressReporter, ProgressUpdate};
pub use scheduler::{Job, Scheduler};
