//! Job planning and bounded-concurrency execution.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::coords::{BoundingBox, MAX_ZOOM, TileKey, TileRectangle, tile_rectangle};
use crate::error::ConfigError;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::progress::{JobSummary, ProgressAggregator, ProgressReporter};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// One bounding box fetched over a range of zoom levels into one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub layer: String,
    /// Shown in progress lines, e.g. the country code.
    pub label: Option<String>,
    pub bbox: BoundingBox,
    pub zooms: RangeInclusive<u8>,
    pub url_template: String,
    pub concurrency: usize,
    /// Cached tiles at least this old are fetched again; `None` never expires.
    pub max_age: Option<Duration>,
}

impl Job {
    pub fn new(
        layer: impl Into<String>,
        bbox: BoundingBox,
        zooms: RangeInclusive<u8>,
        url_template: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let (min, max) = (*zooms.start(), *zooms.end());
        if min > max {
            return Err(ConfigError::InvalidZoomRange { min, max });
        }
        if max > MAX_ZOOM {
            return Err(ConfigError::ZoomTooDeep(max));
        }

        Ok(Self {
            layer: layer.into(),
            label: None,
            bbox,
            zooms,
            url_template: url_template.into(),
            concurrency: DEFAULT_CONCURRENCY,
            max_age: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// One rectangle per zoom level, lowest zoom first.
    ///
    /// Zooms past `MAX_ZOOM` have no grid and contribute no rectangle;
    /// `Job::new` already refuses them.
    pub fn rectangles(&self) -> Vec<TileRectangle> {
        self.zooms
            .clone()
            .filter_map(|zoom| tile_rectangle(&self.bbox, zoom).ok())
            .collect()
    }

    pub fn tile_count(&self) -> u64 {
        self.rectangles().iter().map(TileRectangle::area).sum()
    }
}

/// Runs jobs: cache lookup first, fetch on miss.
pub struct Scheduler {
    fetcher: Fetcher,
}

impl Scheduler {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Processes every tile of `job` and returns once all of them have an
    /// outcome. Outcomes are collected in completion order.
    pub async fn run(&self, job: &Job, reporter: Arc<dyn ProgressReporter>) -> JobSummary {
        let rectangles = job.rectangles();
        let progress = ProgressAggregator::new(
            rectangles.iter().map(|r| (r.zoom, r.area() as usize)),
            job.label.clone(),
            reporter,
        );

        info!(
            layer = %job.layer,
            zooms = ?job.zooms,
            tiles = progress.total(),
            concurrency = job.concurrency,
            "Starting job"
        );

        let keys = rectangles.iter().flat_map(|r| r.keys(&job.layer));
        let progress_ref = &progress;
        let results: Vec<(TileKey, FetchOutcome)> = stream::iter(keys)
            .map(|key| async move {
                let outcome = self.process(&key, job).await;
                progress_ref.record(&key, &outcome);
                (key, outcome)
            })
            .buffer_unordered(job.concurrency.max(1))
            .collect()
            .await;

        if results.len() != progress.total() {
            error!(
                layer = %job.layer,
                collected = results.len(),
                expected = progress.total(),
                "Outcome count does not match planned tile count"
            );
        }

        let failures = results
            .into_iter()
            .filter_map(|(key, outcome)| match outcome {
                FetchOutcome::Failed(reason) => Some((key, reason)),
                _ => None,
            })
            .collect();

        let summary = progress.finish(&job.layer, failures);
        info!(
            layer = %summary.layer,
            fetched = summary.fetched,
            cached = summary.cached,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Job finished"
        );
        summary
    }

    async fn process(&self, key: &TileKey, job: &Job) -> FetchOutcome {
        let cache = self.fetcher.cache().clone();
        let probe = key.clone();
        let max_age = job.max_age;
        let hit = tokio::task::spawn_blocking(move || cache.has(&probe, max_age))
            .await
            .unwrap_or_else(|err| {
                warn!(tile = %key, error = %err, "Cache lookup task failed");
                false
            });

        if hit {
            return FetchOutcome::Cached;
        }
        self.fetcher.fetch(key, &job.url_template).await
    }
}
