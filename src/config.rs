//! Download configuration and job planning.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::coords::{BoundingBox, MAX_ZOOM};
use crate::error::ConfigError;
use crate::fetch::RetryPolicy;
use crate::presets::Presets;
use crate::scheduler::{DEFAULT_CONCURRENCY, Job};

pub const DEFAULT_URL: &str = "https://mt0.google.com/vt?lyrs=p&x={x}&s=&y={y}&z={z}";
pub const DEFAULT_CACHE_DIR: &str = "cache";
pub const WORLD_LAYER: &str = "world";

/// Zoom levels fetched for the whole world.
pub const WORLD_ZOOMS: RangeInclusive<u8> = 0..=6;
/// Zoom levels fetched for a selected country.
pub const REGION_ZOOMS: RangeInclusive<u8> = 7..=15;

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub cache_dir: PathBuf,
    pub url_template: String,
    pub concurrency: usize,
    pub max_age: Option<Duration>,
    pub retry: RetryPolicy,
    /// Requested bounds; each pass is intersected with them.
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub world_zooms: RangeInclusive<u8>,
    pub region_zooms: RangeInclusive<u8>,
    pub country: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            url_template: DEFAULT_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            max_age: None,
            retry: RetryPolicy::default(),
            min_zoom: *WORLD_ZOOMS.start(),
            max_zoom: *REGION_ZOOMS.end(),
            world_zooms: WORLD_ZOOMS,
            region_zooms: REGION_ZOOMS,
            country: None,
        }
    }
}

/// Jobs to run plus the configuration problems met while planning them.
#[derive(Debug, Default)]
pub struct JobPlan {
    pub jobs: Vec<Job>,
    pub errors: Vec<ConfigError>,
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::InvalidZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if self.max_zoom > MAX_ZOOM {
            return Err(ConfigError::ZoomTooDeep(self.max_zoom));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    fn window(&self, pass: &RangeInclusive<u8>) -> Option<RangeInclusive<u8>> {
        let lo = (*pass.start()).max(self.min_zoom);
        let hi = (*pass.end()).min(self.max_zoom);
        (lo <= hi).then_some(lo..=hi)
    }

    fn job(&self, layer: &str, bbox: BoundingBox, zooms: RangeInclusive<u8>) -> Result<Job, ConfigError> {
        Ok(Job::new(layer, bbox, zooms, self.url_template.as_str())?
            .with_concurrency(self.concurrency)?
            .with_max_age(self.max_age))
    }

    /// The world pass, then the country pass if one was requested.
    ///
    /// An unknown country is recorded in [`JobPlan::errors`] and does not
    /// prevent the world pass.
    pub fn jobs(&self, presets: &Presets) -> JobPlan {
        let mut plan = JobPlan::default();

        match self.window(&self.world_zooms) {
            Some(zooms) => match self.job(WORLD_LAYER, BoundingBox::world(), zooms) {
                Ok(job) => plan.jobs.push(job),
                Err(err) => plan.errors.push(err),
            },
            None => info!("World zoom window is empty, skipping world tiles"),
        }

        if let Some(code) = &self.country {
            match presets.get(code) {
                Ok(bbox) => match self.window(&self.region_zooms) {
                    Some(zooms) => match self.job(&code.to_lowercase(), bbox, zooms) {
                        Ok(job) => plan.jobs.push(job.with_label(code.to_uppercase())),
                        Err(err) => plan.errors.push(err),
                    },
                    None => info!(country = %code, "Country zoom window is empty, skipping"),
                },
                Err(err) => plan.errors.push(err),
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_plan_world_only() {
        let plan = DownloadConfig::default().jobs(&Presets::builtin());
        assert!(plan.errors.is_empty());
        assert_eq!(plan.jobs.len(), 1);
        let world = &plan.jobs[0];
        assert_eq!(world.layer, "world");
        assert_eq!(world.zooms, 0..=6);
        assert_eq!(world.concurrency, 4);
        assert_eq!(world.url_template, DEFAULT_URL);
    }

    #[test]
    fn country_gets_lowercase_layer_and_region_zooms() {
        let config = DownloadConfig {
            country: Some("sg".into()),
            ..DownloadConfig::default()
        };
        let plan = config.jobs(&Presets::builtin());
        assert_eq!(plan.jobs.len(), 2);
        let sg = &plan.jobs[1];
        assert_eq!(sg.layer, "sg");
        assert_eq!(sg.label.as_deref(), Some("SG"));
        assert_eq!(sg.zooms, 7..=15);
    }

    #[test]
    fn zoom_bounds_clip_both_passes() {
        let config = DownloadConfig {
            country: Some("SG".into()),
            min_zoom: 5,
            max_zoom: 9,
            ..DownloadConfig::default()
        };
        let plan = config.jobs(&Presets::builtin());
        assert_eq!(plan.jobs[0].zooms, 5..=6);
        assert_eq!(plan.jobs[1].zooms, 7..=9);
    }

    #[test]
    fn empty_world_window_is_skipped() {
        let config = DownloadConfig {
            country: Some("SG".into()),
            min_zoom: 10,
            max_zoom: 12,
            ..DownloadConfig::default()
        };
        let plan = config.jobs(&Presets::builtin());
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].layer, "sg");
        assert_eq!(plan.jobs[0].zooms, 10..=12);
    }

    #[test]
    fn unknown_country_keeps_world_job() {
        let config = DownloadConfig {
            country: Some("ZZ".into()),
            ..DownloadConfig::default()
        };
        let plan = config.jobs(&Presets::builtin());
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].layer, "world");
        assert!(matches!(
            plan.errors.as_slice(),
            [ConfigError::UnknownCountry(code)] if code == "ZZ"
        ));
    }

    #[test]
    fn validate_rejects_inverted_bounds_and_zero_threads() {
        let inverted = DownloadConfig {
            min_zoom: 8,
            max_zoom: 3,
            ..DownloadConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidZoomRange { min: 8, max: 3 })
        ));

        let no_workers = DownloadConfig {
            concurrency: 0,
            ..DownloadConfig::default()
        };
        assert!(matches!(
            no_workers.validate(),
            Err(ConfigError::ZeroConcurrency)
        ));
        assert!(DownloadConfig::default().validate().is_ok());
    }
}
