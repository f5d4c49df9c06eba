use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::config::{DEFAULT_CACHE_DIR, DEFAULT_URL, DownloadConfig};
use crate::fetch::{DEFAULT_ATTEMPTS, Fetcher, HttpSource, RetryPolicy};
use crate::presets::{DEFAULT_PRESETS_FILE, Presets};
use crate::progress::{ConsoleReporter, Verbosity};
use crate::scheduler::{DEFAULT_CONCURRENCY, Job, Scheduler};

const NOTICE: &str = "Map tiles are subject to the tile provider's terms of use. \
    Do not mass-download or redistribute them without permission.";

#[derive(Parser, Debug)]
pub struct Args {
    /// Country code to fetch at regional zoom levels (e.g. SG, US)
    #[arg(long)]
    pub country: Option<String>,

    /// Minimum zoom level
    #[arg(long = "min-zoom", alias = "minzoom", default_value_t = 0)]
    pub min_zoom: u8,

    /// Maximum zoom level
    #[arg(long = "max-zoom", alias = "maxzoom", default_value_t = 15)]
    pub max_zoom: u8,

    /// Number of parallel downloads
    #[arg(short = 't', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub threads: usize,

    /// Tile server URL template with {x}, {y} and {z} placeholders
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Cache directory
    #[arg(long = "cache-dir", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// JSON file mapping country codes to bounding boxes
    #[arg(long, default_value = DEFAULT_PRESETS_FILE)]
    pub presets: PathBuf,

    /// Re-fetch cached tiles older than this many hours (default: never)
    #[arg(long = "max-age-hours")]
    pub max_age_hours: Option<u64>,

    /// Attempts per tile
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
    pub attempts: u32,

    /// Pause before the first attempt; doubles on every retry
    #[arg(long = "initial-delay-ms", default_value_t = 1000)]
    pub initial_delay_ms: u64,

    /// Dry run: print the tile ranges without fetching
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
}

impl Args {
    pub fn to_config(&self) -> DownloadConfig {
        DownloadConfig {
            cache_dir: self.cache_dir.clone(),
            url_template: self.url.clone(),
            concurrency: self.threads,
            max_age: self
                .max_age_hours
                .map(|hours| Duration::from_secs(hours.saturating_mul(3600))),
            retry: RetryPolicy {
                attempts: self.attempts,
                initial_delay: Duration::from_millis(self.initial_delay_ms),
                ..RetryPolicy::default()
            },
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            country: self.country.clone(),
            ..DownloadConfig::default()
        }
    }
}

fn print_plan(job: &Job) {
    let name = job.label.as_deref().unwrap_or("world");
    println!("Job: {} ({})", name, job.bbox);
    for rect in job.rectangles() {
        println!(
            "  z{}: x {}..={}, y {}..={} ({} tiles)",
            rect.zoom,
            rect.x_min,
            rect.x_max,
            rect.y_min,
            rect.y_max,
            rect.area()
        );
    }
    println!("  Tile total: {}", job.tile_count());
}

pub async fn run_download(args: Args, verbosity: Verbosity) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid download settings")?;

    println!("{NOTICE}");

    let presets = Presets::load_or_builtin(&args.presets);
    let plan = config.jobs(&presets);
    for err in &plan.errors {
        eprintln!("Error: {err}");
    }

    if args.dry_run {
        for job in &plan.jobs {
            print_plan(job);
        }
        return Ok(());
    }

    fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("Failed to create cache directory {:?}", config.cache_dir))?;

    let source = Arc::new(HttpSource::new().context("Failed to build HTTP client")?);
    let scheduler = Scheduler::new(Fetcher::new(
        source,
        CacheStore::new(&config.cache_dir),
        config.retry,
    ));

    for job in &plan.jobs {
        let (lo, hi) = (job.zooms.start(), job.zooms.end());
        match &job.label {
            Some(label) => println!("\nDownloading {label} tiles (zoom {lo}-{hi})..."),
            None => println!("Downloading world tiles (zoom {lo}-{hi})..."),
        }

        let reporter = Arc::new(ConsoleReporter::new(job.tile_count(), verbosity));
        scheduler.run(job, reporter).await;
    }

    Ok(())
}
