use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;

use crate::cache::CacheStore;
use crate::config::DEFAULT_CACHE_DIR;

#[derive(Parser, Debug)]
pub struct Args {
    /// Cache directory to check
    #[arg(long = "cache-dir", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Limit worker threads (default = number of logical CPUs)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Only report broken tiles, do not delete them
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub scanned: usize,
    pub broken: Vec<PathBuf>,
    pub removed: usize,
}

/// Decodes every cached tile in parallel and removes the ones that fail.
pub fn verify_cache(cache: &CacheStore, remove: bool, pb: &ProgressBar) -> Result<VerifyReport> {
    let files = cache.tile_files()?;
    pb.set_length(files.len() as u64);

    let broken: Vec<PathBuf> = files
        .par_iter()
        .filter_map(|path| {
            let ok = image::open(path).is_ok();
            pb.inc(1);
            (!ok).then(|| path.clone())
        })
        .collect();

    let mut removed = 0;
    if remove {
        for path in &broken {
            fs::remove_file(path).with_context(|| format!("Removing {:?}", path))?;
            removed += 1;
        }
    }

    Ok(VerifyReport {
        scanned: files.len(),
        broken,
        removed,
    })
}

pub fn run_verify(args: Args) -> Result<()> {
    let pool = {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = args.jobs {
            builder = builder.num_threads(n);
        }
        builder.build().context("Failed to start worker pool")?
    };

    let cache = CacheStore::new(&args.cache_dir);
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}",
        )
        .map(|style| style.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let report = pool.install(|| verify_cache(&cache, !args.dry_run, &pb))?;
    pb.finish_and_clear();

    println!("Scanned {} tile(s) in {}", report.scanned, args.cache_dir.display());
    if report.broken.is_empty() {
        println!("All tiles decode cleanly.");
    } else {
        eprintln!("Found {} broken tile(s):", report.broken.len());
        for (i, path) in report.broken.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, path.display());
        }
        if report.removed > 0 {
            println!("Removed {} tile(s); they will be fetched on the next run.", report.removed);
        }
    }
    Ok(())
}
