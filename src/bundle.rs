use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::cache::CacheStore;
use crate::config::DEFAULT_CACHE_DIR;

#[derive(Parser, Debug)]
pub struct Args {
    /// Cache directory to package
    #[arg(long = "cache-dir", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Archive to write
    #[arg(short, long, default_value = "map_bundle.zip")]
    pub out: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
    pub tiles: usize,
    pub bytes: u64,
}

/// Zips every cached tile, keeping `<layer>/<zoom>/<x>/<y>.png` entry names.
pub fn create_bundle(cache: &CacheStore, out: &Path) -> Result<BundleReport> {
    if !cache.root().is_dir() {
        return Err(anyhow!("Cache directory {:?} not found", cache.root()));
    }

    let tiles = cache.tile_files()?;
    let file = File::create(out).with_context(|| format!("Failed to create {:?}", out))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &tiles {
        let name = entry_name(cache.root(), path)?;
        zip.start_file(name, options)
            .with_context(|| format!("Adding {:?}", path))?;
        let mut input = File::open(path).with_context(|| format!("Reading {:?}", path))?;
        io::copy(&mut input, &mut zip).with_context(|| format!("Compressing {:?}", path))?;
    }
    let mut writer = zip.finish().context("Failed to finish archive")?;
    writer.flush()?;

    let bytes = fs::metadata(out)?.len();
    Ok(BundleReport {
        tiles: tiles.len(),
        bytes,
    })
}

fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{:?} is outside {:?}", path, root))?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Ok(parts.join("/"))
}

pub fn run_bundle(args: Args) -> Result<()> {
    let cache = CacheStore::new(&args.cache_dir);
    let report = create_bundle(&cache, &args.out)?;

    println!("\nCreated {} with {} tiles", args.out.display(), report.tiles);
    println!("Size: {:.2} MB", report.bytes as f64 / 1024.0 / 1024.0);
    Ok(())
}
