//! On-disk tile cache.
//!
//! Tiles live at `<root>/<layer>/<zoom>/<x>/<y>.png`, re-encoded as palette
//! PNGs. Writes go through a temporary file in the target directory and are
//! renamed into place, so a reader never sees a half-written tile.

use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_quant::NeuQuant;
use image::RgbaImage;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::coords::TileKey;
use crate::error::CacheError;

/// Upper bound on the stored palette size.
pub const PALETTE_COLORS: usize = 128;

/// NeuQuant sampling factor; 1 is slowest and best, 30 is fastest.
const QUANT_SAMPLE_FACTOR: i32 = 10;

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(key.layer())
            .join(key.zoom().to_string())
            .join(key.x().to_string())
    }

    /// Where `key` is (or would be) stored.
    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        self.dir_for(key).join(format!("{}.png", key.y()))
    }

    /// Whether a usable copy of `key` is on disk.
    ///
    /// With `max_age` set, tiles whose modification time is not younger than
    /// it count as missing. A file that no longer decodes is deleted and
    /// reported as missing.
    pub fn has(&self, key: &TileKey, max_age: Option<Duration>) -> bool {
        let path = self.path_for(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return false,
        };

        if let Some(max_age) = max_age {
            let age = metadata
                .modified()
                .ok()
                .map(|modified| modified.elapsed().unwrap_or(Duration::ZERO));
            match age {
                Some(age) if age < max_age => {}
                _ => {
                    debug!(tile = %key, "Cached tile is stale");
                    return false;
                }
            }
        }

        match image::open(&path) {
            Ok(_) => true,
            Err(err) => {
                info!(tile = %key, error = %err, "Removing corrupt cached tile");
                if let Err(err) = fs::remove_file(&path) {
                    debug!(path = ?path, error = %err, "Could not remove corrupt tile");
                }
                false
            }
        }
    }

    /// Validates `bytes` as an image, re-encodes it with a reduced palette
    /// and stores it under `key`.
    pub fn put(&self, key: &TileKey, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let decoded = image::load_from_memory(bytes)?;
        let encoded = encode_palette_png(&decoded.to_rgba8())?;

        let dir = self.dir_for(key);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let path = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tmp.write_all(&encoded)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)?;

        Ok(path)
    }

    /// All stored tiles, sorted, as paths under the cache root.
    pub fn tile_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }

        for entry in WalkDir::new(&self.root).min_depth(4).max_depth(4) {
            let entry = entry?;
            if entry.file_type().is_file() && has_png_ext(entry.path()) {
                out.push(entry.into_path());
            }
        }

        out.sort();
        Ok(out)
    }
}

fn has_png_ext(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Quantizes to at most [`PALETTE_COLORS`] colours and writes an indexed PNG.
fn encode_palette_png(rgba: &RgbaImage) -> Result<Vec<u8>, CacheError> {
    let (width, height) = rgba.dimensions();
    let pixels = rgba.as_raw();

    let quant = NeuQuant::new(QUANT_SAMPLE_FACTOR, PALETTE_COLORS, pixels);
    let indices: Vec<u8> = pixels
        .chunks_exact(4)
        .map(|px| quant.index_of(px) as u8)
        .collect();

    let color_map = quant.color_map_rgba();
    let mut palette = Vec::with_capacity(color_map.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(color_map.len() / 4);
    for entry in color_map.chunks_exact(4) {
        palette.extend_from_slice(&entry[..3]);
        alpha.push(entry[3]);
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        if alpha.iter().any(|&a| a != u8::MAX) {
            encoder.set_trns(alpha);
        }
        encoder.set_compression(png::Compression::Best);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indices)?;
        writer.finish()?;
    }
    Ok(out)
}
