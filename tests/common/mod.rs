use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use tilepack::{FetchError, ProgressReporter, ProgressUpdate, JobSummary, TileSource};

pub fn tile_png(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(64, 64, |x, y| {
        Rgb([seed.wrapping_add(x as u8), (y * 4) as u8, ((x ^ y) * 2) as u8])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode tile");
    buf
}

/// Serves a PNG for every URL except those listed as broken.
pub struct TileServer {
    body: Vec<u8>,
    broken: HashSet<String>,
    pub requests: AtomicUsize,
}

impl TileServer {
    pub fn new() -> Self {
        Self {
            body: tile_png(7),
            broken: HashSet::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileSource for TileServer {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(url) {
            return Err(FetchError::Status(404));
        }
        Ok(self.body.clone())
    }
}

#[derive(Default)]
pub struct Recorder {
    pub updates: Mutex<Vec<ProgressUpdate>>,
    pub summaries: Mutex<Vec<JobSummary>>,
}

impl ProgressReporter for Recorder {
    fn tile_finished(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }

    fn job_finished(&self, summary: &JobSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}
