//! In-process tile server used by unit tests.

use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::FetchError;
use crate::fetch::TileSource;

pub(crate) fn sample_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(16, 16, |x, y| {
        Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode sample tile");
    buf
}

/// Serves a fixed body after failing the first `fail_first` requests.
pub(crate) struct FakeSource {
    body: Vec<u8>,
    fail_first: usize,
    status: u16,
    hang: bool,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new(body: Vec<u8>, fail_first: usize, status: u16, hang: bool) -> Self {
        Self {
            body,
            fail_first,
            status,
            hang,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn serving(body: Vec<u8>) -> Self {
        Self::new(body, 0, 200, false)
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self::new(Vec::new(), usize::MAX, status, false)
    }

    pub(crate) fn flaky(fail_first: usize, body: Vec<u8>) -> Self {
        Self::new(body, fail_first, 503, false)
    }

    pub(crate) fn hanging() -> Self {
        Self::new(Vec::new(), 0, 200, true)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls lock").clone()
    }
}

#[async_trait]
impl TileSource for FakeSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("urls lock").push(url.to_string());

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if n < self.fail_first {
            return Err(FetchError::Status(self.status));
        }
        Ok(self.body.clone())
    }
}
