//! In-memory backend for unit tests
//!
//! Fixtures are text files: `;`-separated pages written as `WxH` with an
//! optional `@degrees` rotation. The literal `empty` decodes to zero pages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use super::traits::{BackendError, DecodedDocument, DocumentBackend};
use super::types::PageGeometry;
use crate::error::DocumentLoadError;
use crate::geometry::Rotation;
use crate::render::CancellationToken;
use crate::text::TextRun;

pub(crate) struct SyntheticBackend {
    dir: tempfile::TempDir,
    fixtures: AtomicUsize,
    decode_delay: Duration,
    raster_delay: Duration,
    fail_text: bool,
    geometry_calls: Arc<AtomicUsize>,
    text_calls: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            fixtures: AtomicUsize::new(0),
            decode_delay: Duration::ZERO,
            raster_delay: Duration::ZERO,
            fail_text: false,
            geometry_calls: Arc::new(AtomicUsize::new(0)),
            text_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Rasterization takes at least this long, polling the cancel token each millisecond
    pub(crate) fn with_raster_delay(mut self, delay: Duration) -> Self {
        self.raster_delay = delay;
        self
    }

    pub(crate) fn with_failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    pub(crate) fn write_fixture(&self, contents: &str) -> PathBuf {
        let n = self.fixtures.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.path().join(format!("fixture-{}.doc", n));
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub(crate) fn geometry_calls(&self) -> usize {
        self.geometry_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

impl DocumentBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn decode(&self, bytes: Arc<Vec<u8>>) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError> {
        std::thread::sleep(self.decode_delay);
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| DocumentLoadError::Decode(e.to_string()))?
            .trim();

        let mut pages = Vec::new();
        if text != "empty" {
            for entry in text.split(';') {
                pages.push(parse_page(entry)?);
            }
        }

        Ok(Arc::new(SyntheticDocument {
            pages,
            raster_delay: self.raster_delay,
            fail_text: self.fail_text,
            geometry_calls: Arc::clone(&self.geometry_calls),
            text_calls: Arc::clone(&self.text_calls),
        }))
    }
}

fn parse_page(entry: &str) -> Result<PageGeometry, DocumentLoadError> {
    let bad = || DocumentLoadError::Decode(format!("bad page '{}'", entry));
    let (size, rotation) = match entry.split_once('@') {
        Some((size, deg)) => {
            let deg: i32 = deg.parse().map_err(|_| bad())?;
            (size, Rotation::from_degrees(deg).map_err(|_| bad())?)
        }
        None => (entry, Rotation::None),
    };
    let (w, h) = size.split_once('x').ok_or_else(bad)?;
    Ok(PageGeometry {
        width: w.trim().parse().map_err(|_| bad())?,
        height: h.trim().parse().map_err(|_| bad())?,
        rotation,
    })
}

struct SyntheticDocument {
    pages: Vec<PageGeometry>,
    raster_delay: Duration,
    fail_text: bool,
    geometry_calls: Arc<AtomicUsize>,
    text_calls: Arc<AtomicUsize>,
}

/// Fill colour encoding the scale, so tests can tell which render landed
pub(crate) fn color_for_scale(scale: f32) -> Rgba<u8> {
    Rgba([(scale * 100.0) as u8, 0, 0, 255])
}

impl DecodedDocument for SyntheticDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_geometry(&self, page_number: u32) -> Result<PageGeometry, BackendError> {
        self.geometry_calls.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for memoization tests
        std::thread::sleep(Duration::from_millis(5));
        self.pages
            .get(page_number as usize - 1)
            .copied()
            .ok_or_else(|| BackendError::new("no such page"))
    }

    fn rasterize(
        &self,
        page_number: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Option<RgbaImage>, BackendError> {
        let page = self.page_geometry(page_number)?;
        let steps = self.raster_delay.as_millis().max(1) as u64;
        for _ in 0..steps {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        let (w, h) = if page.rotation.swaps_axes() {
            (page.height, page.width)
        } else {
            (page.width, page.height)
        };
        let s = scale as f64;
        Ok(Some(RgbaImage::from_pixel(
            (w * s).ceil() as u32,
            (h * s).ceil() as u32,
            color_for_scale(scale),
        )))
    }

    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>, BackendError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_text {
            return Err(BackendError::new("text layer is corrupt"));
        }
        Ok(vec![
            TextRun {
                text: format!("Page {} heading", page_number),
                transform: [18.0, 0.0, 0.0, 18.0, 72.0, 90.0],
                font_name: "Helvetica-Bold".to_string(),
                width: 160.0,
            },
            TextRun {
                text: "Body text".to_string(),
                transform: [12.0, 0.0, 0.0, 12.0, 72.0, 120.0],
                font_name: "Helvetica".to_string(),
                width: 54.0,
            },
        ])
    }
}
