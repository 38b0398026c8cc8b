//! MuPDF decode backend
//!
//! MuPDF's context is not thread-safe, so every operation opens a fresh
//! `Document` from the shared bytes.

use std::sync::Arc;

use image::RgbaImage;
use mupdf::{Colorspace, Document, Matrix, TextPageOptions};

use super::traits::{BackendError, DecodedDocument, DocumentBackend};
use super::types::PageGeometry;
use crate::error::DocumentLoadError;
use crate::geometry::Rotation;
use crate::render::CancellationToken;
use crate::text::TextRun;

const MIME_PDF: &str = "application/pdf";

/// Backend decoding PDF bytes with MuPDF
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl DocumentBackend for MupdfBackend {
    fn name(&self) -> &str {
        "mupdf"
    }

    fn decode(&self, bytes: Arc<Vec<u8>>) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError> {
        let doc = Document::from_bytes(&bytes, MIME_PDF)
            .map_err(|e| DocumentLoadError::Decode(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| DocumentLoadError::Decode(e.to_string()))?;

        Ok(Arc::new(MupdfDocument {
            bytes,
            page_count: page_count.max(0) as u32,
        }))
    }
}

struct MupdfDocument {
    bytes: Arc<Vec<u8>>,
    page_count: u32,
}

impl MupdfDocument {
    fn load_page(&self, page_number: u32) -> Result<mupdf::Page, BackendError> {
        let doc = Document::from_bytes(&self.bytes, MIME_PDF).map_err(to_backend)?;
        doc.load_page(page_number as i32 - 1).map_err(to_backend)
    }
}

fn to_backend(e: mupdf::Error) -> BackendError {
    BackendError::new(e.to_string())
}

impl DecodedDocument for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_geometry(&self, page_number: u32) -> Result<PageGeometry, BackendError> {
        let page = self.load_page(page_number)?;
        let bounds = page.bounds().map_err(to_backend)?;
        // bounds already reflect /Rotate, so the page is reported upright
        Ok(PageGeometry {
            width: (bounds.x1 - bounds.x0) as f64,
            height: (bounds.y1 - bounds.y0) as f64,
            rotation: Rotation::None,
        })
    }

    fn rasterize(
        &self,
        page_number: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Option<RgbaImage>, BackendError> {
        let page = self.load_page(page_number)?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), true, true)
            .map_err(to_backend)?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let n = pixmap.n() as usize;
        let samples = pixmap.samples();

        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for px in samples.chunks(n.max(1)).take((width * height) as usize) {
            let r = px.first().copied().unwrap_or(0);
            let g = px.get(1).copied().unwrap_or(0);
            let b = px.get(2).copied().unwrap_or(0);
            let a = if n >= 4 { px.get(3).copied().unwrap_or(255) } else { 255 };
            rgba.extend_from_slice(&[r, g, b, a]);
        }

        RgbaImage::from_raw(width, height, rgba)
            .map(Some)
            .ok_or_else(|| BackendError::new("pixmap size mismatch"))
    }

    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>, BackendError> {
        let page = self.load_page(page_number)?;
        let text_page = page
            .to_text_page(TextPageOptions::PRESERVE_WHITESPACE)
            .map_err(to_backend)?;

        let mut runs = Vec::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                let mut text = String::new();
                let mut x0 = f32::MAX;
                let mut x1 = f32::MIN;
                let mut baseline = f32::MIN;
                let mut size = 0.0f32;

                for ch in line.chars() {
                    let Some(c) = ch.char() else { continue };
                    let quad = ch.quad();
                    x0 = x0.min(quad.ul.x.min(quad.ll.x));
                    x1 = x1.max(quad.ur.x.max(quad.lr.x));
                    baseline = baseline.max(quad.ll.y.max(quad.lr.y));
                    size = size.max(ch.size());
                    text.push(c);
                }

                if text.trim().is_empty() {
                    continue;
                }

                let size = size as f64;
                runs.push(TextRun {
                    text,
                    transform: [size, 0.0, 0.0, size, x0 as f64, baseline as f64],
                    font_name: String::new(),
                    width: (x1 - x0) as f64,
                });
            }
        }

        Ok(runs)
    }
}
