//! Zoom and paging state for one viewer

use serde::Serialize;

use crate::error::GeometryError;
use crate::geometry::validate_scale;

pub const DEFAULT_ZOOM: f32 = 1.2;
pub const ZOOM_STEP: f32 = 0.2;
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomState {
    scale: f32,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self { scale: DEFAULT_ZOOM }
    }
}

impl ZoomState {
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.scale = round_step(self.scale + ZOOM_STEP).min(MAX_ZOOM);
        self.scale
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.scale = round_step(self.scale - ZOOM_STEP).max(MIN_ZOOM);
        self.scale
    }

    pub fn reset(&mut self) -> f32 {
        self.scale = DEFAULT_ZOOM;
        self.scale
    }

    /// Set an explicit scale, clamped to the zoom range
    pub fn set(&mut self, scale: f32) -> Result<f32, GeometryError> {
        validate_scale(scale)?;
        self.scale = scale.clamp(MIN_ZOOM, MAX_ZOOM);
        Ok(self.scale)
    }
}

// Keeps repeated steps from drifting (1.2 + 0.2 + 0.2 ...)
fn round_step(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// 1-indexed page position within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    page: u32,
    page_count: u32,
}

impl PageCursor {
    pub fn new(page_count: u32) -> Self {
        Self {
            page: 1,
            page_count: page_count.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Jump to a page; out-of-range requests are ignored
    pub fn go_to(&mut self, page: u32) -> bool {
        if (1..=self.page_count).contains(&page) {
            self.page = page;
            true
        } else {
            tracing::debug!("Ignoring page {} (document has {})", page, self.page_count);
            false
        }
    }

    pub fn next(&mut self) -> u32 {
        self.page = (self.page + 1).min(self.page_count);
        self.page
    }

    pub fn previous(&mut self) -> u32 {
        self.page = self.page.saturating_sub(1).max(1);
        self.page
    }
}
