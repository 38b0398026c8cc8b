//! Page-level types

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::traits::DecodedDocument;
use crate::error::GeometryError;
use crate::geometry::{validate_scale, PageSize, Rotation};

/// Native page metadata as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    /// Width at scale 1, unrotated
    pub width: f64,
    /// Height at scale 1, unrotated
    pub height: f64,
    pub rotation: Rotation,
}

/// Display size of a page at a given scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scale: f32,
    pub rotation: Rotation,
}

impl Viewport {
    /// Pixel dimensions of a surface holding this viewport
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.ceil().max(1.0) as u32,
            self.height.ceil().max(1.0) as u32,
        )
    }
}

/// Handle to one page of an open document
///
/// Immutable once obtained. A reloaded session hands out new handles.
#[derive(Clone)]
pub struct PageHandle {
    page_number: u32,
    geometry: PageGeometry,
    fingerprint: Arc<str>,
    document: Arc<dyn DecodedDocument>,
}

impl PageHandle {
    pub(crate) fn new(
        page_number: u32,
        geometry: PageGeometry,
        fingerprint: Arc<str>,
        document: Arc<dyn DecodedDocument>,
    ) -> Self {
        Self {
            page_number,
            geometry,
            fingerprint,
            document,
        }
    }

    /// 1-indexed page number
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn width(&self) -> f64 {
        self.geometry.width
    }

    pub fn height(&self) -> f64 {
        self.geometry.height
    }

    pub fn rotation(&self) -> Rotation {
        self.geometry.rotation
    }

    /// Native unrotated size, the frame annotations are stored in
    pub fn native_size(&self) -> PageSize {
        PageSize::new(self.geometry.width, self.geometry.height)
    }

    /// Fingerprint of the document this page belongs to
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Page dimensions at `scale`, with axes swapped for quarter rotations
    pub fn viewport(&self, scale: f32) -> Result<Viewport, GeometryError> {
        let s = validate_scale(scale)?;
        let (width, height) = if self.geometry.rotation.swaps_axes() {
            (self.geometry.height, self.geometry.width)
        } else {
            (self.geometry.width, self.geometry.height)
        };
        Ok(Viewport {
            width: width * s,
            height: height * s,
            scale,
            rotation: self.geometry.rotation,
        })
    }

    pub(crate) fn document(&self) -> Arc<dyn DecodedDocument> {
        Arc::clone(&self.document)
    }
}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_number", &self.page_number)
            .field("geometry", &self.geometry)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
