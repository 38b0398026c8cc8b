//! Decode backend traits
//!
//! Backends are synchronous: the session always calls them from a blocking
//! thread.

use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;

use super::types::PageGeometry;
use crate::error::DocumentLoadError;
use crate::render::CancellationToken;
use crate::text::TextRun;

/// Failure inside a backend page operation
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Turns raw document bytes into a decoded document
pub trait DocumentBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Decode `bytes`; must not return a document with zero pages
    fn decode(&self, bytes: Arc<Vec<u8>>) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError>;
}

/// A decoded, paginated document
///
/// Page numbers are 1-indexed and already range-checked by the caller.
pub trait DecodedDocument: Send + Sync {
    fn page_count(&self) -> u32;

    /// Native size and rotation of a page
    fn page_geometry(&self, page_number: u32) -> Result<PageGeometry, BackendError>;

    /// Rasterize a page at `scale`
    ///
    /// Implementations poll `cancel` between units of work and return
    /// `Ok(None)` once it is set.
    fn rasterize(
        &self,
        page_number: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Option<RgbaImage>, BackendError>;

    /// Positioned text runs in reading order
    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>, BackendError>;
}
