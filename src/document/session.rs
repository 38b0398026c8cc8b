//! Open document session with memoized pages

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::traits::DecodedDocument;
use super::types::PageHandle;
use crate::error::DocumentLoadError;

/// Handle to a decoded document
///
/// Owned by one viewer instance. Page handles are created lazily and at most
/// once per page, even under concurrent requests.
pub struct DocumentSession {
    source: String,
    fingerprint: Arc<str>,
    document: Arc<dyn DecodedDocument>,
    pages: Vec<OnceCell<Arc<PageHandle>>>,
}

impl DocumentSession {
    pub(crate) fn new(source: String, fingerprint: String, document: Arc<dyn DecodedDocument>) -> Self {
        let pages = (0..document.page_count()).map(|_| OnceCell::new()).collect();
        Self {
            source,
            fingerprint: fingerprint.into(),
            document,
            pages,
        }
    }

    /// Source URL or path the session was opened from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// SHA-256 hex digest of the source bytes
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page handle (1-indexed)
    pub async fn get_page(&self, page_number: u32) -> Result<Arc<PageHandle>, DocumentLoadError> {
        let slot = page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .ok_or(DocumentLoadError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count(),
            })?;

        slot.get_or_try_init(|| async {
            let document = Arc::clone(&self.document);
            let geometry = tokio::task::spawn_blocking(move || document.page_geometry(page_number))
                .await
                .map_err(|e| DocumentLoadError::Decode(format!("page task failed: {}", e)))?
                .map_err(|e| DocumentLoadError::Decode(format!("page {}: {}", page_number, e)))?;

            tracing::debug!(
                "Loaded page {} ({}x{}, rotation {})",
                page_number,
                geometry.width,
                geometry.height,
                geometry.rotation.degrees()
            );

            Ok::<_, DocumentLoadError>(Arc::new(PageHandle::new(
                page_number,
                geometry,
                Arc::clone(&self.fingerprint),
                Arc::clone(&self.document),
            )))
        })
        .await
        .map(Arc::clone)
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("source", &self.source)
            .field("fingerprint", &self.fingerprint)
            .field("page_count", &self.pages.len())
            .finish()
    }
}
