//! Text layer extraction with an LRU cache
//!
//! Keyed by `(document fingerprint, page)`. Concurrent misses on one page
//! share a single extraction. Failures are not cached and never fail the
//! page: callers get an unavailable layer instead.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::timeout;

use super::runs::{layout, TextRun, TextSpan};
use crate::config::ViewerConfig;
use crate::document::PageHandle;
use crate::error::{Result, ViewerError};

/// Timeout for a single page extraction
const TEXT_TIMEOUT_SECS: u64 = 15;

/// Extracted text for one page
#[derive(Debug, Clone)]
pub struct TextLayer {
    pub page_number: u32,
    pub runs: Arc<Vec<TextRun>>,
    /// False when extraction failed and selection is disabled for the page
    pub available: bool,
}

impl TextLayer {
    pub fn unavailable(page_number: u32) -> Self {
        Self {
            page_number,
            runs: Arc::new(Vec::new()),
            available: false,
        }
    }

    pub fn spans(&self, scale: f32) -> Vec<TextSpan> {
        layout(&self.runs, scale)
    }
}

type RunsCell = Arc<OnceCell<Arc<Vec<TextRun>>>>;

/// Cached text-run extractor
#[derive(Clone)]
pub struct TextLayerExtractor {
    cache: Arc<RwLock<LruCache<(String, u32), RunsCell>>>,
}

impl TextLayerExtractor {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(config.text_cache_size)
    }

    /// Extract runs, reporting failures
    pub async fn try_extract(&self, page: &PageHandle) -> Result<Arc<Vec<TextRun>>> {
        let key = (page.fingerprint().to_string(), page.page_number());

        let cell = {
            let mut cache = self.cache.write().await;
            match cache.get(&key) {
                Some(cell) => Arc::clone(cell),
                None => {
                    let cell = RunsCell::default();
                    cache.put(key, Arc::clone(&cell));
                    cell
                }
            }
        };

        let runs = cell.get_or_try_init(|| extract_runs(page)).await?;
        Ok(Arc::clone(runs))
    }

    /// Extract runs, degrading to an unavailable layer on failure
    pub async fn extract(&self, page: &PageHandle) -> TextLayer {
        match self.try_extract(page).await {
            Ok(runs) => TextLayer {
                page_number: page.page_number(),
                runs,
                available: true,
            },
            Err(e) => {
                tracing::warn!("{}; text selection disabled for this page", e);
                TextLayer::unavailable(page.page_number())
            }
        }
    }

    /// Drop cached runs for one document
    pub async fn evict_document(&self, fingerprint: &str) {
        let mut cache = self.cache.write().await;
        let stale: Vec<(String, u32)> = cache
            .iter()
            .filter(|((fp, _), _)| fp == fingerprint)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }
}

async fn extract_runs(page: &PageHandle) -> Result<Arc<Vec<TextRun>>> {
    let page_number = page.page_number();
    let document = page.document();
    let runs = timeout(
        Duration::from_secs(TEXT_TIMEOUT_SECS),
        tokio::task::spawn_blocking(move || document.text_runs(page_number)),
    )
    .await
    .map_err(|_| ViewerError::TextExtraction {
        page: page_number,
        reason: format!("timed out after {} seconds", TEXT_TIMEOUT_SECS),
    })?
    .map_err(|e| ViewerError::TextExtraction {
        page: page_number,
        reason: e.to_string(),
    })?
    .map_err(|e| ViewerError::TextExtraction {
        page: page_number,
        reason: e.to_string(),
    })?;

    Ok(Arc::new(runs))
}
