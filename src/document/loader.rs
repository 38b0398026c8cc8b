//! Document loading with timeout and supersession

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::task::AbortHandle;
use tokio::time::timeout;

use super::session::DocumentSession;
use super::source::DocumentSource;
use super::traits::DocumentBackend;
use crate::config::ViewerConfig;
use crate::error::DocumentLoadError;

/// Process-wide HTTP client; connection pools are shared between loads
pub fn shared_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

/// Open a document: fetch its bytes, then decode them on a blocking thread
pub async fn open_document(
    source: &str,
    backend: Arc<dyn DocumentBackend>,
    load_timeout: Duration,
) -> Result<DocumentSession, DocumentLoadError> {
    open_document_with_client(source, backend, load_timeout, shared_client()).await
}

/// [`open_document`] over a caller-provided HTTP client
pub async fn open_document_with_client(
    source: &str,
    backend: Arc<dyn DocumentBackend>,
    load_timeout: Duration,
    client: &reqwest::Client,
) -> Result<DocumentSession, DocumentLoadError> {
    let secs = load_timeout.as_secs();
    timeout(load_timeout, open_inner(source, backend, client))
        .await
        .map_err(|_| {
            tracing::warn!("Loading {} timed out after {}s", source, secs);
            DocumentLoadError::Timeout(secs)
        })?
}

async fn open_inner(
    source: &str,
    backend: Arc<dyn DocumentBackend>,
    client: &reqwest::Client,
) -> Result<DocumentSession, DocumentLoadError> {
    let resolved = DocumentSource::parse(source)?;
    let bytes = resolved.fetch(client).await?;
    if bytes.is_empty() {
        return Err(DocumentLoadError::Decode("source is empty".to_string()));
    }

    let bytes = Arc::new(bytes);
    let (fingerprint, document) = tokio::task::spawn_blocking(move || {
        let fingerprint = hex::encode(Sha256::digest(bytes.as_slice()));
        backend.decode(bytes).map(|doc| (fingerprint, doc))
    })
    .await
    .map_err(|e| DocumentLoadError::Decode(format!("decode task failed: {}", e)))??;

    if document.page_count() == 0 {
        return Err(DocumentLoadError::Empty);
    }

    tracing::info!(
        "Opened {} ({} pages, fingerprint {})",
        source,
        document.page_count(),
        &fingerprint[..12]
    );

    Ok(DocumentSession::new(source.to_string(), fingerprint, document))
}

/// Loads documents for one viewer, aborting a load superseded by a newer one
pub struct DocumentLoader {
    backend: Arc<dyn DocumentBackend>,
    client: reqwest::Client,
    load_timeout: Duration,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl DocumentLoader {
    pub fn new(backend: Arc<dyn DocumentBackend>, config: &ViewerConfig) -> Self {
        Self {
            backend,
            client: shared_client().clone(),
            load_timeout: config.load_timeout,
            in_flight: Mutex::new(None),
        }
    }

    /// Fetch over `client` instead of the shared one
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Load `source`, aborting any load still in flight
    ///
    /// The superseded call resolves with [`DocumentLoadError::Aborted`].
    pub async fn load(&self, source: &str) -> Result<Arc<DocumentSession>, DocumentLoadError> {
        let source = source.to_string();
        let backend = Arc::clone(&self.backend);
        let client = self.client.clone();
        let load_timeout = self.load_timeout;

        let handle = tokio::spawn(async move {
            open_document_with_client(&source, backend, load_timeout, &client)
                .await
                .map(Arc::new)
        });

        if let Some(previous) = self.in_flight.lock().replace(handle.abort_handle()) {
            tracing::debug!("Aborting superseded document load");
            previous.abort();
        }

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DocumentLoadError::Aborted),
            Err(e) => Err(DocumentLoadError::Decode(format!("load task failed: {}", e))),
        }
    }

    /// Abort any in-flight load
    pub fn abort(&self) {
        if let Some(handle) = self.in_flight.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for DocumentLoader {
    fn drop(&mut self) {
        self.abort();
    }
}
