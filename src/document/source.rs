//! Document source resolution and byte fetching

use std::path::PathBuf;

use crate::error::DocumentLoadError;

/// Where document bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// http(s) URL fetched over the network
    Remote(String),
    /// Local file, from a `file://` URL or a plain path
    File(PathBuf),
}

impl DocumentSource {
    /// Classify a source string
    pub fn parse(source: &str) -> Result<Self, DocumentLoadError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(DocumentLoadError::InvalidUrl("empty source".to_string()));
        }

        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(DocumentSource::Remote(source.to_string()));
        }

        if let Some(path) = source.strip_prefix("file://") {
            let decoded = urlencoding::decode(path)
                .map_err(|e| DocumentLoadError::InvalidUrl(format!("{}: {}", source, e)))?;
            return Ok(DocumentSource::File(PathBuf::from(decoded.into_owned())));
        }

        if let Some((scheme, _)) = source.split_once("://") {
            return Err(DocumentLoadError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        Ok(DocumentSource::File(PathBuf::from(source)))
    }

    /// Read the full document into memory
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<u8>, DocumentLoadError> {
        match self {
            DocumentSource::Remote(url) => {
                tracing::debug!("Fetching document from {}", url);
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| DocumentLoadError::Fetch(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(DocumentLoadError::Http {
                        status: status.as_u16(),
                        url: url.clone(),
                    });
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| DocumentLoadError::Fetch(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            DocumentSource::File(path) => {
                tracing::debug!("Reading document from {}", path.display());
                Ok(tokio::fs::read(path).await?)
            }
        }
    }
}
