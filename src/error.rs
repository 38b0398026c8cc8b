//! Error types for the viewer core
//!
//! Every fallible operation in the crate reports through [`ViewerError`].
//! Render cancellation is not an error; a cancelled render resolves with
//! `RenderOutcome::Cancelled`.

use thiserror::Error;

use crate::annotations::ServiceError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Top-level error taxonomy
#[derive(Debug, Error)]
pub enum ViewerError {
    /// The document could not be opened; fatal to the viewer instance
    #[error("Document load error: {0}")]
    DocumentLoad(#[from] DocumentLoadError),

    /// Rasterization failed for one page (not cancellation)
    #[error("Failed to render page {page} at scale {scale}: {reason}")]
    PageRender { page: u32, scale: f32, reason: String },

    /// Text extraction failed; selection is unavailable for the page
    #[error("Text extraction failed on page {page}: {reason}")]
    TextExtraction { page: u32, reason: String },

    /// A persistence call failed and the optimistic change was rolled back
    #[error("Annotation {operation} failed: {reason}")]
    AnnotationPersistence {
        operation: MutationKind,
        reason: String,
    },

    /// The mutation targets a deleted or unknown annotation
    #[error("Conflict on annotation {id}: {reason}")]
    Conflict { id: String, reason: String },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ViewerError {
    pub fn page_render(page: u32, scale: f32, reason: impl Into<String>) -> Self {
        Self::PageRender {
            page,
            scale,
            reason: reason.into(),
        }
    }

    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Map a persistence-service failure into the viewer taxonomy
    ///
    /// Missing or already-deleted records surface as conflicts, everything
    /// else is a persistence failure.
    pub fn from_service(operation: MutationKind, id: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => Self::conflict(id, format!("not found: {}", msg)),
            ServiceError::Conflict(msg) => Self::conflict(id, msg),
            other => Self::AnnotationPersistence {
                operation,
                reason: other.to_string(),
            },
        }
    }

    /// Whether the error leaves the viewer session usable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ViewerError::DocumentLoad(_) | ViewerError::Config(_))
    }
}

/// Kind of store operation, used for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    /// Fetching a document's annotations
    Load,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
            MutationKind::Load => "load",
        };
        f.write_str(s)
    }
}

/// Document open failures
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    #[error("Invalid document URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Server returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes could not be decoded as a document
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Document has no pages")]
    Empty,

    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Document load timed out after {0} seconds")]
    Timeout(u64),

    /// The load was superseded by a newer one or the viewer went away
    #[error("Document load aborted")]
    Aborted,
}

/// Invalid geometry inputs
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Scale must be finite and > 0, got {0}")]
    InvalidScale(f32),

    #[error("Rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),
}

/// Configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_not_found_maps_to_conflict() {
        let err = ViewerError::from_service(
            MutationKind::Update,
            "ann-1",
            ServiceError::NotFound("ann-1".into()),
        );
        assert!(matches!(err, ViewerError::Conflict { ref id, .. } if id == "ann-1"));
    }

    #[test]
    fn test_service_transport_maps_to_persistence() {
        let err = ViewerError::from_service(
            MutationKind::Create,
            "local-1",
            ServiceError::Transport("connection refused".into()),
        );
        match err {
            ViewerError::AnnotationPersistence { operation, reason } => {
                assert_eq!(operation, MutationKind::Create);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recoverability() {
        assert!(!ViewerError::from(DocumentLoadError::Empty).is_recoverable());
        assert!(ViewerError::page_render(1, 1.0, "boom").is_recoverable());
    }
}
