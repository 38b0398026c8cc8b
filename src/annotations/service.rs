//! Persistence service interface

use async_trait::async_trait;
use thiserror::Error;

use super::types::{AnnotationPatch, CreateAnnotation, PdfAnnotation};

/// Errors reported by a persistence service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Annotation not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rejected input
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identity stamped on created records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContext {
    pub organization_id: String,
    pub user_id: String,
}

/// Backing store for annotations
///
/// Listing excludes soft-deleted records; direct lookup includes them.
#[async_trait]
pub trait AnnotationService: Send + Sync {
    async fn create_annotation(
        &self,
        dto: &CreateAnnotation,
        ctx: &CreateContext,
    ) -> Result<PdfAnnotation, ServiceError>;

    /// Apply a partial update and return the authoritative record
    async fn update_annotation(
        &self,
        document_id: &str,
        id: &str,
        patch: &AnnotationPatch,
    ) -> Result<PdfAnnotation, ServiceError>;

    /// Mark a record deleted; it stays retrievable by id
    async fn soft_delete_annotation(&self, document_id: &str, id: &str) -> Result<(), ServiceError>;

    async fn list_annotations(&self, document_id: &str) -> Result<Vec<PdfAnnotation>, ServiceError>;

    async fn get_annotation(&self, document_id: &str, id: &str) -> Result<Option<PdfAnnotation>, ServiceError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    use super::*;

    /// In-memory service with failure injection and an optional gate
    ///
    /// With a gate, every mutation waits for a permit, leaving the store's
    /// optimistic state observable.
    #[derive(Default)]
    pub(crate) struct MockAnnotationService {
        records: Mutex<HashMap<String, PdfAnnotation>>,
        fail_next: Mutex<Option<String>>,
        conflict_next: Mutex<bool>,
        gate: Option<Arc<Semaphore>>,
        mutations: AtomicUsize,
        list_gate: Mutex<Option<Arc<Semaphore>>>,
        lists: AtomicUsize,
    }

    impl MockAnnotationService {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            (
                Self {
                    gate: Some(Arc::clone(&gate)),
                    ..Self::default()
                },
                gate,
            )
        }

        /// The next mutation fails with a transport error
        pub(crate) fn fail_next(&self, reason: &str) {
            *self.fail_next.lock() = Some(reason.to_string());
        }

        /// The next mutation fails with a conflict
        pub(crate) fn conflict_next(&self) {
            *self.conflict_next.lock() = true;
        }

        pub(crate) fn insert(&self, record: PdfAnnotation) {
            self.records.lock().insert(record.id.clone(), record);
        }

        pub(crate) fn record(&self, id: &str) -> Option<PdfAnnotation> {
            self.records.lock().get(id).cloned()
        }

        pub(crate) fn mutations(&self) -> usize {
            self.mutations.load(Ordering::SeqCst)
        }

        /// Listings snapshot the records, then wait for a permit
        pub(crate) fn hold_lists(&self) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            *self.list_gate.lock() = Some(Arc::clone(&gate));
            gate
        }

        /// Number of listings snapshotted so far
        pub(crate) fn lists(&self) -> usize {
            self.lists.load(Ordering::SeqCst)
        }

        async fn enter(&self) -> Result<(), ServiceError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(reason) = self.fail_next.lock().take() {
                return Err(ServiceError::Transport(reason));
            }
            if std::mem::take(&mut *self.conflict_next.lock()) {
                return Err(ServiceError::Conflict("modified elsewhere".to_string()));
            }
            Ok(())
        }

        fn live(&self, id: &str) -> Result<PdfAnnotation, ServiceError> {
            match self.records.lock().get(id) {
                None => Err(ServiceError::NotFound(id.to_string())),
                Some(r) if r.is_deleted() => Err(ServiceError::Conflict(format!("{} is deleted", id))),
                Some(r) => Ok(r.clone()),
            }
        }
    }

    #[async_trait]
    impl AnnotationService for MockAnnotationService {
        async fn create_annotation(
            &self,
            dto: &CreateAnnotation,
            ctx: &CreateContext,
        ) -> Result<PdfAnnotation, ServiceError> {
            self.enter().await?;
            let now = Utc::now();
            let record = PdfAnnotation {
                id: Uuid::new_v4().to_string(),
                organization_id: ctx.organization_id.clone(),
                document_id: dto.document_id.clone(),
                requirement_id: dto.requirement_id.clone(),
                supplier_id: dto.supplier_id.clone(),
                annotation_type: dto.annotation_type,
                page_number: dto.page_number,
                position: dto.position.clone(),
                highlighted_text: dto.highlighted_text.clone(),
                note_content: dto.note_content.clone(),
                color: dto.resolved_color(),
                tags: dto.tags.clone(),
                created_by: ctx.user_id.clone(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            self.insert(record.clone());
            Ok(record)
        }

        async fn update_annotation(
            &self,
            _document_id: &str,
            id: &str,
            patch: &AnnotationPatch,
        ) -> Result<PdfAnnotation, ServiceError> {
            self.enter().await?;
            let mut updated = patch.apply_to(&self.live(id)?);
            updated.updated_at = Utc::now();
            self.insert(updated.clone());
            Ok(updated)
        }

        async fn soft_delete_annotation(&self, _document_id: &str, id: &str) -> Result<(), ServiceError> {
            self.enter().await?;
            let mut record = self.live(id)?;
            record.deleted_at = Some(Utc::now());
            self.insert(record);
            Ok(())
        }

        async fn list_annotations(&self, document_id: &str) -> Result<Vec<PdfAnnotation>, ServiceError> {
            let mut list: Vec<PdfAnnotation> = self
                .records
                .lock()
                .values()
                .filter(|r| r.document_id == document_id && !r.is_deleted())
                .cloned()
                .collect();
            list.sort_by(|a, b| (a.page_number, a.created_at).cmp(&(b.page_number, b.created_at)));
            self.lists.fetch_add(1, Ordering::SeqCst);

            let gate = self.list_gate.lock().clone();
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            Ok(list)
        }

        async fn get_annotation(&self, _document_id: &str, id: &str) -> Result<Option<PdfAnnotation>, ServiceError> {
            Ok(self.record(id))
        }
    }
}
