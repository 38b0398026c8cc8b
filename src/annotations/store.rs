//! Optimistic annotation store
//!
//! Each loaded document keeps a committed map (server-confirmed records) and
//! an ordered overlay of pending mutations. Readers always see
//! [`effective_state`] of the two. A failed mutation is removed from the
//! overlay, which restores the previous effective state exactly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use uuid::Uuid;

use super::service::{AnnotationService, CreateContext};
use super::types::{
    AnnotationPatch, AnnotationType, CreateAnnotation, PdfAnnotation, UpdateAnnotation, LOCAL_ID_PREFIX,
};
use crate::config::ViewerConfig;
use crate::error::{MutationKind, Result, ViewerError};

const EVENT_CAPACITY: usize = 64;

/// An optimistic change not yet confirmed by the service
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    /// Optimistic record under a local id
    Create(PdfAnnotation),
    Update {
        id: String,
        patch: AnnotationPatch,
        at: DateTime<Utc>,
    },
    Delete {
        id: String,
        at: DateTime<Utc>,
    },
}

impl PendingOp {
    pub fn target_id(&self) -> &str {
        match self {
            PendingOp::Create(record) => &record.id,
            PendingOp::Update { id, .. } | PendingOp::Delete { id, .. } => id,
        }
    }

    /// Apply on top of `state`; ops whose target is missing are no-ops
    fn apply(&self, state: &mut HashMap<String, PdfAnnotation>) {
        match self {
            PendingOp::Create(record) => {
                state.insert(record.id.clone(), record.clone());
            }
            PendingOp::Update { id, patch, at } => {
                if let Some(record) = state.get_mut(id) {
                    let mut updated = patch.apply_to(record);
                    updated.updated_at = *at;
                    *record = updated;
                }
            }
            PendingOp::Delete { id, at } => {
                if let Some(record) = state.get_mut(id) {
                    record.deleted_at.get_or_insert(*at);
                }
            }
        }
    }

    /// Whether the committed state already reflects this op
    fn is_reflected_in(&self, committed: &HashMap<String, PdfAnnotation>) -> bool {
        match self {
            PendingOp::Create(_) => false,
            PendingOp::Update { id, patch, .. } => committed
                .get(id)
                .map_or(true, |record| record.is_deleted() || patch.is_satisfied_by(record)),
            PendingOp::Delete { id, .. } => committed.get(id).map_or(true, PdfAnnotation::is_deleted),
        }
    }
}

/// A pending op tagged with its mutation sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub seq: u64,
    pub op: PendingOp,
}

/// Committed records with the pending overlay applied, in order
pub fn effective_state(
    committed: &HashMap<String, PdfAnnotation>,
    pending: &[PendingMutation],
) -> HashMap<String, PdfAnnotation> {
    let mut state = committed.clone();
    for mutation in pending {
        mutation.op.apply(&mut state);
    }
    state
}

/// Notifications about mutation outcomes
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Confirmed {
        operation: MutationKind,
        /// Id the caller saw; a `local-` id for creates
        id: String,
        record: PdfAnnotation,
    },
    RolledBack {
        operation: MutationKind,
        id: String,
        reason: String,
    },
    /// A document's annotations were (re)loaded
    Loaded { document_id: String, count: usize },
}

/// Resolves once the service confirms or rejects a mutation
#[derive(Debug)]
pub struct MutationHandle {
    id: String,
    operation: MutationKind,
    rx: oneshot::Receiver<Result<PdfAnnotation>>,
}

impl MutationHandle {
    /// Id of the affected record; the local id for creates
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operation(&self) -> MutationKind {
        self.operation
    }

    /// The authoritative record, or the error that caused a rollback
    pub async fn confirmed(self) -> Result<PdfAnnotation> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ViewerError::AnnotationPersistence {
                operation: self.operation,
                reason: "persistence task dropped".to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct DocumentCache {
    committed: HashMap<String, PdfAnnotation>,
    pending: Vec<PendingMutation>,
    /// Bumped by every confirmed mutation
    generation: u64,
    /// Generation at which each record was last confirmed
    confirmed_at: HashMap<String, u64>,
}

impl DocumentCache {
    fn confirm(&mut self, record: PdfAnnotation) {
        self.generation += 1;
        self.confirmed_at.insert(record.id.clone(), self.generation);
        self.committed.insert(record.id.clone(), record);
    }

    /// Replace committed records with a listing requested at generation `started`
    ///
    /// Local tombstones and records confirmed after `started` are kept over
    /// the listing.
    fn merge_listing(&mut self, fetched: Vec<PdfAnnotation>, started: u64) {
        let confirmed_at = &self.confirmed_at;
        let mut committed: HashMap<String, PdfAnnotation> = self
            .committed
            .drain()
            .filter(|(id, record)| {
                record.is_deleted() || confirmed_at.get(id).map_or(false, |at| *at > started)
            })
            .collect();
        for record in fetched {
            committed.entry(record.id.clone()).or_insert(record);
        }
        self.committed = committed;
    }

    fn effective(&self) -> HashMap<String, PdfAnnotation> {
        effective_state(&self.committed, &self.pending)
    }

    /// Drop pending ops the committed state already reflects
    fn reconcile(&mut self) -> usize {
        let before = self.pending.len();
        let committed = &self.committed;
        self.pending.retain(|m| !m.op.is_reflected_in(committed));
        before - self.pending.len()
    }

    fn remove_pending(&mut self, seq: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|m| m.seq != seq);
        before != self.pending.len()
    }

    fn requirement_ids(&self) -> HashSet<String> {
        self.effective()
            .into_values()
            .filter_map(|a| a.requirement_id)
            .collect()
    }
}

#[derive(Debug)]
struct RequirementView {
    annotations: Vec<PdfAnnotation>,
    documents: HashSet<String>,
}

/// Requirement id and optional supplier filter
type RequirementKey = (String, Option<String>);

#[derive(Debug, Default)]
struct StoreState {
    documents: HashMap<String, DocumentCache>,
    requirement_views: HashMap<RequirementKey, RequirementView>,
    next_seq: u64,
}

impl StoreState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Find the document holding `id` and its effective record
    fn locate(&self, id: &str) -> Option<(String, PdfAnnotation)> {
        self.documents.iter().find_map(|(doc_id, cache)| {
            cache
                .effective()
                .remove(id)
                .map(|record| (doc_id.clone(), record))
        })
    }

    /// Drop requirement views that may include records of `document_id`
    fn invalidate(&mut self, document_id: &str, extra: Option<&str>) {
        let mut touched = self
            .documents
            .get(document_id)
            .map(DocumentCache::requirement_ids)
            .unwrap_or_default();
        if let Some(rid) = extra {
            touched.insert(rid.to_string());
        }
        self.requirement_views.retain(|(rid, _), view| {
            !view.documents.contains(document_id) && !touched.contains(rid)
        });
    }
}

struct StoreInner {
    service: Arc<dyn AnnotationService>,
    context: CreateContext,
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreInner {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Settle a finished mutation: commit on success, roll back on failure
    fn settle(
        &self,
        document_id: &str,
        seq: u64,
        operation: MutationKind,
        id: &str,
        outcome: std::result::Result<PdfAnnotation, ViewerError>,
    ) -> Result<PdfAnnotation> {
        {
            let mut state = self.state.lock();
            let cache = state.documents.entry(document_id.to_string()).or_default();
            cache.remove_pending(seq);
            if let Ok(record) = &outcome {
                cache.confirm(record.clone());
                cache.reconcile();
            }
            let rid = outcome.as_ref().ok().and_then(|r| r.requirement_id.clone());
            state.invalidate(document_id, rid.as_deref());
        }
        self.bump();

        match outcome {
            Ok(record) => {
                tracing::debug!("Annotation {} {} confirmed as {}", operation, id, record.id);
                self.emit(StoreEvent::Confirmed {
                    operation,
                    id: id.to_string(),
                    record: record.clone(),
                });
                Ok(record)
            }
            Err(err) => {
                tracing::warn!("Annotation {} {} rolled back: {}", operation, id, err);
                self.emit(StoreEvent::RolledBack {
                    operation,
                    id: id.to_string(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

/// Client-side annotation cache with optimistic mutations
#[derive(Clone)]
pub struct AnnotationStore {
    inner: Arc<StoreInner>,
}

impl AnnotationStore {
    pub fn new(service: Arc<dyn AnnotationService>, config: &ViewerConfig) -> Self {
        let (revision, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                service,
                context: CreateContext {
                    organization_id: config.organization_id.clone(),
                    user_id: config.user_id.clone(),
                },
                state: Mutex::new(StoreState::default()),
                revision,
                events,
            }),
        }
    }

    /// Receiver of the store revision, bumped on every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Mutation outcome notifications
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Active annotations of a document, by page then creation time
    pub fn list(&self, document_id: &str) -> Vec<PdfAnnotation> {
        let state = self.inner.state.lock();
        let Some(cache) = state.documents.get(document_id) else {
            return Vec::new();
        };
        active_sorted(cache.effective().into_values())
    }

    /// Fetch a document's annotations from the service
    ///
    /// Committed active records are replaced; locally known tombstones are
    /// kept so a deleted id never reappears. A mutation confirmed while the
    /// fetch was in flight wins over the fetched copy.
    pub async fn load(&self, document_id: &str) -> Result<Vec<PdfAnnotation>> {
        let started = self
            .inner
            .state
            .lock()
            .documents
            .entry(document_id.to_string())
            .or_default()
            .generation;
        let fetched = self
            .inner
            .service
            .list_annotations(document_id)
            .await
            .map_err(|e| ViewerError::from_service(MutationKind::Load, document_id, e))?;
        let count = fetched.len();

        {
            let mut state = self.inner.state.lock();
            let cache = state.documents.entry(document_id.to_string()).or_default();
            cache.merge_listing(fetched, started);
            let dropped = cache.reconcile();
            if dropped > 0 {
                tracing::debug!("Reconciled {} pending mutations for {}", dropped, document_id);
            }
            state.invalidate(document_id, None);
        }

        tracing::info!("Loaded {} annotations for document {}", count, document_id);
        self.inner.bump();
        self.inner.emit(StoreEvent::Loaded {
            document_id: document_id.to_string(),
            count,
        });
        Ok(self.list(document_id))
    }

    /// Re-fetch a document; same contract as [`load`](Self::load)
    pub async fn refresh(&self, document_id: &str) -> Result<Vec<PdfAnnotation>> {
        self.load(document_id).await
    }

    /// Create an annotation optimistically
    ///
    /// The optimistic record is visible in [`list`](Self::list) as soon as
    /// this returns.
    pub fn create(&self, dto: CreateAnnotation) -> Result<MutationHandle> {
        dto.validate().map_err(|reason| ViewerError::AnnotationPersistence {
            operation: MutationKind::Create,
            reason,
        })?;

        let now = Utc::now();
        let local_id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4());
        let optimistic = PdfAnnotation {
            id: local_id.clone(),
            organization_id: self.inner.context.organization_id.clone(),
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
            created_by: self.inner.context.user_id.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let document_id = dto.document_id.clone();
        let seq = self.push_pending(&document_id, PendingOp::Create(optimistic));
        tracing::debug!("Optimistic create {} on {}", local_id, document_id);

        let inner = Arc::clone(&self.inner);
        let id = local_id.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = inner
                .service
                .create_annotation(&dto, &inner.context)
                .await
                .map_err(|e| ViewerError::from_service(MutationKind::Create, &id, e));
            let _ = tx.send(inner.settle(&document_id, seq, MutationKind::Create, &id, outcome));
        });

        Ok(MutationHandle {
            id: local_id,
            operation: MutationKind::Create,
            rx,
        })
    }

    /// Apply a partial update optimistically
    pub fn update(&self, request: UpdateAnnotation) -> Result<MutationHandle> {
        request
            .patch
            .validate()
            .map_err(|reason| ViewerError::AnnotationPersistence {
                operation: MutationKind::Update,
                reason,
            })?;

        let id = request.id;
        let patch = request.patch;
        let document_id = self.mutable_target(&id)?;
        let seq = self.push_pending(
            &document_id,
            PendingOp::Update {
                id: id.clone(),
                patch: patch.clone(),
                at: Utc::now(),
            },
        );

        let inner = Arc::clone(&self.inner);
        let (tx, rx) = oneshot::channel();
        let target = id.clone();
        tokio::spawn(async move {
            let outcome = inner
                .service
                .update_annotation(&document_id, &target, &patch)
                .await
                .map_err(|e| ViewerError::from_service(MutationKind::Update, &target, e));
            let _ = tx.send(inner.settle(&document_id, seq, MutationKind::Update, &target, outcome));
        });

        Ok(MutationHandle {
            id,
            operation: MutationKind::Update,
            rx,
        })
    }

    /// Soft-delete optimistically; the record leaves `list` immediately
    pub fn soft_delete(&self, id: &str) -> Result<MutationHandle> {
        let document_id = self.mutable_target(id)?;
        let at = Utc::now();
        let seq = self.push_pending(
            &document_id,
            PendingOp::Delete {
                id: id.to_string(),
                at,
            },
        );

        let inner = Arc::clone(&self.inner);
        let (tx, rx) = oneshot::channel();
        let target = id.to_string();
        tokio::spawn(async move {
            let outcome = inner
                .service
                .soft_delete_annotation(&document_id, &target)
                .await
                .map_err(|e| ViewerError::from_service(MutationKind::Delete, &target, e))
                .and_then(|()| {
                    // Tombstone built from the last confirmed record
                    let state = inner.state.lock();
                    state
                        .documents
                        .get(&document_id)
                        .and_then(|cache| cache.committed.get(&target).cloned())
                        .map(|mut record| {
                            record.deleted_at = Some(at);
                            record
                        })
                        .ok_or_else(|| ViewerError::conflict(&target, "record vanished during delete"))
                });
            let _ = tx.send(inner.settle(&document_id, seq, MutationKind::Delete, &target, outcome));
        });

        Ok(MutationHandle {
            id: id.to_string(),
            operation: MutationKind::Delete,
            rx,
        })
    }

    /// Look up one annotation of a document, soft-deleted or not
    ///
    /// Local state answers first; the service is asked otherwise.
    pub async fn get(&self, document_id: &str, id: &str) -> Result<Option<PdfAnnotation>> {
        if let Some(record) = self.find(id) {
            return Ok(Some(record));
        }
        self.inner
            .service
            .get_annotation(document_id, id)
            .await
            .map_err(|e| ViewerError::from_service(MutationKind::Load, id, e))
    }

    /// Effective record for `id` across loaded documents
    pub fn find(&self, id: &str) -> Option<PdfAnnotation> {
        self.inner.state.lock().locate(id).map(|(_, record)| record)
    }

    /// Bookmarks linked to a requirement across loaded documents, newest first
    ///
    /// With a `supplier_id`, only that supplier's bookmarks are listed.
    pub fn annotations_for_requirement(&self, requirement_id: &str, supplier_id: Option<&str>) -> Vec<PdfAnnotation> {
        let key = (requirement_id.to_string(), supplier_id.map(str::to_string));
        let mut state = self.inner.state.lock();
        if let Some(view) = state.requirement_views.get(&key) {
            return view.annotations.clone();
        }

        let mut documents = HashSet::new();
        let mut annotations = Vec::new();
        for (doc_id, cache) in &state.documents {
            let found: Vec<PdfAnnotation> = cache
                .effective()
                .into_values()
                .filter(|a| a.requirement_id.as_deref() == Some(requirement_id))
                .collect();
            if found.is_empty() {
                continue;
            }
            documents.insert(doc_id.clone());
            annotations.extend(found.into_iter().filter(|a| {
                !a.is_deleted()
                    && a.annotation_type == AnnotationType::Bookmark
                    && supplier_id.map_or(true, |s| a.supplier_id.as_deref() == Some(s))
            }));
        }
        annotations.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));

        state.requirement_views.insert(
            key,
            RequirementView {
                annotations: annotations.clone(),
                documents,
            },
        );
        annotations
    }

    /// Number of unconfirmed mutations for a document
    pub fn pending_count(&self, document_id: &str) -> usize {
        self.inner
            .state
            .lock()
            .documents
            .get(document_id)
            .map_or(0, |cache| cache.pending.len())
    }

    /// Resolve the document of a record that may be mutated
    fn mutable_target(&self, id: &str) -> Result<String> {
        if id.starts_with(LOCAL_ID_PREFIX) {
            return Err(ViewerError::conflict(id, "annotation is not yet confirmed"));
        }
        match self.inner.state.lock().locate(id) {
            None => Err(ViewerError::conflict(id, "unknown annotation")),
            Some((_, record)) if record.is_deleted() => {
                Err(ViewerError::conflict(id, "annotation is deleted"))
            }
            Some((document_id, _)) => Ok(document_id),
        }
    }

    fn push_pending(&self, document_id: &str, op: PendingOp) -> u64 {
        let seq = {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq();
            let rid = match &op {
                PendingOp::Create(record) => record.requirement_id.clone(),
                _ => None,
            };
            state
                .documents
                .entry(document_id.to_string())
                .or_default()
                .pending
                .push(PendingMutation { seq, op });
            state.invalidate(document_id, rid.as_deref());
            seq
        };
        self.inner.bump();
        seq
    }
}

fn active_sorted(records: impl IntoIterator<Item = PdfAnnotation>) -> Vec<PdfAnnotation> {
    let mut list: Vec<PdfAnnotation> = records.into_iter().filter(|a| !a.is_deleted()).collect();
    list.sort_by(|a, b| {
        (a.page_number, a.created_at, &a.id).cmp(&(b.page_number, b.created_at, &b.id))
    });
    list
}
