//! Drag-to-reposition state machine
//!
//! `Idle -> Dragging -> Committing -> Idle`, or straight back to `Idle` for a
//! click or a cancelled gesture. Pointer positions are screen pixels; rects
//! handed in and out are document space in the unrotated frame.

use std::collections::HashMap;

use super::overlay::PageFrame;
use crate::annotations::{AnnotationPatch, AnnotationStore, MutationHandle, PdfAnnotation, UpdateAnnotation};
use crate::config::ViewerConfig;
use crate::error::{GeometryError, Result, ViewerError};
use crate::geometry::{denormalize_for_rotation, normalize_for_rotation, validate_scale, AnnotationRect, PageSize, Point};

/// Document-space travel before a press counts as a drag
pub const DEFAULT_DRAG_THRESHOLD: f64 = 2.0;
/// Tolerance when matching a confirmed rect against an override
pub const RECONCILE_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        annotation_id: String,
        frame: PageFrame,
        /// Grabbed rect in the displayed (rotated) frame
        origin: AnnotationRect,
        pointer_origin: Point,
        position: AnnotationRect,
        moved: bool,
    },
    Committing {
        annotation_id: String,
    },
}

/// Result of releasing the pointer
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// The marker moved; `rect` is the new `rects[0]` on a page of size `page`
    Reposition {
        id: String,
        rect: AnnotationRect,
        page: PageSize,
    },
    /// No meaningful movement; open the detail view
    Click { id: String },
}

#[derive(Debug)]
pub struct DragController {
    state: DragState,
    threshold: f64,
    /// Optimistic `rects[0]` shown until the store confirms it
    overrides: HashMap<String, AnnotationRect>,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD)
    }
}

impl DragController {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: DragState::Idle,
            threshold,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(config.drag_threshold)
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    pub fn override_for(&self, id: &str) -> Option<AnnotationRect> {
        self.overrides.get(id).copied()
    }

    /// Rect to draw in place of `rects[0]`, if any
    pub fn display_rect(&self, id: &str) -> Option<AnnotationRect> {
        match &self.state {
            DragState::Dragging {
                annotation_id,
                frame,
                position,
                ..
            } if annotation_id == id => Some(normalize_for_rotation(position, frame.size, frame.rotation)),
            _ => self.override_for(id),
        }
    }

    /// Start a gesture on a marker
    ///
    /// Ignored unless idle.
    pub fn pointer_down(&mut self, annotation_id: &str, doc_rect: AnnotationRect, frame: PageFrame, pointer: Point) {
        if !self.is_idle() {
            tracing::debug!("Ignoring pointer down on {} while {:?}", annotation_id, self.state);
            return;
        }
        let origin = denormalize_for_rotation(&doc_rect, frame.size, frame.rotation);
        self.state = DragState::Dragging {
            annotation_id: annotation_id.to_string(),
            frame,
            origin,
            pointer_origin: pointer,
            position: origin,
            moved: false,
        };
    }

    /// Track the pointer; returns the live rect in the unrotated frame
    pub fn pointer_move(&mut self, pointer: Point, scale: f32) -> std::result::Result<Option<AnnotationRect>, GeometryError> {
        let s = validate_scale(scale)?;
        let threshold = self.threshold;
        match &mut self.state {
            DragState::Dragging {
                frame,
                origin,
                pointer_origin,
                position,
                moved,
                ..
            } => {
                let dx = (pointer.x - pointer_origin.x) / s;
                let dy = (pointer.y - pointer_origin.y) / s;
                if dx.abs() > threshold || dy.abs() > threshold {
                    *moved = true;
                }
                *position = origin.translate(dx, dy);
                Ok(Some(normalize_for_rotation(position, frame.size, frame.rotation)))
            }
            _ => Ok(None),
        }
    }

    /// Finish the gesture
    pub fn pointer_up(&mut self) -> Option<DragOutcome> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging {
                annotation_id,
                frame,
                position,
                moved: true,
                ..
            } => {
                let rect = normalize_for_rotation(&position, frame.size, frame.rotation);
                self.overrides.insert(annotation_id.clone(), rect);
                self.state = DragState::Committing {
                    annotation_id: annotation_id.clone(),
                };
                Some(DragOutcome::Reposition {
                    id: annotation_id,
                    rect,
                    page: frame.size,
                })
            }
            DragState::Dragging { annotation_id, .. } => Some(DragOutcome::Click { id: annotation_id }),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Abort the gesture without changes
    pub fn cancel(&mut self) {
        if let DragState::Dragging { annotation_id, .. } = &self.state {
            tracing::debug!("Drag of {} cancelled", annotation_id);
            self.state = DragState::Idle;
        }
    }

    /// Persist a reposition through the store
    ///
    /// On a synchronous failure the override is dropped at once.
    pub fn commit(&mut self, store: &AnnotationStore, outcome: &DragOutcome) -> Result<Option<MutationHandle>> {
        let DragOutcome::Reposition { id, rect, page } = outcome else {
            return Ok(None);
        };

        let submitted = match store.find(id) {
            Some(record) => store.update(UpdateAnnotation {
                id: id.clone(),
                patch: AnnotationPatch {
                    position: Some(record.position.reconciled_to(*page).with_primary_rect(*rect)),
                    ..Default::default()
                },
            }),
            None => Err(ViewerError::conflict(id, "unknown annotation")),
        };

        match submitted {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                self.finish_commit(id, false);
                Err(e)
            }
        }
    }

    /// Leave `Committing`; a failed commit snaps the marker back
    pub fn finish_commit(&mut self, id: &str, succeeded: bool) {
        if !succeeded {
            tracing::debug!("Reposition of {} failed; dropping override", id);
            self.overrides.remove(id);
        }
        if matches!(&self.state, DragState::Committing { annotation_id } if annotation_id == id) {
            self.state = DragState::Idle;
        }
    }

    /// Clear overrides the authoritative records now match
    pub fn reconcile(&mut self, annotations: &[PdfAnnotation]) {
        self.overrides.retain(|id, rect| {
            match annotations.iter().find(|a| &a.id == id) {
                Some(a) if !a.is_deleted() => a
                    .position
                    .rects
                    .first()
                    .map_or(false, |confirmed| !confirmed.approx_eq(rect, RECONCILE_EPSILON)),
                _ => false,
            }
        });
    }
}
