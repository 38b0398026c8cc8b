//! Annotation overlay projection and drag-to-reposition

mod drag;
mod overlay;

pub use drag::{DragController, DragOutcome, DragState, DEFAULT_DRAG_THRESHOLD, RECONCILE_EPSILON};
pub use overlay::{AnnotationLayer, OverlayElement, OverlayKind, PageFrame, HIGHLIGHT_OPACITY};
