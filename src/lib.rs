//! Docmark Core
//!
//! Viewer core for paginated documents with spatial annotations: page
//! rendering, screen/document coordinate transforms, text selection and an
//! optimistic annotation store synchronized with a persistence service.
//!
//! # Modules
//!
//! - `document`: Opening sources and memoized page handles
//! - `render`: Per-surface render tasks with cooperative cancellation
//! - `geometry`: Coordinate transforms, rect merging, rotation frames
//! - `text`: Text layer extraction and selection capture
//! - `annotations`: Data model, persistence services, optimistic store
//! - `layer`: Overlay projection and drag-to-reposition
//! - `navigation`: Jump-to-annotation bus and flash timers

pub mod annotations;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod logging;
pub mod navigation;
pub mod render;
pub mod text;
pub mod viewer;

pub use annotations::{AnnotationService, AnnotationStore, PdfAnnotation};
pub use config::ViewerConfig;
pub use document::{open_document, DocumentBackend, DocumentLoader, DocumentSession, PageHandle};
pub use error::{Result, ViewerError};
pub use geometry::{AnnotationRect, PageSize, Point, Rotation};
pub use layer::{AnnotationLayer, DragController};
pub use navigation::{NavigationCoordinator, NavigationTarget};
pub use render::{RenderOutcome, SurfaceRenderController};
