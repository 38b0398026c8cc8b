//! End-to-end flows through the public API
//!
//! Uses a plain-text page backend and the SQLite annotation service.

use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use docmark_core::annotations::{AnnotationStore, SqliteAnnotationService};
use docmark_core::document::{BackendError, DecodedDocument, DocumentBackend, PageGeometry};
use docmark_core::error::DocumentLoadError;
use docmark_core::geometry::{AnnotationRect, Point, Rotation};
use docmark_core::layer::{AnnotationLayer, OverlayKind, PageFrame};
use docmark_core::navigation::{FlashTracker, NavigationCoordinator, NavigationStep, NavigationTarget};
use docmark_core::render::{CancellationToken, PixelSurface, RenderOutcome, SurfaceRenderController};
use docmark_core::text::{ClientSelection, InteractionMode, SelectionCapture, TextLayerExtractor, TextRun};
use docmark_core::{db, logging, open_document, ViewerConfig};

/// Pages described as `WxH` separated by newlines
struct PlainPages;

struct PlainDocument {
    pages: Vec<(f64, f64)>,
}

impl DocumentBackend for PlainPages {
    fn name(&self) -> &str {
        "plain"
    }

    fn decode(&self, bytes: Arc<Vec<u8>>) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError> {
        let text = std::str::from_utf8(&bytes).map_err(|e| DocumentLoadError::Decode(e.to_string()))?;
        let mut pages = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (w, h) = line
                .trim()
                .split_once('x')
                .ok_or_else(|| DocumentLoadError::Decode(format!("bad page {line}")))?;
            let parse = |v: &str| v.parse::<f64>().map_err(|e| DocumentLoadError::Decode(e.to_string()));
            pages.push((parse(w)?, parse(h)?));
        }
        Ok(Arc::new(PlainDocument { pages }))
    }
}

impl DecodedDocument for PlainDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_geometry(&self, page_number: u32) -> Result<PageGeometry, BackendError> {
        let (width, height) = self.pages[(page_number - 1) as usize];
        Ok(PageGeometry {
            width,
            height,
            rotation: Rotation::None,
        })
    }

    fn rasterize(
        &self,
        page_number: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Option<RgbaImage>, BackendError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let (width, height) = self.pages[(page_number - 1) as usize];
        let s = scale as f64;
        Ok(Some(RgbaImage::from_pixel(
            (width * s).ceil() as u32,
            (height * s).ceil() as u32,
            Rgba([255, 255, 255, 255]),
        )))
    }

    fn text_runs(&self, page_number: u32) -> Result<Vec<TextRun>, BackendError> {
        Ok(vec![TextRun {
            text: format!("Requirement text on page {page_number}"),
            transform: [12.0, 0.0, 0.0, 12.0, 72.0, 112.0],
            font_name: "Helvetica".to_string(),
            width: 180.0,
        }])
    }
}

async fn write_document(dir: &tempfile::TempDir, pages: &str) -> String {
    let path = dir.path().join("contract.txt");
    tokio::fs::write(&path, pages).await.unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_open_render_and_extract() {
    logging::init_tracing(logging::DEFAULT_FILTER);
    let dir = tempfile::tempdir().unwrap();
    let source = write_document(&dir, "612x792\n612x792\n612x792\n").await;

    let session = open_document(&source, Arc::new(PlainPages), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(session.page_count(), 3);
    assert_eq!(session.fingerprint().len(), 64);

    let page = session.get_page(2).await.unwrap();
    let viewport = page.viewport(1.5).unwrap();
    assert_eq!(viewport.width, 612.0 * 1.5);
    assert_eq!(viewport.height, 792.0 * 1.5);

    let config = ViewerConfig::default();
    let controller = SurfaceRenderController::from_config(PixelSurface::new(), &config);
    let outcome = controller.render(Arc::clone(&page), 1.5).await.unwrap();
    assert_eq!(
        outcome,
        RenderOutcome::Completed {
            width: 918,
            height: 1188
        }
    );
    assert_eq!(controller.surface().lock().commits(), 1);

    let extractor = TextLayerExtractor::from_config(&config);
    let layer = extractor.extract(&page).await;
    assert!(layer.available);
    let spans = layer.spans(2.0);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].font_size, 24.0);

    assert!(matches!(
        session.get_page(4).await,
        Err(DocumentLoadError::PageOutOfRange { page: 4, page_count: 3 })
    ));
}

#[tokio::test]
async fn test_highlight_lifecycle_against_sqlite() {
    logging::init_tracing(logging::DEFAULT_FILTER);
    let dir = tempfile::tempdir().unwrap();
    let source = write_document(&dir, "612x792\n").await;
    let session = open_document(&source, Arc::new(PlainPages), Duration::from_secs(5))
        .await
        .unwrap();
    let page = session.get_page(1).await.unwrap();

    let db_url = format!("sqlite://{}", dir.path().join("annotations.db").display());
    let pool = db::create_pool(&db_url).await.unwrap();
    let config = ViewerConfig::default();
    let store = AnnotationStore::new(Arc::new(SqliteAnnotationService::new(pool)), &config);
    assert!(store.load("doc-1").await.unwrap().is_empty());

    // Two glyph runs on one line, reported in client coordinates at scale 1.5
    let mut capture = SelectionCapture::default();
    capture.set_mode(InteractionMode::Highlight);
    let origin = Point::new(10.0, 50.0);
    let selection = ClientSelection {
        text: "shall comply ".to_string(),
        client_rects: vec![
            AnnotationRect::new(118.0, 200.0, 60.0, 18.0),
            AnnotationRect::new(178.0, 200.0, 45.0, 18.0),
        ],
    };
    let captured = capture
        .on_pointer_up(&selection, origin, &page, 1.5)
        .unwrap()
        .expect("highlight mode captures");
    assert_eq!(captured.rects.len(), 1);
    assert!(captured.rects[0].approx_eq(&AnnotationRect::new(72.0, 100.0, 70.0, 12.0), 1e-9));

    let handle = store
        .create(captured.into_create_request("doc-1", Some("REQ-7".to_string()), None))
        .unwrap();
    assert_eq!(store.list("doc-1").len(), 1, "optimistic record is visible immediately");

    let saved = handle.confirmed().await.unwrap();
    assert!(!saved.is_local());
    let listed = store.list("doc-1");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, saved.id);
    assert_eq!(listed[0].highlighted_text.as_deref(), Some("shall comply"));
    // Requirement views list bookmarks only
    assert!(store.annotations_for_requirement("REQ-7", None).is_empty());

    let layer = AnnotationLayer::default();
    let elements = layer
        .project(&listed, PageFrame::from(page.as_ref()), 2.0)
        .unwrap();
    assert_eq!(elements.len(), 1);
    assert!(matches!(elements[0].kind, OverlayKind::Region(_)));
    assert!(elements[0]
        .rect
        .approx_eq(&AnnotationRect::new(144.0, 200.0, 140.0, 24.0), 1e-9));

    store.soft_delete(&saved.id).unwrap().confirmed().await.unwrap();
    assert!(store.list("doc-1").is_empty());

    // Reloading from the database keeps the delete
    store.refresh("doc-1").await.unwrap();
    assert!(store.list("doc-1").is_empty());
    let tombstone = store.get("doc-1", &saved.id).await.unwrap().expect("deleted record stays retrievable");
    assert!(tombstone.is_deleted());
}

#[tokio::test]
async fn test_navigation_to_annotation_flashes() {
    let coordinator = NavigationCoordinator::with_delays(Duration::from_millis(20), Duration::from_millis(5));
    let flash = FlashTracker::new(Duration::from_millis(80));
    let mut consumer = coordinator.subscribe();

    coordinator.navigate_to(NavigationTarget::annotation("doc-2", 3, "ann-9"));
    let request = consumer.next().await.unwrap();

    let steps = request.target.plan(Some("doc-1"), 1, 10);
    assert_eq!(steps.len(), 3);
    for step in &steps {
        if let NavigationStep::ScrollToAnnotation { annotation_id, flash: true } = step {
            tokio::time::sleep(consumer.scroll_delay()).await;
            flash.flash(annotation_id);
        }
    }
    consumer.consumed(&request).await.unwrap();

    assert!(coordinator.pending().is_none());
    assert!(flash.is_flashing("ann-9"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!flash.is_flashing("ann-9"));
}
