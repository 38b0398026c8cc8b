//! Projecting stored annotations into the current viewport

use std::collections::HashMap;

use serde::Serialize;

use super::drag::DragController;
use crate::annotations::{AnnotationType, PdfAnnotation, RequirementBadge, RequirementRegistry};
use crate::document::PageHandle;
use crate::error::GeometryError;
use crate::geometry::{denormalize_for_rotation, document_to_screen, AnnotationRect, PageSize, Rotation};

/// Fill opacity of annotation regions
pub const HIGHLIGHT_OPACITY: f32 = 0.4;

/// The page an overlay is drawn over
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub page_number: u32,
    /// Native unrotated size
    pub size: PageSize,
    pub rotation: Rotation,
}

impl PageFrame {
    pub fn upright(page_number: u32, size: PageSize) -> Self {
        Self {
            page_number,
            size,
            rotation: Rotation::None,
        }
    }
}

impl From<&PageHandle> for PageFrame {
    fn from(page: &PageHandle) -> Self {
        Self {
            page_number: page.page_number(),
            size: page.native_size(),
            rotation: page.rotation(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayKind {
    /// Translucent fill over one rect
    Region(AnnotationType),
    /// Draggable bookmark pin anchored at `rects[0]`
    Marker,
}

/// One drawable element, in container-relative screen pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayElement {
    pub annotation_id: String,
    pub rect_index: usize,
    pub rect: AnnotationRect,
    pub color: String,
    pub opacity: f32,
    pub kind: OverlayKind,
}

/// Per-page annotation overlay
#[derive(Debug, Default)]
pub struct AnnotationLayer {
    drag: DragController,
}

impl AnnotationLayer {
    pub fn new(drag: DragController) -> Self {
        Self { drag }
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn drag_mut(&mut self) -> &mut DragController {
        &mut self.drag
    }

    /// Screen-space elements for the active annotations on `page`
    ///
    /// Rects are rescaled when the page's native size differs from the one
    /// recorded at creation. A live drag or an optimistic override replaces
    /// `rects[0]`.
    pub fn project(
        &self,
        annotations: &[PdfAnnotation],
        page: PageFrame,
        scale: f32,
    ) -> Result<Vec<OverlayElement>, GeometryError> {
        let mut elements = Vec::new();

        for annotation in annotations
            .iter()
            .filter(|a| a.page_number == page.page_number && !a.is_deleted())
        {
            let mut rects = annotation.position.reconciled_to(page.size).rects;
            if let (Some(first), Some(display)) =
                (rects.first_mut(), self.drag.display_rect(&annotation.id))
            {
                *first = display;
            }

            let view: Vec<AnnotationRect> = rects
                .iter()
                .map(|r| denormalize_for_rotation(r, page.size, page.rotation))
                .collect();
            let screen = document_to_screen(&view, scale)?;

            for (rect_index, rect) in screen.iter().enumerate() {
                elements.push(OverlayElement {
                    annotation_id: annotation.id.clone(),
                    rect_index,
                    rect: *rect,
                    color: annotation.color.clone(),
                    opacity: HIGHLIGHT_OPACITY,
                    kind: OverlayKind::Region(annotation.annotation_type),
                });
            }

            if annotation.annotation_type == AnnotationType::Bookmark {
                if let Some(anchor) = screen.first() {
                    elements.push(OverlayElement {
                        annotation_id: annotation.id.clone(),
                        rect_index: 0,
                        rect: *anchor,
                        color: annotation.color.clone(),
                        opacity: 1.0,
                        kind: OverlayKind::Marker,
                    });
                }
            }
        }

        Ok(elements)
    }

    /// Requirement badges for annotations that carry a requirement link
    pub async fn badges(
        annotations: &[PdfAnnotation],
        registry: &dyn RequirementRegistry,
    ) -> HashMap<String, RequirementBadge> {
        let mut badges = HashMap::new();
        for annotation in annotations {
            if let Some(rid) = &annotation.requirement_id {
                badges.insert(annotation.id.clone(), registry.badge(rid).await);
            }
        }
        badges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationPosition, StaticRequirementRegistry};
    use chrono::Utc;

    fn annotation(id: &str, kind: AnnotationType, page: u32, rects: Vec<AnnotationRect>) -> PdfAnnotation {
        let now = Utc::now();
        PdfAnnotation {
            id: id.to_string(),
            organization_id: "org".to_string(),
            document_id: "doc".to_string(),
            requirement_id: None,
            supplier_id: None,
            annotation_type: kind,
            page_number: page,
            position: AnnotationPosition {
                annotation_type: kind,
                page_width: 600.0,
                page_height: 800.0,
                rects,
                text_range: None,
            },
            highlighted_text: None,
            note_content: None,
            color: kind.default_color().to_string(),
            tags: None,
            created_by: "u".to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_project_scales_every_rect() {
        let layer = AnnotationLayer::default();
        let highlight = annotation(
            "h1",
            AnnotationType::Highlight,
            1,
            vec![
                AnnotationRect::new(10.0, 20.0, 100.0, 12.0),
                AnnotationRect::new(10.0, 34.0, 60.0, 12.0),
            ],
        );
        let elsewhere = annotation("h2", AnnotationType::Highlight, 2, vec![AnnotationRect::new(0.0, 0.0, 5.0, 5.0)]);

        let elements = layer
            .project(
                &[highlight, elsewhere],
                PageFrame::upright(1, PageSize::new(600.0, 800.0)),
                2.0,
            )
            .unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].rect_index, 1);
        assert_eq!(elements[1].rect, AnnotationRect::new(20.0, 68.0, 120.0, 24.0));
        assert_eq!(elements[0].opacity, HIGHLIGHT_OPACITY);
    }

    #[test]
    fn test_bookmark_emits_marker() {
        let layer = AnnotationLayer::default();
        let bookmark = annotation("b1", AnnotationType::Bookmark, 1, vec![AnnotationRect::new(50.0, 60.0, 20.0, 20.0)]);
        let elements = layer
            .project(&[bookmark], PageFrame::upright(1, PageSize::new(600.0, 800.0)), 1.0)
            .unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].kind, OverlayKind::Marker);
        assert_eq!(elements[1].rect, AnnotationRect::new(50.0, 60.0, 20.0, 20.0));
    }

    #[test]
    fn test_rotated_page_denormalizes() {
        let layer = AnnotationLayer::default();
        // Stored in the unrotated frame
        let stored = annotation("h1", AnnotationType::Highlight, 1, vec![AnnotationRect::new(20.0, 690.0, 12.0, 100.0)]);
        let frame = PageFrame {
            page_number: 1,
            size: PageSize::new(600.0, 800.0),
            rotation: Rotation::Quarter,
        };
        let elements = layer.project(&[stored], frame, 1.0).unwrap();
        assert_eq!(elements[0].rect, AnnotationRect::new(10.0, 20.0, 100.0, 12.0));
    }

    #[test]
    fn test_resized_page_rescales_rects() {
        let layer = AnnotationLayer::default();
        // Recorded on a 600x800 page
        let stored = annotation("h1", AnnotationType::Highlight, 1, vec![AnnotationRect::new(60.0, 80.0, 120.0, 16.0)]);
        let elements = layer
            .project(&[stored], PageFrame::upright(1, PageSize::new(300.0, 400.0)), 2.0)
            .unwrap();
        assert_eq!(elements[0].rect, AnnotationRect::new(60.0, 80.0, 120.0, 16.0));
    }

    #[test]
    fn test_deleted_annotations_are_hidden() {
        let layer = AnnotationLayer::default();
        let mut gone = annotation("h1", AnnotationType::Note, 1, vec![AnnotationRect::new(0.0, 0.0, 5.0, 5.0)]);
        gone.deleted_at = Some(Utc::now());
        let elements = layer
            .project(&[gone], PageFrame::upright(1, PageSize::new(600.0, 800.0)), 1.0)
            .unwrap();
        assert!(elements.is_empty());
    }

    #[tokio::test]
    async fn test_badges_resolve_through_registry() {
        let registry = StaticRequirementRegistry::new().with("r1", "REQ-001", "Braking");
        let mut linked = annotation("a", AnnotationType::Highlight, 1, vec![AnnotationRect::default()]);
        linked.requirement_id = Some("r1".to_string());
        let mut dangling = annotation("b", AnnotationType::Highlight, 1, vec![AnnotationRect::default()]);
        dangling.requirement_id = Some("r2".to_string());
        let plain = annotation("c", AnnotationType::Highlight, 1, vec![AnnotationRect::default()]);

        let badges = AnnotationLayer::badges(&[linked, dangling, plain], &registry).await;
        assert_eq!(badges.len(), 2);
        assert!(matches!(badges["a"], RequirementBadge::Linked(_)));
        assert_eq!(badges["b"], RequirementBadge::Unlinked("r2".to_string()));
    }
}
