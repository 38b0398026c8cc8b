//! Turning live selections and clicks into annotation requests

use serde::{Deserialize, Serialize};

use crate::annotations::{
    AnnotationPosition, AnnotationType, CreateAnnotation, DEFAULT_BOOKMARK_COLOR,
    DEFAULT_HIGHLIGHT_COLOR,
};
use crate::document::PageHandle;
use crate::error::GeometryError;
use crate::geometry::{
    merge_overlapping_rects, normalize_for_rotation, screen_to_document, AnnotationRect, Point,
};

/// Side length of a click-to-bookmark marker, in document units
pub const BOOKMARK_SIZE: f64 = 20.0;

/// What a pointer gesture on the page does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Select,
    Highlight,
    Bookmark,
}

/// A selection as reported by the host, in client coordinates
#[derive(Debug, Clone, Default)]
pub struct ClientSelection {
    pub text: String,
    pub client_rects: Vec<AnnotationRect>,
}

/// A captured selection in document space, unrotated frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    pub text: String,
    pub rects: Vec<AnnotationRect>,
    pub page_number: u32,
    pub page_height: f64,
    pub page_width: f64,
}

impl TextSelection {
    /// Build a highlight create request from this selection
    pub fn into_create_request(
        self,
        document_id: impl Into<String>,
        requirement_id: Option<String>,
        color: Option<String>,
    ) -> CreateAnnotation {
        CreateAnnotation {
            document_id: document_id.into(),
            requirement_id,
            supplier_id: None,
            annotation_type: AnnotationType::Highlight,
            page_number: self.page_number,
            position: AnnotationPosition {
                annotation_type: AnnotationType::Highlight,
                page_width: self.page_width,
                page_height: self.page_height,
                rects: self.rects,
                text_range: None,
            },
            highlighted_text: Some(self.text),
            note_content: None,
            color: Some(color.unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string())),
            tags: None,
        }
    }
}

/// Holds the interaction mode and captures selections and clicks
#[derive(Debug, Clone, Default)]
pub struct SelectionCapture {
    mode: InteractionMode,
}

impl SelectionCapture {
    pub fn new(mode: InteractionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        tracing::debug!("Interaction mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    /// Handle pointer-up after a selection
    ///
    /// Returns `None` outside highlight mode or for a blank selection.
    pub fn on_pointer_up(
        &self,
        selection: &ClientSelection,
        container_origin: Point,
        page: &PageHandle,
        scale: f32,
    ) -> Result<Option<TextSelection>, GeometryError> {
        if self.mode != InteractionMode::Highlight {
            return Ok(None);
        }
        let text = selection.text.trim();
        if text.is_empty() || selection.client_rects.is_empty() {
            return Ok(None);
        }

        let document_rects = screen_to_document(&selection.client_rects, container_origin, scale)?;
        let native = page.native_size();
        let rects = merge_overlapping_rects(&document_rects)
            .iter()
            .map(|r| normalize_for_rotation(r, native, page.rotation()))
            .collect();

        Ok(Some(TextSelection {
            text: text.to_string(),
            rects,
            page_number: page.page_number(),
            page_height: native.height,
            page_width: native.width,
        }))
    }

    /// Build a bookmark create request for a click, in bookmark mode only
    pub fn bookmark_at(
        &self,
        click: Point,
        container_origin: Point,
        page: &PageHandle,
        scale: f32,
        document_id: impl Into<String>,
        requirement_id: Option<String>,
    ) -> Result<Option<CreateAnnotation>, GeometryError> {
        if self.mode != InteractionMode::Bookmark {
            return Ok(None);
        }

        let clicked = AnnotationRect::new(click.x, click.y, 0.0, 0.0);
        let anchor = screen_to_document(&[clicked], container_origin, scale)?[0];
        let view_rect = AnnotationRect::new(anchor.x, anchor.y, BOOKMARK_SIZE, BOOKMARK_SIZE);
        let native = page.native_size();
        let rect = normalize_for_rotation(&view_rect, native, page.rotation());

        Ok(Some(CreateAnnotation {
            document_id: document_id.into(),
            requirement_id,
            supplier_id: None,
            annotation_type: AnnotationType::Bookmark,
            page_number: page.page_number(),
            position: AnnotationPosition {
                annotation_type: AnnotationType::Bookmark,
                page_width: native.width,
                page_height: native.height,
                rects: vec![rect],
                text_range: None,
            },
            highlighted_text: None,
            note_content: None,
            color: Some(DEFAULT_BOOKMARK_COLOR.to_string()),
            tags: None,
        }))
    }
}
