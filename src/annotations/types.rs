//! Annotation data model
//!
//! Wire format is camelCase JSON. `position.rects` are always document-space
//! points in the unrotated page frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{AnnotationRect, PageSize};

/// Default highlight colour
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#FFEB3B";
/// Default bookmark colour
pub const DEFAULT_BOOKMARK_COLOR: &str = "#2196F3";

/// Relative page-size change beyond which a snapshot counts as drifted
const DRIFT_TOLERANCE: f64 = 1e-3;

/// Kinds of annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Highlight,
    Bookmark,
    Note,
    /// Free rectangular region
    Area,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Highlight => "highlight",
            AnnotationType::Bookmark => "bookmark",
            AnnotationType::Note => "note",
            AnnotationType::Area => "area",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "highlight" => Some(AnnotationType::Highlight),
            "bookmark" => Some(AnnotationType::Bookmark),
            "note" => Some(AnnotationType::Note),
            "area" => Some(AnnotationType::Area),
            _ => None,
        }
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            AnnotationType::Bookmark => DEFAULT_BOOKMARK_COLOR,
            _ => DEFAULT_HIGHLIGHT_COLOR,
        }
    }
}

/// Character offsets of a highlight within the page text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_offset: u32,
    pub end_offset: u32,
}

/// Where an annotation sits on its page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPosition {
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    /// Native page width when the annotation was created
    pub page_width: f64,
    /// Native page height when the annotation was created
    pub page_height: f64,
    pub rects: Vec<AnnotationRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_range: Option<TextRange>,
}

impl AnnotationPosition {
    /// Whether the page's native size differs from the creation snapshot
    pub fn has_geometry_drift(&self, page: PageSize) -> bool {
        let drifted = |snapshot: f64, current: f64| {
            snapshot > 0.0 && ((current - snapshot) / snapshot).abs() > DRIFT_TOLERANCE
        };
        drifted(self.page_width, page.width) || drifted(self.page_height, page.height)
    }

    /// Rescale rects onto a page whose native size changed
    pub fn reconciled_to(&self, page: PageSize) -> AnnotationPosition {
        if !self.has_geometry_drift(page) {
            return self.clone();
        }
        let sx = page.width / self.page_width;
        let sy = page.height / self.page_height;
        AnnotationPosition {
            annotation_type: self.annotation_type,
            page_width: page.width,
            page_height: page.height,
            rects: self
                .rects
                .iter()
                .map(|r| AnnotationRect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy))
                .collect(),
            text_range: self.text_range,
        }
    }

    /// Same position with `rects[0]` replaced
    pub fn with_primary_rect(&self, rect: AnnotationRect) -> AnnotationPosition {
        let mut position = self.clone();
        match position.rects.first_mut() {
            Some(first) => *first = rect,
            None => position.rects.push(rect),
        }
        position
    }
}

/// A stored annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAnnotation {
    pub id: String,
    pub organization_id: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    pub annotation_type: AnnotationType,
    /// 1-indexed
    pub page_number: u32,
    pub position: AnnotationPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PdfAnnotation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this record only exists locally, awaiting server confirmation
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Prefix of ids minted for optimistic records
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Create request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotation {
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    pub annotation_type: AnnotationType,
    pub page_number: u32,
    pub position: AnnotationPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,
    /// Falls back to the type's default colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl CreateAnnotation {
    /// Colour the record will carry
    pub fn resolved_color(&self) -> String {
        self.color
            .clone()
            .unwrap_or_else(|| self.annotation_type.default_color().to_string())
    }

    /// Check fields a service would reject
    pub fn validate(&self) -> Result<(), String> {
        if self.document_id.trim().is_empty() {
            return Err("documentId is required".to_string());
        }
        if self.page_number == 0 {
            return Err("pageNumber is 1-indexed".to_string());
        }
        if self.position.rects.is_empty() {
            return Err("position needs at least one rect".to_string());
        }
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        Ok(())
    }
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AnnotationPosition>,
}

impl AnnotationPatch {
    pub fn is_empty(&self) -> bool {
        self.note_content.is_none()
            && self.color.is_none()
            && self.tags.is_none()
            && self.position.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        if let Some(position) = &self.position {
            if position.rects.is_empty() {
                return Err("position needs at least one rect".to_string());
            }
        }
        Ok(())
    }

    /// Apply to a record; `updated_at` is left to the caller
    pub fn apply_to(&self, annotation: &PdfAnnotation) -> PdfAnnotation {
        let mut updated = annotation.clone();
        if let Some(note) = &self.note_content {
            updated.note_content = Some(note.clone());
        }
        if let Some(color) = &self.color {
            updated.color = color.clone();
        }
        if let Some(tags) = &self.tags {
            updated.tags = Some(tags.clone());
        }
        if let Some(position) = &self.position {
            updated.position = position.clone();
        }
        updated
    }

    /// Whether applying this patch leaves the record unchanged
    pub fn is_satisfied_by(&self, annotation: &PdfAnnotation) -> bool {
        self.note_content
            .as_ref()
            .map_or(true, |n| annotation.note_content.as_ref() == Some(n))
            && self.color.as_ref().map_or(true, |c| &annotation.color == c)
            && self
                .tags
                .as_ref()
                .map_or(true, |t| annotation.tags.as_ref() == Some(t))
            && self
                .position
                .as_ref()
                .map_or(true, |p| &annotation.position == p)
    }
}

/// Update request addressed to one annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnotation {
    pub id: String,
    #[serde(flatten)]
    pub patch: AnnotationPatch,
}

/// Accept `#RGB` or `#RRGGBB`
pub fn validate_color(color: &str) -> Result<(), String> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| format!("invalid color '{}': expected #RGB or #RRGGBB", color))?;
    if matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(format!("invalid color '{}': expected #RGB or #RRGGBB", color))
    }
}
