//! Coordinate transform engine
//!
//! Pure functions converting rectangles between screen space (pixels,
//! relative to the viewer container, zoom dependent) and document space
//! (native page points at scale 1.0, unrotated frame).

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Vertical distance under which two rects are on the same text line
pub const SAME_LINE_TOLERANCE: f64 = 5.0;
/// Horizontal gap bridged when merging rects on one line
pub const ADJACENCY_TOLERANCE: f64 = 10.0;

/// Rectangle, in document space unless stated otherwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl AnnotationRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Bounding box covering both rects
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Component-wise comparison within `epsilon`
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
    }
}

/// A point in either space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Native page dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Page rotation in quarter turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    /// Parse any multiple of 90 degrees, including negative values
    pub fn from_degrees(degrees: i32) -> Result<Self, GeometryError> {
        if degrees % 90 != 0 {
            return Err(GeometryError::InvalidRotation(degrees));
        }
        Ok(match degrees.rem_euclid(360) {
            0 => Rotation::None,
            90 => Rotation::Quarter,
            180 => Rotation::Half,
            _ => Rotation::ThreeQuarter,
        })
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }

    /// Whether the rotated page swaps width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Quarter | Rotation::ThreeQuarter)
    }
}

impl TryFrom<i32> for Rotation {
    type Error = GeometryError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Rotation::from_degrees(value)
    }
}

impl From<Rotation> for i32 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// Reject zero, negative and non-finite scales
pub fn validate_scale(scale: f32) -> Result<f64, GeometryError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale as f64)
    } else {
        Err(GeometryError::InvalidScale(scale))
    }
}

/// Convert client-space rects to document space
///
/// Subtracts the container origin then divides by `scale`.
pub fn screen_to_document(
    rects: &[AnnotationRect],
    container_origin: Point,
    scale: f32,
) -> Result<Vec<AnnotationRect>, GeometryError> {
    let s = validate_scale(scale)?;
    Ok(rects
        .iter()
        .map(|r| AnnotationRect {
            x: (r.x - container_origin.x) / s,
            y: (r.y - container_origin.y) / s,
            width: r.width / s,
            height: r.height / s,
        })
        .collect())
}

/// Convert document-space rects to container-relative screen space
pub fn document_to_screen(
    rects: &[AnnotationRect],
    scale: f32,
) -> Result<Vec<AnnotationRect>, GeometryError> {
    let s = validate_scale(scale)?;
    Ok(rects.iter().map(|r| r.scaled(s)).collect())
}

/// Convert document-space rects back to client space (inverse of [`screen_to_document`])
pub fn document_to_client(
    rects: &[AnnotationRect],
    container_origin: Point,
    scale: f32,
) -> Result<Vec<AnnotationRect>, GeometryError> {
    Ok(document_to_screen(rects, scale)?
        .into_iter()
        .map(|r| r.translate(container_origin.x, container_origin.y))
        .collect())
}

/// Merge adjacent or overlapping rects that sit on the same line
///
/// The output is a fixed point: merging it again returns the same list.
pub fn merge_overlapping_rects(rects: &[AnnotationRect]) -> Vec<AnnotationRect> {
    let mut current = merge_pass(rects);
    loop {
        let next = merge_pass(&current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

/// One sort-and-sweep pass over `rects`
fn merge_pass(rects: &[AnnotationRect]) -> Vec<AnnotationRect> {
    let mut merged: Vec<AnnotationRect> = Vec::with_capacity(rects.len());
    for row in rows(rects) {
        for rect in row {
            match merged.last_mut() {
                Some(last)
                    if (rect.y - last.y).abs() < SAME_LINE_TOLERANCE
                        && rect.x <= last.right() + ADJACENCY_TOLERANCE =>
                {
                    *last = last.union(&rect);
                }
                _ => merged.push(rect),
            }
        }
    }
    merged
}

/// Group rects into text rows, each ordered left to right
///
/// A row starts at its topmost rect and takes every rect within
/// [`SAME_LINE_TOLERANCE`] below it.
fn rows(rects: &[AnnotationRect]) -> Vec<Vec<AnnotationRect>> {
    let mut sorted = rects.to_vec();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<Vec<AnnotationRect>> = Vec::new();
    let mut row_top = f64::NEG_INFINITY;
    for rect in sorted {
        match rows.last_mut() {
            Some(row) if rect.y - row_top <= SAME_LINE_TOLERANCE => row.push(rect),
            _ => {
                row_top = rect.y;
                rows.push(vec![rect]);
            }
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    }
    rows
}

/// Map a rect drawn on a rotated page into the unrotated reference frame
///
/// `page` is the native (unrotated) page size.
pub fn normalize_for_rotation(rect: &AnnotationRect, page: PageSize, rotation: Rotation) -> AnnotationRect {
    let (w, h) = (page.width, page.height);
    match rotation {
        Rotation::None => *rect,
        Rotation::Quarter => AnnotationRect {
            x: rect.y,
            y: h - rect.x - rect.width,
            width: rect.height,
            height: rect.width,
        },
        Rotation::Half => AnnotationRect {
            x: w - rect.x - rect.width,
            y: h - rect.y - rect.height,
            width: rect.width,
            height: rect.height,
        },
        Rotation::ThreeQuarter => AnnotationRect {
            x: w - rect.y - rect.height,
            y: rect.x,
            width: rect.height,
            height: rect.width,
        },
    }
}

/// Inverse of [`normalize_for_rotation`]: unrotated frame to the rotated view
pub fn denormalize_for_rotation(rect: &AnnotationRect, page: PageSize, rotation: Rotation) -> AnnotationRect {
    let (w, h) = (page.width, page.height);
    match rotation {
        Rotation::None => *rect,
        Rotation::Quarter => AnnotationRect {
            x: h - rect.y - rect.height,
            y: rect.x,
            width: rect.height,
            height: rect.width,
        },
        Rotation::Half => normalize_for_rotation(rect, page, Rotation::Half),
        Rotation::ThreeQuarter => AnnotationRect {
            x: rect.y,
            y: w - rect.x - rect.width,
            width: rect.height,
            height: rect.width,
        },
    }
}
