//! Positioned text runs and their on-screen layout

use serde::{Deserialize, Serialize};

/// A run of text with its glyph-space transform
///
/// `transform` is `[a, b, c, d, e, f]` in top-down document space with
/// `(e, f)` at the baseline origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    pub transform: [f64; 6],
    pub font_name: String,
    /// Advance width in document units
    pub width: f64,
}

impl TextRun {
    pub fn font_height(&self) -> f64 {
        self.transform[0].hypot(self.transform[1])
    }

    /// Baseline angle in radians
    pub fn angle(&self) -> f64 {
        self.transform[1].atan2(self.transform[0])
    }
}

/// A transparent, selectable span positioned over the raster
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub font_size: f64,
    pub width: f64,
    /// Rotation in radians
    pub angle: f64,
    pub font_name: String,
}

/// Lay out runs for display at `scale`
pub fn layout(runs: &[TextRun], scale: f32) -> Vec<TextSpan> {
    let s = scale as f64;
    runs.iter()
        .map(|run| {
            let font_height = run.font_height();
            TextSpan {
                text: run.text.clone(),
                left: run.transform[4] * s,
                top: (run.transform[5] - font_height) * s,
                font_size: font_height * s,
                width: run.width * s,
                angle: run.angle(),
                font_name: run.font_name.clone(),
            }
        })
        .collect()
}
