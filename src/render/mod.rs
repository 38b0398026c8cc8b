//! Page render pipeline
//!
//! Rasterizes one page at one scale onto a drawable surface. Each surface
//! owns a [`SurfaceRenderController`] that keeps at most one live render
//! task and cancels it before starting the next.

mod cancel;
mod controller;
mod surface;

pub use cancel::CancellationToken;
pub use controller::{RenderOutcome, RenderState, RenderTask, SurfaceRenderController};
pub use surface::{PixelSurface, Surface};
