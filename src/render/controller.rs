//! Per-surface render task ownership

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::timeout;

use super::cancel::CancellationToken;
use super::surface::Surface;
use crate::config::ViewerConfig;
use crate::document::PageHandle;
use crate::error::{Result, ViewerError};

/// Lifecycle of a render task
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RenderState::Running)
    }
}

/// Successful resolution of a render
///
/// Cancellation is an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed { width: u32, height: u32 },
    Cancelled,
}

/// Handle to one in-flight rasterization
#[derive(Debug, Clone)]
pub struct RenderTask {
    id: u64,
    page_number: u32,
    scale: f32,
    size: (u32, u32),
    token: CancellationToken,
    state: watch::Receiver<RenderState>,
}

impl RenderTask {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Current state snapshot
    pub fn state(&self) -> RenderState {
        self.state.borrow().clone()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for a terminal state
    pub async fn finished(&self) -> Result<RenderOutcome> {
        let mut state = self.state.clone();
        let terminal = match state.wait_for(RenderState::is_terminal).await {
            Ok(s) => s.clone(),
            // Sender dropped without reaching a terminal state
            Err(_) => RenderState::Failed("render task vanished".to_string()),
        };

        match terminal {
            RenderState::Completed => Ok(RenderOutcome::Completed {
                width: self.size.0,
                height: self.size.1,
            }),
            RenderState::Cancelled => Ok(RenderOutcome::Cancelled),
            RenderState::Failed(reason) => {
                Err(ViewerError::page_render(self.page_number, self.scale, reason))
            }
            RenderState::Running => unreachable!("wait_for returned a running state"),
        }
    }
}

/// Owns the render task for one surface
pub struct SurfaceRenderController<S: Surface> {
    surface: Arc<Mutex<S>>,
    current: AsyncMutex<Option<RenderTask>>,
    render_timeout: Duration,
    next_id: AtomicU64,
}

impl<S: Surface> SurfaceRenderController<S> {
    pub fn new(surface: S, render_timeout: Duration) -> Self {
        Self {
            surface: Arc::new(Mutex::new(surface)),
            current: AsyncMutex::new(None),
            render_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(surface: S, config: &ViewerConfig) -> Self {
        Self::new(surface, config.render_timeout)
    }

    /// Shared access to the surface
    pub fn surface(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.surface)
    }

    /// Start rendering `page` at `scale`
    ///
    /// Any previous task on this surface is cancelled and has reached a
    /// terminal state by the time this returns.
    pub async fn start(&self, page: Arc<PageHandle>, scale: f32) -> Result<RenderTask> {
        let viewport = page.viewport(scale)?;
        let (width, height) = viewport.pixel_size();

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            if !previous.state().is_terminal() {
                tracing::debug!(
                    "Cancelling render {} (page {} @ {})",
                    previous.id,
                    previous.page_number,
                    previous.scale
                );
                previous.cancel();
                let mut state = previous.state.clone();
                let _ = state.wait_for(RenderState::is_terminal).await;
            }
        }

        self.surface.lock().resize(width, height);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RenderState::Running);

        let task = RenderTask {
            id,
            page_number: page.page_number(),
            scale,
            size: (width, height),
            token: token.clone(),
            state: state_rx,
        };

        tracing::debug!(
            "Starting render {} (page {} @ {}, {}x{})",
            id,
            page.page_number(),
            scale,
            width,
            height
        );

        let surface = Arc::clone(&self.surface);
        let render_timeout = self.render_timeout;
        tokio::spawn(async move {
            let state = run_render(page, scale, token, surface, render_timeout).await;
            match &state {
                RenderState::Failed(reason) => {
                    tracing::warn!("Render {} failed: {}", id, reason)
                }
                RenderState::Cancelled => tracing::debug!("Render {} cancelled", id),
                _ => tracing::debug!("Render {} completed", id),
            }
            let _ = state_tx.send(state);
        });

        *current = Some(task.clone());
        Ok(task)
    }

    /// Start a render and wait for it to resolve
    pub async fn render(&self, page: Arc<PageHandle>, scale: f32) -> Result<RenderOutcome> {
        let task = self.start(page, scale).await?;
        task.finished().await
    }

    /// Cancel the live task, if any, and wait for it to stop
    pub async fn cancel(&self) {
        let mut current = self.current.lock().await;
        if let Some(task) = current.take() {
            task.cancel();
            let mut state = task.state.clone();
            let _ = state.wait_for(RenderState::is_terminal).await;
        }
    }
}

async fn run_render<S: Surface>(
    page: Arc<PageHandle>,
    scale: f32,
    token: CancellationToken,
    surface: Arc<Mutex<S>>,
    render_timeout: Duration,
) -> RenderState {
    let document = page.document();
    let page_number = page.page_number();
    let worker_token = token.clone();

    let raster = timeout(
        render_timeout,
        tokio::task::spawn_blocking(move || document.rasterize(page_number, scale, &worker_token)),
    )
    .await;

    let pixels = match raster {
        Err(_) => {
            token.cancel();
            return RenderState::Failed(format!(
                "timed out after {} seconds",
                render_timeout.as_secs_f32()
            ));
        }
        Ok(Err(join)) => return RenderState::Failed(format!("render task panicked: {}", join)),
        Ok(Ok(Err(e))) if token.is_cancelled() => {
            tracing::debug!("Ignoring error from cancelled render: {}", e);
            return RenderState::Cancelled;
        }
        Ok(Ok(Err(e))) => return RenderState::Failed(e.to_string()),
        Ok(Ok(Ok(None))) => return RenderState::Cancelled,
        Ok(Ok(Ok(Some(pixels)))) => pixels,
    };

    let mut surface = surface.lock();
    if token.is_cancelled() {
        return RenderState::Cancelled;
    }
    surface.commit(pixels);
    RenderState::Completed
}
