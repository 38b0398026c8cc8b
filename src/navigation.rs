//! Navigation Coordinator
//!
//! A single-slot mailbox for "jump to (document, page, annotation)" requests.
//! Publishing replaces whatever is pending; every publish gets a fresh
//! sequence number so repeating the same target triggers again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ViewerConfig;

/// Where to go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTarget {
    pub document_id: String,
    /// 1-indexed
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<String>,
    /// Flash the annotation once it is in view
    #[serde(default)]
    pub highlight: bool,
}

impl NavigationTarget {
    pub fn page(document_id: impl Into<String>, page_number: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page_number,
            annotation_id: None,
            highlight: false,
        }
    }

    pub fn annotation(document_id: impl Into<String>, page_number: u32, annotation_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            page_number,
            annotation_id: Some(annotation_id.into()),
            highlight: true,
        }
    }

    /// Steps a viewer showing `current_page` of `current_document` must take
    ///
    /// `page_count` belongs to the current document; after a document switch
    /// the page is only clamped from below.
    pub fn plan(&self, current_document: Option<&str>, current_page: u32, page_count: u32) -> Vec<NavigationStep> {
        let mut steps = Vec::new();
        let switching = current_document != Some(self.document_id.as_str());

        if switching {
            steps.push(NavigationStep::SwitchDocument {
                document_id: self.document_id.clone(),
            });
            steps.push(NavigationStep::ChangePage {
                page_number: self.page_number.max(1),
            });
        } else {
            let page = self.page_number.clamp(1, page_count.max(1));
            if page != current_page {
                steps.push(NavigationStep::ChangePage { page_number: page });
            }
        }

        if let Some(annotation_id) = &self.annotation_id {
            steps.push(NavigationStep::ScrollToAnnotation {
                annotation_id: annotation_id.clone(),
                flash: self.highlight,
            });
        }
        steps
    }
}

/// One published target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub seq: u64,
    pub target: NavigationTarget,
}

/// What a consumer does, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationStep {
    SwitchDocument { document_id: String },
    ChangePage { page_number: u32 },
    /// Only after the target page has rendered
    ScrollToAnnotation { annotation_id: String, flash: bool },
}

struct CoordinatorInner {
    slot: watch::Sender<Option<NavigationRequest>>,
    next_seq: AtomicU64,
    clear_delay: Duration,
    scroll_delay: Duration,
}

/// Publisher side of the navigation bus
#[derive(Clone)]
pub struct NavigationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl NavigationCoordinator {
    pub fn new(config: &ViewerConfig) -> Self {
        Self::with_delays(config.nav_clear_delay, config.scroll_delay)
    }

    pub fn with_delays(clear_delay: Duration, scroll_delay: Duration) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            inner: Arc::new(CoordinatorInner {
                slot,
                next_seq: AtomicU64::new(1),
                clear_delay,
                scroll_delay,
            }),
        }
    }

    /// Publish a target, replacing any pending one
    pub fn navigate_to(&self, target: NavigationTarget) -> u64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Navigate #{} to {} page {} ({:?})",
            seq,
            target.document_id,
            target.page_number,
            target.annotation_id
        );
        self.inner.slot.send_replace(Some(NavigationRequest { seq, target }));
        seq
    }

    pub fn pending(&self) -> Option<NavigationRequest> {
        self.inner.slot.borrow().clone()
    }

    pub fn clear(&self) {
        self.inner.slot.send_replace(None);
    }

    /// Clear only if `seq` is still the pending request
    pub fn clear_if(&self, seq: u64) -> bool {
        self.inner.slot.send_if_modified(|slot| match slot {
            Some(request) if request.seq == seq => {
                *slot = None;
                true
            }
            _ => false,
        })
    }

    pub fn subscribe(&self) -> NavigationConsumer {
        NavigationConsumer {
            rx: self.inner.slot.subscribe(),
            coordinator: self.clone(),
            last_seq: 0,
        }
    }

    pub fn scroll_delay(&self) -> Duration {
        self.inner.scroll_delay
    }
}

impl std::fmt::Debug for NavigationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationCoordinator")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Receiving side; one per viewer
pub struct NavigationConsumer {
    rx: watch::Receiver<Option<NavigationRequest>>,
    coordinator: NavigationCoordinator,
    /// Highest sequence number already delivered
    last_seq: u64,
}

impl NavigationConsumer {
    /// Wait for the next published target
    ///
    /// Returns `None` once the coordinator is gone. A target that was already
    /// pending when the consumer subscribed is delivered first. Each publish
    /// is delivered once, even while it stays pending.
    pub async fn next(&mut self) -> Option<NavigationRequest> {
        loop {
            let fresh = self
                .rx
                .borrow_and_update()
                .as_ref()
                .filter(|request| request.seq > self.last_seq)
                .cloned();
            if let Some(request) = fresh {
                self.last_seq = request.seq;
                return Some(request);
            }
            self.rx.changed().await.ok()?;
        }
    }

    /// Drop the request after the clear delay, unless a newer one replaced it
    pub fn consumed(&self, request: &NavigationRequest) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let seq = request.seq;
        tokio::spawn(async move {
            tokio::time::sleep(coordinator.inner.clear_delay).await;
            if coordinator.clear_if(seq) {
                tracing::debug!("Navigation #{} cleared", seq);
            }
        })
    }

    pub fn scroll_delay(&self) -> Duration {
        self.coordinator.scroll_delay()
    }
}

/// Transient per-annotation flash with a self-clearing timer
#[derive(Clone)]
pub struct FlashTracker {
    duration: Duration,
    active: Arc<Mutex<HashMap<String, u64>>>,
    generation: Arc<AtomicU64>,
}

impl FlashTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(config.flash_duration)
    }

    /// Start (or restart) the flash for an annotation
    pub fn flash(&self, annotation_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(annotation_id.to_string(), generation);

        let active = Arc::clone(&self.active);
        let id = annotation_id.to_string();
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut active = active.lock();
            // A re-flash owns the entry now
            if active.get(&id) == Some(&generation) {
                active.remove(&id);
            }
        });
    }

    pub fn is_flashing(&self, annotation_id: &str) -> bool {
        self.active.lock().contains_key(annotation_id)
    }

    pub fn active(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for FlashTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashTracker")
            .field("duration", &self.duration)
            .field("active", &self.active())
            .finish()
    }
}
