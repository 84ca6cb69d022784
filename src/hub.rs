// src/hub.rs

//! Registry of connected viewers and the fan-out of change events to them.

use crate::event::{ChangeEvent, ReloadMessage};
use crate::view_match::View;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::watch::Receiver as WatchReceiver;
use tracing::{debug, info};

/// Pending reload messages a single viewer may hold before it counts as not ready.
const VIEWER_QUEUE: usize = 8;

pub type ViewerId = u64;

struct Viewer {
    view: View,
    tx: Sender<ReloadMessage>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    viewers: Mutex<HashMap<ViewerId, Viewer>>,
}

/// Shared set of live viewer sessions.
///
/// Cloning is cheap; all clones see the same set. Sessions join through
/// [`ViewerHub::register`] and leave when their [`ViewerSession`] is dropped.
#[derive(Clone, Default)]
pub struct ViewerHub {
    inner: Arc<HubInner>,
}

/// Outcome of delivering one change event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Viewers that were sent a reload message
    pub delivered: usize,
    /// Viewers whose view is unaffected by the change
    pub filtered: usize,
    /// Viewers that were affected but not ready to receive
    pub skipped: usize,
}

/// One connected viewer. Receives the reload messages meant for its view.
pub struct ViewerSession {
    id: ViewerId,
    view: View,
    hub: ViewerHub,
    rx: Receiver<ReloadMessage>,
}

impl ViewerSession {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Waits for the next reload message. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ReloadMessage> {
        self.rx.recv().await
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a viewer looking at `view`.
    pub fn register(&self, view: View) -> ViewerSession {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE);
        self.viewers().insert(
            id,
            Viewer {
                view: view.clone(),
                tx,
            },
        );
        info!(
            "Viewer {} connected, watching '/{}' ({})",
            id,
            view.id,
            view.kind.as_str()
        );
        ViewerSession {
            id,
            view,
            hub: self.clone(),
            rx,
        }
    }

    fn unregister(&self, id: ViewerId) {
        if self.viewers().remove(&id).is_some() {
            info!("Viewer {} disconnected", id);
        }
    }

    pub fn len(&self) -> usize {
        self.viewers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends a reload message to every viewer whose view is affected by `event`.
    ///
    /// Never waits on a viewer: one whose queue is full or whose connection is
    /// closing is skipped.
    pub fn fan_out(&self, event: &ChangeEvent) -> FanOut {
        let message = ReloadMessage::from(event);
        let mut report = FanOut::default();
        for (id, viewer) in self.viewers().iter() {
            if !viewer.view.should_reload(&event.path) {
                report.filtered += 1;
                continue;
            }
            match viewer.tx.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                    debug!("Viewer {} not ready, skipping {}", id, event.path);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    fn viewers(&self) -> MutexGuard<'_, HashMap<ViewerId, Viewer>> {
        // Entries are plain data, so a poisoned lock still holds a usable map.
        self.inner
            .viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delivers every event from the watcher to the hub until the watcher side
/// closes or shutdown is signalled.
pub async fn run_fan_out(
    hub: ViewerHub,
    mut event_rx: Receiver<ChangeEvent>,
    shutdown_signal: WatchReceiver<bool>,
) {
    let mut shutdown = shutdown_signal;
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let report = hub.fan_out(&event);
                debug!(
                    "Fan-out {} {}: delivered={} filtered={} skipped={}",
                    event.kind, event.path, report.delivered, report.filtered, report.skipped
                );
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Fan-out shutting down.");
                    break;
                }
            }
            else => {
                info!("Watcher event channel closed. Fan-out exiting.");
                break;
            }
        }
    }
}
