// src/watcher.rs
use crate::config::AppConfig;
use crate::event::{ChangeEvent, ChangeKind};
use crate::paths::relative_to_root;
use anyhow::Result;
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use notify_debouncer_full::file_id::{get_file_id, FileId};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver as StdReceiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

type RootDebouncer = Debouncer<RecommendedWatcher, FileIdMap>;

/// Why the event pump stopped.
enum PumpExit {
    /// Nobody listens for change events anymore.
    Closed,
    /// The root vanished or the watch backend died; re-arm after a pause.
    RootLost,
}

/// A live watch on the root, together with the identity the root had when armed.
struct Armed {
    debouncer: RootDebouncer,
    rx: StdReceiver<DebounceEventResult>,
    root_id: FileId,
}

/// Runs the file system watcher for the served root in a background thread.
///
/// Debounced events are converted to [`ChangeEvent`]s relative to the root and
/// sent through `event_tx`. Only changes that happen after the watch is armed
/// are reported; files already on disk at startup produce nothing.
///
/// When the root cannot be watched, or becomes unreadable later, the thread
/// logs it and retries every `retry_interval`. It exits once `event_tx` is
/// closed.
///
/// # Errors
///
/// Returns an error only if the thread cannot be spawned.
pub async fn run_watcher(app_config: Arc<AppConfig>, event_tx: Sender<ChangeEvent>) -> Result<()> {
    let root = app_config.root.clone();
    let debounce = app_config.debounce;
    let retry = app_config.retry_interval;

    std::thread::Builder::new()
        .name("mdlive-watcher".to_string())
        .spawn(move || {
            watch_loop(&root, debounce, retry, &event_tx);
            info!("[WatcherThread] Exiting normally.");
        })?;

    Ok(())
}

fn watch_loop(root: &Path, debounce: Duration, retry: Duration, event_tx: &Sender<ChangeEvent>) {
    loop {
        match arm(root, debounce) {
            Ok(armed) => {
                info!("[WatcherThread] Watching folder: {}", root.display());
                let exit = pump(root, &armed.rx, armed.root_id, retry, event_tx);
                // Dropping the debouncer removes its watches.
                drop(armed.debouncer);
                match exit {
                    PumpExit::Closed => return,
                    PumpExit::RootLost => warn!(
                        "[WatcherThread] Lost watch on {}, retrying every {:?}",
                        root.display(),
                        retry
                    ),
                }
            }
            Err(e) => warn!(
                "[WatcherThread] Failed to watch folder {}: {}. Retrying in {:?}",
                root.display(),
                e,
                retry
            ),
        }
        if event_tx.is_closed() {
            return;
        }
        std::thread::sleep(retry);
    }
}

fn arm(root: &Path, debounce: Duration) -> Result<Armed> {
    if !root.is_dir() {
        anyhow::bail!("root is not a readable directory");
    }
    let root_id = get_file_id(root)?;
    let (debouncer_tx, debouncer_rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(debounce, None, debouncer_tx)?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    debouncer.cache().add_root(root, RecursiveMode::Recursive);
    Ok(Armed {
        debouncer,
        rx: debouncer_rx,
        root_id,
    })
}

fn pump(
    root: &Path,
    debouncer_rx: &StdReceiver<DebounceEventResult>,
    root_id: FileId,
    retry: Duration,
    event_tx: &Sender<ChangeEvent>,
) -> PumpExit {
    loop {
        match debouncer_rx.recv_timeout(retry) {
            Ok(Ok(events)) => {
                let mut root_lost = false;
                for debounced in events {
                    root_lost |= is_root_removal(root, &debounced.event);
                    for change in convert_event(root, &debounced.event) {
                        debug!("[WatcherThread] Produced event: {:?}", change);
                        // Blocking send: this is a plain std thread, not a tokio task.
                        if event_tx.blocking_send(change).is_err() {
                            return PumpExit::Closed;
                        }
                    }
                }
                if root_lost {
                    return PumpExit::RootLost;
                }
            }
            Ok(Err(errors)) => {
                for error in errors {
                    error!("[WatcherThread] Debouncer reported error: {:?}", error);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if event_tx.is_closed() {
                    return PumpExit::Closed;
                }
                // A root replaced between two checks has a new identity and no watch.
                if get_file_id(root).ok() != Some(root_id) {
                    return PumpExit::RootLost;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("[WatcherThread] Debouncer internal channel closed.");
                return PumpExit::RootLost;
            }
        }
    }
}

/// Returns `true` if `event` says the root itself was deleted or moved away.
///
/// The backend drops its watch when that happens, so nothing under a root
/// recreated at the same path would ever be reported.
fn is_root_removal(root: &Path, event: &notify::Event) -> bool {
    match event.kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().any(|p| p == root)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.first().is_some_and(|p| p == root),
        EventKind::Modify(ModifyKind::Name(_)) => event.paths.iter().any(|p| p == root) && !root.is_dir(),
        _ => false,
    }
}

/// Converts one notify event into change events relative to `root`.
///
/// Paths outside the root, the root itself, access and metadata-only events
/// are dropped. A two-sided rename becomes a removal followed by a creation.
pub fn convert_event(root: &Path, event: &notify::Event) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    let mut push = |kind: ChangeKind, path: &PathBuf| match relative_to_root(root, path) {
        Some(rel) if !rel.is_empty() => out.push(ChangeEvent::new(kind, rel)),
        _ => debug!("Ignoring change outside the served root: {}", path.display()),
    };

    match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            event.paths.iter().for_each(|p| push(ChangeKind::DirectoryCreated, p))
        }
        EventKind::Create(_) => event.paths.iter().for_each(|p| push(created(p), p)),
        EventKind::Remove(RemoveKind::Folder) => event
            .paths
            .iter()
            .for_each(|p| push(ChangeKind::DirectoryRemoved, p)),
        EventKind::Remove(_) => event.paths.iter().for_each(|p| push(ChangeKind::Removed, p)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                let dir = to.is_dir();
                push(removed_kind(dir), from);
                push(created_kind(dir), to);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().for_each(|p| push(ChangeKind::Removed, p))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().for_each(|p| push(created(p), p))
        }
        EventKind::Modify(ModifyKind::Name(_)) => event.paths.iter().for_each(|p| {
            if p.exists() {
                push(created(p), p)
            } else {
                push(ChangeKind::Removed, p)
            }
        }),
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => event.paths.iter().for_each(|p| {
            // A directory's own mtime changes with its children; the children report themselves.
            if !p.is_dir() {
                push(ChangeKind::Modified, p)
            }
        }),
        _ => debug!("[WatcherThread] Ignored event kind: {:?}", event.kind),
    }
    out
}

fn created(path: &Path) -> ChangeKind {
    created_kind(path.is_dir())
}

fn created_kind(dir: bool) -> ChangeKind {
    if dir {
        ChangeKind::DirectoryCreated
    } else {
        ChangeKind::Created
    }
}

fn removed_kind(dir: bool) -> ChangeKind {
    if dir {
        ChangeKind::DirectoryRemoved
    } else {
        ChangeKind::Removed
    }
}
