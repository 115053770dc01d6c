//! Directory watching for declaration files.
//!
//! Sources register a handler for a directory; the watcher delivers
//! `updated`/`deleted` callbacks for regular files in it, both for the
//! files already present when watching starts (initial scan) and for
//! subsequent filesystem events. Files whose name starts with `.` are
//! ignored. A rename is surfaced as delete-old plus create-new; sources
//! hide the transient duplicate through their uuid bookkeeping.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::SourceError;

/// Receives file change callbacks for one watched directory.
pub trait DirectoryHandler: Send + Sync {
    fn updated(&self, path: &Path);
    fn deleted(&self, path: &Path);
}

struct Watch {
    dir: PathBuf,
    handler: Arc<dyn DirectoryHandler>,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'))
}

/// Watches registered directories and dispatches change events to their
/// handlers from a single task, serializing handler invocations.
pub struct FsWatcher {
    watches: Arc<Mutex<Vec<Watch>>>,
    events_tx: mpsc::UnboundedSender<notify::Result<Event>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<notify::Result<Event>>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for FsWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FsWatcher {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            watches: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            watcher: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Register a handler for `dir`. Takes effect at [`start`].
    ///
    /// [`start`]: FsWatcher::start
    pub fn add_watch(&self, dir: impl Into<PathBuf>, handler: Arc<dyn DirectoryHandler>) {
        let dir = dir.into();
        info!(dir = %dir.display(), "watching directory");
        if let Ok(mut watches) = self.watches.lock() {
            watches.push(Watch { dir, handler });
        }
    }

    /// Start watching: subscribe to filesystem events for every registered
    /// directory, scan the files already present, and begin dispatching.
    pub fn start(&self) -> Result<(), SourceError> {
        let tx = self.events_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        {
            let Ok(watches) = self.watches.lock() else {
                return Ok(());
            };
            for watch in watches.iter() {
                watcher.watch(&watch.dir, RecursiveMode::NonRecursive)?;
            }
            for watch in watches.iter() {
                scan_existing(&watch.dir, watch.handler.as_ref());
            }
        }
        if let Ok(mut slot) = self.watcher.lock() {
            *slot = Some(watcher);
        }

        let rx = self.events_rx.lock().ok().and_then(|mut rx| rx.take());
        let Some(mut rx) = rx else {
            return Ok(());
        };
        let watches = self.watches.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Ok(event) => dispatch(&watches, &event),
                    Err(err) => warn!(%err, "filesystem watch error"),
                }
            }
        });
        if let Ok(mut slot) = self.task.lock() {
            if let Some(old) = slot.replace(task) {
                old.abort();
            }
        }
        Ok(())
    }

    /// Stop watching and dispatching. Registered handlers are kept, so a
    /// subsequent [`start`](FsWatcher::start) rescans.
    pub fn stop(&self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            watcher.take();
        }
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

fn scan_existing(dir: &Path, handler: &dyn DirectoryHandler) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!(dir = %dir.display(), %err, "could not scan directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_hidden(&path) && path.is_file() {
            handler.updated(&path);
        }
    }
}

fn dispatch(watches: &Arc<Mutex<Vec<Watch>>>, event: &Event) {
    let Ok(watches) = watches.lock() else {
        return;
    };
    for path in &event.paths {
        if is_hidden(path) {
            continue;
        }
        let parent = path.parent();
        for watch in watches.iter() {
            if parent != Some(watch.dir.as_path()) {
                continue;
            }
            // A path that still exists was created or modified; one that
            // does not was removed or renamed away.
            if path.is_file() {
                debug!(path = %path.display(), "file updated");
                watch.handler.updated(path);
            } else {
                debug!(path = %path.display(), "file deleted");
                watch.handler.deleted(path);
            }
        }
    }
}
