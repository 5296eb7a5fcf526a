//! Filesystem watcher feeding the create transition, for hosts that do not
//! already expose their own watcher.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::error::TimingError;
use crate::host::HmrTiming;

/// Watches the project root until dropped.
pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
    pump: JoinHandle<()>,
}

impl FileWatcher {
    /// Starts watching `timing.config().project_root` recursively.
    pub fn start(timing: HmrTiming) -> Result<Self, TimingError> {
        let root = timing.config().project_root.clone();

        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                log::error!("[vite-timing] Failed to forward file event: {}", e);
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        log::info!("[vite-timing] Watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            pump: spawn_pump(timing, rx),
        })
    }
}

/// Drains watcher events into the create transition, one per save.
fn spawn_pump(
    timing: HmrTiming,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
) -> JoinHandle<()> {
    let ignored = timing.config().ignored_dirs.clone();
    let mut coalescer = SaveCoalescer::new(timing.config().debounce);

    tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            match result {
                Ok(event) => {
                    let now = Instant::now();
                    for path in changed_paths(&event, &ignored) {
                        if coalescer.admit(path, now) {
                            timing.on_file_change(path);
                        }
                    }
                }
                Err(e) => log::warn!("[vite-timing] File watcher error: {}", e),
            }
        }
    })
}

/// Collapses the burst of events one save produces (truncate, then write)
/// into a single change.
#[derive(Debug)]
pub struct SaveCoalescer {
    window: Duration,
    last_forwarded: HashMap<PathBuf, Instant>,
}

impl SaveCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_forwarded: HashMap::new(),
        }
    }

    /// Whether an event for `path` at `now` starts a new save. The window
    /// runs from the last event that was let through.
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.last_forwarded.get(path) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                log::debug!(
                    "[vite-timing] Skipping duplicate event for {} ({} ms after the last)",
                    path.display(),
                    elapsed.as_millis()
                );
                return false;
            }
        }

        if self.last_forwarded.len() >= 1024 {
            let window = self.window;
            self.last_forwarded
                .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        }
        self.last_forwarded.insert(path.to_path_buf(), now);
        true
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Paths of `event` that count as a content change.
pub fn changed_paths<'a>(event: &'a Event, ignored: &'a [String]) -> Vec<&'a PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    ) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|path| !is_ignored(path, ignored))
        .collect()
}

fn is_ignored(path: &Path, ignored: &[String]) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => ignored.iter().any(|dir| name == dir.as_str()),
        _ => false,
    })
}
