//! Filesystem watching.
//!
//! Two mechanisms: an event-driven path watcher backed by the platform
//! notifier, and a stat poller that samples metadata on an interval for
//! hosts that want change snapshots rather than events.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};

use crate::error::FsError;
use crate::meta::FileStat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// An entry appeared, disappeared, or was renamed.
    Rename,
    /// Contents or metadata changed in place.
    Change,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Path of the affected entry relative to the watched root, when known.
    pub filename: Option<String>,
}

/// An active event-driven watch. Dropping it stops delivery.
pub struct PathWatcher {
    path: String,
    // Held for its Drop; the notifier thread stops when this goes away.
    _watcher: notify::RecommendedWatcher,
}

impl PathWatcher {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for PathWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathWatcher").field("path", &self.path).finish()
    }
}

fn classify(kind: &notify::EventKind) -> Option<WatchEventKind> {
    use notify::event::{EventKind, ModifyKind};
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(WatchEventKind::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEventKind::Rename),
        EventKind::Modify(_) => Some(WatchEventKind::Change),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn relative_name(root: &Path, event_path: Option<&Path>) -> Option<String> {
    let event_path = event_path?;
    let relative = event_path.strip_prefix(root).unwrap_or(event_path);
    if relative.as_os_str().is_empty() {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
    } else {
        Some(relative.to_string_lossy().into_owned())
    }
}

/// Start watching `path`, delivering events to `on_event` from the
/// notifier's thread until the returned watcher is dropped.
pub fn watch_path(
    path: &str,
    recursive: bool,
    on_event: impl Fn(Result<WatchEvent, FsError>) + Send + 'static,
) -> Result<PathWatcher, FsError> {
    let root = std::path::PathBuf::from(path);
    let error_path = path.to_string();
    let mut watcher = notify::recommended_watcher(
        move |event: Result<notify::Event, notify::Error>| match event {
            Ok(event) => {
                if let Some(kind) = classify(&event.kind) {
                    on_event(Ok(WatchEvent {
                        kind,
                        filename: relative_name(&root, event.paths.first().map(|p| p.as_path())),
                    }));
                }
            }
            Err(e) => on_event(Err(FsError::internal("watch", e.to_string()))),
        },
    )
    .map_err(|e| map_notify_error(&error_path, e))?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(Path::new(path), mode)
        .map_err(|e| map_notify_error(path, e))?;

    tracing::debug!(path, recursive, "watch started");
    Ok(PathWatcher {
        path: path.to_string(),
        _watcher: watcher,
    })
}

fn map_notify_error(path: &str, err: notify::Error) -> FsError {
    match err.kind {
        notify::ErrorKind::Io(io_err) => FsError::io("watch", path, io_err),
        notify::ErrorKind::PathNotFound => FsError::io(
            "watch",
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "watched path not found"),
        ),
        other => FsError::internal("watch", format!("{other:?}")),
    }
}

/// An active stat poller. Dropping it (or calling [`StatPoller::stop`])
/// ends the polling thread after at most one more interval.
pub struct StatPoller {
    stop: Arc<AtomicBool>,
}

impl StatPoller {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for StatPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StatPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StatPoller")
    }
}

fn sample(path: &str) -> FileStat {
    // A missing path reads as an all-zero stat, so appearance and
    // disappearance both surface as a change.
    std::fs::metadata(path)
        .map(|m| FileStat::from_metadata(&m))
        .unwrap_or_else(|_| FileStat::zeroed())
}

/// Poll `path` every `interval_ms`, invoking `on_change(current, previous)`
/// whenever the sampled metadata differs from the last sample.
pub fn poll_stat(
    path: &str,
    interval_ms: u64,
    on_change: impl Fn(FileStat, FileStat) + Send + 'static,
) -> StatPoller {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = Arc::clone(&stop);
    let path = path.to_string();
    let interval = Duration::from_millis(interval_ms.max(1));

    std::thread::spawn(move || {
        let mut previous = sample(&path);
        loop {
            // Sleep in short slices so stop() takes effect promptly.
            let mut remaining = interval;
            while !remaining.is_zero() {
                if stop_for_thread.load(Ordering::SeqCst) {
                    return;
                }
                let slice = remaining.min(Duration::from_millis(50));
                std::thread::sleep(slice);
                remaining -= slice;
            }
            if stop_for_thread.load(Ordering::SeqCst) {
                return;
            }
            let current = sample(&path);
            if current != previous {
                on_change(current.clone(), previous);
                previous = current;
            }
        }
    });

    StatPoller { stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use tempfile::tempdir;

    #[test]
    fn watch_reports_create_and_change() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let watcher = watch_path(&root, false, move |event| {
            if let Ok(event) = event {
                let _ = tx.lock().unwrap().send(event);
            }
        })
        .unwrap();

        std::fs::write(dir.path().join("new.txt"), b"x").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            event.kind,
            WatchEventKind::Rename | WatchEventKind::Change
        ));
        drop(watcher);
    }

    #[test]
    fn watch_missing_path_fails() {
        let err = watch_path("/definitely/not/here", false, |_| {}).unwrap_err();
        assert!(err.code == "ENOENT" || err.code == "EIO");
    }

    #[test]
    fn poller_notices_modification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.txt");
        std::fs::write(&path, b"v1").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let poller = poll_stat(&path_str, 20, move |current, previous| {
            let _ = tx.lock().unwrap().send((current, previous));
        });

        std::thread::sleep(Duration::from_millis(60));
        std::fs::write(&path, b"longer contents").unwrap();

        let (current, previous) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(current.size, previous.size);
        poller.stop();
    }
}
