//! `FileWatcher`: a registry of filesystem watches shared across all
//! file-backed groups on the same filesystem (spec.md §4.3).
//!
//! One background thread is started lazily per filesystem on first
//! registration and stopped once its last registration is removed.
//! Callback execution is serialized per filesystem via a dedicated
//! flush thread reading coalesced `notify` events off an mpsc channel —
//! rapid bursts of modifications to the same path collapse into a single
//! callback call, at-least-once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::observability::Observability;

/// Default coalescing window: events for the same path arriving within
/// this window of each other collapse into one callback invocation.
const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Opaque handle returned by [`FileWatcherRegistry::watch`]; pass it to
/// [`FileWatcherRegistry::unwatch`] to stop receiving callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey(u64);

/// Groups registrations that live on the same underlying filesystem. On
/// Unix this is the device id of the watched path's parent directory; off
/// Unix (no portable device-id query), the canonicalized parent directory
/// itself stands in, which still gives every file-watched group under the
/// same directory tree a shared background thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FilesystemKey(String);

fn filesystem_key_for(path: &Path) -> FilesystemKey {
    let parent = path.parent().unwrap_or(path);
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(meta) = std::fs::metadata(parent) {
            return FilesystemKey(format!("dev:{}", meta.dev()));
        }
    }
    let canonical = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    FilesystemKey(format!("dir:{}", canonical.display()))
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    key: WatchKey,
    path: PathBuf,
    /// Identifies the logical owner that registered this path, so a
    /// repeated `watch(group_id, path, ..)` call is idempotent instead of
    /// installing a second OS-level watch on it (spec.md §4.3).
    group_id: u64,
    callback: Callback,
}

struct FsThread {
    watcher: Mutex<RecommendedWatcher>,
    registrations: Mutex<Vec<Registration>>,
    shutdown: Arc<std_mpsc::Sender<()>>,
}

/// A registry of watched files. Production code typically shares one
/// instance process-wide (see [`FileWatcherRegistry::global`]); tests
/// construct their own to stay isolated from each other (spec.md §9
/// "Global state"). `filesystems` is sharded with `DashMap` rather than a
/// single `Mutex<HashMap<_>>`: registration/unregistration on one
/// filesystem should never block a lookup on an unrelated one.
pub struct FileWatcherRegistry {
    filesystems: DashMap<FilesystemKey, Arc<FsThread>>,
    next_key: AtomicU64,
    coalesce_window: Duration,
    observability: Observability,
}

impl Default for FileWatcherRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_WINDOW, Observability::default())
    }
}

impl FileWatcherRegistry {
    pub fn new(coalesce_window: Duration, observability: Observability) -> Self {
        Self {
            filesystems: DashMap::new(),
            next_key: AtomicU64::new(0),
            coalesce_window,
            observability,
        }
    }

    /// The process-wide instance. Lazily started on first use; nothing
    /// prevents constructing a private [`FileWatcherRegistry`] instead for
    /// test isolation.
    pub fn global() -> &'static Self {
        static GLOBAL: std::sync::OnceLock<FileWatcherRegistry> = std::sync::OnceLock::new();
        GLOBAL.get_or_init(FileWatcherRegistry::default)
    }

    /// Registers `callback` to run (on the filesystem's watcher thread,
    /// so callers should keep it short or hand off) whenever `path`
    /// changes. `group_id` identifies the logical owner for idempotent
    /// re-registration: calling `watch` again with the same `(group_id,
    /// path)` pair returns the existing key instead of installing a
    /// second watch.
    pub fn watch(
        &self,
        group_id: u64,
        path: &Path,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> std::io::Result<WatchKey> {
        let fs_key = filesystem_key_for(path);

        if let Some(existing) = self.filesystems.get(&fs_key) {
            let registrations = existing.registrations.lock().unwrap();
            if let Some(found) = registrations
                .iter()
                .find(|r| r.group_id == group_id && r.path == path)
            {
                return Ok(found.key);
            }
        }

        let fs_thread = match self.filesystems.get(&fs_key) {
            Some(existing) => existing.clone(),
            None => {
                let started = self.start_fs_thread(fs_key.clone())?;
                self.filesystems.insert(fs_key, started.clone());
                started
            }
        };

        fs_thread
            .watcher
            .lock()
            .unwrap()
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(std::io::Error::other)?;

        let key = WatchKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        fs_thread.registrations.lock().unwrap().push(Registration {
            key,
            path: path.to_path_buf(),
            group_id,
            callback: Arc::new(callback),
        });
        Ok(key)
    }

    /// Unregisters a key. Stops the underlying filesystem thread once its
    /// last registration is removed (spec.md §4.3 "stop automatically").
    pub fn unwatch(&self, key: WatchKey) {
        let mut emptied: Option<FilesystemKey> = None;

        for entry in self.filesystems.iter() {
            let mut registrations = entry.value().registrations.lock().unwrap();
            let before = registrations.len();
            registrations.retain(|r| r.key != key);
            if registrations.len() != before {
                if registrations.is_empty() {
                    emptied = Some(entry.key().clone());
                }
                break;
            }
        }

        if let Some(fs_key) = emptied {
            if let Some((_, fs_thread)) = self.filesystems.remove(&fs_key) {
                let _ = fs_thread.shutdown.send(());
            }
        }
    }

    fn start_fs_thread(&self, fs_key: FilesystemKey) -> std::io::Result<Arc<FsThread>> {
        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(move |event| {
            let _ = raw_tx.send(event);
        })
        .map_err(std::io::Error::other)?;

        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let thread = Arc::new(FsThread {
            watcher: Mutex::new(watcher),
            registrations: Mutex::new(Vec::new()),
            shutdown: Arc::new(shutdown_tx),
        });

        let worker_thread = thread.clone();
        let coalesce_window = self.coalesce_window;
        let observability = self.observability.clone();
        std::thread::Builder::new()
            .name(format!("fleet-core-fswatch-{}", fs_key.0))
            .spawn(move || {
                run_fs_loop(worker_thread, raw_rx, shutdown_rx, coalesce_window, observability);
            })
            .map_err(std::io::Error::other)?;

        Ok(thread)
    }
}

/// Per-filesystem loop: reads raw `notify` events, coalesces bursts within
/// `coalesce_window` by path, then invokes every registered callback for
/// each distinct changed path exactly once per burst.
fn run_fs_loop(
    thread: Arc<FsThread>,
    raw_rx: std_mpsc::Receiver<notify::Result<notify::Event>>,
    shutdown_rx: std_mpsc::Receiver<()>,
    coalesce_window: Duration,
    observability: Observability,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }
        let first = match raw_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
        };

        let mut changed_paths: Vec<PathBuf> = Vec::new();
        collect_paths(&first, &mut changed_paths);

        let deadline = std::time::Instant::now() + coalesce_window;
        while let Ok(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            if remaining.is_zero() {
                break;
            }
            match raw_rx.recv_timeout(remaining) {
                Ok(event) => collect_paths(&event, &mut changed_paths),
                Err(_) => break,
            }
        }

        changed_paths.sort();
        changed_paths.dedup();

        let registrations = thread.registrations.lock().unwrap();
        for registration in registrations.iter() {
            if changed_paths.iter().any(|p| p == &registration.path) {
                let outcome =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (registration.callback)()));
                if outcome.is_err() {
                    observability.warn("file-watcher", "watch callback panicked");
                }
            }
        }
    }
}

fn collect_paths(event: &notify::Result<notify::Event>, out: &mut Vec<PathBuf>) {
    if let Ok(event) = event {
        out.extend(event.paths.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn watch_fires_on_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.conf");
        std::fs::write(&path, "a=1\n").unwrap();

        let registry = FileWatcherRegistry::new(Duration::from_millis(20), Observability::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let key = registry
            .watch(1, &path, move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "b=2").unwrap();
        file.flush().unwrap();

        std::thread::sleep(Duration::from_millis(500));
        assert!(calls.load(Ordering::SeqCst) >= 1);
        registry.unwatch(key);
    }

    #[test]
    fn re_registering_same_group_and_path_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.conf");
        std::fs::write(&path, "a=1\n").unwrap();

        let registry = FileWatcherRegistry::new(Duration::from_millis(20), Observability::default());
        let key1 = registry.watch(7, &path, || {}).unwrap();
        let key2 = registry.watch(7, &path, || {}).unwrap();
        assert_eq!(key1, key2);
    }
}
