//! File-watched endpoint group: a dynamic group whose snapshot is derived
//! from a key=value file, re-read whenever [`FileWatcherRegistry`] reports
//! a change (spec.md §4.2 "file-watched", §6 file format).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::{FleetError, Result};
use crate::observability::Observability;
use crate::watcher::FileWatcherRegistry;

use super::{EndpointGroup, GroupCore, ListenerFn, ListenerId, Snapshot};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(0);

/// Parses the key=value file format from spec.md §6: a line whose first
/// non-whitespace character is `#` is a comment (the standard Properties-file
/// convention); keys matching `<prefix>.N` (any `N`, collected in lexical
/// order) each hold one endpoint text form, optionally suffixed with
/// `#weight` (e.g. `"10.0.0.1:8080#3"`). Only a leading `#` is a comment
/// marker — a `#` elsewhere on the line is the value's own weight separator
/// and must survive, so lines are never truncated mid-line.
pub fn parse_endpoint_file(contents: &str, prefix: &str, default_port: Option<u16>) -> Result<Vec<Endpoint>> {
    let dotted_prefix = format!("{prefix}.");
    let mut entries: Vec<(String, String)> = Vec::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if let Some(suffix) = key.strip_prefix(&dotted_prefix) {
            entries.push((suffix.to_string(), value.to_string()));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
        .into_iter()
        .map(|(_, literal)| parse_endpoint_literal(&literal, default_port))
        .collect()
}

/// Parses one value from the file format: an authority in any of the
/// forms `Endpoint::parse` accepts, with an optional `#weight` suffix.
/// Note this `#` is a value-internal weight separator, distinct from the
/// line-comment `#` stripped by [`parse_endpoint_file`] beforehand.
fn parse_endpoint_literal(literal: &str, default_port: Option<u16>) -> Result<Endpoint> {
    let (authority, weight) = match literal.rsplit_once('#') {
        Some((authority, weight_str)) => {
            let weight: u32 = weight_str
                .parse()
                .map_err(|_| FleetError::InvalidAddress(format!("invalid weight suffix in '{literal}'")))?;
            (authority, Some(weight))
        }
        None => (literal, None),
    };

    let mut endpoint = Endpoint::parse(authority)?;
    if endpoint.port() == 0 {
        if let Some(port) = default_port {
            endpoint = Endpoint::builder(endpoint.host())?
                .port(port)?
                .weight(endpoint.weight())
                .build();
        }
    }
    if let Some(weight) = weight {
        endpoint = endpoint.with_weight(weight);
    }
    Ok(endpoint)
}

/// A dynamic group whose contents track a watched file. Construction
/// reads the file once synchronously (so a missing/malformed file at
/// startup surfaces as a synchronous error, not a silently-empty group)
/// and registers with [`FileWatcherRegistry`] for subsequent reloads.
pub struct FileWatchedGroup {
    core: GroupCore,
    registry: Arc<FileWatcherRegistry>,
    watch_key: crate::watcher::WatchKey,
}

impl FileWatchedGroup {
    pub fn open(
        registry: Arc<FileWatcherRegistry>,
        path: impl AsRef<Path>,
        prefix: impl Into<String>,
        default_port: Option<u16>,
        allow_empty_endpoints: bool,
    ) -> std::io::Result<Arc<Self>> {
        Self::open_with_observability(
            registry,
            path,
            prefix,
            default_port,
            allow_empty_endpoints,
            Observability::default(),
        )
    }

    pub fn open_with_observability(
        registry: Arc<FileWatcherRegistry>,
        path: impl AsRef<Path>,
        prefix: impl Into<String>,
        default_port: Option<u16>,
        allow_empty_endpoints: bool,
        observability: Observability,
    ) -> std::io::Result<Arc<Self>> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let prefix = prefix.into();
        let group_id = NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed);

        let core = GroupCore::new(allow_empty_endpoints, observability.clone());
        let initial = read_and_parse(&path, &prefix, default_port, &observability);
        core.publish(initial);

        // `watch`'s callback needs a handle back to `self` to publish
        // reloads, but `self` doesn't exist until after `watch` returns
        // its key. Thread the weak reference through a cell the closure
        // reads lazily instead of constructing a cycle up front.
        let weak_cell: Arc<OnceLock<Weak<FileWatchedGroup>>> = Arc::new(OnceLock::new());
        let weak_cell_for_callback = weak_cell.clone();
        let reload_path = path.clone();
        let reload_prefix = prefix.clone();
        let reload_observability = observability.clone();
        let watch_key = registry
            .watch(group_id, &path, move || {
                if let Some(strong) = weak_cell_for_callback.get().and_then(Weak::upgrade) {
                    let parsed = read_and_parse(&reload_path, &reload_prefix, default_port, &reload_observability);
                    strong.core.publish(parsed);
                }
            })
            .map_err(std::io::Error::other)?;

        let this = Arc::new(Self {
            core,
            registry: registry.clone(),
            watch_key,
        });
        let _ = weak_cell.set(Arc::downgrade(&this));

        Ok(this)
    }

    /// Sets the default selection timeout a selector over this group falls
    /// back to when a caller doesn't pass one explicitly.
    pub fn set_selection_timeout(&self, timeout: impl Into<Option<Duration>>) {
        self.core.set_selection_timeout(timeout.into());
    }
}

impl Drop for FileWatchedGroup {
    fn drop(&mut self) {
        self.registry.unwatch(self.watch_key);
    }
}

fn read_and_parse(path: &Path, prefix: &str, default_port: Option<u16>, observability: &Observability) -> Vec<Endpoint> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match parse_endpoint_file(&contents, prefix, default_port) {
            Ok(endpoints) => endpoints,
            Err(err) => {
                observability.warn("file-watched-group", format!("failed to parse '{}': {err}", path.display()));
                Vec::new()
            }
        },
        Err(err) => {
            observability.warn("file-watched-group", format!("failed to read '{}': {err}", path.display()));
            Vec::new()
        }
    }
}

impl EndpointGroup for FileWatchedGroup {
    fn endpoints(&self) -> Snapshot {
        self.core.endpoints()
    }

    fn add_listener(&self, listener: ListenerFn, notify_latest: bool) -> ListenerId {
        self.core.add_listener(listener, notify_latest)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.core.remove_listener(id)
    }

    fn when_ready(&self) -> Pin<Box<dyn Future<Output = Snapshot> + Send + '_>> {
        self.core.when_ready()
    }

    fn selection_timeout(&self) -> Option<Duration> {
        self.core.selection_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_keys_in_lexical_order() {
        let contents = "\
# comment line
endpoints.0=10.0.0.1:8080#3
endpoints.1=10.0.0.2
unrelated.key=ignored
";
        let endpoints = parse_endpoint_file(contents, "endpoints", Some(9090)).unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].authority(), "10.0.0.1:8080");
        assert_eq!(endpoints[0].weight(), 3);
        assert_eq!(endpoints[1].authority(), "10.0.0.2:9090");
    }

    #[test]
    fn indented_comment_lines_are_still_ignored() {
        let contents = "\
   # indented comment, still a comment
endpoints.0=10.0.0.1:80#2
";
        let endpoints = parse_endpoint_file(contents, "endpoints", None).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].weight(), 2);
    }

    #[test]
    fn default_port_only_applies_when_missing() {
        let endpoints = parse_endpoint_file("e.a=host:123", "e", Some(80)).unwrap();
        assert_eq!(endpoints[0].port(), 123);
    }

    #[test]
    fn rejects_invalid_weight_suffix() {
        let err = parse_endpoint_file("e.a=host:80#notanumber", "e", None);
        assert!(err.is_err());
    }

    #[test]
    fn open_reads_initial_contents_and_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.conf");
        std::fs::write(&path, "e.0=10.0.0.1:8080\n").unwrap();

        let registry = Arc::new(FileWatcherRegistry::new(
            std::time::Duration::from_millis(20),
            Observability::default(),
        ));
        let group = FileWatchedGroup::open(registry, &path, "e", None, true).unwrap();
        assert_eq!(group.endpoints().len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(&path, "e.0=10.0.0.1:8080\ne.1=10.0.0.2:9090\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(500));
        assert_eq!(group.endpoints().len(), 2);
    }

    #[tokio::test]
    async fn when_ready_resolves_when_the_initial_file_is_missing() {
        // A missing file makes `read_and_parse` fall back to an empty
        // Vec; for an allow-empty group that's still a real first publish
        // and `when_ready` must resolve rather than hang.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.conf");

        let registry = Arc::new(FileWatcherRegistry::new(
            std::time::Duration::from_millis(20),
            Observability::default(),
        ));
        let group = FileWatchedGroup::open(registry, &path, "e", None, true).unwrap();
        let snapshot = tokio::time::timeout(std::time::Duration::from_secs(1), group.when_ready())
            .await
            .expect("when_ready must resolve on the initial empty-due-to-missing-file publish");
        assert!(snapshot.is_empty());
    }
}
