//! Adapter between `notify` and watch nodes.
//!
//! A tree shares one OS-level watcher, owned by a [`WatchHub`]. Each node
//! registers its own directory non-recursively and gets back a
//! [`Subscription`]; dropping it unwatches the directory. Events are routed to
//! the node whose directory is the event path or its parent.
//!
//! A node only needs to know "entry `name` may have changed" or "something in
//! this directory changed, go look". Everything `notify` reports is reduced to
//! one of those signals, or to a fatal failure.

use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::error::{Result, WatchError};

/// Which notification mechanism a tree subscribes with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// The platform's native mechanism (inotify, FSEvents, ReadDirectoryChangesW)
    #[default]
    Native,
    /// Periodic metadata polling, for network or virtual filesystems
    Poll(Duration),
}

/// Reduced form of a native notification
#[derive(Debug)]
pub(crate) enum Signal {
    /// The named immediate entry may have changed
    Entry(String),
    /// Something changed but the entry is unknown; list the whole directory
    Rescan,
    /// The subscription itself broke
    Failed(Arc<notify::Error>),
}

/// Registered directory -> the signal sender of the node watching it
type Routes = HashMap<PathBuf, UnboundedSender<Signal>>;

/// One `notify` watcher shared by every node of a tree
#[derive(Clone)]
pub(crate) struct WatchHub {
    shared: Arc<Shared>,
}

struct Shared {
    watcher: Mutex<Box<dyn Watcher + Send>>,
    routes: Arc<Mutex<Routes>>,
    backend: Backend,
}

impl WatchHub {
    pub fn new(backend: Backend) -> std::result::Result<Self, notify::Error> {
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let handler = {
            let routes = Arc::clone(&routes);
            move |res: notify::Result<Event>| dispatch(&routes.lock(), res)
        };

        let watcher: Box<dyn Watcher + Send> = match backend {
            Backend::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
            Backend::Poll(interval) => Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(interval),
            )?),
        };

        debug!("Created {:?} watcher", backend);
        Ok(Self {
            shared: Arc::new(Shared {
                watcher: Mutex::new(watcher),
                routes,
                backend,
            }),
        })
    }

    /// Watch `dir`'s immediate entries, forwarding signals to `tx`
    pub fn subscribe(&self, dir: &Path, tx: UnboundedSender<Signal>) -> Result<Subscription> {
        // Some platforms report resolved paths (/private/var vs /var)
        let mut keys = vec![dir.to_path_buf()];
        if let Ok(resolved) = std::fs::canonicalize(dir) {
            if resolved != dir {
                keys.push(resolved);
            }
        }

        // Route before watching so nothing emitted in between is lost
        {
            let mut routes = self.shared.routes.lock();
            for key in &keys {
                routes.insert(key.clone(), tx.clone());
            }
        }

        let watched = self
            .shared
            .watcher
            .lock()
            .watch(dir, RecursiveMode::NonRecursive);
        if let Err(source) = watched {
            self.unroute(&keys);
            return Err(WatchError::Subscribe {
                path: dir.to_path_buf(),
                source,
            });
        }

        debug!("Subscribed to {} ({:?})", dir.display(), self.shared.backend);
        Ok(Subscription {
            hub: self.clone(),
            dir: dir.to_path_buf(),
            keys,
        })
    }

    fn unroute(&self, keys: &[PathBuf]) {
        let mut routes = self.shared.routes.lock();
        for key in keys {
            routes.remove(key);
        }
    }

    #[cfg(test)]
    fn route_count(&self) -> usize {
        self.shared.routes.lock().len()
    }
}

/// A registered directory; dropping it releases the watch.
pub(crate) struct Subscription {
    hub: WatchHub,
    /// As passed to `watch`
    dir: PathBuf,
    /// `dir`, plus its resolved form when that differs
    keys: Vec<PathBuf>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unroute(&self.keys);

        // Fails when the directory is already gone; the OS dropped the watch itself
        if let Err(e) = self.hub.shared.watcher.lock().unwatch(&self.dir) {
            trace!("unwatch {}: {}", self.dir.display(), e);
        }
    }
}

/// Deliver one `notify` result to the nodes it concerns.
fn dispatch(routes: &Routes, res: notify::Result<Event>) {
    match res {
        Ok(event) => {
            trace!("{:?}", event);

            // Overflow, or nothing to route by: every node looks for itself
            if event.need_rescan() || event.paths.is_empty() {
                for (dir, tx) in routes {
                    send_all(tx, signals_for(dir, &event));
                }
                return;
            }

            let owners = owners(routes, &event.paths);
            if owners.is_empty() {
                trace!("No node watches {:?}", event.paths);
            }
            for dir in owners {
                if let Some(tx) = routes.get(dir) {
                    send_all(tx, signals_for(dir, &event));
                }
            }
        }
        Err(error) => {
            let owners = owners(routes, &error.paths);
            let error = Arc::new(error);
            for (dir, tx) in routes {
                if owners.is_empty() || owners.contains(&dir.as_path()) {
                    let _ = tx.send(Signal::Failed(Arc::clone(&error)));
                }
            }
        }
    }
}

fn send_all(tx: &UnboundedSender<Signal>, signals: Vec<Signal>) {
    for signal in signals {
        // Node already shut down; nothing left to notify
        if tx.send(signal).is_err() {
            return;
        }
    }
}

/// Registered directories concerned by `paths`: each path itself and its parent
fn owners<'a>(routes: &'a Routes, paths: &[PathBuf]) -> Vec<&'a Path> {
    let mut dirs: Vec<&Path> = Vec::new();
    for path in paths {
        for candidate in std::iter::once(path.as_path()).chain(path.parent()) {
            if let Some((dir, _)) = routes.get_key_value(candidate) {
                if !dirs.contains(&dir.as_path()) {
                    dirs.push(dir.as_path());
                }
            }
        }
    }
    dirs
}

/// Translate one `notify` event on `dir` into node signals.
pub(crate) fn signals_for(dir: &Path, event: &Event) -> Vec<Signal> {
    if event.need_rescan() {
        return vec![Signal::Rescan];
    }

    // Reads and opens never change size or mtime. Close-after-write does.
    if let EventKind::Access(kind) = event.kind {
        if kind != AccessKind::Close(AccessMode::Write) {
            return Vec::new();
        }
    }

    if event.paths.is_empty() {
        return vec![Signal::Rescan];
    }

    let mut names: Vec<String> = Vec::new();
    let mut rescan = false;

    for path in &event.paths {
        if path == dir {
            // Only removal of the directory itself matters: the next listing
            // fails and the node reports it.
            if matches!(event.kind, EventKind::Remove(_)) {
                rescan = true;
            }
            continue;
        }

        let name = match (path.parent(), path.file_name().and_then(|n| n.to_str())) {
            (Some(parent), Some(name)) if parent == dir => name,
            // Deeper entries belong to child nodes
            _ if path.starts_with(dir) => continue,
            _ => {
                // Canonicalized or foreign path (e.g. /private/var vs /var)
                rescan = true;
                continue;
            }
        };

        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    let mut signals: Vec<Signal> = names.into_iter().map(Signal::Entry).collect();
    if rescan {
        signals.push(Signal::Rescan);
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, Flag, ModifyKind, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn names(signals: &[Signal]) -> Vec<String> {
        signals
            .iter()
            .map(|s| match s {
                Signal::Entry(name) => name.clone(),
                Signal::Rescan => "<rescan>".to_string(),
                Signal::Failed(_) => "<failed>".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_named_entry() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(dir.join("a.txt"));

        assert_eq!(names(&signals_for(dir, &event)), vec!["a.txt"]);
    }

    #[test]
    fn test_rename_yields_both_names() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(dir.join("old"))
            .add_path(dir.join("new"));

        assert_eq!(names(&signals_for(dir, &event)), vec!["old", "new"]);
    }

    #[test]
    fn test_duplicate_paths_collapse() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(dir.join("a"))
            .add_path(dir.join("a"));

        assert_eq!(names(&signals_for(dir, &event)), vec!["a"]);
    }

    #[test]
    fn test_nameless_event_rescans() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Any);

        assert_eq!(names(&signals_for(dir, &event)), vec!["<rescan>"]);
    }

    #[test]
    fn test_rescan_flag() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Other)
            .add_path(dir.join("a"))
            .set_flag(Flag::Rescan);

        assert_eq!(names(&signals_for(dir, &event)), vec!["<rescan>"]);
    }

    #[test]
    fn test_access_ignored_except_close_write() {
        let dir = Path::new("/w");
        let open = Event::new(EventKind::Access(AccessKind::Open(AccessMode::Any)))
            .add_path(dir.join("a"));
        let close_write = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(dir.join("a"));

        assert!(signals_for(dir, &open).is_empty());
        assert_eq!(names(&signals_for(dir, &close_write)), vec!["a"]);
    }

    #[test]
    fn test_self_events() {
        let dir = Path::new("/w");
        let touched = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(dir.to_path_buf());
        let removed = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(dir.to_path_buf());

        assert!(signals_for(dir, &touched).is_empty());
        assert_eq!(names(&signals_for(dir, &removed)), vec!["<rescan>"]);
    }

    #[test]
    fn test_nested_path_ignored() {
        let dir = Path::new("/w");
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(dir.join("sub/a"));

        assert!(signals_for(dir, &event).is_empty());
    }

    #[test]
    fn test_foreign_path_rescans() {
        let dir = Path::new("/var/w");
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/private/var/w/a"));

        assert_eq!(names(&signals_for(dir, &event)), vec!["<rescan>"]);
    }

    fn received(rx: &mut UnboundedReceiver<Signal>) -> Vec<String> {
        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        names(&signals)
    }

    #[test]
    fn test_dispatch_routes_by_parent() {
        let (root_tx, mut root_rx) = mpsc::unbounded_channel();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let mut routes = Routes::new();
        routes.insert(PathBuf::from("/w"), root_tx);
        routes.insert(PathBuf::from("/w/sub"), sub_tx);

        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/w/sub/a"));
        dispatch(&routes, Ok(event));

        assert!(received(&mut root_rx).is_empty());
        assert_eq!(received(&mut sub_rx), vec!["a"]);
    }

    #[test]
    fn test_dispatch_self_event_reaches_own_node() {
        let (root_tx, mut root_rx) = mpsc::unbounded_channel();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let mut routes = Routes::new();
        routes.insert(PathBuf::from("/w"), root_tx);
        routes.insert(PathBuf::from("/w/sub"), sub_tx);

        let event = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(PathBuf::from("/w/sub"));
        dispatch(&routes, Ok(event));

        assert_eq!(received(&mut root_rx), vec!["sub"]);
        assert_eq!(received(&mut sub_rx), vec!["<rescan>"]);
    }

    #[test]
    fn test_dispatch_overflow_rescans_every_node() {
        let (root_tx, mut root_rx) = mpsc::unbounded_channel();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let mut routes = Routes::new();
        routes.insert(PathBuf::from("/w"), root_tx);
        routes.insert(PathBuf::from("/w/sub"), sub_tx);

        dispatch(&routes, Ok(Event::new(EventKind::Other).set_flag(Flag::Rescan)));

        assert_eq!(received(&mut root_rx), vec!["<rescan>"]);
        assert_eq!(received(&mut sub_rx), vec!["<rescan>"]);
    }

    #[test]
    fn test_dispatch_error_targets_owner() {
        let (root_tx, mut root_rx) = mpsc::unbounded_channel();
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
        let mut routes = Routes::new();
        routes.insert(PathBuf::from("/w"), root_tx);
        routes.insert(PathBuf::from("/w/sub"), sub_tx);

        dispatch(&routes, Err(notify::Error::generic("gone").add_path(PathBuf::from("/w/sub"))));
        assert!(received(&mut root_rx).is_empty());
        assert_eq!(received(&mut sub_rx), vec!["<failed>"]);

        dispatch(&routes, Err(notify::Error::generic("unknown")));
        assert_eq!(received(&mut root_rx), vec!["<failed>"]);
        assert_eq!(received(&mut sub_rx), vec!["<failed>"]);
    }

    #[test]
    fn test_one_watcher_serves_many_directories() {
        let dir = TempDir::new().unwrap();
        let hub = WatchHub::new(Backend::Native).unwrap();

        // Well past the default per-user inotify instance limit of 128
        let mut subscriptions = Vec::new();
        for i in 0..200 {
            let sub = dir.path().join(format!("d{i:03}"));
            fs::create_dir(&sub).unwrap();
            let (tx, _rx) = mpsc::unbounded_channel();
            subscriptions.push(hub.subscribe(&sub, tx).unwrap());
        }
        assert_eq!(hub.route_count(), 200);

        subscriptions.truncate(50);
        assert_eq!(hub.route_count(), 50);
        subscriptions.clear();
        assert_eq!(hub.route_count(), 0);
    }

    #[test]
    fn test_subscribe_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let hub = WatchHub::new(Backend::Native).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = hub.subscribe(&dir.path().join("gone"), tx);
        assert!(matches!(result, Err(WatchError::Subscribe { .. })));
        assert_eq!(hub.route_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_forwards_entry_names() {
        let dir = TempDir::new().unwrap();
        let hub = WatchHub::new(Backend::Native).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = hub.subscribe(dir.path(), tx).unwrap();

        fs::write(dir.path().join("a.txt"), "abc").unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("signal channel closed");
        assert_eq!(names(&[signal]), vec!["a.txt"]);
    }
}
