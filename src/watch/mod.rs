//! Recursive directory watching.
//!
//! A [`WatchNode`] watches one directory's immediate entries and spawns a
//! child node for every subdirectory it discovers. Children exist so that
//! removing a directory can cascade correctly; their events are never
//! re-emitted through the parent. Only the root node's own entries reach the
//! caller's [`EventReceiver`].
//!
//! The whole tree shares one OS-level watcher, created by the root. Each node
//! registers only its own directory, non-recursively. Symlinked directories
//! are reported as entries but never get a child node.
//!
//! Callers should handle [`WatchEvent::Error`]. If the receiver has been
//! dropped, errors are logged with `tracing::warn!` and otherwise discarded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

mod native;
mod node;
mod snapshot;

pub use native::Backend;

use crate::error::WatchError;
use crate::file::{EntryFilter, EntryStat};
use native::WatchHub;
use node::{Command, EventSink, NodeTask};

/// Stream of events from a root [`WatchNode`]
pub type EventReceiver = UnboundedReceiver<WatchEvent>;

/// Event kind reported for entries found by a node's initial scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialEvent {
    /// The entry already existed when watching began
    #[default]
    Add,
    /// Report the entry as if it had just been created
    Create,
}

impl InitialEvent {
    fn event(self, path: PathBuf, stat: EntryStat) -> WatchEvent {
        match self {
            InitialEvent::Add => WatchEvent::Add { path, stat },
            InitialEvent::Create => WatchEvent::Create { path, stat },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Add,
    Create,
    Change,
    Remove,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Create => "create",
            EventKind::Change => "change",
            EventKind::Remove => "remove",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to one of the watched directory's immediate entries
#[derive(Debug)]
pub enum WatchEvent {
    /// Present when watching began
    Add { path: PathBuf, stat: EntryStat },
    /// Appeared after watching began
    Create { path: PathBuf, stat: EntryStat },
    /// Size or modification time changed
    Change {
        path: PathBuf,
        stat: EntryStat,
        old: EntryStat,
    },
    /// Gone; `stat` is the last one seen
    Remove { path: PathBuf, stat: EntryStat },
    /// The node could not list its directory or lost its native subscription.
    /// Nothing is retried; close the node.
    Error { path: PathBuf, error: WatchError },
}

impl WatchEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WatchEvent::Add { .. } => EventKind::Add,
            WatchEvent::Create { .. } => EventKind::Create,
            WatchEvent::Change { .. } => EventKind::Change,
            WatchEvent::Remove { .. } => EventKind::Remove,
            WatchEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Full path of the entry (the watched directory for errors)
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Add { path, .. }
            | WatchEvent::Create { path, .. }
            | WatchEvent::Change { path, .. }
            | WatchEvent::Remove { path, .. }
            | WatchEvent::Error { path, .. } => path,
        }
    }

    pub fn stat(&self) -> Option<&EntryStat> {
        match self {
            WatchEvent::Add { stat, .. }
            | WatchEvent::Create { stat, .. }
            | WatchEvent::Change { stat, .. }
            | WatchEvent::Remove { stat, .. } => Some(stat),
            WatchEvent::Error { .. } => None,
        }
    }

    /// Previous stat, only for [`WatchEvent::Change`]
    pub fn old_stat(&self) -> Option<&EntryStat> {
        match self {
            WatchEvent::Change { old, .. } => Some(old),
            _ => None,
        }
    }
}

/// How a node (and every node beneath it) tracks entries
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub(crate) initial_event: InitialEvent,
    pub(crate) filter: EntryFilter,
    pub(crate) backend: Backend,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event kind for entries found by the initial scan (default: `Add`)
    pub fn initial_event(mut self, kind: InitialEvent) -> Self {
        self.initial_event = kind;
        self
    }

    /// Entries rejected by `filter` are never tracked (default: accept all)
    pub fn filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Notification mechanism for the whole tree (default: native)
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

/// Handle to a watched directory.
///
/// Dropping the handle shuts the node down like [`close`](Self::close), but
/// without waiting for it to finish.
#[derive(Debug)]
pub struct WatchNode {
    path: PathBuf,
    control: UnboundedSender<Command>,
}

impl WatchNode {
    /// Start watching `path`.
    ///
    /// Returns immediately; subscription and the initial scan run on the
    /// tokio runtime, and failures arrive as [`WatchEvent::Error`]. Must be
    /// called from within a tokio runtime.
    pub fn create(path: impl Into<PathBuf>, options: WatchOptions) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Self::spawn(path.into(), options, EventSink::Subscriber(tx), None);
        (node, rx)
    }

    pub(crate) fn spawn(
        path: PathBuf,
        options: WatchOptions,
        sink: EventSink,
        hub: Option<WatchHub>,
    ) -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = NodeTask::new(path.clone(), options, sink, hub);
        tokio::spawn(task.run(control_rx));
        Self { path, control }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries, sorted by name.
    ///
    /// Answered only after the initial scan has finished, so awaiting this
    /// right after [`create`](Self::create) also waits for the scan.
    pub async fn snapshot(&self) -> Result<Vec<(String, EntryStat)>, WatchError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(Command::Snapshot(reply))
            .map_err(|_| WatchError::Closed(self.path.clone()))?;
        response
            .await
            .map_err(|_| WatchError::Closed(self.path.clone()))
    }

    /// Release the native subscription and close every descendant.
    ///
    /// No events are emitted once this returns.
    pub async fn close(self) {
        let (done, finished) = oneshot::channel();
        if self.control.send(Command::Close(done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// Emit `remove` for every tracked entry (deepest first), then close.
    pub async fn remove_all(self) {
        let (done, finished) = oneshot::channel();
        if self.control.send(Command::RemoveAll(done)).is_ok() {
            let _ = finished.await;
        }
    }
}
