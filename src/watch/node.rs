//! The task behind every [`WatchNode`] handle.
//!
//! One task per directory. It owns the snapshot, the child table and its
//! registration with the tree's [`WatchHub`], and processes commands and
//! signals strictly one at a time, so reconciliations of the same node never
//! interleave.

use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::native::{Signal, Subscription, WatchHub};
use super::snapshot::{Observation, Snapshot};
use super::{InitialEvent, WatchEvent, WatchNode, WatchOptions};
use crate::error::WatchError;
use crate::file::{list_entries, stat_entry, EntryStat};

/// Requests sent from a [`WatchNode`] handle to its task
pub(crate) enum Command {
    Snapshot(oneshot::Sender<Vec<(String, EntryStat)>>),
    Close(oneshot::Sender<()>),
    RemoveAll(oneshot::Sender<()>),
}

/// Where a node's events go
pub(crate) enum EventSink {
    /// The caller that created the root node
    Subscriber(UnboundedSender<WatchEvent>),
    /// The parent node. Bookkeeping only: events stop here.
    Structural { parent: PathBuf },
}

impl EventSink {
    fn emit(&self, event: WatchEvent) {
        match self {
            EventSink::Subscriber(tx) => {
                if let Err(SendError(event)) = tx.send(event) {
                    match event {
                        WatchEvent::Error { error, .. } => {
                            warn!("Unhandled watch error (receiver dropped): {}", error)
                        }
                        other => trace!("Receiver dropped, discarding {:?}", other.kind()),
                    }
                }
            }
            EventSink::Structural { parent } => match &event {
                WatchEvent::Error { error, .. } => {
                    debug!("Child of {} reported: {}", parent.display(), error)
                }
                other => trace!("{} {}", other.kind(), other.path().display()),
            },
        }
    }
}

pub(crate) struct NodeTask {
    path: PathBuf,
    options: WatchOptions,
    sink: EventSink,
    snapshot: Snapshot,
    children: HashMap<String, WatchNode>,
    /// Shared with the whole tree; the root creates it on start
    hub: Option<WatchHub>,
    subscription: Option<Subscription>,
    /// Set once the native subscription is gone for good
    failed: bool,
}

impl NodeTask {
    pub fn new(
        path: PathBuf,
        options: WatchOptions,
        sink: EventSink,
        hub: Option<WatchHub>,
    ) -> Self {
        Self {
            path,
            options,
            sink,
            snapshot: Snapshot::new(),
            children: HashMap::new(),
            hub,
            subscription: None,
            failed: false,
        }
    }

    pub async fn run(mut self, mut control: UnboundedReceiver<Command>) {
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        self.start(signal_tx).await;

        loop {
            tokio::select! {
                // Control first: a pending close must win over queued signals
                biased;

                command = control.recv() => match command {
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot.sorted());
                    }
                    Some(Command::Close(done)) => {
                        self.close().await;
                        let _ = done.send(());
                        return;
                    }
                    Some(Command::RemoveAll(done)) => {
                        self.remove_all().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        debug!("Handle for {} dropped, closing", self.path.display());
                        self.close().await;
                        return;
                    }
                },
                Some(signal) = signals.recv() => self.handle(signal).await,
            }
        }
    }

    /// Subscribe, then run the initial scan
    async fn start(&mut self, signal_tx: UnboundedSender<Signal>) {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                self.fail(WatchError::NotADirectory(self.path.clone()));
                return;
            }
            Err(source) => {
                self.fail(WatchError::Listing {
                    path: self.path.clone(),
                    source,
                });
                return;
            }
        }

        let hub = match self.hub.clone() {
            Some(hub) => hub,
            None => match WatchHub::new(self.options.backend) {
                Ok(hub) => {
                    self.hub = Some(hub.clone());
                    hub
                }
                Err(source) => {
                    self.fail(WatchError::Subscribe {
                        path: self.path.clone(),
                        source,
                    });
                    return;
                }
            },
        };

        match hub.subscribe(&self.path, signal_tx) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                self.fail(e);
                return;
            }
        }

        let initial = self.options.initial_event;
        self.rescan(initial).await;
        debug!(
            "Watching {} ({} entries)",
            self.path.display(),
            self.snapshot.len()
        );
    }

    async fn handle(&mut self, signal: Signal) {
        if self.failed {
            return;
        }

        match signal {
            Signal::Entry(name) => {
                if self.options.filter.accepts(&name) {
                    self.reconcile(&name, InitialEvent::Create).await;
                }
            }
            Signal::Rescan => self.rescan(InitialEvent::Create).await,
            Signal::Failed(source) => self.fail(WatchError::Native {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Bring one entry's snapshot record in line with the filesystem
    async fn reconcile(&mut self, name: &str, new_kind: InitialEvent) {
        let full_path = self.path.join(name);
        let stat = stat_entry(&full_path).await;

        match self.snapshot.observe(name, stat) {
            Observation::Unchanged | Observation::Absent => {}
            Observation::Changed { stat, old } => {
                self.sink.emit(WatchEvent::Change {
                    path: full_path,
                    stat,
                    old,
                });
            }
            Observation::Discovered(stat) => self.discover(name, full_path, stat, new_kind),
            Observation::Vanished(old) => self.forget(name, full_path, old).await,
            Observation::Replaced { stat, old } => {
                self.forget(name, full_path.clone(), old).await;
                self.discover(name, full_path, stat, InitialEvent::Create);
            }
        }
    }

    /// List the whole directory and reconcile every entry, known or new
    async fn rescan(&mut self, new_kind: InitialEvent) {
        let mut listing = match list_entries(&self.path, &self.options.filter).await {
            Ok(listing) => listing,
            Err(source) => {
                self.report(WatchError::Listing {
                    path: self.path.clone(),
                    source,
                });
                return;
            }
        };
        listing.sort();

        for name in self.snapshot.missing_from(&listing) {
            if let Observation::Vanished(old) = self.snapshot.observe(&name, None) {
                let full_path = self.path.join(&name);
                self.forget(&name, full_path, old).await;
            }
        }

        for name in &listing {
            self.reconcile(name, new_kind).await;
        }
    }

    fn discover(&mut self, name: &str, full_path: PathBuf, stat: EntryStat, kind: InitialEvent) {
        self.sink.emit(kind.event(full_path.clone(), stat));

        if stat.is_watchable_dir() {
            let options = self.options.clone().initial_event(kind);
            let sink = EventSink::Structural {
                parent: self.path.clone(),
            };
            let child = WatchNode::spawn(full_path, options, sink, self.hub.clone());
            if let Some(stale) = self.children.insert(name.to_string(), child) {
                // Unreachable while the snapshot and child table agree
                warn!("Replaced untracked child node {}", stale.path().display());
            }
        }
    }

    /// Drop an entry that left the snapshot; its subtree goes first
    async fn forget(&mut self, name: &str, full_path: PathBuf, old: EntryStat) {
        if let Some(child) = self.children.remove(name) {
            child.remove_all().await;
        }
        self.sink.emit(WatchEvent::Remove {
            path: full_path,
            stat: old,
        });
    }

    async fn close(&mut self) {
        self.subscription = None;

        let mut children: Vec<_> = self.children.drain().collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, child) in children {
            child.close().await;
        }

        self.snapshot.clear();
        trace!("Closed {}", self.path.display());
    }

    async fn remove_all(&mut self) {
        self.subscription = None;

        let mut children: Vec<_> = self.children.drain().collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, child) in children {
            child.remove_all().await;
        }

        for (name, stat) in self.snapshot.drain_sorted() {
            self.sink.emit(WatchEvent::Remove {
                path: self.path.join(name),
                stat,
            });
        }

        self.close().await;
    }

    fn report(&self, error: WatchError) {
        debug!("{}", error);
        self.sink.emit(WatchEvent::Error {
            path: self.path.clone(),
            error,
        });
    }

    /// Report a fatal error and stop reconciling
    fn fail(&mut self, error: WatchError) {
        self.subscription = None;
        self.failed = true;
        self.report(error);
    }
}
