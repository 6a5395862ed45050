use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by watch nodes.
///
/// Most of these never reach a caller as a `Result`: a node reports them
/// through its event stream as [`WatchEvent::Error`](crate::watch::WatchEvent)
/// and stops reconciling.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to list directory {path}: {source}")]
    Listing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to subscribe to changes in {path}: {source}")]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },

    /// Shared by every node the failing watcher reported it to
    #[error("native watcher for {path} failed: {source}")]
    Native {
        path: PathBuf,
        source: Arc<notify::Error>,
    },

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("watch node for {0} is closed")]
    Closed(PathBuf),

    #[error("invalid ignore pattern '{pattern}': {source}")]
    Config {
        pattern: String,
        source: ignore::Error,
    },
}

pub type Result<T> = std::result::Result<T, WatchError>;
