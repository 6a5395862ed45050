use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, trace};

mod filter;

pub use filter::EntryFilter;

/// Last-known state of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStat {
    pub size: u64,
    /// `None` on platforms that cannot report modification times
    pub modified: Option<SystemTime>,
    /// Kind of the entry, or of its target when it is a symlink
    pub is_dir: bool,
    #[serde(default)]
    pub is_symlink: bool,
}

impl EntryStat {
    /// True when size or modification time differ. The entry kind is not compared.
    pub fn differs_from(&self, other: &EntryStat) -> bool {
        self.size != other.size || self.modified != other.modified
    }

    /// True when both describe the same kind of entry
    pub fn same_kind(&self, other: &EntryStat) -> bool {
        self.is_dir == other.is_dir && self.is_symlink == other.is_symlink
    }

    /// A real directory, to be watched by a child node. Symlinked
    /// directories are tracked as entries but never descended into.
    pub fn is_watchable_dir(&self) -> bool {
        self.is_dir && !self.is_symlink
    }
}

impl From<&Metadata> for EntryStat {
    fn from(meta: &Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
        }
    }
}

/// Stat a single entry. Any failure means the entry is gone as far as the
/// watcher is concerned, so the error itself is only logged.
///
/// Symlinks report their target's size, mtime and kind with `is_symlink` set.
/// A dangling symlink reports the link itself.
pub async fn stat_entry(path: &Path) -> Option<EntryStat> {
    let link = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            debug!("stat failed for {}: {}", path.display(), e);
            return None;
        }
    };
    if !link.file_type().is_symlink() {
        return Some(EntryStat::from(&link));
    }

    match tokio::fs::metadata(path).await {
        Ok(target) => Some(EntryStat {
            is_symlink: true,
            ..EntryStat::from(&target)
        }),
        Err(e) => {
            trace!("dangling symlink {}: {}", path.display(), e);
            Some(EntryStat::from(&link))
        }
    }
}

/// List the names of a directory's immediate entries that pass `filter`.
///
/// Names that are not valid UTF-8 are skipped.
pub async fn list_entries(dir: &Path, filter: &EntryFilter) -> std::io::Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        match entry.file_name().into_string() {
            Ok(name) if filter.accepts(&name) => names.push(name),
            Ok(_) => {}
            Err(raw) => debug!("Skipping non UTF-8 entry {:?} in {}", raw, dir.display()),
        }
    }

    Ok(names)
}
