use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WatchError};

type Predicate = dyn Fn(&str) -> bool + Send + Sync;

/// Decides which entry names a watch node tracks.
///
/// The filter sees bare entry names, never full paths, and is shared by a
/// node and every child node it spawns.
#[derive(Clone, Default)]
pub struct EntryFilter {
    predicate: Option<Arc<Predicate>>,
}

impl EntryFilter {
    /// Track every entry (default)
    pub fn accept_all() -> Self {
        Self { predicate: None }
    }

    /// Skip dot-files and dot-directories
    pub fn hidden() -> Self {
        Self::new(|name| !name.starts_with('.'))
    }

    /// Track entries for which `predicate` returns true
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Skip entries matching any of the gitignore-style `patterns`.
    ///
    /// Patterns are matched against the entry name only. A directory-only
    /// pattern such as `build/` also matches a file named `build`, since the
    /// entry kind is not known when the filter runs.
    pub fn ignoring<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add_line(None, pattern)
                .map_err(|source| WatchError::Config {
                    pattern: pattern.to_string(),
                    source,
                })?;
        }
        let gitignore = builder.build().map_err(|source| WatchError::Config {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            source,
        })?;

        if gitignore.is_empty() {
            return Ok(Self::accept_all());
        }

        Ok(Self::new(move |name| !is_ignored(&gitignore, name)))
    }

    /// Combine two filters; an entry must pass both
    pub fn and(self, other: EntryFilter) -> Self {
        match (self.predicate, other.predicate) {
            (None, None) => Self::accept_all(),
            (Some(p), None) | (None, Some(p)) => Self { predicate: Some(p) },
            (Some(a), Some(b)) => Self::new(move |name| a(name) && b(name)),
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(name),
            None => true,
        }
    }
}

fn is_ignored(gitignore: &Gitignore, name: &str) -> bool {
    gitignore.matched(name, false).is_ignore() || gitignore.matched(name, true).is_ignore()
}

impl fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.predicate.is_some() { "custom" } else { "accept_all" };
        f.debug_tuple("EntryFilter").field(&kind).finish()
    }
}
