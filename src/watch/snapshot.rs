use std::collections::{HashMap, HashSet};

use crate::file::EntryStat;

/// What a fresh stat means for one entry, relative to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observation {
    /// Known before, still there, same size and mtime
    Unchanged,
    /// Known before, size or mtime moved
    Changed { stat: EntryStat, old: EntryStat },
    /// Known before as another kind (file, directory, symlink)
    Replaced { stat: EntryStat, old: EntryStat },
    /// Not known before
    Discovered(EntryStat),
    /// Known before, stat failed
    Vanished(EntryStat),
    /// Never known and stat failed
    Absent,
}

/// In-memory record of a directory's immediate entries
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    entries: HashMap<String, EntryStat>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a stat result for `name` into the snapshot.
    ///
    /// `None` means the stat failed; the entry is dropped if it was known.
    pub fn observe(&mut self, name: &str, stat: Option<EntryStat>) -> Observation {
        match stat {
            None => match self.entries.remove(name) {
                Some(old) => Observation::Vanished(old),
                None => Observation::Absent,
            },
            Some(stat) => match self.entries.insert(name.to_string(), stat) {
                Some(old) if !old.same_kind(&stat) => Observation::Replaced { stat, old },
                Some(old) if stat.differs_from(&old) => Observation::Changed { stat, old },
                Some(_) => Observation::Unchanged,
                None => Observation::Discovered(stat),
            },
        }
    }

    /// Names currently tracked that do not appear in `listing`
    pub fn missing_from(&self, listing: &[String]) -> Vec<String> {
        let present: HashSet<&str> = listing.iter().map(String::as_str).collect();
        self.entries
            .keys()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries sorted by name
    pub fn sorted(&self) -> Vec<(String, EntryStat)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(name, stat)| (name.clone(), *stat))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Remove every entry, returning them sorted by name
    pub fn drain_sorted(&mut self) -> Vec<(String, EntryStat)> {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, UNIX_EPOCH};

    fn stat(size: u64, secs: u64) -> EntryStat {
        EntryStat {
            size,
            modified: Some(UNIX_EPOCH + Duration::from_secs(secs)),
            is_dir: false,
            is_symlink: false,
        }
    }

    #[test]
    fn test_discover_then_unchanged() {
        let mut snapshot = Snapshot::new();

        assert_eq!(snapshot.observe("a", Some(stat(3, 10))), Observation::Discovered(stat(3, 10)));
        assert_eq!(snapshot.observe("a", Some(stat(3, 10))), Observation::Unchanged);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_size_change() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("a", Some(stat(3, 10)));

        assert_eq!(
            snapshot.observe("a", Some(stat(6, 10))),
            Observation::Changed { stat: stat(6, 10), old: stat(3, 10) }
        );
        assert_eq!(snapshot.sorted(), vec![("a".to_string(), stat(6, 10))]);
    }

    #[test]
    fn test_mtime_change() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("a", Some(stat(3, 10)));

        assert_eq!(
            snapshot.observe("a", Some(stat(3, 11))),
            Observation::Changed { stat: stat(3, 11), old: stat(3, 10) }
        );
    }

    #[test]
    fn test_kind_flip_is_replacement() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("x", Some(stat(3, 10)));
        let dir = EntryStat { is_dir: true, ..stat(3, 10) };

        assert_eq!(
            snapshot.observe("x", Some(dir)),
            Observation::Replaced { stat: dir, old: stat(3, 10) }
        );
        assert_eq!(snapshot.sorted(), vec![("x".to_string(), dir)]);
    }

    #[test]
    fn test_directory_becoming_symlink_is_replacement() {
        let mut snapshot = Snapshot::new();
        let dir = EntryStat { is_dir: true, ..stat(3, 10) };
        let link = EntryStat { is_symlink: true, ..dir };
        snapshot.observe("d", Some(dir));

        assert_eq!(
            snapshot.observe("d", Some(link)),
            Observation::Replaced { stat: link, old: dir }
        );
    }

    #[test]
    fn test_vanished_and_absent() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("a", Some(stat(3, 10)));

        assert_eq!(snapshot.observe("a", None), Observation::Vanished(stat(3, 10)));
        assert_eq!(snapshot.len(), 0);
        assert_eq!(snapshot.observe("a", None), Observation::Absent);
        assert_eq!(snapshot.observe("never", None), Observation::Absent);
    }

    #[test]
    fn test_rediscovered_after_vanish() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("a", Some(stat(3, 10)));
        snapshot.observe("a", None);

        assert_eq!(snapshot.observe("a", Some(stat(4, 12))), Observation::Discovered(stat(4, 12)));
    }

    #[test]
    fn test_missing_from() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("a", Some(stat(1, 1)));
        snapshot.observe("b", Some(stat(1, 1)));
        snapshot.observe("c", Some(stat(1, 1)));

        let mut missing = snapshot.missing_from(&["b".to_string(), "d".to_string()]);
        missing.sort();
        assert_eq!(missing, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_drain_sorted() {
        let mut snapshot = Snapshot::new();
        snapshot.observe("b", Some(stat(2, 1)));
        snapshot.observe("a", Some(stat(1, 1)));

        let drained = snapshot.drain_sorted();
        assert_eq!(
            drained,
            vec![("a".to_string(), stat(1, 1)), ("b".to_string(), stat(2, 1))]
        );
        assert_eq!(snapshot.len(), 0);
    }

    #[test]
    fn test_missing_mtime_compares_equal() {
        let mut snapshot = Snapshot::new();
        let no_time = EntryStat {
            modified: None,
            is_dir: true,
            ..stat(5, 0)
        };
        snapshot.observe("d", Some(no_time));

        assert_eq!(snapshot.observe("d", Some(no_time)), Observation::Unchanged);
    }
}
