//! Output control for quiet mode and event rendering
//!
//! Provides a global quiet mode flag to suppress non-essential output, and
//! the text/JSON renderings of watch events.

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::file::EntryStat;
use crate::watch::{EventKind, WatchEvent};

/// Global quiet mode flag
static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Enable quiet mode (suppresses informational output)
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::SeqCst);
}

/// Check if quiet mode is enabled
pub fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::SeqCst)
}

/// Print a message only if not in quiet mode
#[macro_export]
macro_rules! info_print {
    ($($arg:tt)*) => {
        if !$crate::output::is_quiet() {
            println!($($arg)*);
        }
    };
}

/// Print to stderr only if not in quiet mode (for warnings)
#[macro_export]
macro_rules! warn_print {
    ($($arg:tt)*) => {
        if !$crate::output::is_quiet() {
            eprintln!($($arg)*);
        }
    };
}

fn rfc3339(time: Option<SystemTime>) -> Option<String> {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

fn stat_json(stat: &EntryStat) -> serde_json::Value {
    json!({
        "size": stat.size,
        "modified": rfc3339(stat.modified),
        "is_dir": stat.is_dir,
        "is_symlink": stat.is_symlink,
    })
}

/// One JSON object per event
pub fn event_json(event: &WatchEvent) -> serde_json::Value {
    let mut value = json!({
        "event": event.kind(),
        "path": event.path().display().to_string(),
    });

    if let Some(stat) = event.stat() {
        value["stat"] = stat_json(stat);
    }
    if let Some(old) = event.old_stat() {
        value["old_stat"] = stat_json(old);
    }
    if let WatchEvent::Error { error, .. } = event {
        value["error"] = json!(error.to_string());
    }

    value
}

/// Human readable single line, e.g. `change  src/main.rs  120 -> 164 bytes`
pub fn event_line(event: &WatchEvent, color: bool) -> String {
    let kind = format!("{:<6}", event.kind().as_str());
    let kind = if color {
        match event.kind() {
            EventKind::Add => kind.dimmed().to_string(),
            EventKind::Create => kind.green().to_string(),
            EventKind::Change => kind.yellow().to_string(),
            EventKind::Remove => kind.red().to_string(),
            EventKind::Error => kind.red().bold().to_string(),
        }
    } else {
        kind
    };

    let detail = match event {
        WatchEvent::Change { stat, old, .. } if stat.size != old.size => {
            format!("{} -> {} bytes", old.size, stat.size)
        }
        WatchEvent::Error { error, .. } => error.to_string(),
        _ => match event.stat() {
            Some(stat) if stat.is_symlink && stat.is_dir => "symlink -> dir".to_string(),
            Some(stat) if stat.is_dir => "dir".to_string(),
            Some(stat) => format!("{} bytes", stat.size),
            None => String::new(),
        },
    };

    format!("{}  {}  {}", kind, event.path().display(), detail)
        .trim_end()
        .to_string()
}

/// Modification time in local time, for listings
pub fn local_time(time: Option<SystemTime>) -> String {
    time.map(|t| {
        DateTime::<Local>::from(t)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
    .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn file(size: u64) -> EntryStat {
        EntryStat {
            size,
            modified: Some(UNIX_EPOCH + Duration::from_secs(60)),
            is_dir: false,
            is_symlink: false,
        }
    }

    #[test]
    fn test_event_json_change() {
        let event = WatchEvent::Change {
            path: PathBuf::from("/w/a.txt"),
            stat: file(6),
            old: file(3),
        };

        let value = event_json(&event);
        assert_eq!(value["event"], "change");
        assert_eq!(value["path"], "/w/a.txt");
        assert_eq!(value["stat"]["size"], 6);
        assert_eq!(value["old_stat"]["size"], 3);
        assert_eq!(value["stat"]["modified"], "1970-01-01T00:01:00+00:00");
    }

    #[test]
    fn test_event_json_create_has_no_old_stat() {
        let event = WatchEvent::Create {
            path: PathBuf::from("/w/a.txt"),
            stat: file(3),
        };

        let value = event_json(&event);
        assert_eq!(value["event"], "create");
        assert!(value.get("old_stat").is_none());
    }

    #[test]
    fn test_event_line_plain() {
        let change = WatchEvent::Change {
            path: PathBuf::from("/w/a.txt"),
            stat: file(6),
            old: file(3),
        };
        assert_eq!(event_line(&change, false), "change  /w/a.txt  3 -> 6 bytes");

        let dir = WatchEvent::Create {
            path: PathBuf::from("/w/sub"),
            stat: EntryStat { is_dir: true, ..file(0) },
        };
        assert_eq!(event_line(&dir, false), "create  /w/sub  dir");
    }
}
