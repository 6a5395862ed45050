pub mod config;
pub mod error;
pub mod file;
pub mod output;
pub mod watch;

// Re-export commonly used types
pub use config::Config;
pub use error::WatchError;
pub use file::{EntryFilter, EntryStat};
pub use watch::{
    Backend, EventKind, EventReceiver, InitialEvent, WatchEvent, WatchNode, WatchOptions,
};
