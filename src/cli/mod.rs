use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use treewatch::config::Config;
use treewatch::InitialEvent;

mod snapshot;
mod watch;

/// Watch a directory tree and report entry changes
#[derive(Parser, Debug)]
#[command(name = "treewatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output (only show events/errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read configuration from this file instead of ~/.treewatch/config.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Entry selection flags shared by all commands
#[derive(clap::Args, Debug)]
pub struct FilterArgs {
    /// Track dot-files and dot-directories
    #[arg(long)]
    pub hidden: bool,

    /// Skip entries matching this gitignore-style pattern (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory and print every event until interrupted
    Watch {
        /// Directory to watch (defaults to current directory)
        path: Option<PathBuf>,

        /// Report entries that already exist as "create" instead of "add"
        #[arg(long)]
        create: bool,

        /// Poll every N milliseconds instead of using native notifications
        #[arg(long, value_name = "MS")]
        poll: Option<u64>,

        /// Output JSON lines
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print the entries a watch node tracks for a directory, then exit
    Snapshot {
        /// Directory to scan (defaults to current directory)
        path: Option<PathBuf>,

        /// Output JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn apply_filter_args(config: &mut Config, filter: FilterArgs) {
    if filter.hidden {
        config.watch.include_hidden = true;
    }
    config.watch.ignore.extend(filter.ignore);
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    // Set quiet mode if requested
    if cli.quiet {
        treewatch::output::set_quiet(true);
    }

    match cli.command {
        Commands::Watch {
            path,
            create,
            poll,
            json,
            filter,
        } => {
            apply_filter_args(&mut config, filter);
            if create {
                config.watch.initial_event = InitialEvent::Create;
            }
            if poll.is_some() {
                config.watch.poll_interval_ms = poll;
            }
            if json {
                config.output.json = true;
            }
            // Auto-enable quiet mode for JSON output
            if config.output.json {
                treewatch::output::set_quiet(true);
            }
            watch::run(path, &config).await
        }
        Commands::Snapshot { path, json, filter } => {
            apply_filter_args(&mut config, filter);
            if json {
                config.output.json = true;
                treewatch::output::set_quiet(true);
            }
            snapshot::run(path, &config).await
        }
    }
}
