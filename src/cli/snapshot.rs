use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

use treewatch::config::Config;
use treewatch::output::local_time;
use treewatch::{info_print, WatchEvent, WatchNode};

/// Run one initial scan of `path` and print what it found
pub async fn run(path: Option<PathBuf>, config: &Config) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let root = path
        .canonicalize()
        .with_context(|| format!("Cannot scan {}", path.display()))?;
    let options = config.watch.to_options()?;

    let (node, mut events) = WatchNode::create(&root, options);
    let entries = node.snapshot().await?;
    node.close().await;

    while let Some(event) = events.recv().await {
        if let WatchEvent::Error { error, .. } = event {
            bail!(error);
        }
    }

    if config.output.json {
        let listing: Vec<_> = entries
            .iter()
            .map(|(name, stat)| {
                json!({
                    "name": name,
                    "size": stat.size,
                    "is_dir": stat.is_dir,
                    "modified": local_time(stat.modified),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    info_print!("{} ({} entries)", root.display(), entries.len());
    for (name, stat) in &entries {
        let name = if stat.is_dir && config.output.color {
            format!("{}/", name).blue().bold().to_string()
        } else if stat.is_dir {
            format!("{}/", name)
        } else {
            name.clone()
        };
        println!(
            "{:>12}  {}  {}",
            stat.size,
            local_time(stat.modified),
            name
        );
    }

    Ok(())
}
