use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use treewatch::config::Config;
use treewatch::output::{event_json, event_line};
use treewatch::{info_print, warn_print, WatchEvent, WatchNode};

/// Watch `path` until Ctrl-C or until the node reports an error
pub async fn run(path: Option<PathBuf>, config: &Config) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let root = path
        .canonicalize()
        .with_context(|| format!("Cannot watch {}", path.display()))?;
    let options = config.watch.to_options()?;

    let (node, mut events) = WatchNode::create(&root, options);
    info_print!("Watching {} (Ctrl-C to stop)", root.display());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut failure = None;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event, config);
                    if let WatchEvent::Error { error, .. } = event {
                        failure = Some(error);
                        break;
                    }
                }
                None => {
                    warn_print!("Event stream for {} ended", root.display());
                    break;
                }
            },
            _ = &mut ctrl_c => {
                warn_print!("Interrupted, closing watcher");
                break;
            }
        }
    }

    node.close().await;

    match failure {
        Some(error) => bail!(error),
        None => Ok(()),
    }
}

fn print_event(event: &WatchEvent, config: &Config) {
    if config.output.json {
        println!("{}", event_json(event));
    } else {
        println!("{}", event_line(event, config.output.color));
    }
}
