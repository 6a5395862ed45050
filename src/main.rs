mod cli;

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let verbose = std::env::args().any(|arg| arg == "-v" || arg == "--verbose");
    let default_filter = if verbose { "treewatch=debug" } else { "treewatch=info" };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Starting treewatch v{}", env!("CARGO_PKG_VERSION"));

    // Parse CLI and execute command
    cli::run().await
}
