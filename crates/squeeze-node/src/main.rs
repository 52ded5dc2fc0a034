//! Squeeze Node - serves a document root with adaptive script and
//! stylesheet merging.

use anyhow::Context;
use clap::Parser;
use squeeze_node::{create_router, create_state, init_logging, LogFormat, NodeConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Squeeze Node - adaptive merging of HTML sub-resources
#[derive(Parser, Debug)]
#[command(name = "squeeze-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Directory whose files are served
    #[arg(long)]
    document_root: Option<PathBuf>,

    /// Directory where merged artifacts are written
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Path or absolute URL under which merged artifacts are served
    #[arg(long)]
    url_prefix: Option<String>,

    /// Minimum co-occurrence ratio for a group to be merged (0 < t <= 1)
    #[arg(long)]
    threshold: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Applies command line flags on top of the loaded configuration.
    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(root) = self.document_root {
            config.document_root = root;
        }
        if let Some(dir) = self.cache_dir {
            config.squeeze.cache_dir = Some(dir);
        }
        if let Some(prefix) = self.url_prefix {
            config.squeeze.url_prefix = Some(prefix);
        }
        if let Some(threshold) = self.threshold {
            config.squeeze.threshold = threshold;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        NodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting squeeze node");

    config.validate().context("Invalid configuration")?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        document_root = %config.document_root.display(),
        url_prefix = config.squeeze.url_prefix.as_deref().unwrap_or_default(),
        threshold = config.squeeze.threshold,
        "Node configuration"
    );

    let state = create_state(&config).context("Failed to initialize squeezing engine")?;
    let app = create_router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Squeeze node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
