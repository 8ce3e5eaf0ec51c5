//! Framecast broadcast server.
//!
//! ```text
//! framecast-server                       Listen on 0.0.0.0:8080
//! framecast-server --bind 127.0.0.1:9000 Listen elsewhere
//! framecast-server --print-config        Print the effective config as JSON
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use framecast::{init_logging, BroadcastServer, ServerConfig};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast-server", about = "Relay uploaded frames to WebSocket viewers")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "FRAMECAST_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Route accepting frame uploads.
    #[arg(long, env = "FRAMECAST_UPLOAD_PATH", default_value = "/upload-frame")]
    upload_path: String,

    /// Route accepting viewer WebSocket connections.
    #[arg(long, env = "FRAMECAST_VIEWER_PATH", default_value = "/ws")]
    viewer_path: String,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "FRAMECAST_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Frames buffered per viewer before it starts skipping.
    #[arg(long, env = "FRAMECAST_VIEWER_QUEUE", default_value_t = 4)]
    viewer_queue: usize,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "FRAMECAST_LOG", default_value = "info")]
    log: String,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            upload_path: self.upload_path.clone(),
            viewer_path: self.viewer_path.clone(),
            max_upload_bytes: self.max_upload_bytes,
            viewer_queue_size: self.viewer_queue,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.server_config();

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&cli.log)?;

    let server = BroadcastServer::bind(config)
        .await
        .context("starting broadcast server")?;
    info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!(
        "Stopping with {} viewers connected, {} uploads forwarded",
        server.connection_count(),
        server.stats().uploads()
    );
    server.shutdown().await?;
    Ok(())
}
