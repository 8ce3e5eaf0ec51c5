//! Headless Framecast viewer.
//!
//! Subscribes to a broadcast server, decodes every frame and logs the
//! connection state, resolution and frame rate once per second.
//!
//! ```text
//! framecast-viewer                               Connect to ws://127.0.0.1:8080/ws
//! framecast-viewer --url ws://host:8080/ws       Connect elsewhere
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use framecast::{init_logging, FrameSubscriber, HeadlessViewer, ViewerConfig};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast-viewer", about = "Watch a Framecast stream without a window")]
struct Cli {
    /// WebSocket URL of the viewer endpoint.
    #[arg(long, env = "FRAMECAST_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Milliseconds to wait before reconnecting.
    #[arg(long, env = "FRAMECAST_RECONNECT_MS", default_value_t = 2000)]
    reconnect_ms: u64,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "FRAMECAST_LOG", default_value = "info")]
    log: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    let config = ViewerConfig {
        url: cli.url,
        reconnect_delay: Duration::from_millis(cli.reconnect_ms),
        ..Default::default()
    };
    config.validate()?;

    let (mut subscriber, mut events) =
        FrameSubscriber::spawn(config.subscriber()).context("starting subscriber")?;
    let mut viewer = HeadlessViewer::new(&config);
    let mut report = tokio::time::interval(config.fps_window);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => viewer.handle(event),
                None => break,
            },
            _ = report.tick() => {
                let status = viewer.status();
                info!(
                    "{} | {} | {} fps",
                    status.state,
                    status.resolution,
                    status.fps.map_or_else(|| "-".to_string(), |fps| format!("{:.1}", fps))
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscriber.stop();
    let status = viewer.status();
    info!(
        "Viewer stopped after {} frames ({} discarded)",
        status.frames_applied, status.frames_discarded
    );
    Ok(())
}
