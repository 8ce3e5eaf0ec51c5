//! Whole pipeline in one process.
//!
//! Test pattern capture feeds the mailbox; the software display and the
//! relay drain it; the relay uploads to an in-process broadcast server; a
//! headless viewer subscribes to that server and decodes what arrives.
//!
//! ```text
//! cargo run -p framecast --example loopback
//! ```

use std::time::Duration;

use framecast::{
    init_logging, BroadcastServer, CaptureConfig, FrameSubscriber, HeadlessViewer,
    PassthroughRgba, Pipeline, PipelineConfig, RelayConfig, ServerConfig, SoftwareBackend,
    ViewerConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info")?;

    let server = BroadcastServer::bind(ServerConfig {
        bind_addr: "127.0.0.1:0".parse()?,
        ..Default::default()
    })
    .await?;
    let addr = server.local_addr();

    let viewer_config = ViewerConfig {
        url: format!("ws://{}/ws", addr),
        ..Default::default()
    };
    let (mut subscriber, mut events) = FrameSubscriber::spawn(viewer_config.subscriber())?;
    let mut viewer = HeadlessViewer::new(&viewer_config);

    let mut pipeline = Pipeline::<SoftwareBackend>::new(PipelineConfig {
        capture: CaptureConfig {
            width: 160,
            height: 120,
            frame_rate: 30.0,
            max_frames: None,
        },
        relay: Some(RelayConfig {
            upload_url: format!("http://{}/upload-frame", addr),
            ..Default::default()
        }),
        ..Default::default()
    })?;
    pipeline.start_test_pattern(PassthroughRgba, Some(SoftwareBackend::new()))?;

    let deadline = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            Some(event) = events.recv() => viewer.handle(event),
            _ = &mut deadline => break,
        }
    }

    let stats = pipeline.stats();
    let sink = pipeline.stop().await?;
    subscriber.stop();
    server.shutdown().await?;

    info!(
        "Captured {} frames, uploaded {} ({} failed)",
        stats.captured, stats.uploads_delivered, stats.uploads_failed
    );
    if let Some(sink) = sink {
        let display_stats = sink.stats();
        info!(
            "Display: {} allocations, {} updates, {} redraws",
            display_stats.allocations, display_stats.updates, display_stats.redraws
        );
    }
    let status = viewer.status();
    info!(
        "Viewer: {} frames at {}, last rate {:?}",
        status.frames_applied, status.resolution, status.fps
    );
    Ok(())
}
