//! Broadcast server
//!
//! Accepts encoded frames over HTTP and forwards each one, byte for byte, to
//! every connected WebSocket viewer.
//!
//! ## Endpoints
//!
//! | Path | Description |
//! |------|-------------|
//! | `POST /upload-frame` | One encoded frame per request body |
//! | `GET /ws` | WebSocket, one binary message per frame |
//! | `GET /health` | Liveness probe |

use crate::connections::{ConnectionSet, FanOutReport};
use crate::error::BroadcastError;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, DefaultBodyLimit, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use framecast_core::{FrameHeader, FramecastError, HEADER_LEN};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Time allowed for in-flight requests to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Broadcast server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Route accepting frame uploads
    pub upload_path: String,
    /// Route accepting viewer WebSocket connections
    pub viewer_path: String,
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,
    /// Frames buffered per viewer before that viewer starts skipping
    pub viewer_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            upload_path: "/upload-frame".to_string(),
            viewer_path: "/ws".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            viewer_queue_size: 4,
        }
    }
}

impl ServerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), BroadcastError> {
        for path in [&self.upload_path, &self.viewer_path] {
            if !path.starts_with('/') {
                return Err(BroadcastError::InvalidUrl {
                    url: path.clone(),
                    reason: "route path must start with '/'".to_string(),
                });
            }
            if path == "/health" {
                return Err(BroadcastError::InvalidUrl {
                    url: path.clone(),
                    reason: "route path is reserved".to_string(),
                });
            }
        }
        if self.upload_path == self.viewer_path {
            return Err(BroadcastError::InvalidConfiguration {
                field: "viewer_path".to_string(),
                reason: "upload and viewer routes must differ".to_string(),
            });
        }
        if self.max_upload_bytes < HEADER_LEN {
            return Err(BroadcastError::InvalidConfiguration {
                field: "max_upload_bytes".to_string(),
                reason: format!("must be at least {} bytes", HEADER_LEN),
            });
        }
        if self.viewer_queue_size == 0 {
            return Err(BroadcastError::InvalidConfiguration {
                field: "viewer_queue_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Upload counters
#[derive(Debug, Default)]
pub struct ServerStats {
    uploads: AtomicU64,
    rejected: AtomicU64,
    mismatched: AtomicU64,
}

impl ServerStats {
    /// Uploads accepted and forwarded
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Uploads rejected as malformed
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Forwarded uploads whose body disagreed with their header
    pub fn mismatched(&self) -> u64 {
        self.mismatched.load(Ordering::Relaxed)
    }
}

/// Shared state passed to all request handlers
#[derive(Clone)]
struct AppState {
    connections: Arc<ConnectionSet>,
    stats: Arc<ServerStats>,
    shutdown: watch::Receiver<bool>,
}

/// Frame broadcast server
pub struct BroadcastServer {
    config: ServerConfig,
    connections: Arc<ConnectionSet>,
    stats: Arc<ServerStats>,
}

impl BroadcastServer {
    /// Create a server from a validated configuration
    pub fn new(config: ServerConfig) -> Result<Self, BroadcastError> {
        config.validate()?;
        let connections = Arc::new(ConnectionSet::new(config.viewer_queue_size));
        Ok(Self {
            config,
            connections,
            stats: Arc::new(ServerStats::default()),
        })
    }

    /// Validate `config`, bind its address and start serving
    pub async fn bind(config: ServerConfig) -> Result<RunningServer, BroadcastError> {
        Self::new(config)?.start().await
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and start serving in a background task
    pub async fn start(self) -> Result<RunningServer, BroadcastError> {
        let address = self.config.bind_addr;
        let listener =
            TcpListener::bind(address)
                .await
                .map_err(|e| BroadcastError::ServerStartFailed {
                    address,
                    source: Box::new(e),
                })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            connections: Arc::clone(&self.connections),
            stats: Arc::clone(&self.stats),
            shutdown: shutdown_rx.clone(),
        };

        let app = Router::new()
            .route(
                &self.config.upload_path,
                post(handle_upload).layer(DefaultBodyLimit::max(self.config.max_upload_bytes)),
            )
            .route(&self.config.viewer_path, get(handle_viewer))
            .route("/health", get(handle_health))
            .with_state(state);

        tracing::info!("Broadcast server listening on http://{}", local_addr);
        tracing::info!(
            "Uploads on {}, viewers on ws://{}{}",
            self.config.upload_path,
            local_addr,
            self.config.viewer_path
        );

        let mut stop = shutdown_rx;
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopping| *stopping).await;
            })
            .await
        });

        Ok(RunningServer {
            local_addr,
            connections: self.connections,
            stats: self.stats,
            shutdown_tx,
            task: Some(task),
        })
    }
}

/// Handle to a server running in the background
pub struct RunningServer {
    local_addr: SocketAddr,
    connections: Arc<ConnectionSet>,
    stats: Arc<ServerStats>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl RunningServer {
    /// Address actually bound, useful when the configured port was 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected viewers
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Viewer connections
    pub fn connections(&self) -> &Arc<ConnectionSet> {
        &self.connections
    }

    /// Upload counters
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Forward `payload` to every viewer without going through HTTP
    pub fn broadcast(&self, payload: &Bytes) -> FanOutReport {
        self.connections.fan_out(payload)
    }

    /// Wait until the server task exits on its own
    pub async fn wait(mut self) -> Result<(), BroadcastError> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result.map_err(BroadcastError::from),
                Err(e) => Err(BroadcastError::Io(std::io::Error::other(e))),
            },
            None => Ok(()),
        }
    }

    /// Close viewer sockets, stop accepting and wait for in-flight requests
    pub async fn shutdown(mut self) -> Result<(), BroadcastError> {
        tracing::info!("Shutting down broadcast server on {}", self.local_addr);
        let _ = self.shutdown_tx.send(true);

        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(result)) => result.map_err(BroadcastError::from),
            Ok(Err(e)) => Err(BroadcastError::Io(std::io::Error::other(e))),
            Err(_) => {
                tracing::warn!("Broadcast server did not stop in time, aborting");
                task.abort();
                Ok(())
            }
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Handles `POST` uploads of one encoded frame.
///
/// Payloads shorter than the header are rejected. A body whose length
/// disagrees with its header is still forwarded, so viewers make the final
/// size check.
async fn handle_upload(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    match forward_upload(&state, body) {
        Ok(report) => {
            tracing::trace!(
                "Forwarded frame to {} viewers ({} skipped)",
                report.delivered,
                report.skipped
            );
            (StatusCode::OK, "ok")
        }
        Err(FramecastError::MalformedPayload { len, .. }) => {
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Rejected upload of {} bytes: too short for a frame", len);
            (StatusCode::BAD_REQUEST, "invalid frame")
        }
        Err(e) => {
            tracing::error!("Error handling upload: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "server error")
        }
    }
}

fn forward_upload(state: &AppState, body: Bytes) -> Result<FanOutReport, FramecastError> {
    let header = FrameHeader::parse(&body)?;
    let actual = (body.len() - HEADER_LEN) as u64;
    let expected = header.expected_pixel_len();
    if actual != expected {
        state.stats.mismatched.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "Frame size mismatch for {}x{}: got {}, expected {}",
            header.width,
            header.height,
            actual,
            expected
        );
    }

    state.stats.uploads.fetch_add(1, Ordering::Relaxed);
    Ok(state.connections.fan_out(&body))
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Handles WebSocket upgrade requests from viewers
async fn handle_viewer(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_viewer_socket(socket, addr, state))
}

/// Pumps queued frames to one viewer until either side goes away
async fn handle_viewer_socket(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (id, mut frames) = state.connections.register(Some(addr));
    tracing::info!(
        "Viewer {} connected from {} (total: {})",
        id,
        addr,
        state.connections.len()
    );

    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(payload) = frame else { break };
                if let Err(e) = socket.send(Message::Binary(payload)).await {
                    tracing::debug!("Send to viewer {} failed: {}", id, e);
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::info!("Message from viewer {}: {}", id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Viewer {} socket error: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            // The watch guard must not outlive this arm's future
            _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.connections.remove(&id);
    tracing::info!(
        "Viewer {} disconnected (total: {})",
        id,
        state.connections.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.upload_path, "/upload-frame");
        assert_eq!(config.viewer_path, "/ws");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig {
            upload_path: "upload".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BroadcastError::InvalidUrl { .. })
        ));

        let config = ServerConfig {
            viewer_path: "/upload-frame".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_upload_bytes: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            viewer_queue_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    fn require_send_handler<F, Fut>(_handler: F)
    where
        F: FnOnce(WebSocket, SocketAddr, AppState) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
    }

    #[test]
    fn test_viewer_socket_future_is_send() {
        // on_upgrade spawns the handler, so its future must be Send
        require_send_handler(handle_viewer_socket);
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = holder.local_addr().unwrap();

        let result = BroadcastServer::bind(ServerConfig {
            bind_addr: taken,
            ..Default::default()
        })
        .await;

        match result {
            Err(BroadcastError::ServerStartFailed { address, .. }) => assert_eq!(address, taken),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("bind should fail on a taken port"),
        }
    }
}
