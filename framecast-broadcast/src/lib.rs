//! # Framecast Broadcast
//!
//! The network hub of Framecast. [`BroadcastServer`] accepts encoded frames
//! over HTTP and forwards each payload unchanged to every connected WebSocket
//! viewer. [`FrameSubscriber`] is the viewer side of that socket, with
//! fixed-delay reconnect.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connections;
pub mod error;
pub mod server;
pub mod subscriber;

// Re-export main types
pub use connections::{ConnectionId, ConnectionSet, FanOutReport, ViewerHandle};
pub use error::BroadcastError;
pub use server::{BroadcastServer, RunningServer, ServerConfig, ServerStats};
pub use subscriber::{FrameSubscriber, SubscriberConfig, SubscriberEvent};
