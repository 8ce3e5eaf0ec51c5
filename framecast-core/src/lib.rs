//! # Framecast Core
//!
//! Frame handoff and network framing for the Framecast pipeline.
//! This crate provides the single-slot frame mailbox shared by the local
//! display and the relay, the binary wire format used between the relay,
//! the broadcast server and viewers, and the rate-limited relay uplink.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod frame;
pub mod mailbox;
pub mod uplink;
pub mod wire_format;

// Re-export main types
pub use error::FramecastError;
pub use event::{EventBus, EventStream, PipelineEvent};
pub use frame::{rgba_len, BufferPool, Frame, BYTES_PER_PIXEL};
pub use mailbox::{FrameMailbox, MailboxReader, MailboxStats};
pub use uplink::{
    CycleOutcome, FrameTransport, HttpTransport, RateLimiter, RelayConfig, RelayHandle,
    RelayStats, RelayUplink,
};
pub use wire_format::{
    decode_frame, encode_frame, DecodedFrame, FrameEncoder, FrameHeader, HEADER_LEN,
};
