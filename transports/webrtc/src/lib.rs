//! WebRTC recorder
//!
//! Accepts a single browser WebRTC session over a WebSocket, answers it with
//! a complete (non-trickled) description and writes the received tracks to
//! disk: Opus audio into an Ogg container, VP8 video into an IVF container.
//!
//! # Features
//!
//! - **Receive-only peer**: one audio and one video transceiver
//! - **Single offer/answer exchange**: JSON session descriptions, no trickle ICE
//! - **Periodic keyframe requests**: PLI on every video stream
//! - **Disk sinks**: Ogg/Opus and IVF/VP8 writers, closed exactly once
//! - **Lifecycle monitor**: terminal ICE/peer states end the session with a
//!   [`SessionEnded`] notification
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Browser (getUserMedia + RTCPeerConnection)            │
//! │  ↓ offer over /ws          ↑ complete answer           │
//! │  Session                                               │
//! │  ├─ RecorderPeer (recvonly audio + video)              │
//! │  │   └─ KeyframeRequester (interval PLI)               │
//! │  ├─ TrackRouter → DiskSink (Ogg) / DiskSink (IVF)      │
//! │  └─ LifecycleMonitor → SessionEnded                    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use webrtc_recorder::RecorderConfig;
//!
//! let config = RecorderConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.output.audio_file_name, "output.ogg");
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use webrtc_recorder::{MpscChannel, RecorderConfig, Session};
//!
//! # async fn example() -> webrtc_recorder::Result<()> {
//! let config = RecorderConfig::default();
//! let (_browser, mut server) = MpscChannel::pair(1);
//!
//! let mut session = Session::negotiate(&config, &mut server).await?;
//! if let Some(ended) = session.ended().await {
//!     println!("session {} ended: {}", ended.session_id, ended.reason);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{OutputConfig, OutputLayout, RecorderConfig};
pub use error::{Error, Result};
pub use media::{DiskSink, MediaKind, SinkPair, TrackRouter};
pub use peer::{EndReason, RecorderPeer, SessionEnded};
pub use session::Session;
pub use signaling::{MpscChannel, ServerState, SessionDescriptionMessage, SignalingChannel};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
