//! WebRTC peer connection management
//!
//! Handles the receive-only connection and its lifecycle monitoring.

pub mod connection;
pub mod lifecycle;

pub use connection::RecorderPeer;
pub use lifecycle::{EndReason, LifecycleMonitor, SessionEnded};
