//! Signaling: offer/answer wire format, text channels, HTTP/WebSocket server

pub mod channel;
pub mod protocol;
pub mod server;

pub use channel::{MpscChannel, SignalingChannel};
pub use protocol::SessionDescriptionMessage;
pub use server::{router, serve, ServerState};
