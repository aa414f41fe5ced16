//! Error types for the WebRTC recorder

/// Result type alias using the recorder Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or recording a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Codec, interceptor or peer connection construction failed
    #[error("Setup error: {0}")]
    Setup(String),

    /// Inbound signaling payload could not be decoded as an offer
    #[error("Malformed offer: {0}")]
    MalformedOffer(String),

    /// The engine rejected a session description or could not produce one
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Signaling transport failure while receiving or sending
    #[error("Signaling channel error: {0}")]
    Channel(String),

    /// Container writer rejected a packet
    #[error("Write error: {0}")]
    Write(String),

    /// Remote track stream ended or failed
    #[error("Read error: {0}")]
    Read(String),

    /// Ingest attempted after the sink was closed
    #[error("Sink closed: {0}")]
    SinkClosed(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Errors that abort the whole session when raised during establishment
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Setup(_)
                | Error::MalformedOffer(_)
                | Error::Negotiation(_)
                | Error::Channel(_)
                | Error::InvalidConfig(_)
        )
    }

    /// Errors confined to a single track's draining task
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            Error::Write(_) | Error::Read(_) | Error::SinkClosed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MalformedOffer("missing field `sdp`".to_string());
        assert_eq!(err.to_string(), "Malformed offer: missing field `sdp`");
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::Setup("codec".to_string()).is_fatal());
        assert!(Error::Negotiation("sdp".to_string()).is_fatal());
        assert!(Error::Channel("closed".to_string()).is_fatal());
        assert!(!Error::Write("ogg".to_string()).is_fatal());
    }

    #[test]
    fn test_error_is_track_local() {
        assert!(Error::Write("ivf".to_string()).is_track_local());
        assert!(Error::Read("eof".to_string()).is_track_local());
        assert!(Error::SinkClosed("audio".to_string()).is_track_local());
        assert!(!Error::MalformedOffer("json".to_string()).is_track_local());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_fatal());
    }
}
