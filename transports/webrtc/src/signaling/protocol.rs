//! Signaling wire format
//!
//! One JSON session description in each direction:
//! `{"type": "offer", "sdp": "..."}` in, `{"type": "answer", "sdp": "..."}` out.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Session description type carried by an inbound offer
pub const OFFER: &str = "offer";

/// Session description type carried by the outbound answer
pub const ANSWER: &str = "answer";

/// JSON-encoded session description exchanged over the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescriptionMessage {
    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub sdp_type: String,

    /// Raw SDP body
    pub sdp: String,
}

impl SessionDescriptionMessage {
    /// Decode an inbound offer
    ///
    /// # Errors
    ///
    /// `MalformedOffer` if the payload is not JSON, lacks `type`/`sdp`, or
    /// is not of type "offer".
    pub fn parse_offer(text: &str) -> Result<Self> {
        let msg: Self = serde_json::from_str(text)
            .map_err(|e| Error::MalformedOffer(format!("Failed to parse JSON: {}", e)))?;

        if msg.sdp_type != OFFER {
            return Err(Error::MalformedOffer(format!(
                "Expected session description of type 'offer', got '{}'",
                msg.sdp_type
            )));
        }

        Ok(msg)
    }

    /// Build the outbound answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: ANSWER.to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Other(e.into()))
    }
}
