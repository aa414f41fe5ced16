//! Receive-only WebRTC peer connection

use crate::config::RecorderConfig;
use crate::media::codecs;
use crate::media::TrackRouter;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Peer connection that only receives one audio and one video track
///
/// Wraps a webrtc::RTCPeerConnection built from the recorder's codec and
/// interceptor setup.
pub struct RecorderPeer {
    /// Session this connection belongs to
    session_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<RTCPeerConnection>,
}

impl RecorderPeer {
    /// Create the peer connection and its two receive-only transceivers
    ///
    /// # Arguments
    ///
    /// * `session_id` - Identifier used in logs
    /// * `config` - STUN servers and keyframe interval
    #[instrument(skip(config), fields(session_id = %session_id))]
    pub async fn new(session_id: String, config: &RecorderConfig) -> Result<Self> {
        let api = codecs::build_api(config)?;

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::Setup(format!("Failed to create peer connection: {}", e)))?,
        );

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| {
                    Error::Setup(format!("Failed to add {} transceiver: {}", kind, e))
                })?;
        }

        info!("Created receive-only peer connection");

        Ok(Self {
            session_id,
            peer_connection,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the underlying peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Route every remote track announced by the engine through `router`
    pub fn on_track(&self, router: TrackRouter) {
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let router = router.clone();
                Box::pin(async move {
                    router.attach_remote(track);
                })
            }));
    }

    /// Apply a remote offer and produce a complete, non-trickled answer
    ///
    /// Blocks until ICE gathering has finished, so the returned description
    /// already carries every local candidate.
    pub async fn answer(&self, offer_sdp: String) -> Result<RTCSessionDescription> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::Negotiation(format!("Invalid offer SDP: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create answer: {}", e)))?;

        // Subscribe before gathering starts so completion cannot be missed
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {}", e)))?;

        let _ = gather_complete.recv().await;
        debug!(session_id = %self.session_id, "ICE gathering complete");

        self.peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::Negotiation("No local description after gathering".to_string())
            })
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        info!(session_id = %self.session_id, "Closing peer connection");
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to close connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> RecorderConfig {
        RecorderConfig {
            stun_servers: Vec::new(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_peer_has_two_recvonly_transceivers() {
        let peer = RecorderPeer::new("s1".to_string(), &offline_config())
            .await
            .unwrap();

        let transceivers = peer.peer_connection().get_transceivers().await;
        assert_eq!(transceivers.len(), 2);
        for t in &transceivers {
            assert_eq!(t.direction(), RTCRtpTransceiverDirection::Recvonly);
        }
        assert_eq!(transceivers[0].kind(), RTPCodecType::Audio);
        assert_eq!(transceivers[1].kind(), RTPCodecType::Video);

        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_answer_rejects_garbage_sdp() {
        let peer = RecorderPeer::new("s1".to_string(), &offline_config())
            .await
            .unwrap();

        let err = peer.answer("not an sdp".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Negotiation(_)));

        peer.close().await.unwrap();
    }
}
