//! Codec and interceptor setup
//!
//! Builds the webrtc-rs `API` used to create the session's peer connection:
//! exactly one audio codec (Opus) and one video codec (VP8), the default
//! interceptor chain, and the periodic keyframe-request interceptor.

use crate::config::RecorderConfig;
use crate::media::keyframe::KeyframeRequestBuilder;
use crate::{Error, Result};
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

/// Payload type negotiated for Opus
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Payload type negotiated for VP8
pub const VP8_PAYLOAD_TYPE: u8 = 96;

/// Opus RTP clock rate
pub const OPUS_CLOCK_RATE: u32 = 48000;

/// Standard 90kHz video RTP clock
pub const VIDEO_CLOCK_RATE: u32 = 90000;

/// Audio codec MIME type recorded to the Ogg sink
pub const AUDIO_MIME_TYPE: &str = MIME_TYPE_OPUS;

/// Video codec MIME type recorded to the IVF sink
pub const VIDEO_MIME_TYPE: &str = MIME_TYPE_VP8;

fn audio_codec() -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: AUDIO_MIME_TYPE.to_owned(),
            clock_rate: OPUS_CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        payload_type: OPUS_PAYLOAD_TYPE,
        ..Default::default()
    }
}

fn video_codec() -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: VIDEO_MIME_TYPE.to_owned(),
            clock_rate: VIDEO_CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        payload_type: VP8_PAYLOAD_TYPE,
        ..Default::default()
    }
}

/// Register the two recorded codecs on a fresh media engine
pub fn media_engine() -> Result<MediaEngine> {
    let mut media_engine = MediaEngine::default();

    media_engine
        .register_codec(video_codec(), RTPCodecType::Video)
        .map_err(|e| Error::Setup(format!("Failed to register VP8 codec: {}", e)))?;

    media_engine
        .register_codec(audio_codec(), RTPCodecType::Audio)
        .map_err(|e| Error::Setup(format!("Failed to register Opus codec: {}", e)))?;

    Ok(media_engine)
}

/// Build the negotiation engine factory for one session
///
/// A new `API` is required per peer connection because the interceptor
/// registry is consumed by it.
pub fn build_api(config: &RecorderConfig) -> Result<API> {
    let mut media_engine = media_engine()?;

    let mut registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| Error::Setup(format!("Failed to register interceptors: {}", e)))?;

    registry.add(Box::new(KeyframeRequestBuilder::new(
        config.keyframe_interval(),
    )));

    debug!(
        keyframe_interval_ms = config.keyframe_interval_ms,
        "Built WebRTC API with Opus/VP8 and keyframe interceptor"
    );

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}
