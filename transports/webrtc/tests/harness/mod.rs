//! Integration test harness
//!
//! Provides a browser-like offerer built on webrtc-rs and a recorder
//! configuration that needs no network access.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc_recorder::{OutputConfig, RecorderConfig};

/// Recorder config writing into `dir`, with no STUN servers so gathering
/// completes from host candidates only
pub fn offline_config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        stun_servers: Vec::new(),
        output: OutputConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Sending peer standing in for the browser page
pub struct BrowserPeer {
    pub peer_connection: Arc<RTCPeerConnection>,
    audio_track: Arc<TrackLocalStaticSample>,
    video_track: Option<Arc<TrackLocalStaticSample>>,
}

impl BrowserPeer {
    /// Create an offerer publishing an Opus track and, optionally, a VP8 track
    pub async fn new(with_video: bool) -> Self {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let registry = register_default_interceptors(Registry::new(), &mut media_engine).unwrap();

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_string(),
            "browser".to_string(),
        ));
        peer_connection
            .add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .unwrap();

        let mut video = None;
        if with_video {
            let video_track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video".to_string(),
                "browser".to_string(),
            ));
            peer_connection
                .add_track(Arc::clone(&video_track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .unwrap();
            video = Some(video_track);
        }

        Self {
            peer_connection,
            audio_track,
            video_track: video,
        }
    }

    /// Create the offer, wait for gathering and encode it as the page does
    pub async fn offer_json(&self) -> String {
        let offer = self.peer_connection.create_offer(None).await.unwrap();
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection
            .set_local_description(offer)
            .await
            .unwrap();
        let _ = gather_complete.recv().await;

        let local = self.peer_connection.local_description().await.unwrap();
        serde_json::json!({ "type": "offer", "sdp": local.sdp }).to_string()
    }

    /// Apply the recorder's answer
    pub async fn apply_answer(&self, sdp: String) {
        let answer = RTCSessionDescription::answer(sdp).unwrap();
        self.peer_connection
            .set_remote_description(answer)
            .await
            .unwrap();
    }

    /// Send one 20ms Opus frame and, with video, one VP8 keyframe
    ///
    /// Samples written before the connection is up are dropped by the track.
    pub async fn write_samples(&self) {
        self.audio_track
            .write_sample(&Sample {
                data: Bytes::from_static(&[0xfc; 40]),
                duration: Duration::from_millis(20),
                ..Default::default()
            })
            .await
            .unwrap();

        if let Some(video_track) = &self.video_track {
            // Low bit of the first VP8 payload byte clear marks a keyframe
            video_track
                .write_sample(&Sample {
                    data: Bytes::from_static(&[0x10; 64]),
                    duration: Duration::from_millis(33),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
    }

    pub async fn close(&self) {
        let _ = self.peer_connection.close().await;
    }
}
