//! Track routing
//!
//! Binds each newly announced remote track to the sink matching its codec
//! and drains the track's RTP stream into that sink on a dedicated task.

use super::codecs::{AUDIO_MIME_TYPE, VIDEO_MIME_TYPE};
use super::sink::{DiskSink, SinkPair};
use super::MediaKind;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::track::track_remote::TrackRemote;

/// Ordered source of RTP packets for one track
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Read the next packet. An error ends the stream.
    async fn read_packet(&self) -> Result<Packet>;
}

#[async_trait]
impl PacketSource for TrackRemote {
    async fn read_packet(&self) -> Result<Packet> {
        self.read_rtp()
            .await
            .map(|(packet, _)| packet)
            .map_err(|e| Error::Read(e.to_string()))
    }
}

/// Why a draining task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// Track read failed (remote ended or connection torn down)
    SourceEnded,
    /// Container writer rejected a packet
    WriteFailed,
    /// Session teardown closed the sink first
    SinkClosed,
}

/// Outcome of one draining task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub packets: u64,
    pub end: DrainEnd,
}

/// Copy packets from `source` into `sink` in read order, then close the sink
pub async fn drain<S>(source: &S, sink: &DiskSink) -> DrainSummary
where
    S: PacketSource + ?Sized,
{
    let kind = sink.kind();
    let mut packets = 0u64;

    let end = loop {
        let packet = match source.read_packet().await {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%kind, "Track read ended: {}", e);
                break DrainEnd::SourceEnded;
            }
        };

        match sink.ingest(&packet).await {
            Ok(()) => packets += 1,
            Err(Error::SinkClosed(_)) => {
                debug!(%kind, "Sink closed by teardown, stopping drain");
                break DrainEnd::SinkClosed;
            }
            Err(e) => {
                warn!(%kind, "Dropping track after write failure: {}", e);
                break DrainEnd::WriteFailed;
            }
        }
    };

    if let Err(e) = sink.close().await {
        error!(%kind, "Failed to close sink after drain: {}", e);
    }

    info!(%kind, packets, end = ?end, "Track drain finished");
    DrainSummary { packets, end }
}

/// Routes remote tracks to the session's sinks by codec
#[derive(Clone)]
pub struct TrackRouter {
    session_id: String,
    sinks: SinkPair,
    audio_bound: Arc<AtomicBool>,
    video_bound: Arc<AtomicBool>,
}

impl TrackRouter {
    pub fn new(session_id: impl Into<String>, sinks: SinkPair) -> Self {
        Self {
            session_id: session_id.into(),
            sinks,
            audio_bound: Arc::new(AtomicBool::new(false)),
            video_bound: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Map a codec MIME type to the recorded media kind (case-insensitive)
    pub fn classify(mime_type: &str) -> Option<MediaKind> {
        if mime_type.eq_ignore_ascii_case(AUDIO_MIME_TYPE) {
            Some(MediaKind::Audio)
        } else if mime_type.eq_ignore_ascii_case(VIDEO_MIME_TYPE) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    fn bound_flag(&self, kind: MediaKind) -> &AtomicBool {
        match kind {
            MediaKind::Audio => &self.audio_bound,
            MediaKind::Video => &self.video_bound,
        }
    }

    /// Bind a packet source to the sink for `mime_type` and start draining it
    ///
    /// Returns `None` without spawning anything when the codec is not
    /// recorded or the matching sink already has a producer.
    pub fn attach<S>(&self, source: Arc<S>, mime_type: &str) -> Option<JoinHandle<DrainSummary>>
    where
        S: PacketSource + ?Sized + 'static,
    {
        let Some(kind) = Self::classify(mime_type) else {
            info!(
                session_id = %self.session_id,
                mime_type,
                "Ignoring track with unrecorded codec"
            );
            return None;
        };

        if self
            .bound_flag(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                session_id = %self.session_id,
                %kind,
                "Sink already has a producer, ignoring extra track"
            );
            return None;
        }

        let sink = Arc::clone(self.sinks.get(kind));
        info!(
            session_id = %self.session_id,
            %kind,
            mime_type,
            path = ?sink.path(),
            "Got track, saving to disk"
        );

        Some(tokio::spawn(async move {
            drain(source.as_ref(), sink.as_ref()).await
        }))
    }

    /// Entry point for the peer connection's on_track handler
    pub fn attach_remote(&self, track: Arc<TrackRemote>) -> Option<JoinHandle<DrainSummary>> {
        let mime_type = track.codec().capability.mime_type;
        self.attach(track, &mime_type)
    }
}
