//! Disk sinks: container writers for recorded tracks
//!
//! Each sink owns one webrtc-rs media writer (Ogg for Opus, IVF for VP8).
//! `ingest` and `close` share one lock, so a close never interleaves with an
//! in-flight write and every ingest after close is rejected without touching
//! the file.

use super::MediaKind;
use crate::config::OutputLayout;
use crate::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp::packet::Packet;

/// Container writer bound to a fixed output path
pub struct DiskSink {
    kind: MediaKind,
    path: PathBuf,
    writer: Mutex<Option<Box<dyn Writer + Send + Sync>>>,
    packets: AtomicU64,
}

impl DiskSink {
    /// Wrap an already-open media writer
    pub fn new(kind: MediaKind, path: PathBuf, writer: Box<dyn Writer + Send + Sync>) -> Self {
        Self {
            kind,
            path,
            writer: Mutex::new(Some(writer)),
            packets: AtomicU64::new(0),
        }
    }

    /// Create (or truncate) an Ogg/Opus file
    pub fn create_ogg(path: &Path, sample_rate: u32, channels: u8) -> Result<Self> {
        let file = create_output_file(path)?;
        let writer = OggWriter::new(file, sample_rate, channels)
            .map_err(|e| Error::Setup(format!("Failed to open Ogg writer {:?}: {}", path, e)))?;

        info!(path = ?path, sample_rate, channels, "Opened audio sink");
        Ok(Self::new(MediaKind::Audio, path.to_path_buf(), Box::new(writer)))
    }

    /// Create (or truncate) an IVF/VP8 file
    pub fn create_ivf(path: &Path) -> Result<Self> {
        let file = create_output_file(path)?;
        let header = IVFFileHeader {
            signature: *b"DKIF",
            version: 0,
            header_size: 32,
            four_cc: *b"VP80",
            width: 640,
            height: 480,
            timebase_denominator: 30,
            timebase_numerator: 1,
            num_frames: 900,
            unused: 0,
        };
        let writer = IVFWriter::new(file, &header)
            .map_err(|e| Error::Setup(format!("Failed to open IVF writer {:?}: {}", path, e)))?;

        info!(path = ?path, "Opened video sink");
        Ok(Self::new(MediaKind::Video, path.to_path_buf(), Box::new(writer)))
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packets accepted since the sink was opened
    pub fn packets_written(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }

    /// Append one RTP packet to the container
    ///
    /// # Errors
    ///
    /// `SinkClosed` once the sink has been closed, `Write` if the container
    /// writer rejects the packet.
    pub async fn ingest(&self, packet: &Packet) -> Result<()> {
        // The container writers do blocking file I/O on this worker while the
        // lock is held; at one packet stream per sink the writes are small.
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::SinkClosed(format!("{} sink {:?}", self.kind, self.path)))?;

        writer.write_rtp(packet).map_err(|e| {
            Error::Write(format!("{} sink {:?}: {}", self.kind, self.path, e))
        })?;

        self.packets.fetch_add(1, Ordering::Relaxed);
        trace!(kind = %self.kind, seq = packet.header.sequence_number, "Packet written");
        Ok(())
    }

    /// Finalize the container
    ///
    /// Returns `Ok(true)` if this call closed the writer and `Ok(false)` if
    /// it was already closed.
    pub async fn close(&self) -> Result<bool> {
        let writer = self.writer.lock().await.take();
        let Some(mut writer) = writer else {
            debug!(kind = %self.kind, "Sink already closed");
            return Ok(false);
        };

        writer.close().map_err(|e| {
            Error::Write(format!("Failed to close {} sink {:?}: {}", self.kind, self.path, e))
        })?;

        info!(
            kind = %self.kind,
            path = ?self.path,
            packets = self.packets_written(),
            "Closed sink"
        );
        Ok(true)
    }
}

fn create_output_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// The audio and video sinks of one session
#[derive(Clone)]
pub struct SinkPair {
    pub audio: Arc<DiskSink>,
    pub video: Arc<DiskSink>,
}

impl SinkPair {
    /// Open both container files for a session, truncating previous runs
    pub fn open(layout: &OutputLayout) -> Result<Self> {
        let audio = DiskSink::create_ogg(
            &layout.audio_path,
            layout.audio_sample_rate,
            layout.audio_channels,
        )?;
        let video = DiskSink::create_ivf(&layout.video_path)?;

        Ok(Self {
            audio: Arc::new(audio),
            video: Arc::new(video),
        })
    }

    pub fn get(&self, kind: MediaKind) -> &Arc<DiskSink> {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    /// Close both sinks, attempting the second even if the first fails
    pub async fn close_all(&self) -> Result<()> {
        let audio = self.audio.close().await;
        let video = self.video.close().await;

        if let Err(ref e) = audio {
            warn!("Audio sink close failed: {}", e);
        }
        if let Err(ref e) = video {
            warn!("Video sink close failed: {}", e);
        }

        audio.and(video).map(|_| ())
    }
}
