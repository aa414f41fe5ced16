//! Configuration types for the WebRTC recorder

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Address the signaling server binds to
    pub listen_addr: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// Interval between keyframe requests on video streams (default: 3000ms)
    pub keyframe_interval_ms: u64,

    /// Output artifact settings
    pub output: OutputConfig,
}

/// Where and how recorded tracks are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the container files
    pub dir: PathBuf,

    /// Ogg/Opus file name (default: output.ogg)
    pub audio_file_name: String,

    /// IVF/VP8 file name (default: output.ivf)
    pub video_file_name: String,

    /// Sample rate written into the Ogg header (default: 48000)
    pub audio_sample_rate: u32,

    /// Channel count written into the Ogg header (default: 2)
    pub audio_channels: u8,

    /// Give each session its own `<dir>/<session_id>/` folder instead of
    /// overwriting the fixed paths (default: false)
    pub per_session_dirs: bool,
}

/// Resolved file paths for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            keyframe_interval_ms: 3000,
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            audio_file_name: "output.ogg".to_string(),
            video_file_name: "output.ivf".to_string(),
            audio_sample_rate: 48000,
            audio_channels: 2,
            per_session_dirs: false,
        }
    }
}

impl OutputConfig {
    /// Resolve the artifact paths for a session
    pub fn layout(&self, session_id: &str) -> OutputLayout {
        let base: &Path = &self.dir;
        let dir = if self.per_session_dirs {
            base.join(session_id)
        } else {
            base.to_path_buf()
        };

        OutputLayout {
            audio_path: dir.join(&self.audio_file_name),
            video_path: dir.join(&self.video_file_name),
            audio_sample_rate: self.audio_sample_rate,
            audio_channels: self.audio_channels,
        }
    }
}

impl RecorderConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or contains a non-STUN URL
    /// - `keyframe_interval_ms` is not in range 100-60000
    /// - an output file name is empty
    /// - `audio_sample_rate` or `audio_channels` is zero
    /// - `listen_addr` is not a socket address
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must start with stun: or stuns:, got {}",
                bad
            )));
        }

        if !(100..=60000).contains(&self.keyframe_interval_ms) {
            return Err(Error::InvalidConfig(format!(
                "keyframe_interval_ms must be in range 100-60000, got {}",
                self.keyframe_interval_ms
            )));
        }

        if self.output.audio_file_name.is_empty() || self.output.video_file_name.is_empty() {
            return Err(Error::InvalidConfig(
                "Output file names must not be empty".to_string(),
            ));
        }

        if self.output.audio_sample_rate == 0 || self.output.audio_channels == 0 {
            return Err(Error::InvalidConfig(format!(
                "Audio format must be non-zero, got {}Hz x {}",
                self.output.audio_sample_rate, self.output.audio_channels
            )));
        }

        self.listen_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                Error::InvalidConfig(format!(
                    "listen_addr '{}' is not a socket address: {}",
                    self.listen_addr, e
                ))
            })?;

        Ok(())
    }

    /// Keyframe request interval as a Duration
    pub fn keyframe_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.keyframe_interval_ms)
    }
}
