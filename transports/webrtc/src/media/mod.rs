//! Media handling: codec setup, keyframe requests, track routing and disk sinks

pub mod codecs;
pub mod keyframe;
pub mod router;
pub mod sink;

pub use router::{drain, DrainEnd, DrainSummary, PacketSource, TrackRouter};
pub use sink::{DiskSink, SinkPair};

use std::fmt;

/// Kind of a recorded media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
