//! Connection lifecycle monitoring
//!
//! Reacts to ICE and peer-connection state changes driven by the engine.
//! Both terminal paths share one latch so sink close and engine teardown run
//! exactly once, after which the monitor emits a single [`SessionEnded`] to
//! the process driver. The monitor never exits the process itself.

use crate::media::SinkPair;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Why a session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    IceFailed,
    IceClosed,
    PeerFailed,
    PeerClosed,
    /// Local shutdown requested by the process driver
    Shutdown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::IceFailed => "ICE connection failed",
            EndReason::IceClosed => "ICE connection closed",
            EndReason::PeerFailed => "peer connection failed",
            EndReason::PeerClosed => "peer connection closed",
            EndReason::Shutdown => "shutdown requested",
        };
        f.write_str(s)
    }
}

/// Emitted once per session when its connection ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    pub session_id: String,
    pub reason: EndReason,
    /// First teardown failure, if any (sink finalization or engine close)
    pub teardown_error: Option<String>,
}

/// What a state change asks the monitor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Ignore,
    Log,
    Terminate(EndReason),
}

pub fn ice_reaction(state: RTCIceConnectionState) -> Reaction {
    match state {
        RTCIceConnectionState::Connected => Reaction::Log,
        RTCIceConnectionState::Failed => Reaction::Terminate(EndReason::IceFailed),
        RTCIceConnectionState::Closed => Reaction::Terminate(EndReason::IceClosed),
        _ => Reaction::Ignore,
    }
}

pub fn peer_reaction(state: RTCPeerConnectionState) -> Reaction {
    match state {
        RTCPeerConnectionState::Failed => Reaction::Terminate(EndReason::PeerFailed),
        RTCPeerConnectionState::Closed => Reaction::Terminate(EndReason::PeerClosed),
        _ => Reaction::Ignore,
    }
}

/// One-shot terminal transition guard
#[derive(Debug, Default)]
pub struct TerminalLatch {
    fired: AtomicBool,
}

impl TerminalLatch {
    /// Returns true for exactly one caller
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// The part of the negotiation engine the monitor tears down
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn close_engine(&self) -> Result<()>;
}

#[async_trait]
impl EngineHandle for RTCPeerConnection {
    async fn close_engine(&self) -> Result<()> {
        self.close()
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to close peer connection: {}", e)))
    }
}

pub struct LifecycleMonitor {
    session_id: String,
    sinks: SinkPair,
    engine: Weak<dyn EngineHandle>,
    latch: TerminalLatch,
    ended_tx: mpsc::UnboundedSender<SessionEnded>,
}

impl LifecycleMonitor {
    pub fn new(
        session_id: impl Into<String>,
        sinks: SinkPair,
        engine: Weak<dyn EngineHandle>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEnded>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(Self {
            session_id: session_id.into(),
            sinks,
            engine,
            latch: TerminalLatch::default(),
            ended_tx,
        });
        (monitor, ended_rx)
    }

    pub fn is_terminated(&self) -> bool {
        self.latch.is_fired()
    }

    /// Take the latch without tearing down, for sessions that never
    /// finished negotiating. Returns false if teardown already happened.
    pub fn disarm(&self) -> bool {
        self.latch.try_fire()
    }

    /// Register both observers on the peer connection
    pub fn register(self: &Arc<Self>, peer_connection: &RTCPeerConnection) {
        let monitor = Arc::clone(self);
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let monitor = Arc::clone(&monitor);
                Box::pin(async move {
                    monitor.on_ice_state(state);
                })
            },
        ));

        let monitor = Arc::clone(self);
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let monitor = Arc::clone(&monitor);
                Box::pin(async move {
                    monitor.on_peer_state(state);
                })
            },
        ));
    }

    /// ICE connectivity observer
    pub fn on_ice_state(self: &Arc<Self>, state: RTCIceConnectionState) -> Reaction {
        info!(session_id = %self.session_id, %state, "ICE connection state has changed");
        let reaction = ice_reaction(state);
        match reaction {
            Reaction::Log => {
                info!(
                    session_id = %self.session_id,
                    "Media connected; close the browser tab to stop recording"
                );
            }
            Reaction::Terminate(reason) => self.spawn_teardown(reason),
            Reaction::Ignore => {}
        }
        reaction
    }

    /// Peer-connection aggregate observer
    pub fn on_peer_state(self: &Arc<Self>, state: RTCPeerConnectionState) -> Reaction {
        info!(session_id = %self.session_id, %state, "Peer connection state has changed");
        let reaction = peer_reaction(state);
        if let Reaction::Terminate(reason) = reaction {
            self.spawn_teardown(reason);
        }
        reaction
    }

    // Engine callbacks must return promptly; closing the engine from inside
    // its own callback re-enters the state handlers.
    fn spawn_teardown(self: &Arc<Self>, reason: EndReason) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.terminate(reason).await;
        });
    }

    /// Close sinks, close the engine and emit `SessionEnded`, at most once
    ///
    /// Returns false if another observer already performed the teardown.
    pub async fn terminate(&self, reason: EndReason) -> bool {
        if !self.latch.try_fire() {
            debug!(session_id = %self.session_id, %reason, "Teardown already done");
            return false;
        }

        info!(session_id = %self.session_id, %reason, "Session ending, finalizing media files");

        let mut teardown_error = None;

        if let Err(e) = self.sinks.close_all().await {
            error!(session_id = %self.session_id, "Failed to finalize media files: {}", e);
            teardown_error = Some(e.to_string());
        } else {
            info!(session_id = %self.session_id, "Done writing media files");
        }

        if let Some(engine) = self.engine.upgrade() {
            if let Err(e) = engine.close_engine().await {
                error!(session_id = %self.session_id, "{}", e);
                teardown_error.get_or_insert(e.to_string());
            }
        }

        let _ = self.ended_tx.send(SessionEnded {
            session_id: self.session_id.clone(),
            reason,
            teardown_error,
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::sink::tests::RecordingWriter;
    use crate::media::{DiskSink, MediaKind};
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingEngine {
        closes: AtomicU32,
    }

    #[async_trait]
    impl EngineHandle for CountingEngine {
        async fn close_engine(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sinks() -> (SinkPair, RecordingWriter, RecordingWriter) {
        let audio = RecordingWriter::default();
        let video = RecordingWriter::default();
        let pair = SinkPair {
            audio: Arc::new(DiskSink::new(MediaKind::Audio, "a".into(), Box::new(audio.clone()))),
            video: Arc::new(DiskSink::new(MediaKind::Video, "v".into(), Box::new(video.clone()))),
        };
        (pair, audio, video)
    }

    #[test]
    fn test_ice_reactions() {
        assert_eq!(ice_reaction(RTCIceConnectionState::Connected), Reaction::Log);
        assert_eq!(
            ice_reaction(RTCIceConnectionState::Failed),
            Reaction::Terminate(EndReason::IceFailed)
        );
        assert_eq!(
            ice_reaction(RTCIceConnectionState::Closed),
            Reaction::Terminate(EndReason::IceClosed)
        );
        assert_eq!(ice_reaction(RTCIceConnectionState::Checking), Reaction::Ignore);
        assert_eq!(ice_reaction(RTCIceConnectionState::Disconnected), Reaction::Ignore);
    }

    #[test]
    fn test_peer_reactions() {
        assert_eq!(
            peer_reaction(RTCPeerConnectionState::Failed),
            Reaction::Terminate(EndReason::PeerFailed)
        );
        assert_eq!(
            peer_reaction(RTCPeerConnectionState::Closed),
            Reaction::Terminate(EndReason::PeerClosed)
        );
        assert_eq!(peer_reaction(RTCPeerConnectionState::Connected), Reaction::Ignore);
        assert_eq!(peer_reaction(RTCPeerConnectionState::Disconnected), Reaction::Ignore);
    }

    #[test]
    fn test_latch_fires_once() {
        let latch = TerminalLatch::default();
        assert!(!latch.is_fired());
        assert!(latch.try_fire());
        assert!(!latch.try_fire());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn test_terminate_closes_everything_once() {
        let (pair, audio, video) = sinks();
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<dyn EngineHandle> = Arc::downgrade(&engine) as Weak<dyn EngineHandle>;
        let (monitor, mut ended_rx) = LifecycleMonitor::new("s1", pair, weak);

        assert!(monitor.terminate(EndReason::IceFailed).await);
        assert!(!monitor.terminate(EndReason::PeerClosed).await);

        assert_eq!(*audio.closes.lock().unwrap(), 1);
        assert_eq!(*video.closes.lock().unwrap(), 1);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);

        let ended = ended_rx.recv().await.unwrap();
        assert_eq!(ended.session_id, "s1");
        assert_eq!(ended.reason, EndReason::IceFailed);
        assert!(ended.teardown_error.is_none());
        assert!(ended_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observers_tear_down_once() {
        let (pair, audio, video) = sinks();
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<dyn EngineHandle> = Arc::downgrade(&engine) as Weak<dyn EngineHandle>;
        let (monitor, mut ended_rx) = LifecycleMonitor::new("s1", pair, weak);

        monitor.on_ice_state(RTCIceConnectionState::Failed);
        monitor.on_peer_state(RTCPeerConnectionState::Failed);
        monitor.on_peer_state(RTCPeerConnectionState::Closed);

        let ended = ended_rx.recv().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(monitor.is_terminated());
        assert!(ended_rx.try_recv().is_err());
        assert_eq!(*audio.closes.lock().unwrap(), 1);
        assert_eq!(*video.closes.lock().unwrap(), 1);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            ended.reason,
            EndReason::IceFailed | EndReason::PeerFailed | EndReason::PeerClosed
        ));
    }

    #[tokio::test]
    async fn test_connected_state_does_not_tear_down() {
        let (pair, audio, _video) = sinks();
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<dyn EngineHandle> = Arc::downgrade(&engine) as Weak<dyn EngineHandle>;
        let (monitor, mut ended_rx) = LifecycleMonitor::new("s1", pair, weak);

        assert_eq!(monitor.on_ice_state(RTCIceConnectionState::Connected), Reaction::Log);
        tokio::task::yield_now().await;

        assert!(!monitor.is_terminated());
        assert!(ended_rx.try_recv().is_err());
        assert_eq!(*audio.closes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disarmed_monitor_ignores_terminal_states() {
        let (pair, audio, _video) = sinks();
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<dyn EngineHandle> = Arc::downgrade(&engine) as Weak<dyn EngineHandle>;
        let (monitor, mut ended_rx) = LifecycleMonitor::new("s1", pair, weak);

        assert!(monitor.disarm());
        assert!(!monitor.terminate(EndReason::PeerClosed).await);
        assert!(ended_rx.try_recv().is_err());
        assert_eq!(*audio.closes.lock().unwrap(), 0);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_engine_still_ends_session() {
        let (pair, _audio, _video) = sinks();
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<dyn EngineHandle> = Arc::downgrade(&engine) as Weak<dyn EngineHandle>;
        drop(engine);
        let (monitor, mut ended_rx) = LifecycleMonitor::new("s1", pair, weak);

        assert!(monitor.terminate(EndReason::PeerClosed).await);
        assert_eq!(ended_rx.recv().await.unwrap().reason, EndReason::PeerClosed);
    }
}
