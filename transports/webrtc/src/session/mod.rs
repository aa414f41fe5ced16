//! Negotiation session
//!
//! A session is created when an offer channel is handed over and lives until
//! the lifecycle monitor reports a terminal connection state. It exchanges
//! exactly two signaling messages: one offer in, one complete answer out.
//! Candidates are never trickled and renegotiation is not supported.

use crate::config::{OutputLayout, RecorderConfig};
use crate::media::{SinkPair, TrackRouter};
use crate::peer::lifecycle::{EndReason, EngineHandle, LifecycleMonitor, SessionEnded};
use crate::peer::RecorderPeer;
use crate::signaling::{SessionDescriptionMessage, SignalingChannel};
use crate::Result;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// One negotiated recording session
pub struct Session {
    id: String,
    layout: OutputLayout,
    peer: RecorderPeer,
    sinks: SinkPair,
    monitor: Arc<LifecycleMonitor>,
    ended_rx: mpsc::UnboundedReceiver<SessionEnded>,
}

impl Session {
    /// Run the offer/answer exchange over `channel`
    ///
    /// Sinks are opened and the track and lifecycle handlers are registered
    /// before the offer is read, so no track or state event can be missed.
    ///
    /// # Errors
    ///
    /// - `Setup` if the engine or sinks cannot be created
    /// - `Channel` if the offer cannot be read or the answer cannot be sent
    /// - `MalformedOffer` if the payload is not an offer description
    /// - `Negotiation` if the engine rejects the offer
    ///
    /// On any error no answer is sent and the session's resources are released.
    #[instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn negotiate<C>(config: &RecorderConfig, channel: &mut C) -> Result<Session>
    where
        C: SignalingChannel + ?Sized,
    {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("session_id", id.as_str());

        let peer = RecorderPeer::new(id.clone(), config).await?;

        let layout = config.output.layout(&id);
        let sinks = match SinkPair::open(&layout) {
            Ok(sinks) => sinks,
            Err(e) => {
                let _ = peer.close().await;
                return Err(e);
            }
        };

        peer.on_track(TrackRouter::new(id.clone(), sinks.clone()));

        let engine: Weak<dyn EngineHandle> =
            Arc::downgrade(peer.peer_connection()) as Weak<dyn EngineHandle>;
        let (monitor, ended_rx) = LifecycleMonitor::new(id.clone(), sinks.clone(), engine);
        monitor.register(peer.peer_connection());

        if let Err(e) = Self::exchange(&peer, channel).await {
            error!(session_id = %id, "Negotiation aborted: {}", e);
            // Take the latch so the close below does not emit SessionEnded
            monitor.disarm();
            if let Err(close_err) = sinks.close_all().await {
                warn!(session_id = %id, "Failed to close sinks after abort: {}", close_err);
            }
            let _ = peer.close().await;
            return Err(e);
        }

        info!(session_id = %id, "Answer sent, waiting for media");

        Ok(Session {
            id,
            layout,
            peer,
            sinks,
            monitor,
            ended_rx,
        })
    }

    async fn exchange<C>(peer: &RecorderPeer, channel: &mut C) -> Result<()>
    where
        C: SignalingChannel + ?Sized,
    {
        let text = channel.recv_text().await?;
        let offer = SessionDescriptionMessage::parse_offer(&text)?;
        info!(session_id = %peer.session_id(), "Received offer");

        let answer = peer.answer(offer.sdp).await?;

        let reply = SessionDescriptionMessage::answer(answer.sdp).to_json()?;
        channel.send_text(reply).await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Artifact paths for this session
    pub fn output(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn sinks(&self) -> &SinkPair {
        &self.sinks
    }

    pub fn peer(&self) -> &RecorderPeer {
        &self.peer
    }

    /// Wait for the connection to reach a terminal state
    pub async fn ended(&mut self) -> Option<SessionEnded> {
        self.ended_rx.recv().await
    }

    /// Finalize files and close the connection on local request
    ///
    /// Returns false if the session had already ended.
    pub async fn shutdown(&self) -> bool {
        self.monitor.terminate(EndReason::Shutdown).await
    }
}
