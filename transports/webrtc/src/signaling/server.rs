//! HTTP front end: demo page on `/`, offer/answer WebSocket on `/ws`
//!
//! Only one session records at a time. A second `/ws` upgrade while a
//! session is live is refused with 409 so two peers never write to the same
//! output files.

use crate::config::RecorderConfig;
use crate::peer::lifecycle::SessionEnded;
use crate::session::Session;
use crate::{Error, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

const DEMO_PAGE: &str = include_str!("../../static/demo.html");

/// Shared state for the signaling server
pub struct ServerState {
    config: RecorderConfig,

    /// Set while a session is negotiating or recording
    active: AtomicBool,

    /// Receives one SessionEnded per finished session
    ended_tx: mpsc::UnboundedSender<SessionEnded>,

    /// Local shutdown requests for the live session
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerState {
    /// Create server state and the stream of ended sessions
    pub fn new(config: RecorderConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEnded>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(Self {
            config,
            active: AtomicBool::new(false),
            ended_tx,
            shutdown_tx,
        });
        (state, ended_rx)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Whether a session currently holds the recorder
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask the live session, if any, to finalize its files and close
    ///
    /// Returns true if a session was listening.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown_tx.send(()).map(|n| n > 0).unwrap_or(false)
    }

    fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Build the axum router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(demo_page))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Serve HTTP and WebSocket signaling on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Signaling server listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Setup(format!("Signaling server error: {}", e)))
}

/// GET / - browser page that captures camera and microphone
async fn demo_page() -> Html<&'static str> {
    Html(DEMO_PAGE)
}

/// GET /ws - upgrade and hand the socket to a new session
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    if !state.try_acquire() {
        warn!("Rejecting signaling connection: a session is already active");
        return (StatusCode::CONFLICT, "A recording session is already active").into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    let mut session = match Session::negotiate(&state.config, &mut socket).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Signaling connection closed without a session: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            state.release();
            return;
        }
    };

    // The answer is the last signaling message
    let _ = socket.send(Message::Close(None)).await;
    drop(socket);

    let shutdown_requested = tokio::select! {
        ended = session.ended() => {
            forward(&state, ended);
            false
        }
        _ = shutdown_rx.recv() => true,
    };

    if shutdown_requested {
        info!(session_id = %session.id(), "Shutdown requested");
        session.shutdown().await;
        let ended = session.ended().await;
        forward(&state, ended);
    }

    state.release();
}

fn forward(state: &ServerState, ended: Option<SessionEnded>) {
    match ended {
        Some(ended) => {
            let _ = state.ended_tx.send(ended);
        }
        None => warn!("Session monitor dropped without reporting an end"),
    }
}
