//! Client core for realtime tic-tac-toe.
//!
//! Three components, each its own state machine:
//!
//! - `session` - identity, session credential, realtime channel lifecycle
//! - `matchmaking` - single-ticket search lifecycle
//! - `match_channel` - match join, authoritative state mirror, moves
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Client                                   │
//! │                                                                       │
//! │  ┌────────────────┐   ┌──────────────────────┐  ┌─────────────────┐  │
//! │  │ SessionManager │   │ MatchmakingCoordinator│  │ MatchChannel-   │  │
//! │  │                │   │                      │  │ Controller      │  │
//! │  │ identity       │   │ one live ticket      │  │ phase           │  │
//! │  │ session        │   │                      │  │ match id        │  │
//! │  │ channel (owner)│──▶│ lends socket ────────┼─▶│ state mirror    │  │
//! │  └────────────────┘   └──────────┬───────────┘  └────────▲────────┘  │
//! │                                  │ match found            │           │
//! │                                  └──────── hand-off ──────┘           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session manager must be connected before the other two may act. When
//! the coordinator sees its ticket matched it hands the match id to the
//! controller exactly once and retires; the controller owns the match until
//! the user leaves or it concludes.
//!
//! Inbound [`SocketEvent`]s are fed to [`Client::handle_event`] one at a
//! time by the embedder; they interleave with pending calls but never run
//! concurrently with each other.

pub mod backend;
pub mod game;
pub mod match_channel;
pub mod matchmaking;
pub mod rpc;
pub mod session;
pub mod storage;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

pub use backend::{
    Backend, BackendError, MatchmakerRequest, Socket, SocketEvent, OPCODE_ERROR, OPCODE_MOVE,
    OPCODE_REMATCH, OPCODE_STATE,
};
pub use game::{
    Cell, DecodeError, EndReason, GameMode, Mark, MatchOutcome, MatchState, PlayerInfo,
    BOARD_CELLS,
};
pub use match_channel::{
    JoinError, MatchChannelController, MatchPhase, MoveError, RematchError,
};
pub use matchmaking::{MatchmakingCoordinator, SearchError, SearchTicket};
pub use rpc::{
    fetch_display_name, fetch_leaderboard, fetch_stats, LeaderboardEntry, LeaderboardPage,
    PlayerStats,
};
pub use session::{ChannelStatus, ConnectError, Session, SessionManager};
pub use storage::{MemoryStore, Storage};

/// Which component surfaced a [`TransientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    Session,
    Matchmaking,
    MatchChannel,
}

impl ErrorOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Matchmaking => "matchmaking",
            Self::MatchChannel => "match_channel",
        }
    }
}

/// A dismissible, user-visible notice.
///
/// Not persisted; the latest notice replaces the previous one and the
/// boundary clears it by explicit acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientError {
    pub origin: ErrorOrigin,
    pub message: String,
}

impl TransientError {
    fn new(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.origin.as_str(), self.message)
    }
}

/// Combined client state: the three components plus event routing.
pub struct Client {
    backend: Arc<dyn Backend>,
    session: SessionManager,
    matchmaking: MatchmakingCoordinator,
    match_channel: MatchChannelController,
    error: Option<TransientError>,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>, storage: Box<dyn Storage>) -> Self {
        Self {
            session: SessionManager::new(Arc::clone(&backend), storage),
            backend,
            matchmaking: MatchmakingCoordinator::new(),
            match_channel: MatchChannelController::new(),
            error: None,
        }
    }

    // ── Session operations ──────────────────────────────────────────

    /// Connect with a display name. See [`SessionManager::connect`].
    pub async fn connect(&mut self, display_name: &str) -> Result<(), ConnectError> {
        self.session.connect(display_name).await
    }

    /// Connect with the persisted nickname, if any.
    pub async fn auto_connect(&mut self) -> Result<bool, ConnectError> {
        self.session.auto_connect().await
    }

    /// Log out: tear down search and match state locally, close the
    /// channel, clear the session. The socket close covers the server side
    /// of any open ticket or match.
    pub async fn logout(&mut self) {
        self.matchmaking.cancel_search(None).await;
        self.match_channel.leave_match(None).await;
        self.session.logout().await;
        self.error = None;
    }

    // ── Matchmaking operations ──────────────────────────────────────

    /// Start a two-player search. Requires a connected session.
    pub async fn start_search(&mut self, mode: GameMode) -> Result<(), SearchError> {
        if !self.session.status().is_connected() {
            return Err(SearchError::NotConnected);
        }
        let socket = self.session.socket_mut().ok_or(SearchError::NotConnected)?;
        self.matchmaking.start_search(socket, mode).await
    }

    /// Cancel the live search, best-effort.
    pub async fn cancel_search(&mut self) {
        let socket = self.session.socket_mut();
        self.matchmaking.cancel_search(socket).await;
    }

    // ── Match operations ────────────────────────────────────────────

    /// Create a fresh match and join it.
    pub async fn create_match(&mut self) -> Result<(), JoinError> {
        let (session, socket) = self
            .session
            .session_and_socket_mut()
            .ok_or(JoinError::NotConnected)?;
        self.match_channel
            .create_and_join(self.backend.as_ref(), session, socket)
            .await?;
        self.remember_joined();
        Ok(())
    }

    /// Join a match by id.
    pub async fn join_match(&mut self, match_id: &str) -> Result<(), JoinError> {
        let socket = self.session.socket_mut().ok_or(JoinError::NotConnected)?;
        self.match_channel.join_by_match_id(socket, match_id).await?;
        self.remember_joined();
        Ok(())
    }

    /// Submit a move for the local player.
    pub async fn submit_move(&mut self, index: usize) -> Result<(), MoveError> {
        let user_id = self
            .session
            .user_id()
            .map(str::to_owned)
            .ok_or(MoveError::NotConnected)?;
        let socket = self.session.socket_mut().ok_or(MoveError::NotConnected)?;
        self.match_channel.submit_move(socket, &user_id, index).await
    }

    /// Leave the current match, best-effort, and drop the resume hint.
    pub async fn leave_match(&mut self) {
        let socket = self.session.socket_mut();
        self.match_channel.leave_match(socket).await;
        self.session.forget_match();
    }

    /// Request a rematch on a finished match.
    pub async fn request_rematch(&mut self) -> Result<(), RematchError> {
        let socket = self.session.socket_mut().ok_or(RematchError::NotConnected)?;
        self.match_channel.request_rematch(socket).await
    }

    // ── Inbound events ──────────────────────────────────────────────

    /// Route one inbound socket event.
    ///
    /// Matchmaker resolutions hand the match id to the controller and join
    /// it; a hand-off failure is surfaced as a notice without re-entering
    /// the search. Match data feeds the controller. Transport drops park
    /// the channel in `Reconnecting`.
    pub async fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::MatchmakerMatched { ticket, match_id } => {
                let Some(match_id) = self.matchmaking.on_matchmaker_matched(&ticket, &match_id)
                else {
                    return;
                };
                let result = match self.session.socket_mut() {
                    Some(socket) => {
                        self.match_channel.join_by_match_id(socket, &match_id).await
                    }
                    None => Err(JoinError::NotConnected),
                };
                match result {
                    Ok(()) => self.remember_joined(),
                    Err(e) => {
                        warn!("failed to join matched game {}: {}", match_id, e);
                        self.error = Some(TransientError::new(
                            ErrorOrigin::Matchmaking,
                            format!("failed to join matched game: {}", e),
                        ));
                    }
                }
            }
            SocketEvent::MatchData {
                match_id,
                op_code,
                data,
            } => {
                if let Some(message) = self.match_channel.on_match_data(&match_id, op_code, &data)
                {
                    self.error = Some(TransientError::new(ErrorOrigin::MatchChannel, message));
                }
            }
            SocketEvent::Disconnected { reason } => {
                if self.session.on_transport_drop(reason.as_deref()) {
                    self.error = Some(TransientError::new(
                        ErrorOrigin::Session,
                        reason.unwrap_or_else(|| "connection lost".to_string()),
                    ));
                }
            }
        }
    }

    fn remember_joined(&mut self) {
        if let Some(id) = self.match_channel.match_id().map(str::to_owned) {
            self.session.remember_match(&id);
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn status(&self) -> ChannelStatus {
        self.session.status()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.session()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.user_id()
    }

    pub fn is_searching(&self) -> bool {
        self.matchmaking.is_searching()
    }

    pub fn match_phase(&self) -> MatchPhase {
        self.match_channel.phase()
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_channel.match_id()
    }

    /// The latest authoritative snapshot, if any.
    pub fn match_state(&self) -> Option<&MatchState> {
        self.match_channel.state()
    }

    /// Terminal outcome from the local player's perspective.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        let user_id = self.session.user_id()?;
        self.match_channel.state()?.outcome_for(user_id)
    }

    /// Last known match id persisted across restarts. A hint only; pass it
    /// to [`join_match`](Self::join_match) to find out if it still holds.
    pub fn last_match_hint(&self) -> Option<String> {
        self.session.last_match_hint()
    }

    /// The current dismissible notice, if any.
    pub fn last_error(&self) -> Option<&TransientError> {
        self.error.as_ref()
    }

    /// Acknowledge and clear the current notice.
    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.session.status())
            .field("searching", &self.matchmaking.is_searching())
            .field("match_phase", &self.match_channel.phase())
            .finish()
    }
}
