//! Match channel control.
//!
//! Owns the controller state machine (idle, joining, in match), dispatches
//! inbound match-data envelopes into the [`MatchState`] mirror, and submits
//! moves after local guards pass. A passing guard only means the send is
//! attempted; the next authoritative snapshot is the sole word on whether
//! the move was accepted, so nothing here ever writes to the board.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────┐  join / create   ┌─────────┐  first valid STATE  ┌─────────┐
//! │ Idle │─────────────────▶│ Joining │────────────────────▶│ InMatch │
//! └──────┘                  └────┬────┘                     └────┬────┘
//!     ▲                          │ join rejected                 │ leave
//!     └──────────────────────────┴───────────────────────────────┘
//! ```

use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use super::backend::{
    Backend, Socket, OPCODE_ERROR, OPCODE_MOVE, OPCODE_REMATCH, OPCODE_STATE,
};
use super::game::{MatchState, BOARD_CELLS};
use super::rpc::RPC_CREATE_MATCH;
use super::session::Session;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPhase {
    /// Not in a match.
    #[default]
    Idle,

    /// Join requested; also covers "joined, awaiting first snapshot".
    Joining,

    /// At least one authoritative snapshot applied.
    InMatch,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Joining => "joining",
            Self::InMatch => "in_match",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_joining(&self) -> bool {
        matches!(self, Self::Joining)
    }

    pub fn is_in_match(&self) -> bool {
        matches!(self, Self::InMatch)
    }
}

/// Error from joining or creating a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No realtime channel to join over.
    NotConnected,

    /// A join is in flight or a match is active; leave it first.
    AlreadyInMatch,

    /// The match id was empty or blank.
    EmptyMatchId,

    /// The backend rejected the join or create.
    Rejected { message: String },
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to server"),
            Self::AlreadyInMatch => write!(f, "already in a match"),
            Self::EmptyMatchId => write!(f, "match id is empty"),
            Self::Rejected { message } => write!(f, "failed to join match: {}", message),
        }
    }
}

impl std::error::Error for JoinError {}

/// Local guard failure on a move submission. Informational only: when a
/// guard trips, nothing is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    NotConnected,
    NotInMatch,
    MatchFinished,
    NotYourTurn,
    CellTaken { index: usize },
    OutOfRange { index: usize },

    /// Guards passed but the channel refused the send.
    SendFailed { message: String },
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to server"),
            Self::NotInMatch => write!(f, "not in a match"),
            Self::MatchFinished => write!(f, "the match is over"),
            Self::NotYourTurn => write!(f, "it's not your turn"),
            Self::CellTaken { .. } => write!(f, "that cell is already taken"),
            Self::OutOfRange { index } => write!(f, "cell {} is out of range", index),
            Self::SendFailed { message } => write!(f, "failed to send move: {}", message),
        }
    }
}

impl std::error::Error for MoveError {}

/// Error from a rematch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RematchError {
    NotConnected,
    NotInMatch,

    /// The match is still running.
    MatchNotFinished,

    SendFailed { message: String },
}

impl fmt::Display for RematchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to server"),
            Self::NotInMatch => write!(f, "not in a match"),
            Self::MatchNotFinished => write!(f, "the match is still running"),
            Self::SendFailed { message } => write!(f, "failed to request rematch: {}", message),
        }
    }
}

impl std::error::Error for RematchError {}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Owns the match mirror and the join/move/leave/rematch operations.
#[derive(Debug, Default)]
pub struct MatchChannelController {
    phase: MatchPhase,
    match_id: Option<String>,
    state: Option<MatchState>,
}

impl MatchChannelController {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    /// The latest authoritative snapshot. `None` until the first one
    /// arrives ("joined, awaiting state" renders from that gap).
    pub fn state(&self) -> Option<&MatchState> {
        self.state.as_ref()
    }

    pub fn is_in_match(&self) -> bool {
        self.phase.is_in_match()
    }

    // ── Join / create ───────────────────────────────────────────────

    /// Join a match by id. On success the match id is recorded and the
    /// controller waits in `Joining` for the first snapshot.
    pub async fn join_by_match_id(
        &mut self,
        socket: &mut dyn Socket,
        match_id: &str,
    ) -> Result<(), JoinError> {
        let match_id = match_id.trim();
        if match_id.is_empty() {
            return Err(JoinError::EmptyMatchId);
        }
        if !self.phase.is_idle() {
            return Err(JoinError::AlreadyInMatch);
        }

        self.phase = MatchPhase::Joining;
        self.match_id = None;
        self.state = None;

        match socket.join_match(match_id).await {
            Ok(joined_id) => {
                debug!("joined match {}", joined_id);
                self.match_id = Some(joined_id);
                Ok(())
            }
            Err(e) => {
                self.phase = MatchPhase::Idle;
                Err(JoinError::Rejected { message: e.message })
            }
        }
    }

    /// Create a fresh authoritative match via RPC, then join it.
    pub async fn create_and_join(
        &mut self,
        backend: &dyn Backend,
        session: &Session,
        socket: &mut dyn Socket,
    ) -> Result<(), JoinError> {
        if !self.phase.is_idle() {
            return Err(JoinError::AlreadyInMatch);
        }

        let payload = backend
            .rpc(session, RPC_CREATE_MATCH, serde_json::json!({}))
            .await
            .map_err(|e| JoinError::Rejected { message: e.message })?;
        let match_id = payload
            .get("matchId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JoinError::Rejected {
                message: "create RPC returned no match id".to_string(),
            })?
            .to_string();

        self.join_by_match_id(socket, &match_id).await
    }

    // ── Inbound dispatch ────────────────────────────────────────────

    /// Dispatch a match-data envelope.
    ///
    /// Returns a server-pushed error message when the envelope was an ERROR
    /// notice; the caller surfaces it. STATE envelopes feed the mirror;
    /// malformed ones are logged and dropped, keeping the previous mirror.
    /// Unknown op codes are ignored.
    pub fn on_match_data(&mut self, match_id: &str, op_code: i64, data: &[u8]) -> Option<String> {
        match op_code {
            OPCODE_STATE => {
                if self.phase.is_idle() {
                    // Not in (or joining) any match; a straggler snapshot
                    // after a leave must not pull us back in.
                    debug!("ignoring state snapshot for {} while idle", match_id);
                    return None;
                }
                match MatchState::decode(data) {
                    Ok(snapshot) => self.apply_snapshot(match_id, snapshot),
                    Err(e) => warn!("dropping malformed state snapshot: {}", e),
                }
                None
            }
            OPCODE_ERROR => Some(decode_error_message(data)),
            other => {
                debug!("ignoring match data with op code {}", other);
                None
            }
        }
    }

    fn apply_snapshot(&mut self, match_id: &str, snapshot: MatchState) {
        match self.match_id.as_deref() {
            Some(current) if current == match_id => {
                // When both snapshots carry a version, drop stale ones.
                // Without one the transport's ordering is all we have and
                // last-received wins.
                let last_seq = self.state.as_ref().and_then(|s| s.seq);
                if let (Some(last), Some(new)) = (last_seq, snapshot.seq) {
                    if new <= last {
                        debug!("dropping stale snapshot (seq {} <= {})", new, last);
                        return;
                    }
                }
            }
            Some(current) => {
                // A snapshot for a different match id on the same channel:
                // the rematch path. The old mirror is invalid wholesale.
                debug!("rebinding from match {} to {}", current, match_id);
                self.match_id = Some(match_id.to_string());
            }
            None => {
                self.match_id = Some(match_id.to_string());
            }
        }

        self.state = Some(snapshot);
        if !self.phase.is_in_match() {
            debug!("first snapshot applied, now in match {}", match_id);
            self.phase = MatchPhase::InMatch;
        }
    }

    // ── Outbound operations ─────────────────────────────────────────

    /// Submit a move for `user_id` at `index`.
    ///
    /// All guards are local and advisory: in a match, match not over, our
    /// turn (or turns not enforced yet), cell in range and empty. A guard
    /// failure sends nothing. A pass sends MOVE and changes no local state;
    /// the next snapshot decides what actually happened.
    pub async fn submit_move(
        &mut self,
        socket: &mut dyn Socket,
        user_id: &str,
        index: usize,
    ) -> Result<(), MoveError> {
        if !self.phase.is_in_match() {
            return Err(MoveError::NotInMatch);
        }
        let (match_id, state) = match (&self.match_id, &self.state) {
            (Some(match_id), Some(state)) => (match_id, state),
            _ => return Err(MoveError::NotInMatch),
        };
        if state.is_finished {
            return Err(MoveError::MatchFinished);
        }
        if index >= BOARD_CELLS {
            return Err(MoveError::OutOfRange { index });
        }
        if !state.board[index].is_empty() {
            return Err(MoveError::CellTaken { index });
        }
        if !state.may_move(user_id) {
            return Err(MoveError::NotYourTurn);
        }

        let payload = serde_json::json!({ "index": index }).to_string().into_bytes();
        socket
            .send_match_data(match_id, OPCODE_MOVE, payload)
            .await
            .map_err(|e| MoveError::SendFailed { message: e.message })
    }

    /// Leave the current match.
    ///
    /// Best-effort on the wire; match id and mirror are always cleared and
    /// the controller returns to `Idle`, whatever the send's fate.
    pub async fn leave_match(&mut self, socket: Option<&mut dyn Socket>) {
        self.phase = MatchPhase::Idle;
        self.state = None;
        let Some(match_id) = self.match_id.take() else {
            return;
        };
        if let Some(socket) = socket {
            if let Err(e) = socket.leave_match(&match_id).await {
                debug!("leave for match {} failed: {}", match_id, e);
            }
        }
    }

    /// Ask the server for a rematch.
    ///
    /// Only valid on a finished match. Changes no local state; the server
    /// answers with a fresh snapshot, possibly under a new match id.
    pub async fn request_rematch(&mut self, socket: &mut dyn Socket) -> Result<(), RematchError> {
        if !self.phase.is_in_match() {
            return Err(RematchError::NotInMatch);
        }
        let (match_id, state) = match (&self.match_id, &self.state) {
            (Some(match_id), Some(state)) => (match_id, state),
            _ => return Err(RematchError::NotInMatch),
        };
        if !state.is_finished {
            return Err(RematchError::MatchNotFinished);
        }

        let payload = serde_json::json!({}).to_string().into_bytes();
        socket
            .send_match_data(match_id, OPCODE_REMATCH, payload)
            .await
            .map_err(|e| RematchError::SendFailed { message: e.message })
    }
}

fn decode_error_message(data: &[u8]) -> String {
    match serde_json::from_slice::<ErrorPayload>(data) {
        Ok(payload) if !payload.message.is_empty() => payload.message,
        _ => "Server error.".to_string(),
    }
}
