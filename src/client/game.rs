//! Authoritative match state mirror.
//!
//! The server owns the game. The client only holds the latest snapshot it
//! has been sent: snapshots are validated strictly on decode and replace the
//! mirror wholesale. Nothing in this module mutates a board cell locally;
//! win and draw detection live on the server, the mirror just reflects them.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// Match modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    /// Untimed turns.
    #[default]
    Classic,
    /// Each turn carries a server-assigned deadline.
    Timed,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Timed => "timed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "classic" => Some(Self::Classic),
            "timed" => Some(Self::Timed),
            _ => None,
        }
    }
}

/// A player's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X => "X",
            Self::O => "O",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "X" => Some(Self::X),
            "O" => Some(Self::O),
            _ => None,
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    /// No mark yet. Serialized as the empty string on the wire.
    #[default]
    Empty,
    X,
    O,
}

impl Cell {
    /// Check if the cell has no mark.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::X => "X",
            Self::O => "O",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "" => Some(Self::Empty),
            "X" => Some(Self::X),
            "O" => Some(Self::O),
            _ => None,
        }
    }
}

/// A player in the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub user_id: String,
    pub username: String,
    pub mark: Mark,
}

/// Why a terminal match ended, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Draw,
    OpponentLeft,
    Timeout,
    /// A reason this client version does not know. Kept verbatim so newer
    /// servers do not get their snapshots rejected.
    Other(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draw => "DRAW",
            Self::OpponentLeft => "OPPONENT_LEFT",
            Self::Timeout => "TIMEOUT",
            Self::Other(reason) => reason,
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "DRAW" => Self::Draw,
            "OPPONENT_LEFT" => Self::OpponentLeft,
            "TIMEOUT" => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Outcome of a terminal match from one player's perspective, resolved in
/// priority order: draw, forfeit win, timeout win/loss, plain win/loss,
/// then a generic end when the server named neither winner nor reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Draw,
    /// The opponent abandoned the match; the remaining player takes the win.
    WonByForfeit,
    /// The opponent's turn clock elapsed.
    WonOnTime,
    Won,
    /// The local player's turn clock elapsed.
    LostOnTime,
    Lost,
    /// Terminal, but the server reported no winner and no reason.
    Ended,
}

impl MatchOutcome {
    /// Check if this outcome is a win for the local player.
    pub fn is_win(&self) -> bool {
        matches!(self, Self::WonByForfeit | Self::WonOnTime | Self::Won)
    }

    /// Check if this outcome is a loss for the local player.
    pub fn is_loss(&self) -> bool {
        matches!(self, Self::LostOnTime | Self::Lost)
    }
}

/// Error describing why an inbound snapshot was rejected.
///
/// Rejected snapshots are dropped; the previous mirror is always retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload was not UTF-8 JSON of the expected shape.
    Json(String),
    WrongBoardLength(usize),
    BadCell(String),
    BadMark(String),
    TooManyPlayers(usize),
    BadMode(String),
    BadDeadline(i64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(message) => write!(f, "malformed snapshot: {}", message),
            Self::WrongBoardLength(len) => {
                write!(f, "board has {} cells, expected {}", len, BOARD_CELLS)
            }
            Self::BadCell(value) => write!(f, "illegal cell value {:?}", value),
            Self::BadMark(value) => write!(f, "illegal player mark {:?}", value),
            Self::TooManyPlayers(count) => write!(f, "{} players, expected at most 2", count),
            Self::BadMode(value) => write!(f, "unknown match mode {:?}", value),
            Self::BadDeadline(ms) => write!(f, "turn deadline {} is not a valid timestamp", ms),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Raw wire form of a snapshot, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    board: Vec<String>,
    players: Vec<RawPlayer>,
    #[serde(default)]
    next_turn_user_id: Option<String>,
    #[serde(default)]
    winner_user_id: Option<String>,
    is_draw: bool,
    is_finished: bool,
    #[serde(default)]
    end_reason: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    /// Absolute deadline for the current turn, epoch milliseconds.
    #[serde(default)]
    turn_deadline: Option<i64>,
    #[serde(default)]
    seq: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayer {
    user_id: String,
    username: String,
    mark: String,
}

/// The latest authoritative snapshot known for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    /// Board cells in row-major order.
    pub board: [Cell; BOARD_CELLS],

    /// The (at most two) players the server has seated.
    pub players: Vec<PlayerInfo>,

    /// Whose turn is next. Unset while the server is not enforcing turns
    /// yet (e.g. waiting for the second player).
    pub next_turn_user_id: Option<String>,

    pub winner_user_id: Option<String>,

    pub is_draw: bool,

    pub is_finished: bool,

    pub end_reason: Option<EndReason>,

    pub mode: GameMode,

    /// Absolute deadline for the current turn, timed mode only. Always the
    /// server's timestamp; the client never computes a deadline from a
    /// relative duration.
    pub turn_deadline: Option<DateTime<Utc>>,

    /// Optional monotonic snapshot version. When present on consecutive
    /// snapshots, stale ones are dropped; when absent, last-received wins.
    pub seq: Option<u64>,
}

impl MatchState {
    /// Decode and validate a STATE payload.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let text =
            std::str::from_utf8(data).map_err(|e| DecodeError::Json(e.to_string()))?;
        let raw: RawSnapshot =
            serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

        if raw.board.len() != BOARD_CELLS {
            return Err(DecodeError::WrongBoardLength(raw.board.len()));
        }
        let mut board = [Cell::Empty; BOARD_CELLS];
        for (slot, value) in board.iter_mut().zip(&raw.board) {
            *slot = Cell::parse(value).ok_or_else(|| DecodeError::BadCell(value.clone()))?;
        }

        if raw.players.len() > 2 {
            return Err(DecodeError::TooManyPlayers(raw.players.len()));
        }
        let mut players = Vec::with_capacity(raw.players.len());
        for p in raw.players {
            let mark = Mark::parse(&p.mark).ok_or(DecodeError::BadMark(p.mark))?;
            players.push(PlayerInfo {
                user_id: p.user_id,
                username: p.username,
                mark,
            });
        }

        let mode = match raw.mode.as_deref() {
            None => GameMode::Classic,
            Some(value) => {
                GameMode::parse(value).ok_or_else(|| DecodeError::BadMode(value.to_string()))?
            }
        };

        let turn_deadline = match raw.turn_deadline {
            None => None,
            Some(ms) => Some(
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .ok_or(DecodeError::BadDeadline(ms))?,
            ),
        };

        Ok(Self {
            board,
            players,
            next_turn_user_id: raw.next_turn_user_id,
            winner_user_id: raw.winner_user_id,
            is_draw: raw.is_draw,
            is_finished: raw.is_finished,
            end_reason: raw.end_reason.as_deref().map(EndReason::parse),
            mode,
            turn_deadline,
            seq: raw.seq,
        })
    }

    /// Get the cell at an index, if in range.
    pub fn cell(&self, index: usize) -> Option<Cell> {
        self.board.get(index).copied()
    }

    /// Find the seat for a user.
    pub fn player(&self, user_id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    /// Find the seat that is not this user's.
    pub fn opponent_of(&self, user_id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.user_id != user_id)
    }

    /// Check if the server currently expects a move from this user.
    ///
    /// While `next_turn_user_id` is unset the server is not enforcing turns
    /// yet, and any seated player may attempt a move.
    pub fn may_move(&self, user_id: &str) -> bool {
        match &self.next_turn_user_id {
            Some(next) => next == user_id,
            None => true,
        }
    }

    /// Seconds left on the current turn at `now`, clamped at zero.
    ///
    /// `None` when the match carries no deadline or is already terminal.
    /// Purely a presentation derivative; guard logic never consults it.
    pub fn turn_seconds_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_finished {
            return None;
        }
        let deadline = self.turn_deadline?;
        Some((deadline - now).num_seconds().max(0))
    }

    /// Resolve the terminal outcome from this user's perspective.
    ///
    /// `None` while the match is still running.
    pub fn outcome_for(&self, user_id: &str) -> Option<MatchOutcome> {
        if !self.is_finished {
            return None;
        }
        if self.is_draw || self.end_reason == Some(EndReason::Draw) {
            return Some(MatchOutcome::Draw);
        }
        let winner = match &self.winner_user_id {
            Some(winner) => winner,
            None => return Some(MatchOutcome::Ended),
        };
        if winner == user_id {
            match self.end_reason {
                Some(EndReason::OpponentLeft) => Some(MatchOutcome::WonByForfeit),
                Some(EndReason::Timeout) => Some(MatchOutcome::WonOnTime),
                _ => Some(MatchOutcome::Won),
            }
        } else {
            match self.end_reason {
                Some(EndReason::Timeout) => Some(MatchOutcome::LostOnTime),
                _ => Some(MatchOutcome::Lost),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn snapshot_json() -> serde_json::Value {
        serde_json::json!({
            "board": ["", "", "", "", "X", "", "", "", ""],
            "players": [
                {"userId": "user-a", "username": "Alice", "mark": "X"},
                {"userId": "user-b", "username": "Bob", "mark": "O"}
            ],
            "nextTurnUserId": "user-b",
            "winnerUserId": null,
            "isDraw": false,
            "isFinished": false
        })
    }

    fn decode(value: serde_json::Value) -> Result<MatchState, DecodeError> {
        MatchState::decode(value.to_string().as_bytes())
    }

    #[test]
    fn test_decode_valid_snapshot() {
        let state = decode(snapshot_json()).unwrap();

        assert_eq!(state.cell(4), Some(Cell::X));
        assert_eq!(state.cell(0), Some(Cell::Empty));
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.players[0].mark, Mark::X);
        assert_eq!(state.next_turn_user_id.as_deref(), Some("user-b"));
        assert_eq!(state.mode, GameMode::Classic);
        assert!(!state.is_finished);
        assert!(state.turn_deadline.is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_board_length() {
        let mut value = snapshot_json();
        value["board"] = serde_json::json!(["", "", ""]);
        assert_eq!(decode(value), Err(DecodeError::WrongBoardLength(3)));
    }

    #[test]
    fn test_decode_rejects_illegal_cell() {
        let mut value = snapshot_json();
        value["board"][2] = serde_json::json!("Z");
        assert_eq!(decode(value), Err(DecodeError::BadCell("Z".to_string())));
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let mut value = snapshot_json();
        value.as_object_mut().unwrap().remove("isFinished");
        assert!(matches!(decode(value), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_too_many_players() {
        let mut value = snapshot_json();
        value["players"] = serde_json::json!([
            {"userId": "a", "username": "A", "mark": "X"},
            {"userId": "b", "username": "B", "mark": "O"},
            {"userId": "c", "username": "C", "mark": "X"}
        ]);
        assert_eq!(decode(value), Err(DecodeError::TooManyPlayers(3)));
    }

    #[test]
    fn test_decode_rejects_bad_mark_and_mode() {
        let mut value = snapshot_json();
        value["players"][0]["mark"] = serde_json::json!("Q");
        assert_eq!(decode(value), Err(DecodeError::BadMark("Q".to_string())));

        let mut value = snapshot_json();
        value["mode"] = serde_json::json!("blitz");
        assert_eq!(decode(value), Err(DecodeError::BadMode("blitz".to_string())));
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(matches!(
            MatchState::decode(b"not json"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_timed_mode_deadline() {
        let mut value = snapshot_json();
        value["mode"] = serde_json::json!("timed");
        value["turnDeadline"] = serde_json::json!(1_700_000_000_000_i64);

        let state = decode(value).unwrap();
        assert_eq!(state.mode, GameMode::Timed);
        let deadline = state.turn_deadline.unwrap();
        assert_eq!(deadline.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_turn_seconds_remaining_clamps_at_zero() {
        let mut value = snapshot_json();
        value["mode"] = serde_json::json!("timed");
        value["turnDeadline"] = serde_json::json!(1_700_000_000_000_i64);
        let state = decode(value).unwrap();
        let deadline = state.turn_deadline.unwrap();

        assert_eq!(
            state.turn_seconds_remaining(deadline - Duration::seconds(30)),
            Some(30)
        );
        assert_eq!(state.turn_seconds_remaining(deadline), Some(0));
        assert_eq!(
            state.turn_seconds_remaining(deadline + Duration::seconds(5)),
            Some(0)
        );
    }

    #[test]
    fn test_turn_seconds_remaining_non_increasing() {
        let mut value = snapshot_json();
        value["turnDeadline"] = serde_json::json!(1_700_000_000_000_i64);
        let state = decode(value).unwrap();
        let deadline = state.turn_deadline.unwrap();

        let mut previous = i64::MAX;
        for tick in 0..10 {
            let now = deadline - Duration::seconds(5) + Duration::seconds(tick);
            let remaining = state.turn_seconds_remaining(now).unwrap();
            assert!(remaining <= previous);
            assert!(remaining >= 0);
            previous = remaining;
        }
    }

    #[test]
    fn test_no_countdown_on_finished_match() {
        let mut value = snapshot_json();
        value["turnDeadline"] = serde_json::json!(1_700_000_000_000_i64);
        value["isFinished"] = serde_json::json!(true);
        let state = decode(value).unwrap();

        assert_eq!(state.turn_seconds_remaining(Utc::now()), None);
    }

    #[test]
    fn test_outcome_none_while_running() {
        let state = decode(snapshot_json()).unwrap();
        assert_eq!(state.outcome_for("user-a"), None);
    }

    #[test]
    fn test_outcome_draw_beats_winner_field() {
        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        value["isDraw"] = serde_json::json!(true);
        value["winnerUserId"] = serde_json::json!("user-a");
        let state = decode(value).unwrap();

        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::Draw));
        assert_eq!(state.outcome_for("user-b"), Some(MatchOutcome::Draw));
    }

    #[test]
    fn test_outcome_forfeit_win_is_distinct() {
        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        value["winnerUserId"] = serde_json::json!("user-a");
        value["endReason"] = serde_json::json!("OPPONENT_LEFT");
        let state = decode(value).unwrap();

        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::WonByForfeit));
        assert_ne!(state.outcome_for("user-a"), Some(MatchOutcome::Won));
        assert_eq!(state.outcome_for("user-b"), Some(MatchOutcome::Lost));
    }

    #[test]
    fn test_outcome_timeout_sides() {
        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        value["winnerUserId"] = serde_json::json!("user-b");
        value["endReason"] = serde_json::json!("TIMEOUT");
        let state = decode(value).unwrap();

        assert_eq!(state.outcome_for("user-b"), Some(MatchOutcome::WonOnTime));
        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::LostOnTime));
    }

    #[test]
    fn test_outcome_plain_win_loss_and_fallback() {
        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        value["winnerUserId"] = serde_json::json!("user-a");
        let state = decode(value).unwrap();
        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::Won));
        assert_eq!(state.outcome_for("user-b"), Some(MatchOutcome::Lost));

        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        let state = decode(value).unwrap();
        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::Ended));
    }

    #[test]
    fn test_unknown_end_reason_is_kept() {
        let mut value = snapshot_json();
        value["isFinished"] = serde_json::json!(true);
        value["winnerUserId"] = serde_json::json!("user-a");
        value["endReason"] = serde_json::json!("SERVER_SHUTDOWN");
        let state = decode(value).unwrap();

        assert_eq!(
            state.end_reason,
            Some(EndReason::Other("SERVER_SHUTDOWN".to_string()))
        );
        // Unknown reasons fall back to a plain result.
        assert_eq!(state.outcome_for("user-a"), Some(MatchOutcome::Won));
    }

    #[test]
    fn test_may_move_unenforced_turn() {
        let mut value = snapshot_json();
        value["nextTurnUserId"] = serde_json::json!(null);
        let state = decode(value).unwrap();

        assert!(state.may_move("user-a"));
        assert!(state.may_move("user-b"));
    }

    #[test]
    fn test_player_lookup() {
        let state = decode(snapshot_json()).unwrap();

        assert_eq!(state.player("user-a").unwrap().username, "Alice");
        assert_eq!(state.opponent_of("user-a").unwrap().username, "Bob");
        assert!(state.player("user-c").is_none());
    }
}
