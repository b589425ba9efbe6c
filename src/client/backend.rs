//! Backend boundary.
//!
//! Everything the client needs from the server is expressed through two
//! traits: [`Backend`] for request/response calls (device auth, account
//! update, RPCs) and [`Socket`] for the persistent realtime channel that
//! multiplexes matchmaking and match-data traffic. The crate never opens a
//! connection itself; embedders implement these against their transport and
//! feed inbound [`SocketEvent`]s to the client one at a time.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::session::Session;

/// Op code for a move submission (client → server).
pub const OPCODE_MOVE: i64 = 1;

/// Op code for an authoritative state snapshot (server → client).
pub const OPCODE_STATE: i64 = 2;

/// Op code for a server-pushed error notice (server → client).
pub const OPCODE_ERROR: i64 = 3;

/// Op code for a rematch intent (client → server).
pub const OPCODE_REMATCH: i64 = 4;

/// Error returned by a [`Backend`] or [`Socket`] implementation.
///
/// The client classifies failures by the operation that produced them, so a
/// single message-carrying type is enough at this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Request/response surface of the game backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Exchange a device identity for a session, creating the account when
    /// it does not exist yet.
    async fn authenticate_device(
        &self,
        device_id: &str,
        create: bool,
    ) -> Result<Session, BackendError>;

    /// Update the display name on the authenticated account.
    async fn update_account(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<(), BackendError>;

    /// Refresh the session credential.
    async fn session_refresh(&self, session: &Session) -> Result<Session, BackendError>;

    /// Invoke a named server RPC with a JSON payload.
    async fn rpc(
        &self,
        session: &Session,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;

    /// Open the realtime channel for a session.
    ///
    /// Returns a connected socket; failing to open it is a transport-level
    /// error, distinct from the credential exchange above.
    async fn open_socket(&self, session: &Session) -> Result<Box<dyn Socket>, BackendError>;
}

/// The persistent realtime channel.
///
/// Owned exclusively by the session manager and lent to the matchmaking and
/// match-channel components for the duration of a call.
#[async_trait]
pub trait Socket: Send {
    /// Add a matchmaking ticket. Returns the server-issued ticket id.
    async fn add_matchmaker(&mut self, request: &MatchmakerRequest)
        -> Result<String, BackendError>;

    /// Remove a matchmaking ticket.
    async fn remove_matchmaker(&mut self, ticket: &str) -> Result<(), BackendError>;

    /// Join a match. Returns the authoritative match id.
    async fn join_match(&mut self, match_id: &str) -> Result<String, BackendError>;

    /// Leave a match.
    async fn leave_match(&mut self, match_id: &str) -> Result<(), BackendError>;

    /// Send a match-data envelope. The payload is UTF-8 encoded JSON.
    async fn send_match_data(
        &mut self,
        match_id: &str,
        op_code: i64,
        payload: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Close the channel.
    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Parameters for a matchmaker ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchmakerRequest {
    /// Matchmaker query string.
    pub query: String,

    /// Minimum number of players to match.
    pub min_count: u32,

    /// Maximum number of players to match.
    pub max_count: u32,

    /// String properties attached to the ticket, visible to other queries.
    pub string_properties: HashMap<String, String>,
}

impl MatchmakerRequest {
    pub fn new(query: impl Into<String>, min_count: u32, max_count: u32) -> Self {
        Self {
            query: query.into(),
            min_count,
            max_count,
            string_properties: HashMap::new(),
        }
    }

    /// Attach a string property, builder-style.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.string_properties
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Inbound events multiplexed over the realtime channel.
///
/// The embedder reads these from its transport and feeds them to
/// [`Client::handle_event`](super::Client::handle_event). Events are
/// dispatched one at a time, never concurrently with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The matchmaker resolved a ticket into a match.
    MatchmakerMatched { ticket: String, match_id: String },

    /// A match-data envelope from the authoritative match loop.
    MatchData {
        match_id: String,
        op_code: i64,
        data: Vec<u8>,
    },

    /// The transport dropped. Re-establishing the connection is an explicit
    /// boundary action, not something the client retries on its own.
    Disconnected { reason: Option<String> },
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_matchmaker_request_builder() {
        let request = MatchmakerRequest::new("+properties.mode:classic", 2, 2)
            .with_property("mode", "classic");

        assert_eq!(request.query, "+properties.mode:classic");
        assert_eq!(request.min_count, 2);
        assert_eq!(request.max_count, 2);
        assert_eq!(
            request.string_properties.get("mode"),
            Some(&"classic".to_string())
        );
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new("connection refused");
        assert_eq!(format!("{}", err), "connection refused");
    }
}
