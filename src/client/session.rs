//! Session and channel lifecycle management.
//!
//! Establishes identity, exchanges it for a session credential, and owns the
//! realtime channel. The other components never touch the channel lifecycle;
//! they borrow the socket for the duration of a call.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────────┐  connect   ┌────────────┐  exchange + open  ┌───────────┐
//! │ Disconnected │───────────▶│ Connecting │──────────────────▶│ Connected │
//! └──────────────┘            └─────┬──────┘                   └─────┬─────┘
//!        ▲                          │ failure                       │
//!        │                          ▼                    transport  │ logout
//!        │                   ┌──────────────┐              drop    │
//!        └───────────────────│ Disconnected │                      ▼
//!                            └──────────────┘   ┌──────────────┐ ┌────────┐
//!                 connect (explicit) ◀──────────│ Reconnecting │ │ Closed │
//!                                               └──────────────┘ └────────┘
//! ```
//!
//! The client never retries a dropped transport on its own; it surfaces the
//! failure and waits for the boundary to call [`SessionManager::connect`]
//! again.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::backend::{Backend, Socket};
use super::storage::{Storage, KEY_DEVICE_ID, KEY_LAST_MATCH, KEY_NICKNAME};

/// A live session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,

    /// Account display name as of the last exchange or refresh.
    pub username: String,

    /// Bearer credential for backend calls.
    pub token: String,

    /// Credential used to refresh `token` before it expires.
    pub refresh_token: String,

    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if the credential has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Realtime channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    /// No channel, no session.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// Channel open, session live.
    Connected,

    /// The transport dropped; the session is retained and an explicit
    /// connect re-establishes the channel.
    Reconnecting,

    /// Explicitly closed by logout.
    Closed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Check if the channel is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a connect attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

/// Error from a connect attempt or session refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The credential exchange was rejected.
    Auth { message: String },

    /// The channel could not be opened after the exchange succeeded.
    Network { message: String },

    /// A session is already live or a connect attempt is in flight.
    AlreadyConnected,

    /// No session to refresh.
    NotConnected,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { message } => write!(f, "authentication failed: {}", message),
            Self::Network { message } => write!(f, "connection failed: {}", message),
            Self::AlreadyConnected => write!(f, "already connected"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// Owns identity, session, and the realtime channel.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    storage: Box<dyn Storage>,
    session: Option<Session>,
    socket: Option<Box<dyn Socket>>,
    status: ChannelStatus,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>, storage: Box<dyn Storage>) -> Self {
        Self {
            backend,
            storage,
            session: None,
            socket: None,
            status: ChannelStatus::Disconnected,
        }
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Get the durable device identity, creating and persisting one if
    /// absent. Idempotent.
    pub fn acquire_identity(&mut self) -> String {
        if let Some(id) = self.storage.get(KEY_DEVICE_ID) {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.storage.set(KEY_DEVICE_ID, &id);
        debug!("created device identity {}", id);
        id
    }

    /// Destroy the device identity ("change user"). The next connect will
    /// mint a fresh one and land on a different account.
    pub fn reset_identity(&mut self) {
        self.storage.remove(KEY_DEVICE_ID);
    }

    /// Nickname persisted by the last successful connect, if any.
    pub fn saved_nickname(&self) -> Option<String> {
        self.storage.get(KEY_NICKNAME)
    }

    // ── Connect / logout ────────────────────────────────────────────

    /// Exchange identity for a session and open the realtime channel.
    ///
    /// On failure both session and channel are reverted; there is no
    /// partially-connected state.
    pub async fn connect(&mut self, display_name: &str) -> Result<(), ConnectError> {
        if self.status.is_connecting() || self.status.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }
        self.status = ChannelStatus::Connecting;

        match self.try_connect(display_name).await {
            Ok(()) => {
                self.status = ChannelStatus::Connected;
                debug!("connected as {}", display_name);
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.socket = None;
                self.status = ChannelStatus::Disconnected;
                Err(e)
            }
        }
    }

    async fn try_connect(&mut self, display_name: &str) -> Result<(), ConnectError> {
        let auth = |e: super::backend::BackendError| ConnectError::Auth { message: e.message };

        let device_id = self.acquire_identity();
        let session = self
            .backend
            .authenticate_device(&device_id, true)
            .await
            .map_err(auth)?;
        self.backend
            .update_account(&session, display_name)
            .await
            .map_err(auth)?;
        // Refresh immediately so the credential carries the new name.
        let session = self.backend.session_refresh(&session).await.map_err(auth)?;

        self.storage.set(KEY_NICKNAME, display_name);

        let socket = self
            .backend
            .open_socket(&session)
            .await
            .map_err(|e| ConnectError::Network { message: e.message })?;

        self.session = Some(session);
        self.socket = Some(socket);
        Ok(())
    }

    /// Connect with the persisted nickname, if any.
    ///
    /// Returns `Ok(false)` when there is nothing to do: no saved nickname,
    /// a live session, or a connect already in flight. Mutual exclusion
    /// with a manual [`connect`](Self::connect) follows from those checks.
    pub async fn auto_connect(&mut self) -> Result<bool, ConnectError> {
        if self.session.is_some() || self.status.is_connecting() {
            return Ok(false);
        }
        let Some(nickname) = self.saved_nickname() else {
            return Ok(false);
        };
        self.connect(&nickname).await?;
        Ok(true)
    }

    /// Close the channel and clear the session.
    ///
    /// The close is best-effort; local state is cleared regardless. The
    /// persisted nickname is removed, the device identity is not.
    pub async fn logout(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                debug!("socket close during logout failed: {}", e);
            }
        }
        self.session = None;
        self.storage.remove(KEY_NICKNAME);
        self.status = ChannelStatus::Closed;
    }

    /// Refresh the session credential on demand.
    pub async fn refresh_session(&mut self) -> Result<(), ConnectError> {
        let current = self.session.as_ref().ok_or(ConnectError::NotConnected)?;
        let refreshed = self
            .backend
            .session_refresh(current)
            .await
            .map_err(|e| ConnectError::Auth { message: e.message })?;
        self.session = Some(refreshed);
        Ok(())
    }

    /// Record a transport drop. The session is retained; re-establishing
    /// the channel is an explicit boundary action.
    ///
    /// Returns `true` when the drop actually transitioned the channel; a
    /// drop reported after an explicit logout or while disconnected is not
    /// news and returns `false`.
    pub fn on_transport_drop(&mut self, reason: Option<&str>) -> bool {
        if !matches!(
            self.status,
            ChannelStatus::Connected | ChannelStatus::Connecting
        ) {
            return false;
        }
        warn!("transport dropped: {}", reason.unwrap_or("unknown reason"));
        self.socket = None;
        self.status = ChannelStatus::Reconnecting;
        true
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The local user id, when a session is live.
    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Borrow the channel for a call.
    pub fn socket_mut(&mut self) -> Option<&mut (dyn Socket + '_)> {
        match self.socket {
            Some(ref mut b) => Some(&mut **b),
            None => None,
        }
    }

    /// Borrow session and channel together.
    pub fn session_and_socket_mut(&mut self) -> Option<(&Session, &mut dyn Socket)> {
        match (&self.session, &mut self.socket) {
            (Some(session), Some(socket)) => Some((session, socket.as_mut())),
            _ => None,
        }
    }

    // ── Match resume hint ───────────────────────────────────────────

    /// Persist the current match id as a resume hint.
    pub fn remember_match(&mut self, match_id: &str) {
        self.storage.set(KEY_LAST_MATCH, match_id);
    }

    /// Drop the resume hint.
    pub fn forget_match(&mut self) {
        self.storage.remove(KEY_LAST_MATCH);
    }

    /// Last known match id, if any. Best-effort only; a fresh join must
    /// confirm it before it means anything.
    pub fn last_match_hint(&self) -> Option<String> {
        self.storage.get(KEY_LAST_MATCH)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status)
            .field("user_id", &self.user_id())
            .field("has_socket", &self.socket.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::backend::testkit::ScriptBackend;
    use crate::client::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn manager_with(backend: ScriptBackend) -> SessionManager {
        SessionManager::new(Arc::new(backend), Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_acquire_identity_is_idempotent() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));

        let first = manager.acquire_identity();
        let second = manager.acquire_identity();
        assert_eq!(first, second);

        manager.reset_identity();
        let third = manager.acquire_identity();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_connect_happy_path() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));

        manager.connect("Alice").await.unwrap();

        assert!(manager.status().is_connected());
        assert_eq!(manager.user_id(), Some("user-a"));
        // The credential comes from the post-update refresh.
        assert_eq!(manager.session().unwrap().token, "token-2");
        assert_eq!(manager.saved_nickname(), Some("Alice".to_string()));
        assert!(manager.socket_mut().is_some());
    }

    #[tokio::test]
    async fn test_connect_auth_failure_reverts_everything() {
        let mut backend = ScriptBackend::new("user-a", "Alice");
        backend.fail_auth = Some("bad server key".to_string());
        let mut manager = manager_with(backend);

        let err = manager.connect("Alice").await.unwrap_err();
        assert!(matches!(err, ConnectError::Auth { .. }));

        assert_eq!(manager.status(), ChannelStatus::Disconnected);
        assert!(manager.session().is_none());
        assert!(manager.socket_mut().is_none());
        assert_eq!(manager.saved_nickname(), None);
    }

    #[tokio::test]
    async fn test_connect_socket_failure_is_network_error() {
        let mut backend = ScriptBackend::new("user-a", "Alice");
        backend.fail_socket = Some("refused".to_string());
        let mut manager = manager_with(backend);

        let err = manager.connect("Alice").await.unwrap_err();
        assert!(matches!(err, ConnectError::Network { .. }));
        assert_eq!(manager.status(), ChannelStatus::Disconnected);
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));

        manager.connect("Alice").await.unwrap();
        let err = manager.connect("Alice").await.unwrap_err();
        assert_eq!(err, ConnectError::AlreadyConnected);
    }

    #[tokio::test]
    async fn test_auto_connect_uses_saved_nickname() {
        let backend = ScriptBackend::new("user-a", "Alice");
        let storage = MemoryStore::new().with(KEY_NICKNAME, "Alice");
        let mut manager = SessionManager::new(Arc::new(backend), Box::new(storage));

        assert!(manager.auto_connect().await.unwrap());
        assert!(manager.status().is_connected());
    }

    #[tokio::test]
    async fn test_auto_connect_without_saved_nickname_is_a_noop() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));

        assert!(!manager.auto_connect().await.unwrap());
        assert_eq!(manager.status(), ChannelStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_auto_connect_skips_live_session() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));
        manager.connect("Alice").await.unwrap();

        assert!(!manager.auto_connect().await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_clears_nickname_but_not_identity() {
        let backend = ScriptBackend::new("user-a", "Alice");
        let log = std::sync::Arc::clone(&backend.socket_log);
        let mut manager = manager_with(backend);

        manager.connect("Alice").await.unwrap();
        let device_id = manager.acquire_identity();

        manager.logout().await;

        assert_eq!(manager.status(), ChannelStatus::Closed);
        assert!(manager.session().is_none());
        assert_eq!(manager.saved_nickname(), None);
        assert_eq!(manager.acquire_identity(), device_id);
        assert!(log.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn test_transport_drop_keeps_session_and_allows_reconnect() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));
        manager.connect("Alice").await.unwrap();

        assert!(manager.on_transport_drop(Some("read timeout")));
        // A duplicate drop report is not news.
        assert!(!manager.on_transport_drop(Some("read timeout")));

        assert_eq!(manager.status(), ChannelStatus::Reconnecting);
        assert!(manager.session().is_some());
        assert!(manager.socket_mut().is_none());

        // Re-establishing is an explicit connect, which is allowed now.
        manager.connect("Alice").await.unwrap();
        assert!(manager.status().is_connected());
    }

    #[tokio::test]
    async fn test_refresh_session_requires_session() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));
        assert_eq!(
            manager.refresh_session().await.unwrap_err(),
            ConnectError::NotConnected
        );

        manager.connect("Alice").await.unwrap();
        manager.refresh_session().await.unwrap();
        assert_eq!(manager.session().unwrap().token, "token-2");
    }

    #[tokio::test]
    async fn test_match_resume_hint_round_trip() {
        let mut manager = manager_with(ScriptBackend::new("user-a", "Alice"));

        assert_eq!(manager.last_match_hint(), None);
        manager.remember_match("match-9");
        assert_eq!(manager.last_match_hint(), Some("match-9".to_string()));
        manager.forget_match();
        assert_eq!(manager.last_match_hint(), None);
    }
}
