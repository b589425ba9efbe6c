//! Matchmaking ticket lifecycle.
//!
//! One ticket at a time: a search is started, then either resolves into a
//! match, is cancelled, or errors. Matched events are only honored for the
//! ticket currently tracked, so a resolution that races a cancel over the
//! network is discarded instead of yanking the player into a match they
//! backed out of.

use std::fmt;

use tracing::debug;

use super::backend::{MatchmakerRequest, Socket};
use super::game::GameMode;

/// A live matchmaking search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    /// Server-issued ticket id.
    pub ticket_id: String,

    /// Mode the search was started for.
    pub mode: GameMode,
}

/// Error from starting a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No realtime channel to search over.
    NotConnected,

    /// A ticket is already live. One search at a time; cancel it first.
    AlreadySearching,

    /// The matchmaker rejected the ticket.
    Backend { message: String },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to server"),
            Self::AlreadySearching => write!(f, "a search is already in progress"),
            Self::Backend { message } => write!(f, "failed to start matchmaking: {}", message),
        }
    }
}

impl std::error::Error for SearchError {}

/// Runs the single-ticket search state machine.
#[derive(Debug, Default)]
pub struct MatchmakingCoordinator {
    ticket: Option<SearchTicket>,
}

impl MatchmakingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a ticket is live.
    pub fn is_searching(&self) -> bool {
        self.ticket.is_some()
    }

    /// The live ticket, if any.
    pub fn ticket(&self) -> Option<&SearchTicket> {
        self.ticket.as_ref()
    }

    /// Start a search for a two-player match in `mode`.
    ///
    /// Rejects with [`SearchError::AlreadySearching`] while a ticket is
    /// live; an existing search is never silently superseded.
    pub async fn start_search(
        &mut self,
        socket: &mut dyn Socket,
        mode: GameMode,
    ) -> Result<(), SearchError> {
        if self.ticket.is_some() {
            return Err(SearchError::AlreadySearching);
        }

        let request = MatchmakerRequest::new(format!("+properties.mode:{}", mode.as_str()), 2, 2)
            .with_property("mode", mode.as_str());
        let ticket_id = socket
            .add_matchmaker(&request)
            .await
            .map_err(|e| SearchError::Backend { message: e.message })?;

        debug!("matchmaking ticket {} open ({})", ticket_id, mode.as_str());
        self.ticket = Some(SearchTicket { ticket_id, mode });
        Ok(())
    }

    /// Cancel the live search, if any.
    ///
    /// Best-effort: the ticket is released locally even when the remove
    /// request fails or no socket is available. A ticket the server
    /// already resolved is not an error, and local state must never stay
    /// stuck "searching" waiting on an acknowledgment.
    pub async fn cancel_search(&mut self, socket: Option<&mut dyn Socket>) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        if let Some(socket) = socket {
            if let Err(e) = socket.remove_matchmaker(&ticket.ticket_id).await {
                debug!("matchmaker remove for {} failed: {}", ticket.ticket_id, e);
            }
        }
    }

    /// Handle a matchmaker-matched event.
    ///
    /// Returns the match id exactly once when the event resolves the
    /// tracked ticket; events for any other ticket (typically a resolution
    /// arriving after a cancel) are discarded.
    pub fn on_matchmaker_matched(&mut self, ticket_id: &str, match_id: &str) -> Option<String> {
        match &self.ticket {
            Some(tracked) if tracked.ticket_id == ticket_id => {
                debug!("ticket {} matched into {}", ticket_id, match_id);
                self.ticket = None;
                Some(match_id.to_string())
            }
            _ => {
                debug!("ignoring matchmaker event for untracked ticket {}", ticket_id);
                None
            }
        }
    }
}
