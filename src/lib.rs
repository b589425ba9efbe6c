//! Tic-Tac-Toe Client Library
//!
//! This crate provides client-side state management for realtime
//! tic-tac-toe matches played against an authoritative game backend.
//!
//! # Overview
//!
//! The client module provides:
//!
//! - **Session Management** - Durable device identity, credential exchange,
//!   and the realtime channel lifecycle (connect, auto-connect, logout,
//!   transport drops).
//!
//! - **Matchmaking** - The single-ticket search state machine: start,
//!   cancel, and the matched hand-off into a game.
//!
//! - **Match Channel** - Join/create flows, strict decoding of
//!   authoritative state snapshots, local move guards, turn countdown,
//!   leave, and rematch.
//!
//! # Design Principles
//!
//! 1. **The server is the only authority** - The client mirrors the latest
//!    snapshot it was sent and never derives game state locally. A move
//!    that passes the local guards is merely *attempted*; the next
//!    snapshot says what actually happened.
//!
//! 2. **State machines validate transitions** - Connect attempts, search
//!    tickets, and match phases reject invalid operations with clear
//!    errors instead of limping into inconsistent states.
//!
//! 3. **No networking** - This crate is pure state plus boundary traits.
//!    Embedders implement [`Backend`](client::Backend) and
//!    [`Socket`](client::Socket) against their transport and feed inbound
//!    events to [`Client::handle_event`](client::Client::handle_event).
//!
//! 4. **Best-effort teardown** - Cancels, leaves, and logout always clear
//!    local state, even when the matching network call fails; nothing gets
//!    stuck "in progress" waiting on an acknowledgment that never comes.
//!
//! # Example
//!
//! ```rust,ignore
//! use tictactoe_client::client::{Client, GameMode, SocketEvent};
//!
//! let mut client = Client::new(backend, storage);
//!
//! // Reuse the persisted nickname, or prompt and connect manually.
//! if !client.auto_connect().await? {
//!     client.connect("Alice").await?;
//! }
//!
//! // Find an opponent; the matched event joins the game.
//! client.start_search(GameMode::Classic).await?;
//! while let Some(event) = events.recv().await {
//!     client.handle_event(event).await;
//!     if client.match_state().is_some() {
//!         break;
//!     }
//! }
//!
//! client.submit_move(4).await?;
//! ```

pub mod client;

// Re-export everything from the client module at crate root
pub use client::*;
