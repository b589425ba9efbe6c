//! Auxiliary read-only RPCs.
//!
//! Plain request/response wrappers with no state-machine behavior: account
//! display name, win/loss record, leaderboard page. Payloads here are
//! display data, so decoding is lenient: missing fields default instead of
//! failing the whole call.

use serde::Deserialize;

use super::backend::{Backend, BackendError};
use super::session::Session;

/// RPC id: create an authoritative match, returns `{matchId}`.
pub const RPC_CREATE_MATCH: &str = "create_match";

/// RPC id: the calling account's profile, `{displayName, username}`.
pub const RPC_GET_ACCOUNT: &str = "get_account";

/// RPC id: the calling account's win/loss record.
pub const RPC_GET_STATS: &str = "get_stats";

/// RPC id: ranked leaderboard page, takes `{limit}`.
pub const RPC_GET_LEADERBOARD: &str = "get_leaderboard";

/// Win/loss record for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    pub rank: u32,
}

/// A leaderboard page plus the caller's own row, when ranked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct LeaderboardPage {
    #[serde(default)]
    pub entries: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub me: Option<LeaderboardEntry>,
}

/// Fetch the calling account's win/loss record.
pub async fn fetch_stats(
    backend: &dyn Backend,
    session: &Session,
) -> Result<PlayerStats, BackendError> {
    let payload = backend
        .rpc(session, RPC_GET_STATS, serde_json::json!({}))
        .await?;
    Ok(serde_json::from_value(payload).unwrap_or_default())
}

/// Fetch a leaderboard page of up to `limit` entries.
pub async fn fetch_leaderboard(
    backend: &dyn Backend,
    session: &Session,
    limit: u32,
) -> Result<LeaderboardPage, BackendError> {
    let payload = backend
        .rpc(session, RPC_GET_LEADERBOARD, serde_json::json!({ "limit": limit }))
        .await?;
    Ok(serde_json::from_value(payload).unwrap_or_default())
}

/// Fetch the calling account's display name, falling back to the username,
/// then to a generic placeholder.
pub async fn fetch_display_name(
    backend: &dyn Backend,
    session: &Session,
) -> Result<String, BackendError> {
    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase")]
    struct Account {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        username: Option<String>,
    }

    let payload = backend
        .rpc(session, RPC_GET_ACCOUNT, serde_json::json!({}))
        .await?;
    let account: Account = serde_json::from_value(payload).unwrap_or_default();
    Ok(account
        .display_name
        .filter(|name| !name.is_empty())
        .or(account.username)
        .unwrap_or_else(|| "Player".to_string()))
}
