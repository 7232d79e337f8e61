//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// One open tab/window viewing one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSession {
    pub stream_id: String,
    pub user_id: String,
    pub user_email: String,
    pub session_id: String,
    /// Unix milliseconds of the latest join/heartbeat for this session
    pub last_seen_at: u64,
}

impl ViewerSession {
    /// True when this entry belongs to the given (user, tab) pair.
    pub fn is_session(&self, user_id: &str, session_id: &str) -> bool {
        self.user_id == user_id && self.session_id == session_id
    }
}

/// Per-user tab count on a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCount {
    pub user_id: String,
    pub user_email: String,
    pub window_count: usize,
}

/// Allowlisted viewer email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub email: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<String>,
}
