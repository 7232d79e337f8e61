//! viewdeck protocol
//!
//! Shared types for communication between the viewdeck server and its
//! presence agents. These types are serialized as JSON over HTTP.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::{CreateEmailRequest, PresenceAction, PresenceRequest};
pub use server::{
    CreateEmailResponse, DeleteEmailResponse, EmailListResponse, ErrorResponse,
    PresenceMutationResponse, PresenceSnapshotResponse, RecordViewResponse, StreamPresenceResponse,
};
pub use types::*;

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a per-tab session token: `<unix millis>-<9 random chars>`.
///
/// The timestamp prefix keeps tokens roughly sortable by creation; the random
/// suffix keeps two tabs opened in the same millisecond apart.
pub fn new_session_token() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_millis(), &suffix[..9])
}
