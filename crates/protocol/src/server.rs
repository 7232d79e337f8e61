//! Server → Client messages

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::PresenceAction;
use crate::types::*;

/// Response to a presence mutation (join/leave/heartbeat)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMutationResponse {
    pub success: bool,
    pub viewers: Vec<ViewerSession>,
    pub total_viewers: usize,
    pub window_counts: Vec<WindowCount>,
    pub action: PresenceAction,
    pub stream_id: String,
}

/// Response to `GET /api/presence/{streamId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPresenceResponse {
    pub success: bool,
    pub stream_id: String,
    pub viewers: Vec<ViewerSession>,
    pub total_viewers: usize,
    pub window_counts: Vec<WindowCount>,
}

/// Response to `GET /api/presence`: every stream at once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshotResponse {
    pub success: bool,
    pub viewers: BTreeMap<String, Vec<ViewerSession>>,
    pub window_counts: BTreeMap<String, Vec<WindowCount>>,
}

/// Error body shared by every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailListResponse {
    pub data: Vec<Email>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEmailResponse {
    pub success: bool,
    pub data: Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEmailResponse {
    pub success: bool,
}

/// Response to `PUT /api/emails/{id}/ip`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordViewResponse {
    pub success: bool,
    pub data: Email,
    pub ip_address: String,
}
