//! Presence endpoint — join/leave/heartbeat mutations and the all-streams
//! snapshot polled by the admin list.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use viewdeck_protocol::{
    PresenceAction, PresenceMutationResponse, PresenceSnapshotResponse, StreamPresenceResponse,
};

use crate::error::ApiError;
use crate::presence_registry::{count_windows, PresenceRegistry};
use crate::state::AppState;

const MISSING_FIELDS: &str = "Missing required fields: action, streamId, userId, sessionId";
const INVALID_ACTION: &str = "Invalid action. Must be: join, leave, or heartbeat";
const NOT_AN_OBJECT: &str = "Request body must be a valid JSON object";

/// Raw mutation body as it arrives; every field is optional until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequestBody {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, alias = "livestreamId")]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// The (stream, user, tab) triple a command targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRef {
    pub stream_id: String,
    pub user_id: String,
    pub session_id: String,
}

/// A validated presence mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommand {
    Join { viewer: ViewerRef, user_email: String },
    Heartbeat { viewer: ViewerRef, user_email: String },
    Leave { viewer: ViewerRef },
}

impl PresenceCommand {
    pub fn action(&self) -> PresenceAction {
        match self {
            PresenceCommand::Join { .. } => PresenceAction::Join,
            PresenceCommand::Heartbeat { .. } => PresenceAction::Heartbeat,
            PresenceCommand::Leave { .. } => PresenceAction::Leave,
        }
    }

    pub fn viewer(&self) -> &ViewerRef {
        match self {
            PresenceCommand::Join { viewer, .. }
            | PresenceCommand::Heartbeat { viewer, .. }
            | PresenceCommand::Leave { viewer } => viewer,
        }
    }
}

/// Ids are opaque: whitespace-only counts as missing, anything else is kept
/// exactly as sent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<PresenceRequestBody> for PresenceCommand {
    type Error = ApiError;

    fn try_from(body: PresenceRequestBody) -> Result<Self, Self::Error> {
        let (Some(action), Some(stream_id), Some(user_id), Some(session_id)) = (
            non_blank(body.action),
            non_blank(body.stream_id),
            non_blank(body.user_id),
            non_blank(body.session_id),
        ) else {
            return Err(ApiError::invalid(MISSING_FIELDS));
        };

        let action: PresenceAction = action
            .trim()
            .parse()
            .map_err(|_| ApiError::invalid(INVALID_ACTION))?;
        let viewer = ViewerRef {
            stream_id,
            user_id,
            session_id,
        };

        if !action.requires_email() {
            return Ok(PresenceCommand::Leave { viewer });
        }

        let user_email = non_blank(body.user_email)
            .map(|email| email.trim().to_string())
            .ok_or_else(|| ApiError::invalid(format!("userEmail is required for {action} action")))?;

        Ok(match action {
            PresenceAction::Join => PresenceCommand::Join { viewer, user_email },
            PresenceAction::Heartbeat => PresenceCommand::Heartbeat { viewer, user_email },
            PresenceAction::Leave => PresenceCommand::Leave { viewer },
        })
    }
}

/// Apply a validated command and describe the stream afterwards.
pub fn apply_command(
    registry: &PresenceRegistry,
    command: PresenceCommand,
) -> PresenceMutationResponse {
    let action = command.action();
    let viewers = match &command {
        PresenceCommand::Join { viewer, user_email } => registry.upsert(
            &viewer.stream_id,
            &viewer.user_id,
            user_email,
            &viewer.session_id,
        ),
        PresenceCommand::Heartbeat { viewer, user_email } => registry.heartbeat(
            &viewer.stream_id,
            &viewer.user_id,
            user_email,
            &viewer.session_id,
        ),
        PresenceCommand::Leave { viewer } => {
            registry.remove(&viewer.stream_id, &viewer.user_id, &viewer.session_id)
        }
    };

    let viewer = command.viewer();
    debug!(
        component = "presence",
        event = "presence.mutation",
        action = %action,
        stream_id = %viewer.stream_id,
        user_id = %viewer.user_id,
        session_id = %viewer.session_id,
        total_viewers = viewers.len(),
        "Applied presence action"
    );

    PresenceMutationResponse {
        success: true,
        total_viewers: viewers.len(),
        window_counts: count_windows(&viewers),
        viewers,
        action,
        stream_id: viewer.stream_id.clone(),
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Content-Type must be application/json".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "Invalid JSON in request body".to_string(),
        JsonRejection::JsonDataError(_) => NOT_AN_OBJECT.to_string(),
        other => other.body_text(),
    }
}

/// `GET /api/presence`
pub async fn presence_snapshot(State(state): State<AppState>) -> Json<PresenceSnapshotResponse> {
    let snapshot = state.registry().snapshot();
    Json(PresenceSnapshotResponse {
        success: true,
        viewers: snapshot.viewers,
        window_counts: snapshot.window_counts,
    })
}

/// `GET /api/presence/{stream_id}`
pub async fn stream_presence(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Json<StreamPresenceResponse> {
    let viewers = state.registry().list_for_stream(&stream_id);
    Json(StreamPresenceResponse {
        success: true,
        total_viewers: viewers.len(),
        window_counts: count_windows(&viewers),
        viewers,
        stream_id,
    })
}

/// Only a JSON object can carry the request fields.
fn parse_body(value: Value) -> Result<PresenceRequestBody, ApiError> {
    if !value.is_object() {
        return Err(ApiError::invalid(NOT_AN_OBJECT));
    }
    serde_json::from_value(value)
        .map_err(|err| ApiError::invalid(format!("Invalid request body: {err}")))
}

/// `POST /api/presence`
pub async fn presence_mutate(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PresenceMutationResponse>, ApiError> {
    let Json(value) = payload.map_err(|rejection| {
        debug!(
            component = "presence",
            event = "presence.request.rejected",
            error = %rejection,
            "Rejected presence request body"
        );
        ApiError::invalid(rejection_message(&rejection))
    })?;

    let command = PresenceCommand::try_from(parse_body(value)?)?;
    Ok(Json(apply_command(state.registry(), command)))
}
