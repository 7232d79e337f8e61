//! Allowlist endpoints under `/api/emails`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};
use viewdeck_protocol::{
    CreateEmailRequest, CreateEmailResponse, DeleteEmailResponse, EmailListResponse,
    RecordViewResponse,
};

use crate::client_ip::client_ip;
use crate::email_store::StoreError;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DeleteEmailQuery {
    pub id: Option<String>,
}

/// `GET /api/emails`
pub async fn list_emails(State(state): State<AppState>) -> Result<Json<EmailListResponse>, ApiError> {
    let data = state.emails().list().await?;
    Ok(Json(EmailListResponse { data }))
}

/// `POST /api/emails`
pub async fn create_email(
    State(state): State<AppState>,
    payload: Result<Json<CreateEmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateEmailResponse>), ApiError> {
    let raw = payload
        .ok()
        .and_then(|Json(body)| body.email)
        .ok_or(StoreError::InvalidEmail)?;

    let email = state.emails().create(&raw).await?;
    info!(
        component = "emails",
        event = "emails.created",
        email_id = %email.id,
        "Added email to allowlist"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateEmailResponse {
            success: true,
            data: email,
        }),
    ))
}

/// `DELETE /api/emails?id=<id>`
///
/// Deleting an id that does not exist still succeeds.
pub async fn delete_email(
    State(state): State<AppState>,
    Query(query): Query<DeleteEmailQuery>,
) -> Result<Json<DeleteEmailResponse>, ApiError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::invalid("Email ID is required"))?;

    let removed = state.emails().delete(&id).await?;
    info!(
        component = "emails",
        event = "emails.deleted",
        email_id = %id,
        removed = removed,
        "Deleted email from allowlist"
    );

    Ok(Json(DeleteEmailResponse { success: true }))
}

/// `PUT /api/emails/{id}/ip` — remember where this viewer last watched from.
pub async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecordViewResponse>, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::invalid("Email ID is required"));
    }

    let ip_address = client_ip(&headers, state.dev_mode());
    debug!(
        component = "emails",
        event = "emails.ip_detected",
        email_id = %id,
        ip_address = %ip_address,
        user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
        "Detected viewer address"
    );

    let data = state.emails().record_view(&id, &ip_address).await?;
    Ok(Json(RecordViewResponse {
        success: true,
        data,
        ip_address,
    }))
}
