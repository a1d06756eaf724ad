//! services/api/src/web/notifications.rs
//!
//! The member's notification inbox.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::{Member, Notification};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::rest::{port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

/// How many notifications the inbox shows.
const INBOX_SIZE: i64 = 20;

#[derive(Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            message: n.message,
            created_at: n.created_at,
            is_read: n.is_read,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct InboxResponse {
    pub unread_count: i64,
    pub notifications: Vec<NotificationResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkedResponse {
    pub marked: u64,
}

/// GET /notifications - Most recent notifications and the unread count
#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Newest notifications first", body = InboxResponse)
    )
)]
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
) -> Result<Json<InboxResponse>, HandlerError> {
    let notifications = state
        .notifications
        .list_recent(member.id, INBOX_SIZE)
        .await
        .map_err(port_error)?;
    let unread_count = state
        .notifications
        .unread_count(member.id)
        .await
        .map_err(port_error)?;

    Ok(Json(InboxResponse {
        unread_count,
        notifications: notifications.into_iter().map(Into::into).collect(),
    }))
}

/// POST /notifications/{id}/read - Mark one notification as read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification marked as read"),
        (status = 404, description = "No such notification for this member", body = ErrorResponse)
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
    Path(notification_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    state
        .notifications
        .mark_read(member.id, notification_id)
        .await
        .map_err(port_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /notifications/read-all - Mark every notification as read
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications marked", body = MarkedResponse)
    )
)]
pub async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
) -> Result<Json<MarkedResponse>, HandlerError> {
    let marked = state
        .notifications
        .mark_all_read(member.id)
        .await
        .map_err(port_error)?;
    Ok(Json(MarkedResponse { marked }))
}
