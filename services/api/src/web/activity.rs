//! services/api/src/web/activity.rs

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::ActivityEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{bad_request, port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize, IntoParams)]
pub struct ActivityQuery {
    /// Number of entries to return, newest first. Defaults to 50.
    pub limit: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ActivityResponse {
    pub id: i64,
    pub action: String,
    pub member_id: i64,
    pub book_id: i64,
    pub book_title: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<ActivityEntry> for ActivityResponse {
    fn from(e: ActivityEntry) -> Self {
        Self {
            id: e.id,
            action: e.event.kind.as_str().to_string(),
            member_id: e.event.member_id,
            book_id: e.event.book_id,
            book_title: e.book_title,
            occurred_at: e.event.occurred_at,
        }
    }
}

/// GET /admin/activity - The activity feed
#[utoipa::path(
    get,
    path = "/admin/activity",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Recent activity", body = [ActivityResponse]),
        (status = 400, description = "Limit out of range", body = ErrorResponse)
    )
)]
pub async fn list_activity_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityResponse>>, HandlerError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let entries = state
        .activity
        .recent_activity(limit)
        .await
        .map_err(port_error)?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
