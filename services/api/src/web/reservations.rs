//! services/api/src/web/reservations.rs
//!
//! Reservation endpoints for members and the admin reservation queue.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::{Member, Reservation, ReservationDetails, ReserveOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ReserveRequest {
    pub book_id: i64,
}

#[derive(Deserialize, IntoParams)]
pub struct ReservationQuery {
    /// Restrict the queue to a single book, oldest first.
    pub book_id: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ReservationResponse {
    pub reservation_id: i64,
    pub member_id: i64,
    pub book_id: i64,
    pub reserved_at: DateTime<Utc>,
    /// False when the member already held this reservation.
    pub created: bool,
}

impl ReservationResponse {
    fn new(reservation: &Reservation, created: bool) -> Self {
        Self {
            reservation_id: reservation.id,
            member_id: reservation.member_id,
            book_id: reservation.book_id,
            reserved_at: reservation.reserved_at,
            created,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReservationDetailsResponse {
    pub reservation_id: i64,
    pub member_id: i64,
    pub member_name: String,
    pub book_id: i64,
    pub book_title: String,
    pub book_author: String,
    pub reserved_at: DateTime<Utc>,
}

impl From<ReservationDetails> for ReservationDetailsResponse {
    fn from(d: ReservationDetails) -> Self {
        Self {
            reservation_id: d.reservation.id,
            member_id: d.reservation.member_id,
            member_name: d.member_name,
            book_id: d.reservation.book_id,
            book_title: d.book_title,
            book_author: d.book_author,
            reserved_at: d.reservation.reserved_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CountResponse {
    pub count: i64,
}

//=========================================================================================
// Member Handlers
//=========================================================================================

/// POST /reservations - Reserve a book
#[utoipa::path(
    post,
    path = "/reservations",
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationResponse),
        (status = 200, description = "Reservation already active", body = ReservationResponse),
        (status = 404, description = "No such book", body = ErrorResponse)
    )
)]
pub async fn reserve_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome = state
        .circulation
        .reserve(&member, req.book_id)
        .await
        .map_err(port_error)?;

    let (status, created) = match &outcome {
        ReserveOutcome::Created(_) => (StatusCode::CREATED, true),
        ReserveOutcome::AlreadyActive(_) => (StatusCode::OK, false),
    };
    Ok((
        status,
        Json(ReservationResponse::new(outcome.reservation(), created)),
    ))
}

/// GET /reservations - The caller's active reservations, newest first
#[utoipa::path(
    get,
    path = "/reservations",
    responses(
        (status = 200, description = "Active reservations", body = [ReservationDetailsResponse])
    )
)]
pub async fn my_reservations_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
) -> Result<Json<Vec<ReservationDetailsResponse>>, HandlerError> {
    let reservations = state
        .store
        .list_reservations_for_member(member.id)
        .await
        .map_err(port_error)?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

/// DELETE /reservations/{id} - Cancel a reservation
#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 204, description = "Reservation cancelled"),
        (status = 403, description = "Reservation belongs to another member", body = ErrorResponse),
        (status = 404, description = "No such reservation", body = ErrorResponse)
    )
)]
pub async fn cancel_reservation_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
    Path(reservation_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    state
        .circulation
        .cancel_reservation(&member, reservation_id)
        .await
        .map_err(port_error)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Admin Handlers
//=========================================================================================

/// GET /admin/reservations - The reservation queue, oldest first
#[utoipa::path(
    get,
    path = "/admin/reservations",
    params(ReservationQuery),
    responses(
        (status = 200, description = "Active reservations", body = [ReservationDetailsResponse])
    )
)]
pub async fn list_reservations_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<Vec<ReservationDetailsResponse>>, HandlerError> {
    let reservations = match query.book_id {
        Some(book_id) => state.store.list_reservations_for_book(book_id).await,
        None => state.store.list_active_reservations().await,
    }
    .map_err(port_error)?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

/// GET /admin/reservations/count - Number of active reservations
#[utoipa::path(
    get,
    path = "/admin/reservations/count",
    responses(
        (status = 200, description = "Active reservation count", body = CountResponse)
    )
)]
pub async fn count_reservations_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, HandlerError> {
    let count = state
        .store
        .count_active_reservations()
        .await
        .map_err(port_error)?;
    Ok(Json(CountResponse { count }))
}
