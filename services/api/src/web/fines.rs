//! services/api/src/web/fines.rs
//!
//! Fine endpoints: members see their own fines, admins settle and audit them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use library_core::domain::{
    Fine, FineDetails, FineFilter, FineStatus, FineSummary, Member, PaymentOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{bad_request, port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct FineQuery {
    /// `Pending` or `Paid` (case-insensitive first letter).
    pub status: Option<String>,
    pub member_id: Option<i64>,
    /// Part of the member's name.
    pub member: Option<String>,
}

impl FineQuery {
    fn into_filter(self) -> Result<FineFilter, HandlerError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<FineStatus>)
            .transpose()
            .map_err(bad_request)?;
        Ok(FineFilter {
            status,
            member_id: self.member_id,
            member_name: self.member,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct FineResponse {
    pub fine_id: i64,
    pub loan_id: i64,
    pub amount: i64,
    pub days_late: i64,
    pub status: String,
    pub fine_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
}

impl From<Fine> for FineResponse {
    fn from(f: Fine) -> Self {
        Self {
            fine_id: f.id,
            loan_id: f.loan_id,
            amount: f.amount,
            days_late: f.days_late,
            status: f.status.as_str().to_string(),
            fine_date: f.fine_date,
            payment_date: f.payment_date,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FineDetailsResponse {
    #[serde(flatten)]
    pub fine: FineResponse,
    pub book_id: i64,
    pub book_title: String,
    pub member_id: i64,
    pub member_name: String,
}

impl From<FineDetails> for FineDetailsResponse {
    fn from(d: FineDetails) -> Self {
        Self {
            fine: d.fine.into(),
            book_id: d.book_id,
            book_title: d.book_title,
            member_id: d.member_id,
            member_name: d.member_name,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub details: FineDetailsResponse,
    /// True when the fine had been settled before this request.
    pub already_paid: bool,
}

#[derive(Serialize, ToSchema)]
pub struct FineSummaryResponse {
    pub total: i64,
    pub pending: i64,
    pub paid: i64,
    pub pending_amount: i64,
}

impl From<FineSummary> for FineSummaryResponse {
    fn from(s: FineSummary) -> Self {
        Self {
            total: s.total,
            pending: s.pending,
            paid: s.paid,
            pending_amount: s.pending_amount,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /fines - The caller's fines
#[utoipa::path(
    get,
    path = "/fines",
    params(FineQuery),
    responses(
        (status = 200, description = "Fines for the calling member", body = [FineDetailsResponse])
    )
)]
pub async fn my_fines_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
    Query(query): Query<FineQuery>,
) -> Result<Json<Vec<FineDetailsResponse>>, HandlerError> {
    let mut filter = query.into_filter()?;
    filter.member_id = Some(member.id);
    let fines = state.store.list_fines(&filter).await.map_err(port_error)?;
    Ok(Json(fines.into_iter().map(Into::into).collect()))
}

/// GET /admin/fines - All fines, optionally filtered
#[utoipa::path(
    get,
    path = "/admin/fines",
    params(FineQuery),
    responses(
        (status = 200, description = "Matching fines, newest first", body = [FineDetailsResponse]),
        (status = 400, description = "Unknown status", body = ErrorResponse)
    )
)]
pub async fn list_fines_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FineQuery>,
) -> Result<Json<Vec<FineDetailsResponse>>, HandlerError> {
    let filter = query.into_filter()?;
    let fines = state.store.list_fines(&filter).await.map_err(port_error)?;
    Ok(Json(fines.into_iter().map(Into::into).collect()))
}

/// GET /admin/fines/summary - Fine totals
#[utoipa::path(
    get,
    path = "/admin/fines/summary",
    responses(
        (status = 200, description = "Fine counts and outstanding amount", body = FineSummaryResponse)
    )
)]
pub async fn fine_summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FineSummaryResponse>, HandlerError> {
    let summary = state.store.fine_summary().await.map_err(port_error)?;
    Ok(Json(summary.into()))
}

/// GET /admin/fines/{id} - One fine with its book and member
#[utoipa::path(
    get,
    path = "/admin/fines/{id}",
    params(("id" = i64, Path, description = "Fine id")),
    responses(
        (status = 200, description = "The fine", body = FineDetailsResponse),
        (status = 404, description = "No such fine", body = ErrorResponse)
    )
)]
pub async fn get_fine_handler(
    State(state): State<Arc<AppState>>,
    Path(fine_id): Path<i64>,
) -> Result<Json<FineDetailsResponse>, HandlerError> {
    let fine = state.store.get_fine(fine_id).await.map_err(port_error)?;
    Ok(Json(fine.into()))
}

/// POST /admin/fines/{id}/pay - Mark a fine as paid
#[utoipa::path(
    post,
    path = "/admin/fines/{id}/pay",
    params(("id" = i64, Path, description = "Fine id")),
    responses(
        (status = 200, description = "Fine is paid", body = PaymentResponse),
        (status = 404, description = "No such fine", body = ErrorResponse)
    )
)]
pub async fn pay_fine_handler(
    State(state): State<Arc<AppState>>,
    Path(fine_id): Path<i64>,
) -> Result<Json<PaymentResponse>, HandlerError> {
    let outcome = state
        .circulation
        .pay_fine(fine_id, state.today())
        .await
        .map_err(port_error)?;

    let already_paid = matches!(outcome, PaymentOutcome::AlreadyPaid(_));
    let details = match outcome {
        PaymentOutcome::Paid(d) | PaymentOutcome::AlreadyPaid(d) => d,
    };
    Ok(Json(PaymentResponse {
        details: details.into(),
        already_paid,
    }))
}

/// DELETE /admin/fines/{id} - Remove a fine record
#[utoipa::path(
    delete,
    path = "/admin/fines/{id}",
    params(("id" = i64, Path, description = "Fine id")),
    responses(
        (status = 204, description = "Fine deleted"),
        (status = 404, description = "No such fine", body = ErrorResponse)
    )
)]
pub async fn delete_fine_handler(
    State(state): State<Arc<AppState>>,
    Path(fine_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    state
        .circulation
        .delete_fine(fine_id)
        .await
        .map_err(port_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fine_query_parses_status() {
        let filter = FineQuery {
            status: Some("paid".into()),
            member_id: Some(4),
            member: Some("Love".into()),
        }
        .into_filter()
        .expect("valid filter");
        assert_eq!(filter.status, Some(FineStatus::Paid));
        assert_eq!(filter.member_id, Some(4));
        assert_eq!(filter.member_name.as_deref(), Some("Love"));

        let bad = FineQuery {
            status: Some("waived".into()),
            member_id: None,
            member: None,
        }
        .into_filter();
        assert!(bad.is_err());
    }
}
