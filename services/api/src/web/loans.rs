//! services/api/src/web/loans.rs
//!
//! Loan endpoints: issuing, returning and auditing loans, plus the member's
//! own borrowing history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveDate;
use library_core::domain::{
    IssueReceipt, Loan, LoanDetails, LoanFilter, LoanStatusFilter, LoanSummary, Member,
    ReturnOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::web::fines::FineResponse;
use crate::web::rest::{bad_request, port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct IssueRequest {
    pub member_id: i64,
    pub book_id: i64,
    /// Require and consume the member's active reservation for the book.
    #[serde(default)]
    pub from_reservation: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct LoanQuery {
    /// `active` (or `pending`), `returned` or `overdue`.
    pub status: Option<String>,
    pub member_id: Option<i64>,
    /// Earliest issue date, inclusive.
    pub date_from: Option<NaiveDate>,
    /// Latest issue date, inclusive.
    pub date_to: Option<NaiveDate>,
    /// Part of the member's name.
    pub member: Option<String>,
}

impl LoanQuery {
    fn into_filter(self) -> Result<LoanFilter, HandlerError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<LoanStatusFilter>)
            .transpose()
            .map_err(bad_request)?;
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(bad_request("date_from must not be after date_to"));
            }
        }
        Ok(LoanFilter {
            status,
            member_id: self.member_id,
            issued_from: self.date_from,
            issued_to: self.date_to,
            member_name: self.member,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct IssueResponse {
    pub loan_id: i64,
    pub member_id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub fulfilled_reservation: bool,
}

impl From<IssueReceipt> for IssueResponse {
    fn from(r: IssueReceipt) -> Self {
        Self {
            loan_id: r.loan.id,
            member_id: r.loan.member_id,
            book_id: r.loan.book_id,
            book_title: r.book_title,
            issue_date: r.loan.issue_date,
            due_date: r.loan.due_date,
            fulfilled_reservation: r.fulfilled_reservation,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    pub loan_id: i64,
    pub member_id: i64,
    pub member_name: String,
    pub book_id: i64,
    pub book_title: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    /// `active` or `returned`.
    pub status: String,
    pub days_overdue: i64,
    pub fine: Option<FineResponse>,
}

fn loan_status(loan: &Loan) -> &'static str {
    if loan.state.is_active() {
        "active"
    } else {
        "returned"
    }
}

impl From<LoanDetails> for LoanResponse {
    fn from(d: LoanDetails) -> Self {
        Self {
            status: loan_status(&d.loan).to_string(),
            loan_id: d.loan.id,
            member_id: d.loan.member_id,
            member_name: d.member_name,
            book_id: d.loan.book_id,
            book_title: d.book_title,
            issue_date: d.loan.issue_date,
            due_date: d.loan.due_date,
            return_date: d.loan.state.return_date(),
            days_overdue: d.days_overdue,
            fine: d.fine.map(Into::into),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    #[serde(flatten)]
    pub loan: LoanResponse,
    /// True when the loan had been returned before this request.
    pub already_returned: bool,
}

#[derive(Serialize, ToSchema)]
pub struct LoanSummaryResponse {
    pub total: i64,
    pub active: i64,
    pub returned: i64,
    pub overdue: i64,
}

impl From<LoanSummary> for LoanSummaryResponse {
    fn from(s: LoanSummary) -> Self {
        Self {
            total: s.total,
            active: s.active,
            returned: s.returned,
            overdue: s.overdue,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /admin/loans - Issue a book to a member
#[utoipa::path(
    post,
    path = "/admin/loans",
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Book issued", body = IssueResponse),
        (status = 404, description = "No such member, book or reservation", body = ErrorResponse),
        (status = 409, description = "No copy available", body = ErrorResponse)
    )
)]
pub async fn issue_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let receipt = state
        .circulation
        .issue(req.member_id, req.book_id, state.today(), req.from_reservation)
        .await
        .map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(IssueResponse::from(receipt))))
}

/// GET /loans - The caller's borrowing history
#[utoipa::path(
    get,
    path = "/loans",
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans of the calling member, newest first", body = [LoanResponse])
    )
)]
pub async fn my_loans_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
    Query(query): Query<LoanQuery>,
) -> Result<Json<Vec<LoanResponse>>, HandlerError> {
    let mut filter = query.into_filter()?;
    filter.member_id = Some(member.id);
    let loans = state
        .store
        .list_loans(&filter, state.today())
        .await
        .map_err(port_error)?;
    Ok(Json(loans.into_iter().map(Into::into).collect()))
}

/// GET /admin/loans - All loans, optionally filtered
#[utoipa::path(
    get,
    path = "/admin/loans",
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans, newest first", body = [LoanResponse]),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    )
)]
pub async fn list_loans_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoanQuery>,
) -> Result<Json<Vec<LoanResponse>>, HandlerError> {
    let filter = query.into_filter()?;
    debug!(?filter, "Listing loans");
    let loans = state
        .store
        .list_loans(&filter, state.today())
        .await
        .map_err(port_error)?;
    Ok(Json(loans.into_iter().map(Into::into).collect()))
}

/// GET /admin/loans/summary - Loan counts
#[utoipa::path(
    get,
    path = "/admin/loans/summary",
    responses(
        (status = 200, description = "Loan counts as of today", body = LoanSummaryResponse)
    )
)]
pub async fn loan_summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LoanSummaryResponse>, HandlerError> {
    let summary = state
        .store
        .loan_summary(state.today())
        .await
        .map_err(port_error)?;
    Ok(Json(summary.into()))
}

/// GET /admin/loans/{id} - A single loan with its fine
#[utoipa::path(
    get,
    path = "/admin/loans/{id}",
    params(("id" = i64, Path, description = "Loan id")),
    responses(
        (status = 200, description = "The loan", body = LoanResponse),
        (status = 404, description = "No such loan", body = ErrorResponse)
    )
)]
pub async fn get_loan_handler(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<i64>,
) -> Result<Json<LoanResponse>, HandlerError> {
    let loan = state
        .store
        .get_loan(loan_id, state.today())
        .await
        .map_err(port_error)?;
    Ok(Json(loan.into()))
}

/// POST /admin/loans/{id}/return - Check a loan back in, assessing any fine
#[utoipa::path(
    post,
    path = "/admin/loans/{id}/return",
    params(("id" = i64, Path, description = "Loan id")),
    responses(
        (status = 200, description = "Loan is returned", body = ReturnResponse),
        (status = 404, description = "No such loan", body = ErrorResponse)
    )
)]
pub async fn return_handler(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<i64>,
) -> Result<Json<ReturnResponse>, HandlerError> {
    let today = state.today();
    let outcome = state
        .circulation
        .process_return(loan_id, today)
        .await
        .map_err(port_error)?;
    let already_returned = matches!(outcome, ReturnOutcome::AlreadyReturned(_));

    let details = state
        .store
        .get_loan(loan_id, today)
        .await
        .map_err(port_error)?;
    Ok(Json(ReturnResponse {
        loan: details.into(),
        already_returned,
    }))
}

/// DELETE /admin/loans/{id} - Remove a loan and its fine
#[utoipa::path(
    delete,
    path = "/admin/loans/{id}",
    params(("id" = i64, Path, description = "Loan id")),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "No such loan", body = ErrorResponse)
    )
)]
pub async fn delete_loan_handler(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    state
        .circulation
        .delete_loan(loan_id)
        .await
        .map_err(port_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<&str>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> LoanQuery {
        LoanQuery {
            status: status.map(str::to_string),
            member_id: None,
            date_from: from,
            date_to: to,
            member: Some("ada".to_string()),
        }
    }

    #[test]
    fn loan_query_builds_filter() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let filter = query(Some("overdue"), Some(from), Some(to))
            .into_filter()
            .expect("valid filter");
        assert_eq!(filter.status, Some(LoanStatusFilter::Overdue));
        assert_eq!(filter.issued_from, Some(from));
        assert_eq!(filter.issued_to, Some(to));
        assert_eq!(filter.member_name.as_deref(), Some("ada"));
    }

    #[test]
    fn loan_query_rejects_bad_input() {
        let from = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(query(None, Some(from), Some(to)).into_filter().is_err());
        assert!(query(Some("lost"), None, None).into_filter().is_err());
    }
}
