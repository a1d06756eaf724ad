//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the mapping from
//! core port errors to HTTP responses shared by every handler.

use axum::{http::StatusCode, Json};
use library_core::ports::PortError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

use crate::web::{activity, catalog, fines, loans, members, notifications, reservations};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        catalog::list_books_handler,
        catalog::get_book_handler,
        catalog::create_book_handler,
        catalog::update_book_handler,
        catalog::delete_book_handler,
        members::register_handler,
        members::me_handler,
        members::list_members_handler,
        members::update_member_handler,
        members::delete_member_handler,
        reservations::reserve_handler,
        reservations::my_reservations_handler,
        reservations::cancel_reservation_handler,
        reservations::list_reservations_handler,
        reservations::count_reservations_handler,
        loans::issue_handler,
        loans::my_loans_handler,
        loans::list_loans_handler,
        loans::loan_summary_handler,
        loans::get_loan_handler,
        loans::return_handler,
        loans::delete_loan_handler,
        fines::my_fines_handler,
        fines::list_fines_handler,
        fines::fine_summary_handler,
        fines::get_fine_handler,
        fines::pay_fine_handler,
        fines::delete_fine_handler,
        notifications::list_notifications_handler,
        notifications::mark_read_handler,
        notifications::mark_all_read_handler,
        activity::list_activity_handler,
    ),
    components(
        schemas(ErrorResponse)
    ),
    tags(
        (name = "Library Circulation API", description = "Catalog, reservations, loans, fines and notifications.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Responses
//=========================================================================================

/// The body of every non-2xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Converts a port error into its HTTP status and JSON body.
///
/// Business-rule failures are expected traffic and logged at `warn`; only
/// store faults are logged as errors, and their details stay in the log.
pub fn port_error(err: PortError) -> HandlerError {
    let (status, message) = match &err {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        PortError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "A valid x-member-id header is required".to_string(),
        ),
        PortError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    };

    if status.is_server_error() {
        error!("Request failed: {:?}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    (status, Json(ErrorResponse { error: message }))
}

/// Shorthand for rejecting a malformed request before it reaches the core.
pub fn bad_request(message: impl Into<String>) -> HandlerError {
    port_error(PortError::Validation(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_statuses() {
        let cases = [
            (PortError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (PortError::Unauthorized, StatusCode::UNAUTHORIZED),
            (PortError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (PortError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PortError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                PortError::Unexpected("disk I/O error".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(port_error(err).0, expected);
        }
    }

    #[test]
    fn store_faults_do_not_leak_details() {
        let (_, Json(body)) = port_error(PortError::Unexpected("disk I/O error".into()));
        assert_eq!(body.error, "Internal server error");
    }
}
