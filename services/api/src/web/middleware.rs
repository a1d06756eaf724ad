//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.
//!
//! The request layer in front of this service authenticates the caller and
//! forwards the member id in the `x-member-id` header.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use library_core::domain::Member;
use library_core::ports::PortError;
use std::sync::Arc;

use crate::web::rest::{port_error, HandlerError};
use crate::web::state::AppState;

pub const MEMBER_HEADER: &str = "x-member-id";

/// Middleware that resolves the `x-member-id` header to a `Member`.
///
/// If valid, inserts the member into request extensions for handlers to use.
/// If missing, malformed or unknown, returns 401 Unauthorized.
pub async fn require_member(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HandlerError> {
    let member_id = req
        .headers()
        .get(MEMBER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| port_error(PortError::Unauthorized))?;

    let member = state.store.get_member(member_id).await.map_err(|e| match e {
        PortError::NotFound(_) => port_error(PortError::Unauthorized),
        other => port_error(other),
    })?;

    req.extensions_mut().insert(member);
    Ok(next.run(req).await)
}

/// Middleware that only lets administrators through. Must run after
/// `require_member`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, HandlerError> {
    match req.extensions().get::<Member>() {
        Some(member) if member.is_admin() => Ok(next.run(req).await),
        Some(member) => Err(port_error(PortError::Forbidden(format!(
            "Member {} is not an administrator",
            member.id
        )))),
        None => Err(port_error(PortError::Unauthorized)),
    }
}
