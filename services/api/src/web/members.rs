//! services/api/src/web/members.rs
//!
//! Member registration, the member dashboard and the admin member roster.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use library_core::domain::{Member, MemberDraft, MemberSummary, Role};
use library_core::ports::PortError;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::web::rest::{bad_request, port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub address: String,
    pub mob_no: String,
    pub email: String,
    pub password: String,
    /// `admin` or `user`; defaults to `user`.
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateMemberRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub address: String,
    pub mob_no: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize, ToSchema)]
pub struct MemberResponse {
    pub member_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub mob_no: String,
    pub email: String,
    pub role: String,
}

impl From<Member> for MemberResponse {
    fn from(m: Member) -> Self {
        Self {
            member_id: m.id,
            role: m.role.as_str().to_string(),
            first_name: m.first_name,
            last_name: m.last_name,
            address: m.address,
            mob_no: m.mob_no,
            email: m.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    pub total_loans: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub pending_fines_amount: i64,
}

impl From<MemberSummary> for SummaryResponse {
    fn from(s: MemberSummary) -> Self {
        Self {
            total_loans: s.total_loans,
            active_loans: s.active_loans,
            overdue_loans: s.overdue_loans,
            pending_fines_amount: s.pending_fines_amount,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub member: MemberResponse,
    pub summary: SummaryResponse,
}

//=========================================================================================
// Validation
//=========================================================================================

fn parse_role(role: Option<&str>) -> Result<Role, HandlerError> {
    match role {
        None => Ok(Role::User),
        Some(r) => r.trim().parse::<Role>().map_err(bad_request),
    }
}

fn validate_profile(
    first_name: &str,
    last_name: &str,
    mob_no: &str,
    email: &str,
) -> Result<(), HandlerError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(bad_request("first_name and last_name are required"));
    }
    if mob_no.trim().is_empty() {
        return Err(bad_request("mob_no is required"));
    }
    if !email.contains('@') {
        return Err(bad_request("email is not valid"));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            port_error(PortError::Unexpected("password hashing failed".to_string()))
        })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /members - Register a new member
#[utoipa::path(
    post,
    path = "/members",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Member registered", body = MemberResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Mobile number already registered", body = ErrorResponse)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    validate_profile(&req.first_name, &req.last_name, &req.mob_no, &req.email)?;
    if req.password.len() < 6 {
        return Err(bad_request("password must be at least 6 characters"));
    }
    let role = parse_role(req.role.as_deref())?;

    let password_hash = hash_password(&req.password)?;
    let draft = MemberDraft {
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        address: req.address,
        mob_no: req.mob_no.trim().to_string(),
        email: req.email.trim().to_string(),
        role,
    };

    let member = state
        .store
        .create_member(&draft, &password_hash)
        .await
        .map_err(port_error)?;
    info!(member_id = member.id, role = %member.role, "Member registered");

    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

/// GET /me - The calling member's profile and dashboard figures
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile and loan summary", body = DashboardResponse),
        (status = 401, description = "Unknown member", body = ErrorResponse)
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(member): Extension<Member>,
) -> Result<Json<DashboardResponse>, HandlerError> {
    let summary = state
        .store
        .member_summary(member.id, state.today())
        .await
        .map_err(port_error)?;
    Ok(Json(DashboardResponse {
        member: member.into(),
        summary: summary.into(),
    }))
}

/// GET /admin/members - Every registered member
#[utoipa::path(
    get,
    path = "/admin/members",
    responses(
        (status = 200, description = "All members", body = [MemberResponse]),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse)
    )
)]
pub async fn list_members_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MemberResponse>>, HandlerError> {
    let members = state.store.list_members().await.map_err(port_error)?;
    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// PUT /admin/members/{id} - Edit a member's profile or role
#[utoipa::path(
    put,
    path = "/admin/members/{id}",
    params(("id" = i64, Path, description = "Member id")),
    request_body = UpdateMemberRequest,
    responses(
        (status = 200, description = "Member updated", body = MemberResponse),
        (status = 404, description = "No such member", body = ErrorResponse),
        (status = 409, description = "Mobile number already registered", body = ErrorResponse)
    )
)]
pub async fn update_member_handler(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<i64>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<MemberResponse>, HandlerError> {
    validate_profile(&req.first_name, &req.last_name, &req.mob_no, &req.email)?;
    let role = parse_role(Some(&req.role))?;
    let draft = MemberDraft {
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        address: req.address,
        mob_no: req.mob_no.trim().to_string(),
        email: req.email.trim().to_string(),
        role,
    };

    let member = state
        .store
        .update_member(member_id, &draft)
        .await
        .map_err(port_error)?;
    Ok(Json(member.into()))
}

/// DELETE /admin/members/{id} - Remove a member with no circulation history
#[utoipa::path(
    delete,
    path = "/admin/members/{id}",
    params(("id" = i64, Path, description = "Member id")),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "No such member", body = ErrorResponse),
        (status = 409, description = "Member has loans, reservations or notifications", body = ErrorResponse)
    )
)]
pub async fn delete_member_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Member>,
    Path(member_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    if admin.id == member_id {
        return Err(port_error(PortError::Conflict(
            "Administrators cannot delete their own account".to_string(),
        )));
    }
    state.store.delete_member(member_id).await.map_err(port_error)?;
    warn!(member_id, deleted_by = admin.id, "Member deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(parse_role(None).ok(), Some(Role::User));
        assert_eq!(parse_role(Some("admin")).ok(), Some(Role::Admin));
        assert!(parse_role(Some("librarian")).is_err());
    }

    #[test]
    fn profile_requires_names_and_email() {
        assert!(validate_profile("Ada", "Lovelace", "555", "ada@example.com").is_ok());
        assert!(validate_profile(" ", "Lovelace", "555", "ada@example.com").is_err());
        assert!(validate_profile("Ada", "Lovelace", "", "ada@example.com").is_err());
        assert!(validate_profile("Ada", "Lovelace", "555", "not-an-email").is_err());
    }

    #[test]
    fn password_hash_is_phc_string() {
        let hash = hash_password("hunter22").expect("hashing succeeds");
        assert!(hash.starts_with("$argon2"));
    }
}
