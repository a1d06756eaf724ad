//! services/api/src/web/router.rs
//!
//! Assembles the route table: public catalog and registration, member routes
//! behind `require_member`, and admin routes behind `require_admin`.

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::web::middleware::{require_admin, require_member, MEMBER_HEADER};
use crate::web::rest::ApiDoc;
use crate::web::state::AppState;
use crate::web::{activity, catalog, fines, loans, members, notifications, reservations};

/// Builds the full application router, including the Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(MEMBER_HEADER),
        ]);

    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/members", post(members::register_handler))
        .route("/books", get(catalog::list_books_handler))
        .route("/books/{id}", get(catalog::get_book_handler));

    // Member routes
    let member_routes = Router::new()
        .route("/me", get(members::me_handler))
        .route(
            "/reservations",
            post(reservations::reserve_handler).get(reservations::my_reservations_handler),
        )
        .route(
            "/reservations/{id}",
            delete(reservations::cancel_reservation_handler),
        )
        .route("/loans", get(loans::my_loans_handler))
        .route("/fines", get(fines::my_fines_handler))
        .route("/notifications", get(notifications::list_notifications_handler))
        .route(
            "/notifications/read-all",
            post(notifications::mark_all_read_handler),
        )
        .route(
            "/notifications/{id}/read",
            post(notifications::mark_read_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_member,
        ));

    // Admin routes; `require_member` is the outer layer so it runs first.
    let admin_routes = Router::new()
        .route("/admin/books", post(catalog::create_book_handler))
        .route(
            "/admin/books/{id}",
            put(catalog::update_book_handler).delete(catalog::delete_book_handler),
        )
        .route("/admin/members", get(members::list_members_handler))
        .route(
            "/admin/members/{id}",
            put(members::update_member_handler).delete(members::delete_member_handler),
        )
        .route(
            "/admin/reservations",
            get(reservations::list_reservations_handler),
        )
        .route(
            "/admin/reservations/count",
            get(reservations::count_reservations_handler),
        )
        .route(
            "/admin/loans",
            post(loans::issue_handler).get(loans::list_loans_handler),
        )
        .route("/admin/loans/summary", get(loans::loan_summary_handler))
        .route(
            "/admin/loans/{id}",
            get(loans::get_loan_handler).delete(loans::delete_loan_handler),
        )
        .route("/admin/loans/{id}/return", post(loans::return_handler))
        .route("/admin/fines", get(fines::list_fines_handler))
        .route("/admin/fines/summary", get(fines::fine_summary_handler))
        .route(
            "/admin/fines/{id}",
            get(fines::get_fine_handler).delete(fines::delete_fine_handler),
        )
        .route("/admin/fines/{id}/pay", post(fines::pay_fine_handler))
        .route("/admin/activity", get(activity::list_activity_handler))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_member,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
