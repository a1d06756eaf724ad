//! services/api/src/web/catalog.rs
//!
//! Catalog endpoints: browsing books with their availability, and the admin
//! inventory operations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use library_core::domain::{BookAvailability, BookDraft};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{bad_request, port_error, ErrorResponse, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct BookQuery {
    /// Matches title, author or category, case-insensitively.
    pub q: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct BookRequest {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub publisher: String,
    pub year: i32,
    #[serde(default)]
    pub edition: String,
    pub total_stock: i64,
}

impl BookRequest {
    fn into_draft(self) -> Result<BookDraft, HandlerError> {
        if self.title.trim().is_empty() {
            return Err(bad_request("title must not be empty"));
        }
        if self.author.trim().is_empty() {
            return Err(bad_request("author must not be empty"));
        }
        if self.total_stock < 0 {
            return Err(bad_request("total_stock must not be negative"));
        }
        Ok(BookDraft {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            category: self.category,
            publisher: self.publisher,
            year: self.year,
            edition: self.edition,
            total_stock: self.total_stock,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub category: String,
    pub publisher: String,
    pub year: i32,
    pub edition: String,
    pub total_stock: i64,
    pub active_loans: i64,
    pub available_copies: i64,
}

impl From<BookAvailability> for BookResponse {
    fn from(a: BookAvailability) -> Self {
        Self {
            book_id: a.book.id,
            title: a.book.title,
            author: a.book.author,
            category: a.book.category,
            publisher: a.book.publisher,
            year: a.book.year,
            edition: a.book.edition,
            total_stock: a.book.total_stock,
            active_loans: a.active_loans,
            available_copies: a.available_copies,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /books - List the catalog with live availability
#[utoipa::path(
    get,
    path = "/books",
    params(BookQuery),
    responses(
        (status = 200, description = "Books in title order", body = [BookResponse])
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> Result<Json<Vec<BookResponse>>, HandlerError> {
    let books = state
        .store
        .list_books(query.q.as_deref())
        .await
        .map_err(port_error)?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// GET /books/{id} - A single book with its availability
#[utoipa::path(
    get,
    path = "/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "The book", body = BookResponse),
        (status = 404, description = "No such book", body = ErrorResponse)
    )
)]
pub async fn get_book_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<Json<BookResponse>, HandlerError> {
    let book = state.store.get_book(book_id).await.map_err(port_error)?;
    Ok(Json(book.into()))
}

/// POST /admin/books - Add a title to the catalog
#[utoipa::path(
    post,
    path = "/admin/books",
    request_body = BookRequest,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Invalid book", body = ErrorResponse)
    )
)]
pub async fn create_book_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let draft = req.into_draft()?;
    let book = state.store.create_book(&draft).await.map_err(port_error)?;
    info!(book_id = book.id, title = %book.title, "Book added to catalog");

    let created = state.store.get_book(book.id).await.map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(BookResponse::from(created))))
}

/// PUT /admin/books/{id} - Edit a book
#[utoipa::path(
    put,
    path = "/admin/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    request_body = BookRequest,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 404, description = "No such book", body = ErrorResponse),
        (status = 409, description = "Stock would fall below active loans", body = ErrorResponse)
    )
)]
pub async fn update_book_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    Json(req): Json<BookRequest>,
) -> Result<Json<BookResponse>, HandlerError> {
    let draft = req.into_draft()?;
    state
        .store
        .update_book(book_id, &draft)
        .await
        .map_err(port_error)?;
    let updated = state.store.get_book(book_id).await.map_err(port_error)?;
    Ok(Json(updated.into()))
}

/// DELETE /admin/books/{id} - Remove a book with no loan or reservation history
#[utoipa::path(
    delete,
    path = "/admin/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "No such book", body = ErrorResponse),
        (status = 409, description = "Book is referenced by loans or reservations", body = ErrorResponse)
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    state.store.delete_book(book_id).await.map_err(port_error)?;
    info!(book_id, "Book removed from catalog");
    Ok(StatusCode::NO_CONTENT)
}
