pub mod books;
pub mod health;
pub mod members;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::domain::DomainError;
use crate::infrastructure::AppState;

/// Map a domain failure to a JSON error response
pub(crate) fn error_response(e: DomainError) -> Response {
    let status = match &e {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(json!({ "error": e.message() }))).into_response()
}

pub fn api_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Books
        .route("/books", post(books::create_book))
        .route("/books/:book_id", get(books::get_book))
        // Members
        .route("/books/:book_id/members", get(members::list_members))
        .route(
            "/books/:book_id/members/:member_id",
            get(members::get_member)
                .put(members::update_member_role)
                .delete(members::remove_member),
        )
        .route("/books/:book_id/transfer", post(members::transfer_founder))
        .route("/relationships/:id", get(members::get_relationship))
        .with_state(state)
}
