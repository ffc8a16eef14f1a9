//! Book API handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::error_response;
use crate::infrastructure::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
}

pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookRequest>,
) -> impl IntoResponse {
    match state.book_repo.create(payload.title).await {
        Ok(book) => (StatusCode::CREATED, Json(book)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> impl IntoResponse {
    match state.book_repo.find_by_id(book_id).await {
        Ok(Some(book)) => (StatusCode::OK, Json(book)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "project not found"})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
