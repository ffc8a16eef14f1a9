//! Membership API handlers using repository pattern

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
use crate::models::Role;

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub founder_id: i32,
    pub receiver_id: i32,
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> impl IntoResponse {
    match state.relationship_repo.list_by_book(book_id).await {
        Ok(members) => Json(json!({
            "members": members,
            "total": members.len()
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_member(
    State(state): State<AppState>,
    Path((book_id, member_id)): Path<(i32, i32)>,
) -> impl IntoResponse {
    match state
        .relationship_repo
        .find_by_book_and_member(book_id, member_id)
        .await
    {
        Ok(member) => (StatusCode::OK, Json(member)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Set a member's role; adds the member when not yet part of the book
pub async fn update_member_role(
    State(state): State<AppState>,
    Path((book_id, member_id)): Path<(i32, i32)>,
    Json(payload): Json<UpdateRoleRequest>,
) -> impl IntoResponse {
    match state
        .relationship_repo
        .update_role(book_id, member_id, payload.role)
        .await
    {
        Ok(member) => (StatusCode::OK, Json(member)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((book_id, member_id)): Path<(i32, i32)>,
) -> impl IntoResponse {
    match state.relationship_repo.delete(book_id, member_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn transfer_founder(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
    Json(payload): Json<TransferRequest>,
) -> impl IntoResponse {
    match state
        .relationship_repo
        .transfer(book_id, payload.founder_id, payload.receiver_id)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": "Founder transferred"})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_relationship(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match state.relationship_repo.find_by_id(id).await {
        Ok(relationship) => (StatusCode::OK, Json(relationship)).into_response(),
        Err(e) => error_response(e),
    }
}
