use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use super::error::ApiResult;
use super::{AppState, Written};
use crate::core::model::Author;

#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    responses(
        (status = 200, description = "Every author", body = [Author]),
        (status = 503, description = "Storage unreachable", body = String),
    )
)]
pub async fn list_authors(State(state): State<AppState>) -> ApiResult<Json<Vec<Author>>> {
    Ok(Json(state.storage.authors().await?))
}

#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    request_body = Author,
    responses(
        (status = 200, description = "Author created", body = Written),
        (status = 409, description = "Id already taken", body = String),
    )
)]
pub async fn add_author(
    State(state): State<AppState>,
    body: Result<Json<Author>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(author) = body?;
    let id = state.storage.add_author(author).await?;
    Ok(Json(Written { id }))
}

#[utoipa::path(
    put,
    path = "/authors",
    tag = "authors",
    request_body = Author,
    responses(
        (status = 200, description = "Author replaced", body = Written),
        (status = 404, description = "No such author", body = String),
    )
)]
pub async fn update_author(
    State(state): State<AppState>,
    body: Result<Json<Author>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(author) = body?;
    let id = state.storage.update_author(author).await?;
    Ok(Json(Written { id }))
}

/// Only `id` of the body is used.
#[utoipa::path(
    delete,
    path = "/authors",
    tag = "authors",
    request_body = Author,
    responses(
        (status = 200, description = "Author removed; its posts stay", body = Written),
        (status = 404, description = "No such author", body = String),
    )
)]
pub async fn delete_author(
    State(state): State<AppState>,
    body: Result<Json<Author>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(author) = body?;
    let id = state.storage.delete_author(author).await?;
    Ok(Json(Written { id }))
}
