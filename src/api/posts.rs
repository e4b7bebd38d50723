use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use super::error::ApiResult;
use super::{AppState, Written};
use crate::core::model::Post;

#[utoipa::path(
    get,
    path = "/posts",
    tag = "posts",
    responses(
        (status = 200, description = "Every post with author name and formatted timestamps", body = [Post]),
        (status = 503, description = "Storage unreachable", body = String),
    )
)]
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(state.storage.posts().await?))
}

#[utoipa::path(
    post,
    path = "/posts",
    tag = "posts",
    request_body = Post,
    responses(
        (status = 200, description = "Post created", body = Written),
        (status = 409, description = "Id already taken", body = String),
        (status = 422, description = "Author does not exist", body = String),
    )
)]
pub async fn add_post(
    State(state): State<AppState>,
    body: Result<Json<Post>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(post) = body?;
    let id = state.storage.add_post(post).await?;
    Ok(Json(Written { id }))
}

#[utoipa::path(
    put,
    path = "/posts",
    tag = "posts",
    request_body = Post,
    responses(
        (status = 200, description = "Post replaced", body = Written),
        (status = 404, description = "No such post", body = String),
        (status = 422, description = "Author does not exist", body = String),
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    body: Result<Json<Post>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(post) = body?;
    let id = state.storage.update_post(post).await?;
    Ok(Json(Written { id }))
}

/// Only `id` of the body is used.
#[utoipa::path(
    delete,
    path = "/posts",
    tag = "posts",
    request_body = Post,
    responses(
        (status = 200, description = "Post removed", body = Written),
        (status = 404, description = "No such post", body = String),
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    body: Result<Json<Post>, JsonRejection>,
) -> ApiResult<Json<Written>> {
    let Json(post) = body?;
    let id = state.storage.delete_post(post).await?;
    Ok(Json(Written { id }))
}
