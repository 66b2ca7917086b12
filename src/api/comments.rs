use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State, rejection::{JsonRejection, QueryRejection}},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{AppState, ensure_owner, non_blank, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::store::{CommentRecord, CommentView, UserProfile};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/{video_id}", post(add_comment))
        .route("/video-comments/{video_id}", get(video_comments))
        .route("/get-comment/{video_id}/{comment_id}", get(get_comment))
        .route("/update-comment/{video_id}/{comment_id}", patch(update_comment))
        .route("/delete-comment/{video_id}/{comment_id}", delete(delete_comment))
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    content: Option<String>,
}

fn comment_content(body: CommentBody) -> ApiResult<String> {
    non_blank(body.content.as_deref()).ok_or_else(|| ApiError::invalid("Content is required"))
}

async fn add_comment(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    payload: Result<Json<CommentBody>, JsonRejection>,
) -> ApiResult<ApiResponse<CommentRecord>> {
    let video_id = parse_id(&video_id, "video")?;
    let Json(body) = payload?;
    let content = comment_content(body)?;

    if state.store.find_video(&video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    let comment = state
        .store
        .create_comment(&video_id, &caller.id, &content)
        .await?;
    Ok(ApiResponse::created("Comment added successfully", comment))
}

async fn video_comments(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(video_id): AxumPath<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<CommentView>>> {
    let video_id = parse_id(&video_id, "video")?;
    let Query(query) = query?;
    let request = query.parse()?;

    if state.store.find_video(&video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    let page = state.store.list_video_comments(&video_id, request).await?;
    Ok(ApiResponse::ok("Comments fetched successfully", page))
}

/// Loads a comment addressed through its video, rejecting a path whose video
/// does not match the comment's own.
async fn load_comment(state: &AppState, video_id: &str, comment_id: &str) -> ApiResult<CommentRecord> {
    let video_id = parse_id(video_id, "video")?;
    let comment_id = parse_id(comment_id, "comment")?;
    let comment = state
        .store
        .find_comment(&comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.video_id != video_id {
        return Err(ApiError::invalid("Comment does not belong to this video"));
    }
    Ok(comment)
}

async fn owned_comment(
    state: &AppState,
    caller: &UserProfile,
    video_id: &str,
    comment_id: &str,
    action: &str,
) -> ApiResult<CommentRecord> {
    let comment = load_comment(state, video_id, comment_id).await?;
    ensure_owner(&comment, caller, action)?;
    Ok(comment)
}

async fn get_comment(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath((video_id, comment_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<CommentView>> {
    let comment = load_comment(&state, &video_id, &comment_id).await?;
    let view = state
        .store
        .find_comment_view(&comment.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    Ok(ApiResponse::ok("Comment fetched successfully", view))
}

async fn update_comment(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath((video_id, comment_id)): AxumPath<(String, String)>,
    payload: Result<Json<CommentBody>, JsonRejection>,
) -> ApiResult<ApiResponse<CommentRecord>> {
    let comment =
        owned_comment(&state, &caller, &video_id, &comment_id, "edit this comment").await?;
    let Json(body) = payload?;
    let content = comment_content(body)?;

    let updated = state
        .store
        .update_comment(&comment.id, &content)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    Ok(ApiResponse::ok("Comment updated successfully", updated))
}

async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath((video_id, comment_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let comment =
        owned_comment(&state, &caller, &video_id, &comment_id, "delete this comment").await?;
    if !state.store.delete_comment(&comment.id).await? {
        return Err(ApiError::not_found("Comment not found"));
    }
    Ok(ApiResponse::ok(
        "Comment deleted successfully",
        json!({ "commentId": comment.id }),
    ))
}
