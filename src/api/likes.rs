use axum::{
    Router,
    extract::{Path as AxumPath, Query, State, rejection::QueryRejection},
    routing::{get, patch},
};
use serde::Serialize;

use super::{AppState, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::store::{LikeKey, LikeTarget, LikedVideo};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/video/{video_id}", patch(toggle_video_like))
        .route("/tweet/{tweet_id}", patch(toggle_tweet_like))
        .route("/comment/{comment_id}", patch(toggle_comment_like))
        .route("/videos", get(liked_videos))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeState {
    liked: bool,
    like_count: u64,
}

async fn toggle_video_like(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    toggle_like(&state, &caller.id, LikeTarget::Video, &video_id).await
}

async fn toggle_tweet_like(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(tweet_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    toggle_like(&state, &caller.id, LikeTarget::Tweet, &tweet_id).await
}

async fn toggle_comment_like(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(comment_id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    toggle_like(&state, &caller.id, LikeTarget::Comment, &comment_id).await
}

async fn toggle_like(
    state: &AppState,
    caller_id: &str,
    target: LikeTarget,
    raw_id: &str,
) -> ApiResult<ApiResponse<LikeState>> {
    let target_id = parse_id(raw_id, target.as_str())?;
    let exists = match target {
        LikeTarget::Video => state.store.find_video(&target_id).await?.is_some(),
        LikeTarget::Tweet => state.store.find_tweet(&target_id).await?.is_some(),
        LikeTarget::Comment => state.store.find_comment(&target_id).await?.is_some(),
    };
    if !exists {
        return Err(ApiError::not_found(format!("{} not found", capitalized(target))));
    }

    let toggled = state
        .store
        .toggle(&LikeKey::new(target, target_id, caller_id))
        .await?;
    let message = if toggled.is_added() {
        format!("{} liked", capitalized(target))
    } else {
        format!("{} unliked", capitalized(target))
    };
    Ok(ApiResponse::ok(
        message,
        LikeState {
            liked: toggled.is_added(),
            like_count: toggled.count,
        },
    ))
}

fn capitalized(target: LikeTarget) -> &'static str {
    match target {
        LikeTarget::Video => "Video",
        LikeTarget::Tweet => "Tweet",
        LikeTarget::Comment => "Comment",
    }
}

async fn liked_videos(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<LikedVideo>>> {
    let Query(query) = query?;
    let page = state.store.liked_videos(&caller.id, query.parse()?).await?;
    Ok(ApiResponse::ok("Liked videos fetched successfully", page))
}
