use axum::{
    Router,
    extract::{Path as AxumPath, Query, State, rejection::QueryRejection},
    routing::get,
};

use super::{AppState, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::store::{ChannelStats, VideoFilter, VideoView};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/{channel_id}/stats", get(channel_stats))
        .route("/{channel_id}/videos", get(channel_videos))
}

async fn existing_channel(state: &AppState, raw_id: &str) -> ApiResult<String> {
    let channel_id = parse_id(raw_id, "channel")?;
    if state.store.find_user_by_id(&channel_id).await?.is_none() {
        return Err(ApiError::not_found("Channel not found"));
    }
    Ok(channel_id)
}

async fn channel_stats(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<ChannelStats>> {
    let channel_id = existing_channel(&state, &channel_id).await?;
    let stats = state.store.channel_stats(&channel_id).await?;
    Ok(ApiResponse::ok("Channel stats fetched successfully", stats))
}

/// Every video of the channel, unpublished ones included.
async fn channel_videos(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(channel_id): AxumPath<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<VideoView>>> {
    let channel_id = existing_channel(&state, &channel_id).await?;
    let Query(query) = query?;
    let filter = VideoFilter {
        owner_id: Some(channel_id.as_str()),
        include_unpublished: true,
    };
    let page = state.store.list_videos(filter, query.parse()?).await?;
    Ok(ApiResponse::ok("Channel videos fetched successfully", page))
}
