use axum::{
    Json, Router,
    extract::{Multipart, Path as AxumPath, Query, State, rejection::{JsonRejection, QueryRejection}},
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{AppState, MultipartForm, ensure_owner, non_blank, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::media::MediaKind;
use crate::pagination::{Page, PageQuery};
use crate::store::{NewVideo, VideoFilter, VideoRecord, VideoView};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos))
        .route("/upload-a-video", post(upload_video))
        .route(
            "/{video_id}",
            get(get_video).patch(update_video).delete(delete_video),
        )
        .route("/{video_id}/thumbnail", patch(update_thumbnail))
        .route("/toggle/publish/{video_id}", patch(toggle_publish))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVideosQuery {
    #[serde(flatten)]
    page: PageQuery,
    user_id: Option<String>,
}

/// Published videos, newest first. Filtering by your own id also returns the
/// unpublished ones.
async fn list_videos(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    query: Result<Query<ListVideosQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<VideoView>>> {
    let Query(query) = query?;
    let request = query.page.parse()?;
    let owner_id = match non_blank(query.user_id.as_deref()) {
        Some(raw) => Some(parse_id(&raw, "user")?),
        None => None,
    };

    let filter = VideoFilter {
        owner_id: owner_id.as_deref(),
        include_unpublished: owner_id.as_deref() == Some(caller.id.as_str()),
    };
    let page = state.store.list_videos(filter, request).await?;
    Ok(ApiResponse::ok("Videos fetched successfully", page))
}

async fn upload_video(
    State(state): State<AppState>,
    AuthUser(owner): AuthUser,
    multipart: Multipart,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let mut form = MultipartForm::read(
        multipart,
        &state.settings.temp_upload_dir,
        &["video", "thumbnail"],
    )
    .await?;

    let (Some(title), Some(description)) = (form.text("title"), form.text("description"))
    else {
        return Err(ApiError::invalid("Title and description are required"));
    };
    let video_file = form
        .take_file("video")
        .ok_or_else(|| ApiError::invalid("Video file is required"))?;
    let thumbnail_file = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::invalid("Thumbnail is required"))?;

    tracing::debug!(
        file = video_file.original_name().unwrap_or("-"),
        bytes = video_file.len(),
        "probing uploaded video"
    );
    let duration = state.media.probe_duration(video_file.path()).await?;

    let video_asset = state
        .media
        .upload(video_file.path(), MediaKind::Video)
        .await
        .ok_or_else(|| ApiError::internal("Failed to upload video file"))?;
    let Some(thumbnail_asset) = state
        .media
        .upload(thumbnail_file.path(), MediaKind::Thumbnail)
        .await
    else {
        state
            .media
            .remove(&video_asset.public_id, MediaKind::Video)
            .await;
        return Err(ApiError::internal("Failed to upload thumbnail"));
    };

    let created = state
        .store
        .create_video(NewVideo {
            owner_id: owner.id.clone(),
            video_file: video_asset.url.clone(),
            video_file_id: video_asset.public_id.clone(),
            thumbnail: thumbnail_asset.url.clone(),
            thumbnail_id: thumbnail_asset.public_id.clone(),
            title,
            description,
            duration: i64::try_from(duration).unwrap_or(i64::MAX),
        })
        .await;

    match created {
        Ok(video) => {
            tracing::info!(video_id = %video.id, owner = %owner.id, duration, "video uploaded");
            Ok(ApiResponse::created("Video uploaded successfully", video))
        }
        Err(err) => {
            state
                .media
                .remove(&video_asset.public_id, MediaKind::Video)
                .await;
            state
                .media
                .remove(&thumbnail_asset.public_id, MediaKind::Thumbnail)
                .await;
            Err(err.into())
        }
    }
}

/// Counts a view and appends the video to the caller's watch history.
async fn get_video(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<VideoView>> {
    let video_id = parse_id(&video_id, "video")?;
    if state.store.find_video(&video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }

    state.store.increment_views(&video_id).await?;
    state.store.record_watch(&caller.id, &video_id).await?;

    let view = state
        .store
        .find_video_view(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok("Video fetched successfully", view))
}

#[derive(Debug, Deserialize)]
struct UpdateVideoBody {
    title: Option<String>,
    description: Option<String>,
}

async fn update_video(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    payload: Result<Json<UpdateVideoBody>, JsonRejection>,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let video_id = parse_id(&video_id, "video")?;
    let video = state
        .store
        .find_video(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    ensure_owner(&video, &caller, "update this video")?;

    let Json(body) = payload?;
    let title = non_blank(body.title.as_deref());
    let description = non_blank(body.description.as_deref());
    if title.is_none() && description.is_none() {
        return Err(ApiError::invalid("Title or description is required"));
    }

    let updated = state
        .store
        .update_video_details(&video_id, title.as_deref(), description.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok("Video updated successfully", updated))
}

async fn update_thumbnail(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let video_id = parse_id(&video_id, "video")?;
    let mut form =
        MultipartForm::read(multipart, &state.settings.temp_upload_dir, &["thumbnail"]).await?;
    let video = state
        .store
        .find_video(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    ensure_owner(&video, &caller, "update this video")?;

    let file = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::invalid("Thumbnail is required"))?;

    let asset = state
        .media
        .upload(file.path(), MediaKind::Thumbnail)
        .await
        .ok_or_else(|| ApiError::internal("Failed to upload thumbnail"))?;
    if let Err(err) = state
        .store
        .replace_thumbnail(&video_id, &asset.url, &asset.public_id)
        .await
    {
        state
            .media
            .remove(&asset.public_id, MediaKind::Thumbnail)
            .await;
        return Err(err.into());
    }
    state
        .media
        .remove(&video.thumbnail_id, MediaKind::Thumbnail)
        .await;

    let updated = state
        .store
        .find_video(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok("Thumbnail updated successfully", updated))
}

async fn delete_video(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let video_id = parse_id(&video_id, "video")?;
    let video = state
        .store
        .find_video(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    ensure_owner(&video, &caller, "delete this video")?;

    if !state.store.delete_video(&video_id).await? {
        return Err(ApiError::not_found("Video not found"));
    }
    state
        .media
        .remove(&video.video_file_id, MediaKind::Video)
        .await;
    state
        .media
        .remove(&video.thumbnail_id, MediaKind::Thumbnail)
        .await;

    tracing::info!(video_id = %video_id, "video deleted");
    Ok(ApiResponse::ok(
        "Video deleted successfully",
        json!({ "videoId": video_id }),
    ))
}

async fn toggle_publish(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let video_id = parse_id(&video_id, "video")?;
    let video = state
        .store
        .find_video(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    ensure_owner(&video, &caller, "change this video's visibility")?;

    let updated = state
        .store
        .toggle_publish(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    let message = if updated.is_published {
        "Video published"
    } else {
        "Video unpublished"
    };
    Ok(ApiResponse::ok(message, updated))
}
