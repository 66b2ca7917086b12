use axum::{
    Json, Router,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{AppState, ensure_owner, non_blank, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::store::{PlaylistDetail, PlaylistRecord, UserProfile, WriteOutcome};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_playlist))
        .route("/user/{user_id}", get(user_playlists))
        .route(
            "/{playlist_id}",
            get(get_playlist)
                .patch(update_playlist)
                .delete(delete_playlist),
        )
        .route("/{playlist_id}/add/{video_id}", patch(add_video))
        .route("/{playlist_id}/remove/{video_id}", patch(remove_video))
}

#[derive(Debug, Deserialize)]
struct PlaylistBody {
    name: Option<String>,
    description: Option<String>,
}

async fn create_playlist(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: Result<Json<PlaylistBody>, JsonRejection>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let Json(body) = payload?;
    let name = non_blank(body.name.as_deref())
        .ok_or_else(|| ApiError::invalid("Playlist name is required"))?;
    let description = non_blank(body.description.as_deref()).unwrap_or_default();

    let playlist = state
        .store
        .create_playlist(&caller.id, &name, &description)
        .await?;
    Ok(ApiResponse::created("Playlist created successfully", playlist))
}

async fn user_playlists(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<PlaylistRecord>>> {
    let user_id = parse_id(&user_id, "user")?;
    if state.store.find_user_by_id(&user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    let playlists = state.store.list_user_playlists(&user_id).await?;
    Ok(ApiResponse::ok("Playlists fetched successfully", playlists))
}

async fn get_playlist(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<PlaylistDetail>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    let playlist = state
        .store
        .find_playlist_detail(&playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok("Playlist fetched successfully", playlist))
}

async fn owned_playlist(
    state: &AppState,
    caller: &UserProfile,
    playlist_id: &str,
    action: &str,
) -> ApiResult<PlaylistRecord> {
    let playlist = state
        .store
        .find_playlist(playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    ensure_owner(&playlist, caller, action)?;
    Ok(playlist)
}

async fn update_playlist(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
    payload: Result<Json<PlaylistBody>, JsonRejection>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    owned_playlist(&state, &caller, &playlist_id, "update this playlist").await?;

    let Json(body) = payload?;
    let name = non_blank(body.name.as_deref());
    let description = non_blank(body.description.as_deref());
    if name.is_none() && description.is_none() {
        return Err(ApiError::invalid("Name or description is required"));
    }
    let updated = state
        .store
        .update_playlist(&playlist_id, name.as_deref(), description.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok("Playlist updated successfully", updated))
}

async fn delete_playlist(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    owned_playlist(&state, &caller, &playlist_id, "delete this playlist").await?;
    if !state.store.delete_playlist(&playlist_id).await? {
        return Err(ApiError::not_found("Playlist not found"));
    }
    Ok(ApiResponse::ok(
        "Playlist deleted successfully",
        json!({ "playlistId": playlist_id }),
    ))
}

async fn add_video(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath((playlist_id, video_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    let video_id = parse_id(&video_id, "video")?;
    owned_playlist(&state, &caller, &playlist_id, "modify this playlist").await?;
    if state.store.find_video(&video_id).await?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }

    if let WriteOutcome::Duplicate = state.store.add_playlist_video(&playlist_id, &video_id).await? {
        return Err(ApiError::invalid("Video already in playlist"));
    }
    let playlist = state
        .store
        .find_playlist(&playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok("Video added to playlist", playlist))
}

async fn remove_video(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath((playlist_id, video_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let playlist_id = parse_id(&playlist_id, "playlist")?;
    let video_id = parse_id(&video_id, "video")?;
    owned_playlist(&state, &caller, &playlist_id, "modify this playlist").await?;

    if !state
        .store
        .remove_playlist_video(&playlist_id, &video_id)
        .await?
    {
        return Err(ApiError::invalid("Video is not in this playlist"));
    }
    let playlist = state
        .store
        .find_playlist(&playlist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok("Video removed from playlist", playlist))
}
