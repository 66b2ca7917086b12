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
use crate::store::{OwnerSummary, SubscriptionKey};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/my-subscribed-channels", get(my_subscribed_channels))
        .route("/{channel_id}", patch(toggle_subscription))
        .route("/{channel_id}/subscribers", get(channel_subscribers))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionState {
    subscribed: bool,
    subscriber_count: u64,
}

/// 201 when the subscription was created, 200 when it was removed.
async fn toggle_subscription(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<SubscriptionState>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let key = SubscriptionKey::new(channel_id, caller.id.as_str())
        .map_err(|err| ApiError::invalid(err.to_string()))?;
    if state.store.find_user_by_id(key.channel_id()).await?.is_none() {
        return Err(ApiError::not_found("Channel not found"));
    }

    let toggled = state.store.toggle(&key).await?;
    let data = SubscriptionState {
        subscribed: toggled.is_added(),
        subscriber_count: toggled.count,
    };
    Ok(if toggled.is_added() {
        ApiResponse::created("Subscribed successfully", data)
    } else {
        ApiResponse::ok("Unsubscribed successfully", data)
    })
}

async fn channel_subscribers(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(channel_id): AxumPath<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<OwnerSummary>>> {
    let channel_id = parse_id(&channel_id, "channel")?;
    let Query(query) = query?;
    let request = query.parse()?;
    if state.store.find_user_by_id(&channel_id).await?.is_none() {
        return Err(ApiError::not_found("Channel not found"));
    }
    let page = state.store.channel_subscribers(&channel_id, request).await?;
    Ok(ApiResponse::ok("Subscribers fetched successfully", page))
}

async fn my_subscribed_channels(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<OwnerSummary>>> {
    let Query(query) = query?;
    let page = state
        .store
        .subscribed_channels(&caller.id, query.parse()?)
        .await?;
    Ok(ApiResponse::ok("Subscribed channels fetched successfully", page))
}
