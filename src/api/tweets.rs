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
use crate::store::{TweetRecord, UserProfile};

const MAX_TWEET_CHARS: usize = 280;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-tweet", post(create_tweet))
        .route("/user-tweets/{user_id}", get(user_tweets))
        .route("/update-tweet/{tweet_id}", patch(update_tweet))
        .route("/delete-tweet/{tweet_id}", delete(delete_tweet))
}

#[derive(Debug, Deserialize)]
struct TweetBody {
    content: Option<String>,
}

fn tweet_content(body: TweetBody) -> ApiResult<String> {
    let content = non_blank(body.content.as_deref())
        .ok_or_else(|| ApiError::invalid("Tweet content is required"))?;
    if content.chars().count() > MAX_TWEET_CHARS {
        return Err(ApiError::invalid(format!(
            "Tweet cannot exceed {MAX_TWEET_CHARS} characters"
        )));
    }
    Ok(content)
}

async fn create_tweet(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: Result<Json<TweetBody>, JsonRejection>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    let Json(body) = payload?;
    let content = tweet_content(body)?;
    let tweet = state.store.create_tweet(&caller.id, &content).await?;
    Ok(ApiResponse::created("Tweet created successfully", tweet))
}

async fn user_tweets(
    State(state): State<AppState>,
    _caller: AuthUser,
    AxumPath(user_id): AxumPath<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Page<TweetRecord>>> {
    let user_id = parse_id(&user_id, "user")?;
    let Query(query) = query?;
    let request = query.parse()?;
    if state.store.find_user_by_id(&user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    let page = state.store.list_user_tweets(&user_id, request).await?;
    Ok(ApiResponse::ok("Tweets fetched successfully", page))
}

async fn owned_tweet(
    state: &AppState,
    caller: &UserProfile,
    tweet_id: &str,
    action: &str,
) -> ApiResult<TweetRecord> {
    let tweet_id = parse_id(tweet_id, "tweet")?;
    let tweet = state
        .store
        .find_tweet(&tweet_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    ensure_owner(&tweet, caller, action)?;
    Ok(tweet)
}

async fn update_tweet(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(tweet_id): AxumPath<String>,
    payload: Result<Json<TweetBody>, JsonRejection>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    let tweet = owned_tweet(&state, &caller, &tweet_id, "edit this tweet").await?;
    let Json(body) = payload?;
    let content = tweet_content(body)?;
    let updated = state
        .store
        .update_tweet(&tweet.id, &content)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    Ok(ApiResponse::ok("Tweet updated successfully", updated))
}

async fn delete_tweet(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AxumPath(tweet_id): AxumPath<String>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let tweet = owned_tweet(&state, &caller, &tweet_id, "delete this tweet").await?;
    if !state.store.delete_tweet(&tweet.id).await? {
        return Err(ApiError::not_found("Tweet not found"));
    }
    Ok(ApiResponse::ok(
        "Tweet deleted successfully",
        json!({ "tweetId": tweet.id }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(content: &str) -> TweetBody {
        TweetBody {
            content: Some(content.to_string()),
        }
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(tweet_content(body("  hello  ")).unwrap(), "hello");
        assert!(tweet_content(body("   ")).is_err());
        assert!(tweet_content(TweetBody { content: None }).is_err());

        let exact = "é".repeat(MAX_TWEET_CHARS);
        assert!(tweet_content(body(&exact)).is_ok(), "limit counts characters");
        let over = "a".repeat(MAX_TWEET_CHARS + 1);
        assert!(matches!(
            tweet_content(body(&over)),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
