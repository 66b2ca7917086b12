use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path as AxumPath, State, rejection::JsonRejection},
    routing::{get, patch, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AppState, MultipartForm, non_blank};
use crate::auth::{
    AuthUser, REFRESH_COOKIE, TokenPair, clear_credential_cookies, hash_password,
    set_credential_cookies, verify_password,
};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::media::{MediaKind, UploadedAsset};
use crate::store::{
    ChannelProfile, HistoryEntry, ImageSlot, NewUser, UserProfile, UserRecord, WriteOutcome,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .route("/c/{username}", get(channel_profile))
        .route("/watch-history", get(watch_history))
}

/// Session payload returned by register, login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    user: UserProfile,
    #[serde(flatten)]
    tokens: TokenPair,
}

/// Mints both credentials, persists the refresh credential (replacing any
/// previous one) and sets the cookies.
async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &UserRecord,
) -> ApiResult<(CookieJar, Session)> {
    let tokens = state
        .tokens
        .issue_pair(user)
        .map_err(|err| ApiError::internal(format!("Failed to generate tokens: {err:#}")))?;
    state
        .store
        .set_refresh_token(&user.id, Some(&tokens.refresh_token))
        .await?;
    let jar = set_credential_cookies(jar, &tokens, state.settings.production);
    Ok((
        jar,
        Session {
            user: UserProfile::from(user),
            tokens,
        },
    ))
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !value.contains(' '),
        None => false,
    }
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> ApiResult<(CookieJar, ApiResponse<Session>)> {
    let mut form = MultipartForm::read(
        multipart,
        &state.settings.temp_upload_dir,
        &["avatar", "coverImage"],
    )
    .await?;

    let (Some(full_name), Some(email), Some(username), Some(password)) = (
        form.text("fullName"),
        form.text("email"),
        form.text("username"),
        form.text("password"),
    ) else {
        return Err(ApiError::invalid("All fields are required"));
    };
    if !looks_like_email(&email) {
        return Err(ApiError::invalid("Email is not valid"));
    }

    if state
        .store
        .identity_taken(Some(username.as_str()), Some(email.as_str()), None)
        .await?
    {
        return Err(ApiError::Conflict(
            "User with this email or username already exists".into(),
        ));
    }

    let avatar_file = form.take_file("avatar");
    let cover_file = form.take_file("coverImage");

    let mut uploaded: Vec<(UploadedAsset, MediaKind)> = Vec::new();
    let avatar = match avatar_file {
        Some(file) => match state.media.upload(file.path(), MediaKind::Avatar).await {
            Some(asset) => {
                uploaded.push((asset.clone(), MediaKind::Avatar));
                Some(asset)
            }
            None => return Err(ApiError::internal("Failed to upload avatar")),
        },
        None => None,
    };
    let cover = match cover_file {
        Some(file) => match state.media.upload(file.path(), MediaKind::CoverImage).await {
            Some(asset) => {
                uploaded.push((asset.clone(), MediaKind::CoverImage));
                Some(asset)
            }
            None => {
                discard_assets(&state, &uploaded).await;
                return Err(ApiError::internal("Failed to upload cover image"));
            }
        },
        None => None,
    };

    let password_hash = match hash_password(password).await {
        Ok(hash) => hash,
        Err(err) => {
            discard_assets(&state, &uploaded).await;
            return Err(err.into());
        }
    };

    let created = state
        .store
        .create_user(NewUser {
            username,
            email,
            password_hash,
            full_name,
            avatar: avatar.as_ref().map(|a| a.url.clone()).unwrap_or_default(),
            avatar_id: avatar.map(|a| a.public_id),
            cover_image: cover.as_ref().map(|c| c.url.clone()).unwrap_or_default(),
            cover_image_id: cover.map(|c| c.public_id),
        })
        .await;

    let user = match created {
        Ok(WriteOutcome::Written(user)) => user,
        Ok(WriteOutcome::Duplicate) => {
            discard_assets(&state, &uploaded).await;
            return Err(ApiError::Conflict(
                "User with this email or username already exists".into(),
            ));
        }
        Err(err) => {
            discard_assets(&state, &uploaded).await;
            return Err(err.into());
        }
    };

    tracing::info!(user_id = %user.id, username = %user.username, "registered user");
    let (jar, session) = start_session(&state, jar, &user).await?;
    Ok((
        jar,
        ApiResponse::created("User registered successfully", session),
    ))
}

async fn discard_assets(state: &AppState, assets: &[(UploadedAsset, MediaKind)]) {
    for (asset, kind) in assets {
        state.media.remove(&asset.public_id, *kind).await;
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    email: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<(CookieJar, ApiResponse<Session>)> {
    let Json(body) = payload?;
    let email = non_blank(body.email.as_deref());
    let username = non_blank(body.username.as_deref());
    if email.is_none() && username.is_none() {
        return Err(ApiError::invalid("Email or username is required"));
    }
    let password = body
        .password
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::invalid("Password is required"))?;

    let user = match (&email, &username) {
        (Some(email), _) => state.store.find_user_by_email(email).await?,
        (None, Some(username)) => state.store.find_user_by_username(username).await?,
        (None, None) => None,
    }
    .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(ApiError::InvalidCredential("Invalid user credentials".into()));
    }

    let (jar, session) = start_session(&state, jar, &user).await?;
    Ok((jar, ApiResponse::ok("User logged in successfully", session)))
}

async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> ApiResult<(CookieJar, ApiResponse<serde_json::Value>)> {
    state.store.set_refresh_token(&user.id, None).await?;
    Ok((
        clear_credential_cookies(jar),
        ApiResponse::ok("User logged out successfully", json!({})),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: Option<String>,
}

/// Accepts the refresh credential from its cookie or a JSON body and rotates
/// both credentials.
async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<(CookieJar, ApiResponse<Session>)> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshBody>(&body)
            .map_err(|_| ApiError::invalid("Request body must be JSON"))?
            .refresh_token
    };
    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .or(from_body)
        .ok_or_else(|| ApiError::Unauthenticated("Refresh token is required".into()))?;

    let claims = state
        .tokens
        .verify_refresh(&incoming)
        .map_err(|_| ApiError::InvalidCredential("Invalid refresh token".into()))?;
    let user = state
        .store
        .find_user_by_id(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::InvalidCredential("Invalid refresh token".into()))?;
    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        return Err(ApiError::InvalidCredential(
            "Refresh token is expired or used".into(),
        ));
    }

    let (jar, session) = start_session(&state, jar, &user).await?;
    Ok((jar, ApiResponse::ok("Access token refreshed", session)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordBody {
    current_password: Option<String>,
    new_password: Option<String>,
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let Json(body) = payload?;
    let (Some(current), Some(new)) = (
        body.current_password.filter(|value| !value.is_empty()),
        body.new_password.filter(|value| !value.trim().is_empty()),
    ) else {
        return Err(ApiError::invalid(
            "Current and new password are required",
        ));
    };

    let password_hash = state
        .store
        .find_user_by_id(&user.id)
        .await?
        .map(|record| record.password_hash)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if !verify_password(current, password_hash).await? {
        return Err(ApiError::InvalidCredential("Invalid current password".into()));
    }
    let hash = hash_password(new).await?;
    state.store.set_password_hash(&user.id, &hash).await?;
    Ok(ApiResponse::ok("Password changed successfully", json!({})))
}

async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<UserProfile> {
    ApiResponse::ok("Current user fetched", user)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountBody {
    full_name: Option<String>,
    email: Option<String>,
    username: Option<String>,
}

async fn update_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateAccountBody>, JsonRejection>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let Json(body) = payload?;
    let (Some(full_name), Some(email)) = (
        non_blank(body.full_name.as_deref()),
        non_blank(body.email.as_deref()),
    ) else {
        return Err(ApiError::invalid("Full name and email are required"));
    };
    if !looks_like_email(&email) {
        return Err(ApiError::invalid("Email is not valid"));
    }
    let username = non_blank(body.username.as_deref());

    if state
        .store
        .identity_taken(username.as_deref(), Some(email.as_str()), Some(user.id.as_str()))
        .await?
    {
        return Err(ApiError::Conflict(
            "Username or email is already in use".into(),
        ));
    }

    match state
        .store
        .update_account(&user.id, &full_name, &email, username.as_deref())
        .await?
    {
        WriteOutcome::Written(updated) => Ok(ApiResponse::ok(
            "Account details updated",
            UserProfile::from(&updated),
        )),
        WriteOutcome::Duplicate => Err(ApiError::Conflict(
            "Username or email is already in use".into(),
        )),
    }
}

async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserProfile>> {
    replace_image(state, user, multipart, ImageSlot::Avatar).await
}

async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserProfile>> {
    replace_image(state, user, multipart, ImageSlot::CoverImage).await
}

async fn replace_image(
    state: AppState,
    user: UserProfile,
    multipart: Multipart,
    slot: ImageSlot,
) -> ApiResult<ApiResponse<UserProfile>> {
    let (field, kind, label) = match slot {
        ImageSlot::Avatar => ("avatar", MediaKind::Avatar, "Avatar"),
        ImageSlot::CoverImage => ("coverImage", MediaKind::CoverImage, "Cover image"),
    };

    let mut form = MultipartForm::read(multipart, &state.settings.temp_upload_dir, &[field]).await?;
    let file = form
        .take_file(field)
        .ok_or_else(|| ApiError::invalid(format!("{label} file is missing")))?;

    let asset = state
        .media
        .upload(file.path(), kind)
        .await
        .ok_or_else(|| ApiError::internal(format!("Failed to upload {label}")))?;

    let previous = match state
        .store
        .replace_user_image(&user.id, slot, &asset.url, &asset.public_id)
        .await
    {
        Ok(previous) => previous,
        Err(err) => {
            state.media.remove(&asset.public_id, kind).await;
            return Err(err.into());
        }
    };
    if let Some(previous) = previous {
        state.media.remove(&previous, kind).await;
    }

    let updated = state
        .store
        .find_user_by_id(&user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(
        format!("{label} updated successfully"),
        UserProfile::from(&updated),
    ))
}

async fn channel_profile(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    AxumPath(username): AxumPath<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let username = non_blank(Some(username.as_str()))
        .ok_or_else(|| ApiError::invalid("Username is missing"))?;
    let profile = state
        .store
        .channel_profile(&username, Some(&viewer.id))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;
    Ok(ApiResponse::ok("Channel profile fetched", profile))
}

async fn watch_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<Vec<HistoryEntry>>> {
    let history = state.store.watch_history(&user.id).await?;
    Ok(ApiResponse::ok("Watch history fetched", history))
}
