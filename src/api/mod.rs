//! API Surface: route table, shared request plumbing and the ownership check
//! every mutating handler runs before touching a record.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart},
    http::{HeaderValue, Method, header},
    routing::get,
};
use tokio::io::AsyncWriteExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::config::Settings;
use crate::error::{ApiError, ApiResult};
use crate::media::{MediaDelegate, TempAsset};
use crate::store::{CommentRecord, EntityStore, PlaylistRecord, TweetRecord, UserProfile, VideoRecord};

mod comments;
mod dashboard;
mod healthcheck;
mod likes;
mod media;
mod playlists;
mod subscriptions;
mod tweets;
mod users;
mod videos;

#[cfg(test)]
mod tests;

/// Process-scoped resources shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EntityStore>,
    pub media: Arc<MediaDelegate>,
    pub tokens: Arc<TokenIssuer>,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .nest("/api/v1/user", users::routes())
        .nest("/api/v1/video", videos::routes())
        .nest("/api/v1/comment", comments::routes())
        .nest("/api/v1/like", likes::routes())
        .nest("/api/v1/subscription", subscriptions::routes())
        .nest("/api/v1/tweet", tweets::routes())
        .nest("/api/v1/playlist", playlists::routes())
        .nest("/api/v1/channel", dashboard::routes())
        .route("/api/v1/healthcheck", get(healthcheck::healthcheck))
        .route("/media/{kind}/{file}", get(media::serve_media))
        .fallback(|| async { ApiError::not_found("endpoint not found") })
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = state.settings.cors_origin.as_deref() {
        match HeaderValue::from_str(origin) {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_credentials(true)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PATCH,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                );
            }
            Err(err) => tracing::warn!(origin, error = %err, "ignoring invalid CORS_ORIGIN"),
        }
    }

    app.with_state(state)
}

/// Validates an identifier path segment and returns its canonical form.
pub(crate) fn parse_id(raw: &str, kind: &str) -> ApiResult<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| ApiError::invalid(format!("Invalid {kind} ID")))
}

/// Records that belong to exactly one user.
pub(crate) trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for VideoRecord {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for CommentRecord {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for TweetRecord {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for PlaylistRecord {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

pub(crate) fn ensure_owner<T: Owned>(record: &T, caller: &UserProfile, action: &str) -> ApiResult<()> {
    if record.owner_id() != caller.id {
        return Err(ApiError::forbidden(format!(
            "You are not allowed to {action}"
        )));
    }
    Ok(())
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// A parsed multipart body: text fields plus the accepted file fields, each
/// buffered into a [`TempAsset`] that is deleted when the form is dropped.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempAsset>,
}

impl MultipartForm {
    /// Drains the request body. Only fields named in `file_fields` are kept
    /// as files; empty uploads are treated as absent and any other file part
    /// is streamed past without being stored.
    pub(crate) async fn read(
        mut multipart: Multipart,
        temp_dir: &Path,
        file_fields: &[&str],
    ) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_none() {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            }
            if !file_fields.contains(&name.as_str()) {
                tracing::debug!(field = %name, "skipping unexpected file part");
                while field.chunk().await?.is_some() {}
                continue;
            }

            let asset = TempAsset::create(temp_dir, field.file_name())?;
            let mut writer = asset.writer()?;
            while let Some(chunk) = field.chunk().await? {
                writer
                    .write_all(&chunk)
                    .await
                    .context("buffering upload to disk")?;
            }
            writer.flush().await.context("flushing upload to disk")?;
            drop(writer);

            if !asset.is_empty() {
                form.files.insert(name, asset);
            }
        }
        Ok(form)
    }

    pub(crate) fn text(&self, name: &str) -> Option<String> {
        non_blank(self.fields.get(name).map(String::as_str))
    }

    pub(crate) fn take_file(&mut self, name: &str) -> Option<TempAsset> {
        self.files.remove(name)
    }
}
